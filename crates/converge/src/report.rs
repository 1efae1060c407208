//! Lifecycle event sinks.
//!
//! The orchestrator reports every lifecycle transition through a
//! [`Reporter`]; it never inspects the output. Three sinks ship: decorated
//! ([`EmojiReporter`]), plain ([`PlainReporter`]) and silent
//! ([`NullReporter`]).

use chrono::Local;
use colored::Colorize;

/// Event sink for lifecycle transitions. Implementations must not fail;
/// anything that can go wrong while rendering has to be swallowed.
pub trait Reporter: Send + Sync {
    /// General informational message.
    fn info(&self, msg: &str);

    /// Warning about a recoverable issue.
    fn warn(&self, msg: &str);

    /// Non-fatal error message.
    fn error(&self, msg: &str);

    /// Start of resource evaluation.
    fn evaluate(&self, id: &str, name: &str);

    /// Resource needs no changes after evaluation.
    fn no_changes(&self, id: &str, name: &str);

    /// Resource skipped due to a previous failure.
    fn skipped(&self, id: &str, name: &str);

    /// Resource has pending changes.
    fn diff(&self, id: &str, name: &str, diff: &str);

    /// Start of a resource apply.
    fn apply(&self, id: &str, name: &str);

    /// A backup artifact was created for the resource.
    fn backuped(&self, id: &str, name: &str);

    /// Start of a rollback for the resource.
    fn rollback(&self, id: &str, name: &str);

    /// Successful application.
    fn success(&self, id: &str, name: &str);

    /// Failure in any phase.
    fn fail(&self, id: &str, name: &str, err: &anyhow::Error);
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

fn display(id: &str, name: &str) -> String {
    if !id.is_empty() && id != name {
        format!("{name} ({id})")
    } else {
        name.to_string()
    }
}

/// Decorated sink: timestamps, emoji and a splash of color.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmojiReporter;

impl Reporter for EmojiReporter {
    fn info(&self, msg: &str) {
        println!("{} 📢 {msg}", timestamp().dimmed());
    }

    fn warn(&self, msg: &str) {
        println!("{} ⚠️  {}", timestamp().dimmed(), msg.yellow());
    }

    fn error(&self, msg: &str) {
        println!("{} ❌ {}", timestamp().dimmed(), msg.red());
    }

    fn evaluate(&self, id: &str, name: &str) {
        println!("{} 🔍 Evaluating: {}", timestamp().dimmed(), display(id, name));
    }

    fn no_changes(&self, id: &str, name: &str) {
        println!(
            "{} ✨ No changes needed: {}",
            timestamp().dimmed(),
            display(id, name)
        );
    }

    fn skipped(&self, id: &str, name: &str) {
        println!(
            "{} ⏭️  Skipped due to failure: {}",
            timestamp().dimmed(),
            display(id, name)
        );
    }

    fn diff(&self, id: &str, name: &str, diff: &str) {
        println!(
            "{} 📄 Diff for {}:\n{diff}",
            timestamp().dimmed(),
            display(id, name)
        );
    }

    fn apply(&self, id: &str, name: &str) {
        println!("{} 🔧 Applying: {}", timestamp().dimmed(), display(id, name));
    }

    fn backuped(&self, id: &str, name: &str) {
        println!("{} 💾 Backed up: {}", timestamp().dimmed(), display(id, name));
    }

    fn rollback(&self, id: &str, name: &str) {
        println!(
            "{} ↩️  Rolling back: {}",
            timestamp().dimmed(),
            display(id, name)
        );
    }

    fn success(&self, id: &str, name: &str) {
        println!(
            "{} ✅ {} {}",
            timestamp().dimmed(),
            "Success:".green(),
            display(id, name)
        );
    }

    fn fail(&self, id: &str, name: &str, err: &anyhow::Error) {
        println!(
            "{} ❌ {} {} — {err:#}",
            timestamp().dimmed(),
            "Failed:".red(),
            display(id, name)
        );
    }
}

/// Undecorated sink for dumb terminals and log capture.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainReporter;

impl Reporter for PlainReporter {
    fn info(&self, msg: &str) {
        println!("{} Info: {msg}", timestamp());
    }

    fn warn(&self, msg: &str) {
        println!("{} Warning: {msg}", timestamp());
    }

    fn error(&self, msg: &str) {
        println!("{} Error: {msg}", timestamp());
    }

    fn evaluate(&self, id: &str, name: &str) {
        println!("{} Evaluating: {}", timestamp(), display(id, name));
    }

    fn no_changes(&self, id: &str, name: &str) {
        println!("{} No changes needed: {}", timestamp(), display(id, name));
    }

    fn skipped(&self, id: &str, name: &str) {
        println!(
            "{} Skipped due to failure: {}",
            timestamp(),
            display(id, name)
        );
    }

    fn diff(&self, id: &str, name: &str, diff: &str) {
        println!("{} Diff for {}:\n{diff}", timestamp(), display(id, name));
    }

    fn apply(&self, id: &str, name: &str) {
        println!("{} Applying: {}", timestamp(), display(id, name));
    }

    fn backuped(&self, id: &str, name: &str) {
        println!("{} Backed up: {}", timestamp(), display(id, name));
    }

    fn rollback(&self, id: &str, name: &str) {
        println!("{} Rolling back: {}", timestamp(), display(id, name));
    }

    fn success(&self, id: &str, name: &str) {
        println!("{} Success: {}", timestamp(), display(id, name));
    }

    fn fail(&self, id: &str, name: &str, err: &anyhow::Error) {
        println!("{} Failed: {} — {err:#}", timestamp(), display(id, name));
    }
}

/// Swallows everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
    fn evaluate(&self, _id: &str, _name: &str) {}
    fn no_changes(&self, _id: &str, _name: &str) {}
    fn skipped(&self, _id: &str, _name: &str) {}
    fn diff(&self, _id: &str, _name: &str, _diff: &str) {}
    fn apply(&self, _id: &str, _name: &str) {}
    fn backuped(&self, _id: &str, _name: &str) {}
    fn rollback(&self, _id: &str, _name: &str) {}
    fn success(&self, _id: &str, _name: &str) {}
    fn fail(&self, _id: &str, _name: &str, _err: &anyhow::Error) {}
}
