//! Terminal summary rendering.

use colored::Colorize;
use converge::Summary;

/// Prints the one-screen wrap-up after a run: overall verdict, counters
/// and a line per failed attempt.
pub fn print_summary(summary: &Summary, plan_only: bool) {
    println!();
    match (summary.success, plan_only) {
        (true, true) => println!("  {} Plan complete", "✓".green().bold()),
        (true, false) => println!(
            "  {} Configuration applied successfully!",
            "✓".green().bold()
        ),
        (false, _) => println!("  {} Run failed", "✗".red().bold()),
    }

    if plan_only {
        let pending = summary
            .attempts
            .values()
            .filter(|a| a.needs_apply && !a.skipped)
            .count();
        println!(
            "    • {pending} of {} resources have pending changes",
            summary.total_count
        );
    } else if summary.applied_count > 0 {
        println!("    • {} resources applied", summary.applied_count);
    }

    if summary.skipped_count > 0 {
        println!("    • {} resources skipped", summary.skipped_count);
    }
    if summary.rollback_count > 0 {
        println!("    • {} resources rolled back", summary.rollback_count);
    }

    for attempt in summary.attempts.values() {
        if let Some(err) = attempt.error() {
            println!("    {} {} — {err:#}", "✗".red(), attempt.name);
        }
    }
    if let Some(err) = &summary.fatal_error {
        println!("    {} {err}", "✗".red());
    }
}
