//! Scripted Lua manifests.
//!
//! For manifests that want loops, conditionals or computed properties, the
//! Lua form executes a script with an `axion` module in scope:
//!
//! ```lua
//! local webroot = axion.directory{
//!   state = "present",
//!   path = "/srv/www",
//!   mode = "0755",
//! }
//!
//! for _, host in ipairs({ "a", "b" }) do
//!   axion.file{
//!     state = "present",
//!     path = "/srv/www/" .. host .. ".conf",
//!     dependencies = { webroot },
//!   }
//! end
//! ```
//!
//! Each builder registers a resource spec and returns its id, so scripts
//! wire dependencies by passing the returned values around. An explicit
//! `id` field overrides the default (the resource's display name).
//! Resources are validated as they are registered; a broken declaration
//! aborts the script.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use converge::{BoxedResource, ResourceSpec};
use mlua::{Lua, Table};

use super::{Loader, LoaderContext};
use crate::resource::{Command, CommandOptions, DesiredProperties, Directory, File, State};

pub struct LuaLoader;

type SpecSink = Rc<RefCell<Vec<ResourceSpec>>>;

impl Loader for LuaLoader {
    fn load(&self, ctx: &LoaderContext, path: &Path) -> Result<Vec<ResourceSpec>> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;

        let specs: SpecSink = Rc::default();
        let lua = Lua::new();
        register(&lua, ctx, &specs)
            .map_err(|err| anyhow!("failed to set up lua manifest runtime: {err}"))?;

        lua.load(&source)
            .set_name(path.display().to_string())
            .exec()
            .map_err(|err| anyhow!("lua manifest error: {err}"))?;

        let collected = specs.borrow_mut().drain(..).collect();
        Ok(collected)
    }
}

/// Installs the `axion` module with the three resource builders.
fn register(lua: &Lua, ctx: &LoaderContext, specs: &SpecSink) -> mlua::Result<()> {
    let axion = lua.create_table()?;

    {
        let specs = Rc::clone(specs);
        let client = Arc::clone(&ctx.client);
        let backup_dir = ctx.backup_dir.clone();
        axion.set(
            "file",
            lua.create_function(move |_, spec: Table| {
                let path: String = spec.get::<Option<String>>("path")?.unwrap_or_default();
                let desired = DesiredProperties {
                    mode: spec.get("mode")?,
                    owner: spec.get("owner")?,
                    group: spec.get("group")?,
                };
                let id = spec
                    .get::<Option<String>>("id")?
                    .unwrap_or_else(|| format!("file:{path}"));
                let dependencies = spec
                    .get::<Option<Vec<String>>>("dependencies")?
                    .unwrap_or_default();
                let resource = File::new(
                    Arc::clone(&client),
                    &backup_dir,
                    parse_state(spec.get("state")?),
                    path,
                    desired,
                );
                push_spec(&specs, id, Box::new(resource), dependencies)
            })?,
        )?;
    }

    {
        let specs = Rc::clone(specs);
        let client = Arc::clone(&ctx.client);
        let backup_dir = ctx.backup_dir.clone();
        axion.set(
            "directory",
            lua.create_function(move |_, spec: Table| {
                let path: String = spec.get::<Option<String>>("path")?.unwrap_or_default();
                let desired = DesiredProperties {
                    mode: spec.get("mode")?,
                    owner: spec.get("owner")?,
                    group: spec.get("group")?,
                };
                let id = spec
                    .get::<Option<String>>("id")?
                    .unwrap_or_else(|| format!("directory:{path}"));
                let dependencies = spec
                    .get::<Option<Vec<String>>>("dependencies")?
                    .unwrap_or_default();
                let resource = Directory::new(
                    Arc::clone(&client),
                    &backup_dir,
                    parse_state(spec.get("state")?),
                    path,
                    desired,
                );
                push_spec(&specs, id, Box::new(resource), dependencies)
            })?,
        )?;
    }

    {
        let specs = Rc::clone(specs);
        let client = Arc::clone(&ctx.client);
        axion.set(
            "command",
            lua.create_function(move |_, spec: Table| {
                let command: String = spec.get::<Option<String>>("command")?.unwrap_or_default();

                let mut options = CommandOptions::default();
                if let Some(timeout) = spec.get::<Option<u64>>("timeout")? {
                    options.timeout = Duration::from_secs(timeout);
                }
                if let Some(codes) = spec.get::<Option<Vec<i64>>>("expected_exit_codes")? {
                    options.expected_exit_codes = codes;
                }
                if let Some(concurrent) = spec.get::<Option<bool>>("concurrent")? {
                    options.concurrent = concurrent;
                }

                let id = spec
                    .get::<Option<String>>("id")?
                    .unwrap_or_else(|| format!("command:{command}"));
                let dependencies = spec
                    .get::<Option<Vec<String>>>("dependencies")?
                    .unwrap_or_default();
                let resource = Command::new(Arc::clone(&client), command, options);
                push_spec(&specs, id, Box::new(resource), dependencies)
            })?,
        )?;
    }

    lua.globals().set("axion", axion)
}

fn parse_state(state: Option<String>) -> State {
    state
        .as_deref()
        .map(|s| s.parse().unwrap_or_default())
        .unwrap_or_default()
}

/// Validates and registers a spec; the builder returns the id so scripts
/// can reference it in dependency lists.
fn push_spec(
    specs: &RefCell<Vec<ResourceSpec>>,
    id: String,
    resource: BoxedResource,
    dependencies: Vec<String>,
) -> mlua::Result<String> {
    resource
        .validate()
        .map_err(|err| mlua::Error::RuntimeError(format!("invalid resource {id:?}: {err:#}")))?;

    specs.borrow_mut().push(ResourceSpec {
        id: id.clone(),
        resource,
        dependencies,
    });
    Ok(id)
}
