//! Declarative YAML manifests.
//!
//! A manifest is a single document with a `variables` map and a `resources`
//! list. `{{ name }}` placeholders anywhere in the document are substituted
//! from the variables before the final parse:
//!
//! ```yaml
//! variables:
//!   webroot: /srv/www
//! resources:
//!   - id: webroot
//!     type: directory
//!     state: present
//!     properties: { path: "{{ webroot }}", mode: "0755" }
//!   - id: index
//!     type: file
//!     state: present
//!     properties: { path: "{{ webroot }}/index.html", owner: www }
//!     dependencies: [webroot]
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use converge::{BoxedResource, ResourceSpec};
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;

use super::{Loader, LoaderContext};
use crate::resource::{Command, CommandOptions, DesiredProperties, Directory, File, State};

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("variable pattern is valid")
});

#[derive(Debug, Default, Deserialize)]
struct Preliminary {
    #[serde(default)]
    variables: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    resources: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    state: Option<State>,
    #[serde(default)]
    properties: HashMap<String, Value>,
    #[serde(default)]
    dependencies: Vec<String>,
}

pub struct YamlLoader;

impl Loader for YamlLoader {
    fn load(&self, ctx: &LoaderContext, path: &Path) -> Result<Vec<ResourceSpec>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let document =
            parse(&raw).with_context(|| format!("manifest load error [{}]", path.display()))?;

        let mut specs = Vec::with_capacity(document.resources.len());
        for entry in &document.resources {
            specs.push(ResourceSpec {
                id: entry.id.clone(),
                resource: instantiate(ctx, entry)?,
                dependencies: entry.dependencies.clone(),
            });
        }
        Ok(specs)
    }
}

/// Two-pass parse: extract the variables, substitute over the raw text,
/// parse the substituted document.
fn parse(raw: &str) -> Result<Document> {
    let preliminary: Preliminary =
        serde_yaml::from_str(raw).context("failed to parse manifest variables")?;
    let substituted = substitute(raw, &preliminary.variables)?;
    serde_yaml::from_str(&substituted).context("failed to parse manifest")
}

fn substitute(raw: &str, variables: &HashMap<String, Value>) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut last = 0;

    for caps in VAR_PATTERN.captures_iter(raw) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(value) = variables.get(name.as_str()) else {
            bail!("undefined variable {:?} in manifest", name.as_str());
        };
        out.push_str(&raw[last..whole.start()]);
        out.push_str(&value_string(value));
        last = whole.end();
    }
    out.push_str(&raw[last..]);
    Ok(out)
}

fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}

fn opt_string(properties: &HashMap<String, Value>, key: &str) -> Option<String> {
    properties
        .get(key)
        .filter(|value| !value.is_null())
        .map(value_string)
}

/// Builds the concrete resource for a manifest entry and runs its
/// validation, so broken declarations fail at load time.
fn instantiate(ctx: &LoaderContext, entry: &Entry) -> Result<BoxedResource> {
    let props = &entry.properties;
    let state = entry.state.unwrap_or_default();

    let resource: BoxedResource = match entry.kind.as_str() {
        "file" => Box::new(File::new(
            ctx.client.clone(),
            &ctx.backup_dir,
            state,
            opt_string(props, "path").unwrap_or_default(),
            DesiredProperties {
                mode: opt_string(props, "mode"),
                owner: opt_string(props, "owner"),
                group: opt_string(props, "group"),
            },
        )),
        "directory" => Box::new(Directory::new(
            ctx.client.clone(),
            &ctx.backup_dir,
            state,
            opt_string(props, "path").unwrap_or_default(),
            DesiredProperties {
                mode: opt_string(props, "mode"),
                owner: opt_string(props, "owner"),
                group: opt_string(props, "group"),
            },
        )),
        "command" => {
            let mut options = CommandOptions::default();
            if let Some(timeout) = props.get("timeout").and_then(Value::as_u64) {
                options.timeout = Duration::from_secs(timeout);
            }
            if let Some(codes) = props.get("expected_exit_codes") {
                options.expected_exit_codes = serde_yaml::from_value(codes.clone())
                    .context("expected_exit_codes must be a list of integers")?;
            }
            if let Some(concurrent) = props.get("concurrent").and_then(Value::as_bool) {
                options.concurrent = concurrent;
            }
            Box::new(Command::new(
                ctx.client.clone(),
                opt_string(props, "command").unwrap_or_default(),
                options,
            ))
        }
        other => bail!("unsupported resource type {other:?}"),
    };

    resource
        .validate()
        .with_context(|| format!("invalid {:?} resource (id: {})", entry.kind, entry.id))?;
    Ok(resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentkit::AgentClient;
    use std::io::Write;
    use std::sync::Arc;

    fn ctx() -> LoaderContext {
        LoaderContext {
            client: Arc::new(AgentClient::new("http://localhost:8080").unwrap()),
            backup_dir: "/tmp/axion-backups".into(),
        }
    }

    const MANIFEST: &str = r#"
variables:
  webroot: /srv/www

resources:
  - id: webroot
    type: directory
    state: present
    properties:
      path: "{{ webroot }}"
      mode: "0755"

  - id: index
    type: file
    state: present
    properties:
      path: "{{ webroot }}/index.html"
      owner: www
    dependencies: [webroot]

  - id: reload
    type: command
    properties:
      command: "nginx -s reload"
      timeout: 5
      expected_exit_codes: [0, 2]
      concurrent: true
    dependencies: [index]
"#;

    #[test]
    fn loads_resources_with_variable_substitution() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();

        let specs = YamlLoader.load(&ctx(), file.path()).unwrap();
        assert_eq!(specs.len(), 3);

        assert_eq!(specs[0].id, "webroot");
        assert_eq!(specs[0].resource.name(), "directory:/srv/www");
        assert!(specs[0].dependencies.is_empty());

        assert_eq!(specs[1].resource.name(), "file:/srv/www/index.html");
        assert_eq!(specs[1].dependencies, vec!["webroot".to_string()]);

        assert_eq!(specs[2].resource.name(), "command:nginx -s reload");
        assert!(specs[2].resource.is_concurrent());
    }

    #[test]
    fn undefined_variables_are_load_errors() {
        let raw = "resources:\n  - id: a\n    type: file\n    state: present\n    properties: { path: \"{{ missing }}\" }\n";
        let err = parse(raw).unwrap_err();
        assert!(err.to_string().contains("undefined variable"));
    }

    #[test]
    fn unsupported_types_are_rejected() {
        let entry = Entry {
            id: "pkg".into(),
            kind: "package".into(),
            state: None,
            properties: HashMap::new(),
            dependencies: vec![],
        };
        let err = match instantiate(&ctx(), &entry) {
            Ok(_) => panic!("expected instantiate to fail"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("unsupported resource type"));
    }

    #[test]
    fn invalid_resources_fail_at_load_time() {
        // File without a state: validation rejects the unknown state.
        let entry = Entry {
            id: "conf".into(),
            kind: "file".into(),
            state: None,
            properties: HashMap::from([("path".to_string(), Value::String("/etc/foo".into()))]),
            dependencies: vec![],
        };
        let err = match instantiate(&ctx(), &entry) {
            Ok(_) => panic!("expected instantiate to fail"),
            Err(err) => err,
        };
        assert!(format!("{err:#}").contains("invalid desired state"));
    }

    #[test]
    fn substitution_tolerates_whitespace_and_repeats() {
        let variables = HashMap::from([("dir".to_string(), Value::String("/opt".into()))]);
        let out = substitute("{{dir}}/a {{ dir }}/b", &variables).unwrap();
        assert_eq!(out, "/opt/a /opt/b");
    }
}
