//! Configuration assembly
//!
//! A configuration directory holds a base document and any number of fragment
//! files. Fragments contribute receivers, routes and time intervals, which are
//! merged into the base document, validated as a whole and written out as a
//! single Alertmanager configuration.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::error::{Error, Finding, Result};
use crate::models::Document;
use crate::routing::validate;

const FRAGMENT_KEYS: [&str; 3] = ["receivers", "routes", "time_intervals"];

/// Merges a configuration directory into one document
#[derive(Debug, Clone)]
pub struct Assembler {
    base_file: String,
    output_file: PathBuf,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::from_settings(&RenderConfig::default())
    }
}

impl Assembler {
    /// `output_file` is resolved against the configuration directory unless absolute
    pub fn new(base_file: impl Into<String>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            base_file: base_file.into(),
            output_file: output_file.into(),
        }
    }

    /// Create an assembler from the `render` settings section
    pub fn from_settings(settings: &RenderConfig) -> Self {
        Self::new(settings.base_file.clone(), settings.output_file.clone())
    }

    /// Where [`render`](Self::render) writes for `dir`
    pub fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.output_file)
    }

    /// Merge `dir` into one document, substituting `$NAME` values from the
    /// process environment. Problems with the content are returned as
    /// findings; only an unreadable or malformed base document is an error.
    pub fn assemble(&self, dir: &Path) -> Result<Assembly> {
        self.assemble_with(dir, |name| std::env::var(name).ok())
    }

    /// Like [`assemble`](Self::assemble), resolving variables with `lookup`
    pub fn assemble_with<F>(&self, dir: &Path, lookup: F) -> Result<Assembly>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_path = dir.join(&self.base_file);
        info!(dir = %dir.display(), base = %base_path.display(), "Assembling configuration");

        let mut findings = Vec::new();
        let base_name = self.base_file.clone();

        let mut base = serde_yaml::from_str::<Value>(&std::fs::read_to_string(&base_path)?)
            .map_err(|e| Error::config(format!("{}: {e}", base_path.display())))?;
        if !base.is_mapping() {
            return Err(Error::config(format!(
                "{}: expected a mapping at the top level",
                base_path.display()
            )));
        }
        substitute(&mut base, &lookup, &base_name, &mut findings);

        let skip = [base_path.clone(), self.output_path(dir)];
        let fragments = fragment_files(dir, &skip)?;
        let mut parts = Parts::default();
        for path in &fragments {
            let name = display_name(dir, path);
            parts.load(path, &name, &lookup, &mut findings)?;
        }

        if let Value::Mapping(root) = &mut base {
            parts.merge_into(root, &base_name, &mut findings);
        }

        let document = match serde_yaml::from_value::<Document>(base.clone()) {
            Ok(document) => {
                findings.extend(validate(&document));
                Some(document)
            }
            Err(e) => {
                findings.push(Finding::Assembly {
                    file: base_name,
                    reason: e.to_string(),
                });
                None
            }
        };

        debug!(
            fragments = fragments.len(),
            findings = findings.len(),
            "Assembled configuration"
        );
        Ok(Assembly {
            merged: base,
            document,
            findings,
            fragments,
        })
    }

    /// Assemble `dir` and write the result, refusing to write when anything
    /// was found wrong. Returns the path written.
    pub fn render(&self, dir: &Path) -> Result<PathBuf> {
        let assembly = self.assemble(dir)?;
        if !assembly.findings.is_empty() {
            warn!(
                findings = assembly.findings.len(),
                "Not writing configuration with findings"
            );
            return Err(Error::InvalidConfig(assembly.findings));
        }

        let output = self.output_path(dir);
        std::fs::write(&output, assembly.to_yaml_string()?)?;
        info!(path = %output.display(), "Wrote configuration");
        Ok(output)
    }
}

/// Result of merging a configuration directory
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Merged YAML, key order as written in the sources
    pub merged: Value,
    /// Typed view of `merged`; `None` when it does not have the document shape
    pub document: Option<Document>,
    /// Everything wrong with the sources and the merged result
    pub findings: Vec<Finding>,
    /// Fragment files merged, in merge order
    pub fragments: Vec<PathBuf>,
}

impl Assembly {
    /// True when nothing was found wrong
    pub fn is_valid(&self) -> bool {
        self.findings.is_empty()
    }

    /// Serialize the merged document
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.merged)?)
    }
}

/// Components collected from fragment files
#[derive(Debug, Default)]
struct Parts {
    receivers: Vec<Value>,
    routes: Vec<Value>,
    time_intervals: Vec<Value>,
}

impl Parts {
    fn load<F>(
        &mut self,
        path: &Path,
        name: &str,
        lookup: &F,
        findings: &mut Vec<Finding>,
    ) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        debug!(file = name, "Loading fragment");
        let mut report = |reason: String| {
            findings.push(Finding::Assembly {
                file: name.to_string(),
                reason,
            });
        };

        let mut fragment = match serde_yaml::from_str::<Value>(&std::fs::read_to_string(path)?) {
            Ok(Value::Mapping(fragment)) => fragment,
            Ok(Value::Null) => {
                warn!(file = name, "Skipping empty fragment");
                return Ok(());
            }
            Ok(_) => {
                report("expected a mapping at the top level".to_string());
                return Ok(());
            }
            Err(e) => {
                report(e.to_string());
                return Ok(());
            }
        };

        if !FRAGMENT_KEYS.iter().any(|key| fragment.contains_key(*key)) {
            warn!(
                file = name,
                "Skipping fragment without receivers, routes or time_intervals"
            );
            return Ok(());
        }

        for value in fragment.values_mut() {
            substitute(value, lookup, name, findings);
        }

        if let Some(receivers) = fragment.get("receivers") {
            collect_mappings(receivers, "receivers", name, &mut self.receivers, findings);
        }
        match fragment.get("routes") {
            // a single route may be given without the list around it
            Some(route @ Value::Mapping(_)) => self.routes.push(route.clone()),
            Some(routes) => collect_mappings(routes, "routes", name, &mut self.routes, findings),
            None => {}
        }
        if let Some(intervals) = fragment.get("time_intervals") {
            collect_mappings(
                intervals,
                "time_intervals",
                name,
                &mut self.time_intervals,
                findings,
            );
        }
        Ok(())
    }

    fn merge_into(self, root: &mut Mapping, base_name: &str, findings: &mut Vec<Finding>) {
        append(root, "receivers", self.receivers, base_name, findings);
        append(root, "time_intervals", self.time_intervals, base_name, findings);

        if self.routes.is_empty() {
            return;
        }
        if !matches!(root.get("route"), Some(Value::Mapping(_))) {
            warn!(file = base_name, "No root route in base document, creating one");
            root.insert(Value::String("route".to_string()), Value::Mapping(Mapping::new()));
        }
        if let Some(Value::Mapping(route)) = root.get_mut("route") {
            append(route, "routes", self.routes, base_name, findings);
        }
    }
}

fn collect_mappings(
    value: &Value,
    key: &str,
    file: &str,
    into: &mut Vec<Value>,
    findings: &mut Vec<Finding>,
) {
    let Value::Sequence(items) = value else {
        findings.push(Finding::Assembly {
            file: file.to_string(),
            reason: format!("'{key}' must be a list"),
        });
        return;
    };

    for (index, item) in items.iter().enumerate() {
        if item.is_mapping() {
            into.push(item.clone());
        } else {
            findings.push(Finding::Assembly {
                file: file.to_string(),
                reason: format!("{key}[{index}] must be a mapping"),
            });
        }
    }
}

/// Extend the list under `key`, creating it when absent
fn append(
    map: &mut Mapping,
    key: &str,
    items: Vec<Value>,
    file: &str,
    findings: &mut Vec<Finding>,
) {
    if items.is_empty() {
        return;
    }
    if matches!(map.get(key), None | Some(Value::Null)) {
        map.insert(Value::String(key.to_string()), Value::Sequence(Vec::new()));
    }
    match map.get_mut(key) {
        Some(Value::Sequence(existing)) => existing.extend(items),
        _ => findings.push(Finding::Assembly {
            file: file.to_string(),
            reason: format!("'{key}' must be a list"),
        }),
    }
}

/// Replace every string of the form `$name` with the environment variable
/// `NAME`. Unset variables are reported and the value left as written.
fn substitute<F>(value: &mut Value, lookup: &F, file: &str, findings: &mut Vec<Finding>)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(text) => {
            let Some(name) = text.strip_prefix('$').filter(|name| !name.is_empty()) else {
                return;
            };
            let name = name.to_uppercase();
            match lookup(&name) {
                Some(resolved) => *text = resolved,
                None => findings.push(Finding::Assembly {
                    file: file.to_string(),
                    reason: format!("environment variable '{name}' is not set"),
                }),
            }
        }
        Value::Sequence(items) => {
            for item in items {
                substitute(item, lookup, file, findings);
            }
        }
        Value::Mapping(map) => {
            for item in map.values_mut() {
                substitute(item, lookup, file, findings);
            }
        }
        _ => {}
    }
}

/// YAML files under `dir`, recursively, in path order
fn fragment_files(dir: &Path, skip: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            // symlinked directories are not followed, so links cannot form a cycle
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if is_yaml(&path) && !skip.contains(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    )
}

fn display_name(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir).unwrap_or(path).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const BASE: &str = r#"
global:
  resolve_timeout: 5m
route:
  receiver: default
  group_by: [alertname]
receivers:
  - name: default
"#;

    fn config_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            let path = dir.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
        dir
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_merges_fragments_in_path_order() {
        let dir = config_dir(&[
            ("base.yaml", BASE),
            (
                "teams/db.yaml",
                r#"
receivers:
  - name: db-pager
routes:
  - receiver: db-pager
    matchers: ['team="db"']
"#,
            ),
            (
                "a-web.yml",
                r#"
receivers: [{name: web}]
routes:
  receiver: web
  match: {team: web}
"#,
            ),
            ("notes.txt", "not yaml"),
        ]);

        let assembly = Assembler::default()
            .assemble_with(dir.path(), env(&[]))
            .unwrap();
        assert!(assembly.is_valid(), "{:?}", assembly.findings);
        assert_eq!(assembly.fragments.len(), 2);

        let document = assembly.document.unwrap();
        let receivers: Vec<&str> = document.receivers.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(receivers, vec!["default", "web", "db-pager"]);
        let routes: Vec<Option<&str>> = document
            .root()
            .unwrap()
            .routes
            .iter()
            .map(|r| r.receiver.as_deref())
            .collect();
        assert_eq!(routes, vec![Some("web"), Some("db-pager")]);
        assert!(document.extra.contains_key("global"));
    }

    #[test]
    fn test_substitutes_environment_variables() {
        let dir = config_dir(&[
            ("base.yaml", BASE),
            (
                "hooks.yaml",
                r#"
receivers:
  - name: hook
    webhook_configs:
      - url: $hook_url
"#,
            ),
        ]);

        let assembly = Assembler::default()
            .assemble_with(dir.path(), env(&[("HOOK_URL", "http://hooks.local/alert")]))
            .unwrap();
        assert!(assembly.is_valid(), "{:?}", assembly.findings);
        let yaml = assembly.to_yaml_string().unwrap();
        assert!(yaml.contains("http://hooks.local/alert"));
    }

    #[test]
    fn test_reports_every_problem() {
        let dir = config_dir(&[
            ("base.yaml", BASE),
            (
                "a.yaml",
                r#"
receivers:
  - name: default
routes:
  - receiver: ghost
"#,
            ),
            ("b.yaml", "receivers: {name: oops}"),
            ("c.yaml", "routes: [[nested]]"),
            ("d.yaml", "time_intervals: [{name: quiet, time_intervals: [{weekdays: [$day]}]}]"),
        ]);

        let assembly = Assembler::default()
            .assemble_with(dir.path(), env(&[]))
            .unwrap();
        let kinds: Vec<&str> = assembly.findings.iter().map(Finding::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "assembly",
                "assembly",
                "assembly",
                "duplicate_receiver",
                "invalid_time_interval",
                "config_reference",
            ]
        );
        assert_eq!(
            assembly.findings[0],
            Finding::Assembly {
                file: "b.yaml".to_string(),
                reason: "'receivers' must be a list".to_string(),
            }
        );
        assert_eq!(
            assembly.findings[2],
            Finding::Assembly {
                file: "d.yaml".to_string(),
                reason: "environment variable 'DAY' is not set".to_string(),
            }
        );
    }

    #[test]
    fn test_creates_root_route_for_fragment_routes() {
        let dir = config_dir(&[
            ("base.yaml", "receivers: [{name: default}]"),
            ("r.yaml", "routes: [{receiver: default}]"),
        ]);

        let assembly = Assembler::default()
            .assemble_with(dir.path(), env(&[]))
            .unwrap();
        // the created root has no receiver of its own
        assert_eq!(assembly.findings, vec![Finding::MissingDefaultReceiver]);
        assert_eq!(
            assembly.document.unwrap().root().unwrap().routes.len(),
            1
        );
    }

    #[test]
    fn test_base_must_be_a_mapping() {
        let dir = config_dir(&[("base.yaml", "- just\n- a list\n")]);
        let err = Assembler::default().assemble(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_render_writes_output_and_skips_it_next_time() {
        let dir = config_dir(&[
            ("base.yaml", BASE),
            ("team.yaml", "receivers: [{name: team}]\nroutes: [{receiver: team}]"),
        ]);
        let assembler = Assembler::default();

        let written = assembler.render(dir.path()).unwrap();
        assert_eq!(written, dir.path().join("alertmanager.yaml"));
        let output = Document::from_path(&written).unwrap();
        assert_eq!(output.receivers.len(), 2);

        // a second run must not pick up its own output as a fragment
        assembler.render(dir.path()).unwrap();
        let again = Document::from_path(&written).unwrap();
        assert_eq!(output, again);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directories_are_not_followed() {
        let dir = config_dir(&[
            ("base.yaml", BASE),
            ("teams/web.yaml", "receivers: [{name: web}]"),
        ]);
        // a link back to the root would otherwise be walked forever
        std::os::unix::fs::symlink(dir.path(), dir.path().join("teams/loop")).unwrap();

        let assembly = Assembler::default()
            .assemble_with(dir.path(), env(&[]))
            .unwrap();
        assert_eq!(assembly.fragments, vec![dir.path().join("teams/web.yaml")]);
        assert!(assembly.is_valid(), "{:?}", assembly.findings);
    }

    #[test]
    fn test_render_refuses_invalid_configuration() {
        let dir = config_dir(&[
            ("base.yaml", BASE),
            ("bad.yaml", "routes: [{receiver: nobody}]"),
        ]);

        let err = Assembler::new("base.yaml", "out.yaml")
            .render(dir.path())
            .unwrap_err();
        assert_eq!(err.findings().len(), 1);
        assert!(!dir.path().join("out.yaml").exists());
    }
}
