//! Alert label sets and alert input parsing

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Label name to label value. Ordered so traces and output are stable.
pub type LabelSet = BTreeMap<String, String>;

/// Value of `name` in `labels`, with an absent label reading as empty
pub fn label_value<'a>(labels: &'a LabelSet, name: &str) -> &'a str {
    labels.get(name).map_or("", String::as_str)
}

/// Parse an alert given on the command line.
///
/// `input` is either inline JSON, `@path` pointing at a JSON file, or a bare
/// path ending in `.json`. The JSON is either a flat object of string labels
/// or an Alertmanager-style alert object with a `labels` object.
pub fn parse_alert(input: &str) -> Result<LabelSet> {
    let raw = if let Some(path) = input.strip_prefix('@') {
        debug!(path, "Reading alert from file");
        std::fs::read_to_string(path)?
    } else if input.trim_end().ends_with(".json") && Path::new(input.trim()).is_file() {
        debug!(path = input.trim(), "Reading alert from file");
        std::fs::read_to_string(input.trim())?
    } else {
        input.to_string()
    };

    labels_from_json(&serde_json::from_str(raw.trim())?)
}

/// Convert a decoded JSON alert into a label set
pub fn labels_from_json(value: &Value) -> Result<LabelSet> {
    let Value::Object(object) = value else {
        return Err(Error::alert_input("alert must be a JSON object of labels"));
    };

    let object = match object.get("labels") {
        Some(Value::Object(nested)) => nested,
        _ => object,
    };

    object
        .iter()
        .map(|(name, value)| match value {
            Value::String(s) => Ok((name.clone(), s.clone())),
            other => Err(Error::alert_input(format!(
                "label '{name}' must be a string, got {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_inline_alert() {
        let labels = parse_alert(r#"{"severity": "critical", "team": "db"}"#).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(label_value(&labels, "severity"), "critical");
        assert_eq!(label_value(&labels, "missing"), "");
    }

    #[test]
    fn test_alert_from_file_reference() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"alertname": "DiskFull"}}"#).unwrap();

        let by_at = parse_alert(&format!("@{}", file.path().display())).unwrap();
        let by_path = parse_alert(&file.path().display().to_string()).unwrap();
        assert_eq!(by_at, by_path);
        assert_eq!(label_value(&by_at, "alertname"), "DiskFull");
    }

    #[test]
    fn test_alertmanager_envelope() {
        let labels = parse_alert(
            r#"{"labels": {"job": "api"}, "annotations": {"summary": "down"}}"#,
        )
        .unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(label_value(&labels, "job"), "api");
    }

    #[test]
    fn test_non_string_label_rejected() {
        let err = parse_alert(r#"{"code": 500}"#).unwrap_err();
        assert!(matches!(err, Error::AlertInput(_)));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            parse_alert("[1, 2]").unwrap_err(),
            Error::AlertInput(_)
        ));
        assert!(matches!(
            parse_alert("not json").unwrap_err(),
            Error::Serialization(_)
        ));
    }
}
