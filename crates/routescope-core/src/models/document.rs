//! Alertmanager configuration document
//!
//! Mirrors the field names and nesting of the Alertmanager YAML format. Only
//! the parts that drive routing are typed; everything else is carried through
//! untouched so an assembled document can be written back out.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// A parsed configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// `global`, `templates`, `inhibit_rules` and anything else not modelled
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,

    /// Root of the routing tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteConfig>,

    /// Receiver registry
    #[serde(default)]
    pub receivers: Vec<ReceiverConfig>,

    /// Named time intervals
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_intervals: Vec<TimeIntervalConfig>,

    /// Legacy name for `time_intervals`; both lists share one namespace
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mute_time_intervals: Vec<TimeIntervalConfig>,
}

impl Document {
    /// Parse a document from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let document: Document = serde_yaml::from_str(yaml)?;
        Ok(document)
    }

    /// Read and parse a document from a YAML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration document");
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Serialize back to YAML
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The root route, or a config error when the document has none
    pub fn root(&self) -> Result<&RouteConfig> {
        self.route
            .as_ref()
            .ok_or_else(|| Error::config("no 'route' section found in the configuration"))
    }

    /// Every time interval definition, in declaration order
    pub fn interval_definitions(&self) -> impl Iterator<Item = &TimeIntervalConfig> {
        self.time_intervals.iter().chain(&self.mute_time_intervals)
    }
}

/// One node of the `route` tree as written in the document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Receiver name; inherited from the parent when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,

    /// Label names, or `["..."]` to group by every label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<String>>,

    /// Keep matching later siblings after this route matches
    #[serde(rename = "continue", default, skip_serializing_if = "is_false")]
    pub continue_matching: bool,

    /// Equality matchers (legacy form)
    #[serde(
        rename = "match",
        default,
        deserialize_with = "scalar_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub match_labels: BTreeMap<String, String>,

    /// Regex matchers (legacy form)
    #[serde(
        default,
        deserialize_with = "scalar_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub match_re: BTreeMap<String, String>,

    /// Matcher expressions such as `severity="critical"`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<String>,

    /// Duration string such as `30s`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_wait: Option<String>,

    /// Duration string; must not be zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_interval: Option<String>,

    /// Duration string; must not be zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval: Option<String>,

    /// Interval names during which notifications are suppressed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mute_time_intervals: Vec<String>,

    /// Interval names outside which notifications are suppressed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_time_intervals: Vec<String>,

    /// Child routes, in evaluation order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteConfig>,

    /// Keys this tool does not model
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RouteConfig {
    /// True when the route declares any kind of matcher
    pub fn has_matchers(&self) -> bool {
        !self.match_labels.is_empty() || !self.match_re.is_empty() || !self.matchers.is_empty()
    }
}

/// A notification receiver. Integrations are kept as raw YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Receiver name, referenced by routes
    #[serde(default)]
    pub name: String,

    /// Integration lists such as `webhook_configs`
    #[serde(flatten)]
    pub integrations: BTreeMap<String, Value>,
}

/// A named time interval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeIntervalConfig {
    /// Interval name, referenced by routes
    #[serde(default)]
    pub name: String,

    /// Alternatives; the interval holds when any of them does
    #[serde(default)]
    pub time_intervals: Vec<TimeSpecConfig>,
}

/// One alternative of a time interval; every declared field must match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSpecConfig {
    /// Time-of-day ranges
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub times: Vec<TimeRangeConfig>,

    /// Weekday names or ranges such as `monday:friday`
    #[serde(default, deserialize_with = "scalar_list", skip_serializing_if = "Vec::is_empty")]
    pub weekdays: Vec<String>,

    /// Days or ranges; negative values count from the month end
    #[serde(default, deserialize_with = "scalar_list", skip_serializing_if = "Vec::is_empty")]
    pub days_of_month: Vec<String>,

    /// Month names, numbers or ranges
    #[serde(default, deserialize_with = "scalar_list", skip_serializing_if = "Vec::is_empty")]
    pub months: Vec<String>,

    /// Years or ranges
    #[serde(default, deserialize_with = "scalar_list", skip_serializing_if = "Vec::is_empty")]
    pub years: Vec<String>,

    /// `Local` or an IANA zone name; UTC when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Time-of-day range, `HH:MM` on both ends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRangeConfig {
    /// Inclusive start
    pub start_time: String,
    /// Exclusive end; `24:00` is allowed
    pub end_time: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn scalar_to_string(value: Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected a scalar, got {other:?}")),
    }
}

/// YAML writes `code: 500` as an integer; matchers compare strings
fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|(k, v)| {
            scalar_to_string(v)
                .map(|v| (k, v))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

fn scalar_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|v| scalar_to_string(v).map_err(serde::de::Error::custom))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"
global:
  resolve_timeout: 5m
route:
  receiver: default
  group_by: [alertname]
  routes:
    - receiver: pager
      match:
        severity: critical
        code: 500
      continue: true
    - receiver: slack
      matchers:
        - team=~"web|api"
      mute_time_intervals: [weekends]
receivers:
  - name: default
  - name: pager
    pagerduty_configs:
      - routing_key: abc
  - name: slack
time_intervals:
  - name: weekends
    time_intervals:
      - weekdays: ["saturday:sunday"]
        days_of_month: [1, "-3:-1"]
"#;

    #[test]
    fn test_parse_document() {
        let doc = Document::from_yaml_str(CONFIG).unwrap();
        let root = doc.root().unwrap();

        assert_eq!(root.receiver.as_deref(), Some("default"));
        assert_eq!(root.group_by, Some(vec!["alertname".to_string()]));
        assert!(!root.continue_matching);
        assert_eq!(root.routes.len(), 2);

        let pager = &root.routes[0];
        assert!(pager.continue_matching);
        assert_eq!(pager.match_labels.get("code").map(String::as_str), Some("500"));

        let slack = &root.routes[1];
        assert_eq!(slack.matchers, vec![r#"team=~"web|api""#.to_string()]);
        assert_eq!(slack.mute_time_intervals, vec!["weekends".to_string()]);

        assert!(doc.extra.contains_key("global"));
        assert!(doc.receivers[1].integrations.contains_key("pagerduty_configs"));
        assert_eq!(
            doc.time_intervals[0].time_intervals[0].days_of_month,
            vec!["1".to_string(), "-3:-1".to_string()]
        );
    }

    #[test]
    fn test_round_trip_preserves_unmodelled_fields() {
        let doc = Document::from_yaml_str(CONFIG).unwrap();
        let reparsed = Document::from_yaml_str(&doc.to_yaml_string().unwrap()).unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn test_missing_route() {
        let doc = Document::from_yaml_str("receivers: [{name: default}]").unwrap();
        assert!(doc.route.is_none());
        assert!(doc.root().is_err());
    }

    #[test]
    fn test_interval_definitions_include_legacy_list() {
        let doc = Document::from_yaml_str(
            r#"
time_intervals: [{name: a}]
mute_time_intervals: [{name: b}]
"#,
        )
        .unwrap();
        let names: Vec<&str> = doc.interval_definitions().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
