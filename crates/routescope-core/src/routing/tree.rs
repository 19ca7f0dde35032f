//! Route tree model and construction
//!
//! Nodes live in a flat arena in depth-first pre-order, so the arena order is
//! also the order a static walk visits them. Inherited options are resolved
//! while building; evaluation never looks at ancestors.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

use super::interval::TimeInterval;
use super::matcher::{MatchOperator, Matcher, MatcherError};
use super::path::{NodeId, NodePath};
use super::validate::Checker;
use crate::error::{Error, Finding, ReferenceKind, Result};
use crate::models::{Document, LabelSet, RouteConfig};

/// Default `group_wait` of the root route
pub const DEFAULT_GROUP_WAIT: Duration = Duration::from_secs(30);
/// Default `group_interval` of the root route
pub const DEFAULT_GROUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Default `repeat_interval` of the root route
pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

/// Grouping labels of a route
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GroupBy {
    /// `group_by: ['...']`, every label of the alert
    All,
    /// Explicit label names, in declared order
    Labels(Vec<String>),
    /// No grouping declared anywhere on the path; one group for everything
    #[default]
    Nothing,
}

impl GroupBy {
    /// Interpret a declared `group_by` list
    pub fn from_labels(labels: &[String]) -> Self {
        if labels.iter().any(|l| l == "...") {
            Self::All
        } else {
            Self::Labels(labels.to_vec())
        }
    }

    /// Label names as they appear in configuration
    pub fn to_labels(&self) -> Vec<String> {
        match self {
            Self::All => vec!["...".to_string()],
            Self::Labels(labels) => labels.clone(),
            Self::Nothing => Vec::new(),
        }
    }

    /// The subset of `labels` that forms this alert's group key
    pub fn group_labels(&self, labels: &LabelSet) -> LabelSet {
        match self {
            Self::All => labels.clone(),
            Self::Labels(names) => names
                .iter()
                .filter_map(|n| labels.get(n).map(|v| (n.clone(), v.clone())))
                .collect(),
            Self::Nothing => LabelSet::new(),
        }
    }
}

impl Serialize for GroupBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_labels().serialize(serializer)
    }
}

/// Options a route declares itself; `None` means inherit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOverrides {
    /// Declared `receiver`
    pub receiver: Option<String>,
    /// Declared `group_by`
    pub group_by: Option<GroupBy>,
    /// Declared `group_wait`
    pub group_wait: Option<Duration>,
    /// Declared `group_interval`
    pub group_interval: Option<Duration>,
    /// Declared `repeat_interval`
    pub repeat_interval: Option<Duration>,
}

/// Fully resolved options of a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteOptions {
    /// Receiver notified by the route
    pub receiver: String,
    /// Labels alerts are grouped by
    pub group_by: GroupBy,
    /// Wait before the first notification of a group
    #[serde(with = "humantime_serde")]
    pub group_wait: Duration,
    /// Wait before notifying about new alerts in a group
    #[serde(with = "humantime_serde")]
    pub group_interval: Duration,
    /// Wait before repeating a notification
    #[serde(with = "humantime_serde")]
    pub repeat_interval: Duration,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            receiver: String::new(),
            group_by: GroupBy::Nothing,
            group_wait: DEFAULT_GROUP_WAIT,
            group_interval: DEFAULT_GROUP_INTERVAL,
            repeat_interval: DEFAULT_REPEAT_INTERVAL,
        }
    }
}

impl RouteOptions {
    /// Options of a child that declares `overrides` under these options
    #[must_use]
    pub fn inherit(&self, overrides: &RouteOverrides) -> Self {
        Self {
            receiver: overrides
                .receiver
                .clone()
                .unwrap_or_else(|| self.receiver.clone()),
            group_by: overrides
                .group_by
                .clone()
                .unwrap_or_else(|| self.group_by.clone()),
            group_wait: overrides.group_wait.unwrap_or(self.group_wait),
            group_interval: overrides.group_interval.unwrap_or(self.group_interval),
            repeat_interval: overrides.repeat_interval.unwrap_or(self.repeat_interval),
        }
    }
}

/// One route of the tree
#[derive(Debug, Clone)]
pub struct RouteNode {
    id: NodeId,
    path: NodePath,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    matchers: Vec<Matcher>,
    continue_matching: bool,
    overrides: RouteOverrides,
    options: RouteOptions,
    mute_time_intervals: Vec<String>,
    active_time_intervals: Vec<String>,
}

impl RouteNode {
    /// Arena index
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Position in the configuration
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Parent route; `None` for the root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child routes in declared order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Matchers from `matchers`, `match` and `match_re`
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// The route's `continue` flag
    pub fn continue_matching(&self) -> bool {
        self.continue_matching
    }

    /// What the route declares itself
    pub fn overrides(&self) -> &RouteOverrides {
        &self.overrides
    }

    /// Effective options after inheritance
    pub fn options(&self) -> &RouteOptions {
        &self.options
    }

    /// Names of intervals during which the route is muted
    pub fn mute_time_intervals(&self) -> &[String] {
        &self.mute_time_intervals
    }

    /// Names of intervals outside which the route is muted
    pub fn active_time_intervals(&self) -> &[String] {
        &self.active_time_intervals
    }

    /// True for the top-level route
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Conjunction of the route's matchers; no matchers matches everything
    pub fn matches(&self, labels: &LabelSet) -> bool {
        self.matchers.iter().all(|m| m.matches(labels))
    }
}

/// An immutable, validated routing tree
#[derive(Debug, Clone)]
pub struct RouteTree {
    nodes: Vec<RouteNode>,
    receivers: BTreeSet<String>,
    time_intervals: BTreeMap<String, TimeInterval>,
}

impl RouteTree {
    /// Validate `document` and build its tree.
    ///
    /// Fails with [`Error::InvalidConfig`] carrying every finding when the
    /// document does not validate; a tree is never built from a document with
    /// findings.
    pub fn build(document: &Document) -> Result<Self> {
        let (tree, findings) = compile(document);
        if findings.is_empty() {
            debug!(
                routes = tree.len(),
                receivers = tree.receivers.len(),
                "Built route tree"
            );
            Ok(tree)
        } else {
            Err(Error::InvalidConfig(findings))
        }
    }

    /// The top-level route
    pub fn root(&self) -> &RouteNode {
        &self.nodes[NodeId::ROOT.0]
    }

    /// Node by arena id.
    ///
    /// Ids are only handed out by this tree, so they are always in range.
    pub fn node(&self, id: NodeId) -> &RouteNode {
        &self.nodes[id.0]
    }

    /// Node at a configuration path, if it exists
    pub fn find(&self, path: &NodePath) -> Option<&RouteNode> {
        path.indices().iter().try_fold(self.root(), |node, &index| {
            node.children.get(index).map(|&child| self.node(child))
        })
    }

    /// All nodes in depth-first pre-order
    pub fn nodes(&self) -> impl Iterator<Item = &RouteNode> {
        self.nodes.iter()
    }

    /// Number of routes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a built tree
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Declared receiver names
    pub fn receivers(&self) -> &BTreeSet<String> {
        &self.receivers
    }

    /// Declared time interval names
    pub fn time_interval_names(&self) -> impl Iterator<Item = &str> {
        self.time_intervals.keys().map(String::as_str)
    }

    /// Whether `node` would be muted at `at`.
    ///
    /// Muted when a mute interval is in effect, or when active intervals are
    /// declared and none of them is.
    pub fn is_muted(&self, node: &RouteNode, at: DateTime<Utc>) -> bool {
        let active = |name: &String| self.time_intervals.get(name).is_some_and(|i| i.contains(at));

        node.mute_time_intervals.iter().any(active)
            || (!node.active_time_intervals.is_empty()
                && !node.active_time_intervals.iter().any(active))
    }
}

/// Build a tree and collect every finding along the way.
///
/// The tree is only meaningful when the findings are empty.
pub(crate) fn compile(document: &Document) -> (RouteTree, Vec<Finding>) {
    let mut checker = Checker::default();
    let receivers = checker.check_receivers(&document.receivers);
    let (declared_intervals, time_intervals) =
        checker.check_time_intervals(document.interval_definitions());

    let mut builder = Builder {
        checker,
        receivers: &receivers,
        declared_intervals: &declared_intervals,
        nodes: Vec::new(),
    };

    match &document.route {
        Some(root) => {
            builder.checker.check_root(root);
            builder.add(root, NodePath::root(), None, &RouteOptions::default());
        }
        None => {
            builder.checker.push(Finding::MissingRoute);
            builder.add(&RouteConfig::default(), NodePath::root(), None, &RouteOptions::default());
        }
    }

    let Builder { checker, nodes, .. } = builder;
    let tree = RouteTree {
        nodes,
        receivers,
        time_intervals,
    };
    (tree, checker.into_findings())
}

struct Builder<'a> {
    checker: Checker,
    receivers: &'a BTreeSet<String>,
    declared_intervals: &'a BTreeSet<String>,
    nodes: Vec<RouteNode>,
}

impl Builder<'_> {
    fn add(
        &mut self,
        config: &RouteConfig,
        path: NodePath,
        parent: Option<NodeId>,
        inherited: &RouteOptions,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let matchers = self.matchers(config, &path);
        let overrides = self.overrides(config, &path);
        let options = inherited.inherit(&overrides);

        self.check_references(config, &path);

        self.nodes.push(RouteNode {
            id,
            path: path.clone(),
            parent,
            children: Vec::with_capacity(config.routes.len()),
            matchers,
            continue_matching: config.continue_matching,
            overrides,
            options: options.clone(),
            mute_time_intervals: config.mute_time_intervals.clone(),
            active_time_intervals: config.active_time_intervals.clone(),
        });

        for (index, child) in config.routes.iter().enumerate() {
            let child_id = self.add(child, path.child(index), Some(id), &options);
            self.nodes[id.0].children.push(child_id);
        }

        id
    }

    /// `match`, then `match_re`, then `matchers`, each in declared order
    fn matchers(&mut self, config: &RouteConfig, path: &NodePath) -> Vec<Matcher> {
        let mut matchers = Vec::new();

        for (name, value) in &config.match_labels {
            if let Ok(m) = Matcher::new(name, MatchOperator::Equal, value) {
                matchers.push(m);
            }
        }

        for (name, pattern) in &config.match_re {
            match Matcher::new(name, MatchOperator::RegexMatch, pattern) {
                Ok(m) => matchers.push(m),
                Err(e) => self.checker.push(Finding::PatternCompile {
                    path: path.clone(),
                    label: name.clone(),
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        for expr in &config.matchers {
            match Matcher::parse(expr) {
                Ok(m) => matchers.push(m),
                Err(MatcherError::Syntax(reason)) => self.checker.push(Finding::MatcherSyntax {
                    path: path.clone(),
                    matcher: expr.clone(),
                    reason,
                }),
                Err(MatcherError::Pattern {
                    label,
                    pattern,
                    source,
                }) => self.checker.push(Finding::PatternCompile {
                    path: path.clone(),
                    label,
                    pattern,
                    reason: source.to_string(),
                }),
            }
        }

        matchers
    }

    fn overrides(&mut self, config: &RouteConfig, path: &NodePath) -> RouteOverrides {
        RouteOverrides {
            receiver: config.receiver.clone(),
            group_by: config.group_by.as_deref().map(GroupBy::from_labels),
            group_wait: self
                .checker
                .check_duration(path, "group_wait", config.group_wait.as_deref(), true),
            group_interval: self.checker.check_duration(
                path,
                "group_interval",
                config.group_interval.as_deref(),
                false,
            ),
            repeat_interval: self.checker.check_duration(
                path,
                "repeat_interval",
                config.repeat_interval.as_deref(),
                false,
            ),
        }
    }

    fn check_references(&mut self, config: &RouteConfig, path: &NodePath) {
        // a blank root receiver is already reported as missing
        if let Some(receiver) = config.receiver.as_ref().filter(|r| !r.trim().is_empty()) {
            if !self.receivers.contains(receiver) {
                self.checker.push(Finding::ConfigReference {
                    path: path.clone(),
                    reference: ReferenceKind::Receiver,
                    name: receiver.clone(),
                });
            }
        }

        for name in config
            .mute_time_intervals
            .iter()
            .chain(&config.active_time_intervals)
        {
            if !self.declared_intervals.contains(name) {
                self.checker.push(Finding::ConfigReference {
                    path: path.clone(),
                    reference: ReferenceKind::TimeInterval,
                    name: name.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn document(yaml: &str) -> Document {
        Document::from_yaml_str(yaml).unwrap()
    }

    const NESTED: &str = r#"
route:
  receiver: default
  group_by: [alertname]
  group_wait: 10s
  routes:
    - receiver: team-db
      match:
        team: db
      group_by: [alertname, instance]
      routes:
        - match_re:
            severity: critical|page
          repeat_interval: 1h
        - receiver: db-info
          group_by: ["..."]
    - matchers: ['team="web"']
receivers:
  - name: default
  - name: team-db
  - name: db-info
"#;

    #[test]
    fn test_arena_is_preorder() {
        let tree = RouteTree::build(&document(NESTED)).unwrap();
        let paths: Vec<String> = tree.nodes().map(|n| n.path().to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "route",
                "route.routes[0]",
                "route.routes[0].routes[0]",
                "route.routes[0].routes[1]",
                "route.routes[1]",
            ]
        );
        assert_eq!(tree.root().children().len(), 2);
        assert_eq!(tree.node(NodeId(2)).parent(), Some(NodeId(1)));
    }

    #[test]
    fn test_inheritance_resolved_at_build() {
        let tree = RouteTree::build(&document(NESTED)).unwrap();

        let critical = tree.find(&NodePath::from(vec![0, 0])).unwrap();
        assert_eq!(critical.options().receiver, "team-db");
        assert_eq!(
            critical.options().group_by,
            GroupBy::Labels(vec!["alertname".to_string(), "instance".to_string()])
        );
        assert_eq!(critical.options().group_wait, Duration::from_secs(10));
        assert_eq!(critical.options().repeat_interval, Duration::from_secs(3600));
        assert_eq!(critical.options().group_interval, DEFAULT_GROUP_INTERVAL);
        assert_eq!(critical.overrides().receiver, None);

        let info = tree.find(&NodePath::from(vec![0, 1])).unwrap();
        assert_eq!(info.options().group_by, GroupBy::All);
        assert_eq!(info.options().repeat_interval, DEFAULT_REPEAT_INTERVAL);

        let web = tree.find(&NodePath::from(vec![1])).unwrap();
        assert_eq!(web.options().receiver, "default");
        assert_eq!(web.matchers().len(), 1);
    }

    #[test]
    fn test_find_missing_path() {
        let tree = RouteTree::build(&document(NESTED)).unwrap();
        assert!(tree.find(&NodePath::from(vec![3])).is_none());
        assert!(tree.find(&NodePath::root()).unwrap().is_root());
    }

    #[test]
    fn test_matcher_conjunction() {
        let tree = RouteTree::build(&document(
            r#"
route:
  receiver: default
  routes:
    - receiver: default
      matchers: ['sev="critical"', 'team="db"']
receivers: [{name: default}]
"#,
        ))
        .unwrap();
        let node = tree.find(&NodePath::from(vec![0])).unwrap();

        let labels = |pairs: &[(&str, &str)]| -> LabelSet {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        assert!(node.matches(&labels(&[("sev", "critical"), ("team", "db")])));
        assert!(!node.matches(&labels(&[("sev", "critical"), ("team", "web")])));
        assert!(tree.root().matches(&labels(&[])));
    }

    #[test]
    fn test_build_fails_with_all_findings() {
        let err = RouteTree::build(&document(
            r#"
route:
  receiver: default
  routes:
    - receiver: nope
    - receiver: missing
receivers: [{name: default}]
"#,
        ))
        .unwrap_err();
        assert_eq!(err.findings().len(), 2);
    }

    #[test]
    fn test_group_by_labels() {
        let labels: LabelSet = [("alertname", "X"), ("job", "api"), ("env", "prod")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let by_job = GroupBy::from_labels(&["job".to_string(), "cluster".to_string()]);
        assert_eq!(by_job.group_labels(&labels).len(), 1);
        assert_eq!(GroupBy::All.group_labels(&labels).len(), 3);
        assert!(GroupBy::Nothing.group_labels(&labels).is_empty());
        assert_eq!(
            serde_json::to_string(&GroupBy::All).unwrap(),
            r#"["..."]"#
        );
    }
}
