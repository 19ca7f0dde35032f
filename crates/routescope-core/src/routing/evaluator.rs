//! Route tree evaluation engine

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::path::NodeId;
use super::trace::{DecisionTrace, RouteMatch, Visit};
use super::tree::RouteTree;
use crate::models::LabelSet;

/// Walk `tree` for an alert with `labels` at instant `as_of`.
///
/// Children are tried in declared order. A matching child without `continue`
/// ends the search among its siblings. A matched route none of whose children
/// matched is selected. The walk is pure: equal inputs give equal traces.
pub fn evaluate(tree: &RouteTree, labels: &LabelSet, as_of: DateTime<Utc>) -> DecisionTrace {
    let mut evaluator = Evaluator {
        tree,
        labels,
        as_of,
        trace: DecisionTrace {
            evaluated_at: Some(as_of),
            ..DecisionTrace::default()
        },
    };
    evaluator.walk(NodeId::ROOT);

    debug!(
        visited = evaluator.trace.visits.len(),
        receivers = ?evaluator.trace.receivers(),
        "Evaluated alert"
    );
    evaluator.trace
}

/// Every node of `tree`, marked matched and entered, with no alert involved
pub fn render_static(tree: &RouteTree) -> DecisionTrace {
    let visits = tree
        .nodes()
        .map(|node| Visit {
            selected: node.children().is_empty(),
            ..Visit::new(node, true, false)
        })
        .collect();

    DecisionTrace {
        evaluated_at: None,
        visits,
        matches: Vec::new(),
    }
}

struct Evaluator<'a> {
    tree: &'a RouteTree,
    labels: &'a LabelSet,
    as_of: DateTime<Utc>,
    trace: DecisionTrace,
}

impl Evaluator<'_> {
    /// Returns whether the node matched
    fn walk(&mut self, id: NodeId) -> bool {
        let tree = self.tree;
        let node = tree.node(id);

        if !node.is_root() && !node.matches(self.labels) {
            trace!(path = %node.path(), "Route did not match");
            self.trace.visits.push(Visit::new(node, false, false));
            return false;
        }

        let muted = tree.is_muted(node, self.as_of);
        debug!(
            path = %node.path(),
            receiver = %node.options().receiver,
            muted,
            "Route matched"
        );

        let visit_index = self.trace.visits.len();
        self.trace.visits.push(Visit::new(node, true, muted));

        let mut any_child_matched = false;
        for &child in node.children() {
            if !self.walk(child) {
                continue;
            }
            any_child_matched = true;

            if !tree.node(child).continue_matching() {
                debug!(
                    path = %tree.node(child).path(),
                    "Matched route does not continue, skipping remaining siblings"
                );
                break;
            }
        }

        if !any_child_matched {
            self.trace.visits[visit_index].selected = true;
            self.trace
                .matches
                .push(RouteMatch::new(node, self.labels, muted));
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::routing::NodePath;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn tree(yaml: &str) -> RouteTree {
        RouteTree::build(&Document::from_yaml_str(yaml).unwrap()).unwrap()
    }

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
    }

    const PAGER_TICKET: &str = r#"
route:
  receiver: default
  routes:
    - receiver: pager
      match: {severity: critical}
    - receiver: ticket
      match: {severity: critical}
receivers: [{name: default}, {name: pager}, {name: ticket}]
"#;

    #[test]
    fn test_first_match_wins_without_continue() {
        let tree = tree(PAGER_TICKET);
        let trace = evaluate(&tree, &labels(&[("severity", "critical")]), now());

        assert_eq!(trace.receivers(), vec!["pager"]);
        // ticket is never looked at
        assert_eq!(trace.visits.len(), 2);
        assert!(trace.visit(&NodePath::from(vec![1])).is_none());
    }

    #[test]
    fn test_unmatched_alert_falls_back_to_root() {
        let tree = tree(PAGER_TICKET);
        let trace = evaluate(&tree, &labels(&[("severity", "warning")]), now());

        assert_eq!(trace.receivers(), vec!["default"]);
        assert!(trace.fell_through_to_root());
        assert_eq!(trace.visits.len(), 3);
        let pager = trace.visit(&NodePath::from(vec![0])).unwrap();
        assert!(!pager.matched);
        assert!(!pager.entered_subtree);
        assert!(!pager.selected);
    }

    #[test]
    fn test_root_visit_always_present() {
        let tree = tree(PAGER_TICKET);
        for alert in [labels(&[]), labels(&[("severity", "critical")])] {
            let trace = evaluate(&tree, &alert, now());
            let root = &trace.visits[0];
            assert!(root.node_path.is_root());
            assert!(root.matched);
            assert!(root.entered_subtree);
        }
    }

    #[test]
    fn test_continue_allows_later_siblings() {
        let yaml = r#"
route:
  receiver: default
  routes:
    - receiver: c1
      match: {team: db}
      continue: CONTINUE
    - receiver: c2
receivers: [{name: default}, {name: c1}, {name: c2}]
"#;
        let alert = labels(&[("team", "db")]);

        let stop = tree(&yaml.replace("CONTINUE", "false"));
        assert_eq!(evaluate(&stop, &alert, now()).receivers(), vec!["c1"]);

        let go_on = tree(&yaml.replace("CONTINUE", "true"));
        assert_eq!(evaluate(&go_on, &alert, now()).receivers(), vec!["c1", "c2"]);
    }

    #[test]
    fn test_matched_parent_with_matched_child_is_not_selected() {
        let tree = tree(
            r#"
route:
  receiver: default
  group_by: [alertname]
  routes:
    - receiver: email
      match: {severity: critical}
      continue: true
      routes:
        - receiver: pagerduty
          match: {environment: production}
    - receiver: slack
      match: {severity: critical}
receivers: [{name: default}, {name: email}, {name: pagerduty}, {name: slack}]
"#,
        );

        let trace = evaluate(
            &tree,
            &labels(&[("severity", "critical"), ("environment", "production")]),
            now(),
        );
        assert_eq!(trace.receivers(), vec!["pagerduty", "slack"]);
        let email = trace.visit(&NodePath::from(vec![0])).unwrap();
        assert!(email.matched && email.entered_subtree && !email.selected);

        let staging = evaluate(
            &tree,
            &labels(&[("severity", "critical"), ("environment", "staging")]),
            now(),
        );
        assert_eq!(staging.receivers(), vec!["email", "slack"]);
    }

    #[test]
    fn test_same_receiver_reported_once() {
        let tree = tree(
            r#"
route:
  receiver: default
  routes:
    - receiver: team
      continue: true
    - receiver: team
receivers: [{name: default}, {name: team}]
"#,
        );
        let trace = evaluate(&tree, &labels(&[]), now());
        assert_eq!(trace.matches.len(), 2);
        assert_eq!(trace.receivers(), vec!["team"]);
    }

    #[test]
    fn test_muted_route_still_matches_and_blocks_siblings() {
        let tree = tree(
            r#"
route:
  receiver: default
  routes:
    - receiver: office
      active_time_intervals: [business-hours]
      routes:
        - receiver: oncall
          match: {severity: critical}
    - receiver: fallback
receivers: [{name: default}, {name: office}, {name: oncall}, {name: fallback}]
time_intervals:
  - name: business-hours
    time_intervals:
      - times: [{start_time: "09:00", end_time: "17:00"}]
"#,
        );
        let night = Utc.with_ymd_and_hms(2024, 3, 5, 23, 0, 0).unwrap();
        let trace = evaluate(&tree, &labels(&[("severity", "critical")]), night);

        let office = trace.visit(&NodePath::from(vec![0])).unwrap();
        assert!(office.matched && office.muted && office.entered_subtree);
        // muting does not propagate to children
        assert_eq!(trace.receivers(), vec!["oncall"]);
        assert!(!trace.matches[0].muted);
        assert!(trace.visit(&NodePath::from(vec![1])).is_none());

        let day = evaluate(&tree, &labels(&[]), now());
        assert_eq!(day.receivers(), vec!["office"]);
        assert_eq!(day.notified_receivers(), vec!["office"]);

        let quiet = evaluate(&tree, &labels(&[]), night);
        assert_eq!(quiet.receivers(), vec!["office"]);
        assert!(quiet.notified_receivers().is_empty());
    }

    #[test]
    fn test_group_labels_in_match() {
        let tree = tree(
            r#"
route:
  receiver: default
  group_by: [alertname, job]
receivers: [{name: default}]
"#,
        );
        let trace = evaluate(
            &tree,
            &labels(&[("alertname", "Down"), ("job", "api"), ("pod", "a-1")]),
            now(),
        );
        assert_eq!(
            trace.matches[0].group_labels,
            labels(&[("alertname", "Down"), ("job", "api")])
        );
    }

    #[test]
    fn test_render_static_visits_every_node() {
        let tree = tree(PAGER_TICKET);
        let trace = render_static(&tree);

        assert_eq!(trace.visits.len(), 3);
        assert!(trace.visits.iter().all(|v| v.matched && v.entered_subtree));
        assert!(!trace.visits[0].selected);
        assert!(trace.visits[1].selected && trace.visits[2].selected);
        assert!(trace.matches.is_empty());
        assert!(trace.evaluated_at.is_none());
    }

    #[test]
    fn test_trace_json_shape() {
        let tree = tree(PAGER_TICKET);
        let trace = evaluate(&tree, &labels(&[("severity", "critical")]), now());
        let json = serde_json::to_value(&trace).unwrap();

        assert_eq!(json["visits"][1]["node_path"], serde_json::json!([0]));
        assert_eq!(json["matches"][0]["receiver"], "pager");
        assert_eq!(json["matches"][0]["group_wait"], "30s");
        assert_eq!(json["matches"][0]["repeat_interval"], "4h");
    }
}
