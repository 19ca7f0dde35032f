//! Terminal rendering of route trees, decision traces and findings

use std::fmt::Write;

use console::style;

use crate::error::Finding;
use crate::models::LabelSet;
use crate::routing::{DecisionTrace, NodeId, RouteNode, RouteTree, Visit};

/// Draw the whole tree, annotated with what `trace` recorded.
///
/// A static trace (see [`render_static`](crate::routing::render_static))
/// draws the plain configuration. An evaluated trace marks each route as
/// matched, not matched or not reached.
pub fn render_tree(tree: &RouteTree, trace: &DecisionTrace) -> String {
    let mut visits: Vec<Option<&Visit>> = vec![None; tree.len()];
    for visit in &trace.visits {
        if let Some(slot) = visits.get_mut(visit.node.index()) {
            *slot = Some(visit);
        }
    }

    let mut writer = TreeWriter {
        tree,
        visits,
        evaluated: trace.evaluated_at.is_some(),
        out: String::new(),
    };
    writer.node(NodeId::ROOT, "", "");
    writer.out
}

/// Alert, annotated tree and resulting receivers
pub fn render_evaluation(tree: &RouteTree, trace: &DecisionTrace, labels: &LabelSet) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}  {}", style("Alert").bold(), format_labels(labels));
    if let Some(at) = trace.evaluated_at {
        let _ = writeln!(out, "{}     {}", style("At").bold(), at.to_rfc3339());
    }
    out.push('\n');
    out.push_str(&render_tree(tree, trace));
    out.push('\n');

    let receivers = trace.receivers();
    let notified = trace.notified_receivers();
    let _ = write!(out, "{} ", style("Receivers:").bold());
    if receivers.is_empty() {
        let _ = writeln!(out, "{}", style("none").dim());
    } else {
        let _ = writeln!(out, "{}", style(receivers.join(", ")).green().bold());
    }

    let muted: Vec<&str> = receivers
        .iter()
        .copied()
        .filter(|r| !notified.contains(r))
        .collect();
    if !muted.is_empty() {
        let _ = writeln!(
            out,
            "{} {}",
            style("Muted:").bold(),
            style(muted.join(", ")).yellow()
        );
    }
    if trace.fell_through_to_root() && tree.len() > 1 {
        let _ = writeln!(
            out,
            "{}",
            style("No child route matched, delivered to the root receiver").dim()
        );
    }

    out
}

/// One line per finding, then a count
pub fn render_findings(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return format!("{} configuration is valid\n", style("✓").green());
    }

    let mut out = String::new();
    for finding in findings {
        let _ = writeln!(
            out,
            "{} {} {}",
            style("✗").red(),
            style(format!("[{}]", finding.kind())).dim(),
            finding
        );
    }
    let noun = if findings.len() == 1 { "problem" } else { "problems" };
    let _ = writeln!(out, "{}", style(format!("{} {noun} found", findings.len())).red().bold());
    out
}

/// `{name="value", ...}`
pub fn format_labels(labels: &LabelSet) -> String {
    let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v:?}")).collect();
    format!("{{{}}}", pairs.join(", "))
}

struct TreeWriter<'a> {
    tree: &'a RouteTree,
    visits: Vec<Option<&'a Visit>>,
    evaluated: bool,
    out: String,
}

impl TreeWriter<'_> {
    fn node(&mut self, id: NodeId, lead: &str, child_lead: &str) {
        let tree = self.tree;
        let node = tree.node(id);
        let visit = self.visits[id.index()];
        let line = format!("{}{}", self.marker(visit), self.describe(node, visit));
        let _ = writeln!(self.out, "{lead}{line}");

        let children = node.children();
        for (i, &child) in children.iter().enumerate() {
            let (branch, next) = if i + 1 == children.len() {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            self.node(
                child,
                &format!("{child_lead}{branch}"),
                &format!("{child_lead}{next}"),
            );
        }
    }

    fn marker(&self, visit: Option<&Visit>) -> String {
        if !self.evaluated {
            return String::new();
        }
        match visit {
            None => format!("{} ", style("·").dim()),
            Some(v) if !v.matched => format!("{} ", style("✗").red()),
            Some(_) => format!("{} ", style("✓").green()),
        }
    }

    fn describe(&self, node: &RouteNode, visit: Option<&Visit>) -> String {
        let overrides = node.overrides();
        let mut parts = Vec::new();

        let receiver = &node.options().receiver;
        parts.push(if overrides.receiver.is_some() {
            style(receiver).bold().to_string()
        } else {
            style(receiver).dim().to_string()
        });

        if !node.matchers().is_empty() {
            let matchers: Vec<String> = node.matchers().iter().map(ToString::to_string).collect();
            parts.push(style(format!("{{{}}}", matchers.join(", "))).cyan().to_string());
        }
        if let Some(group_by) = &overrides.group_by {
            parts.push(format!("group_by=[{}]", group_by.to_labels().join(", ")));
        }
        for (field, value) in [
            ("group_wait", overrides.group_wait),
            ("group_interval", overrides.group_interval),
            ("repeat_interval", overrides.repeat_interval),
        ] {
            if let Some(value) = value {
                parts.push(format!("{field}={}", humantime::format_duration(value)));
            }
        }
        if node.continue_matching() {
            parts.push(style("continue").yellow().to_string());
        }
        if !node.mute_time_intervals().is_empty() {
            parts.push(format!("mute=[{}]", node.mute_time_intervals().join(", ")));
        }
        if !node.active_time_intervals().is_empty() {
            parts.push(format!("active=[{}]", node.active_time_intervals().join(", ")));
        }

        if self.evaluated {
            if let Some(visit) = visit {
                if visit.selected {
                    parts.push(style("→ selected").green().bold().to_string());
                }
                if visit.muted {
                    parts.push(style("(muted)").yellow().to_string());
                }
            }
        }

        parts.join("  ")
    }
}
