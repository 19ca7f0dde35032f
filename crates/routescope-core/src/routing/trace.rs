//! Decision trace produced by a tree walk

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::path::{NodeId, NodePath};
use super::tree::{GroupBy, RouteNode, RouteOptions};
use crate::models::LabelSet;

/// One node looked at during a walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Visit {
    /// Arena index of the node
    #[serde(skip)]
    pub node: NodeId,
    /// Position in the configuration
    pub node_path: NodePath,
    /// Distance from the root
    pub depth: usize,
    /// The node's matchers held (the root always matches)
    pub matched: bool,
    /// The walk went on to the node's children
    pub entered_subtree: bool,
    /// The node is a final destination for the alert
    pub selected: bool,
    /// A mute or active time interval suppresses notifications here
    pub muted: bool,
    /// The node's `continue` flag
    pub continue_matching: bool,
    /// Receiver after inheritance
    pub effective_receiver: String,
    /// Grouping after inheritance
    pub effective_group_by: GroupBy,
    /// Inherited `group_wait`
    #[serde(with = "humantime_serde")]
    pub group_wait: Duration,
    /// Inherited `group_interval`
    #[serde(with = "humantime_serde")]
    pub group_interval: Duration,
    /// Inherited `repeat_interval`
    #[serde(with = "humantime_serde")]
    pub repeat_interval: Duration,
}

impl Visit {
    pub(crate) fn new(node: &RouteNode, matched: bool, muted: bool) -> Self {
        Self {
            node: node.id(),
            node_path: node.path().clone(),
            depth: node.path().depth(),
            matched,
            entered_subtree: matched,
            selected: false,
            muted,
            continue_matching: node.continue_matching(),
            effective_receiver: node.options().receiver.clone(),
            effective_group_by: node.options().group_by.clone(),
            group_wait: node.options().group_wait,
            group_interval: node.options().group_interval,
            repeat_interval: node.options().repeat_interval,
        }
    }
}

/// A route the alert ends up at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMatch {
    /// Arena index of the route
    #[serde(skip)]
    pub node: NodeId,
    /// Position in the configuration
    pub node_path: NodePath,
    /// Resolved options of the route
    #[serde(flatten)]
    pub options: RouteOptions,
    /// Labels the alert is grouped by at this route
    pub group_labels: LabelSet,
    /// Notifications from this route are suppressed
    pub muted: bool,
}

impl RouteMatch {
    pub(crate) fn new(node: &RouteNode, labels: &LabelSet, muted: bool) -> Self {
        Self {
            node: node.id(),
            node_path: node.path().clone(),
            options: node.options().clone(),
            group_labels: node.options().group_by.group_labels(labels),
            muted,
        }
    }
}

/// Ordered record of a walk over a route tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecisionTrace {
    /// Evaluation instant; `None` for a static walk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<DateTime<Utc>>,
    /// Visited nodes in walk order
    pub visits: Vec<Visit>,
    /// Selected routes in the order they were reached
    pub matches: Vec<RouteMatch>,
}

impl DecisionTrace {
    /// Receiver names of the selected routes, first occurrence first
    pub fn receivers(&self) -> Vec<&str> {
        let mut receivers: Vec<&str> = Vec::with_capacity(self.matches.len());
        for m in &self.matches {
            if !receivers.contains(&m.options.receiver.as_str()) {
                receivers.push(&m.options.receiver);
            }
        }
        receivers
    }

    /// Receivers of selected routes that are not muted at the evaluation time
    pub fn notified_receivers(&self) -> Vec<&str> {
        let mut receivers: Vec<&str> = Vec::new();
        for m in self.matches.iter().filter(|m| !m.muted) {
            if !receivers.contains(&m.options.receiver.as_str()) {
                receivers.push(&m.options.receiver);
            }
        }
        receivers
    }

    /// Visit record of the node at `path`, if it was visited
    pub fn visit(&self, path: &NodePath) -> Option<&Visit> {
        self.visits.iter().find(|v| &v.node_path == path)
    }

    /// Visits whose matchers held
    pub fn matched_visits(&self) -> impl Iterator<Item = &Visit> {
        self.visits.iter().filter(|v| v.matched)
    }

    /// True when nothing below the root matched
    pub fn fell_through_to_root(&self) -> bool {
        matches!(self.matches.as_slice(), [only] if only.node_path.is_root())
    }
}
