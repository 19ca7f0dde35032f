//! Route tree evaluation
//!
//! Builds an immutable routing tree from a configuration document, walks it
//! against an alert's labels and records every decision in a trace.

mod evaluator;
mod interval;
mod matcher;
mod path;
mod trace;
mod tree;
mod validate;

pub use evaluator::{evaluate, render_static};
pub use interval::TimeInterval;
pub use matcher::{MatchOperator, Matcher, MatcherError};
pub use path::{NodeId, NodePath};
pub use trace::{DecisionTrace, RouteMatch, Visit};
pub use tree::{
    GroupBy, RouteNode, RouteOptions, RouteOverrides, RouteTree, DEFAULT_GROUP_INTERVAL,
    DEFAULT_GROUP_WAIT, DEFAULT_REPEAT_INTERVAL,
};
pub use validate::{parse_duration, validate};
