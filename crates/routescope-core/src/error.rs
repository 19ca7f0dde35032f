//! Error types for RouteScope

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::routing::NodePath;

/// Result type alias using RouteScope's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for RouteScope operations
#[derive(Error, Debug)]
pub enum Error {
    /// The routing configuration failed validation
    #[error("Invalid configuration: {}", summarize(.0))]
    InvalidConfig(Vec<Finding>),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Alert input could not be turned into a label set
    #[error("Alert input error: {0}")]
    AlertInput(String),

    /// Tool settings could not be loaded
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an alert input error
    pub fn alert_input(msg: impl Into<String>) -> Self {
        Self::AlertInput(msg.into())
    }

    /// Validation findings carried by this error, if any
    pub fn findings(&self) -> &[Finding] {
        match self {
            Self::InvalidConfig(findings) => findings,
            _ => &[],
        }
    }
}

fn summarize(findings: &[Finding]) -> String {
    match findings {
        [] => "no findings".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

/// What kind of named object a route refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// An entry of the top-level `receivers` list
    Receiver,
    /// An entry of `time_intervals` / `mute_time_intervals`
    TimeInterval,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Receiver => f.write_str("receiver"),
            Self::TimeInterval => f.write_str("time interval"),
        }
    }
}

/// A single load-time problem with a routing configuration.
///
/// Validation never stops at the first finding; callers always get the
/// complete list for a document.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// The document has no `route` section at all
    #[error("no 'route' section found in the configuration")]
    MissingRoute,

    /// The root route has no receiver and no fallback was configured
    #[error("root route has no receiver")]
    MissingDefaultReceiver,

    /// A regex matcher does not compile
    #[error("{path}: invalid regex for label '{label}' ({pattern:?}): {reason}")]
    PatternCompile {
        /// Route declaring the matcher
        path: NodePath,
        /// Label the matcher tests
        label: String,
        /// Pattern as written
        pattern: String,
        /// Regex compiler message
        reason: String,
    },

    /// A receiver or time interval reference does not resolve
    #[error("{path}: {reference} '{name}' is not defined")]
    ConfigReference {
        /// Route holding the reference
        path: NodePath,
        /// What kind of name is referenced
        reference: ReferenceKind,
        /// The undefined name
        name: String,
    },

    /// A `matchers` entry is not valid matcher syntax
    #[error("{path}: cannot parse matcher {matcher:?}: {reason}")]
    MatcherSyntax {
        /// Route declaring the matcher
        path: NodePath,
        /// Expression as written
        matcher: String,
        /// Parser message
        reason: String,
    },

    /// A timing option is not a valid duration
    #[error("{path}: invalid {field} {value:?}: {reason}")]
    InvalidDuration {
        /// Route declaring the option
        path: NodePath,
        /// Option name, such as `group_wait`
        field: String,
        /// Value as written
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// A time interval definition cannot be interpreted
    #[error("time interval '{name}': {reason}")]
    InvalidTimeInterval {
        /// Interval name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Two receivers share a name
    #[error("receiver '{name}' is defined more than once")]
    DuplicateReceiver {
        /// Repeated name
        name: String,
    },

    /// Two time intervals share a name
    #[error("time interval '{name}' is defined more than once")]
    DuplicateTimeInterval {
        /// Repeated name
        name: String,
    },

    /// A receiver definition is malformed
    #[error("receiver '{name}': {reason}")]
    InvalidReceiver {
        /// Receiver name, possibly empty
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// The root route declares something only child routes may declare
    #[error("root route: {reason}")]
    RootRoute {
        /// What the root declares
        reason: String,
    },

    /// A fragment file could not be merged into the assembled configuration
    #[error("{file}: {reason}")]
    Assembly {
        /// Fragment file, relative to the assembled directory
        file: String,
        /// What went wrong
        reason: String,
    },
}

impl Finding {
    /// Route the finding is attached to, when it concerns a single route
    pub fn path(&self) -> Option<&NodePath> {
        match self {
            Self::PatternCompile { path, .. }
            | Self::ConfigReference { path, .. }
            | Self::MatcherSyntax { path, .. }
            | Self::InvalidDuration { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Stable machine-readable name of the finding kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingRoute => "missing_route",
            Self::MissingDefaultReceiver => "missing_default_receiver",
            Self::PatternCompile { .. } => "pattern_compile",
            Self::ConfigReference { .. } => "config_reference",
            Self::MatcherSyntax { .. } => "matcher_syntax",
            Self::InvalidDuration { .. } => "invalid_duration",
            Self::InvalidTimeInterval { .. } => "invalid_time_interval",
            Self::DuplicateReceiver { .. } => "duplicate_receiver",
            Self::DuplicateTimeInterval { .. } => "duplicate_time_interval",
            Self::InvalidReceiver { .. } => "invalid_receiver",
            Self::RootRoute { .. } => "root_route",
            Self::Assembly { .. } => "assembly",
        }
    }
}
