//! # RouteScope
//!
//! Offline simulator for Alertmanager-style routing trees.
//!
//! RouteScope loads a routing configuration, validates it, and shows where a
//! given alert would be delivered, together with the full path of decisions
//! that led there. Nothing is sent anywhere.
//!
//! ## Architecture
//!
//! - **Models**: the configuration document and alert label sets
//! - **Routing**: matchers, the compiled route tree, validation and the evaluator
//! - **Assemble**: merges a base document with fragment files into one configuration
//! - **Display**: terminal rendering of trees, traces and findings
//!
//! ## Quick Start
//!
//! ```bash
//! # Show the routing tree
//! routescope tree alertmanager.yaml
//!
//! # Where does this alert go?
//! routescope eval alertmanager.yaml --alert '{"severity":"critical","team":"db"}'
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod assemble;
pub mod config;
pub mod display;
pub mod error;
pub mod models;
pub mod routing;

pub use config::Settings;
pub use error::{Error, Finding, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::assemble::{Assembler, Assembly};
    pub use crate::config::Settings;
    pub use crate::error::{Error, Finding, Result};
    pub use crate::models::*;
    pub use crate::routing::{evaluate, render_static, validate, DecisionTrace, RouteTree};
}
