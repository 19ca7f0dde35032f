//! Data models for RouteScope

mod document;
mod labels;

pub use document::*;
pub use labels::*;
