//! Jurisdiction search tools: the tool trait, payload parsing, the startup
//! registry, and an HTTP tool-server client.

mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod registry;
pub mod tool;

pub use error::SearchError;
#[cfg(feature = "http")]
pub use http::HttpToolProvider;
pub use registry::{ToolProvider, ToolRegistry};
pub use tool::{JurisdictionTool, ToolArguments, ToolOutcome, parse_finding};
