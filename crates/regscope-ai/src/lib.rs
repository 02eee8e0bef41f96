//! Oracle-backed reasoning: context enrichment and next-action decisions.

pub mod decision;
pub mod enrich;
#[cfg(feature = "http")]
pub mod http;
pub mod json;
pub mod oracle;
pub mod signals;

pub use decision::{Decision, DecisionEngine};
pub use enrich::EnrichmentEngine;
#[cfg(feature = "http")]
pub use http::HttpOracle;
pub use oracle::{Completion, CompletionRequest, Oracle, OracleError};
