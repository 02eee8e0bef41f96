//! Compliance-analysis orchestrator.
//!
//! One [`Orchestrator`] drives each feature through enrichment, an optional
//! pre-analysis clarification, a bounded reasoning loop over the jurisdiction
//! tools in its registry, and verdict synthesis. Clarifications are exchanged
//! with a host through the shared [`ClarificationHub`].

pub mod cancel;
pub mod clarify;
mod error;
pub mod hub;
pub mod orchestrator;
pub mod synth;

pub use cancel::CancellationFlag;
pub use clarify::{ClarificationInterpreter, Interpretation, detect_ambiguity, is_ambiguous};
pub use error::ClarificationError;
pub use hub::ClarificationHub;
pub use orchestrator::Orchestrator;
pub use synth::{Synthesizer, aggregate, error_verdict};
