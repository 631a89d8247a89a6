//! Contracts the research engine depends on.
//!
//! Traits are organized by collaborator:
//! - `search`: literature search (retrieval plus writeup)
//! - `predictor`: structured predictions (formats, decomposition, synthesis, reports)
//! - `gap`: gap-filling subtree builders used during refinement
//! - `observer`: live snapshot consumers
//! - `recorder`: run artifact persistence

pub mod gap;
pub mod observer;
pub mod predictor;
pub mod recorder;
pub mod search;

pub use gap::*;
pub use observer::*;
pub use predictor::*;
pub use recorder::*;
pub use search::*;
