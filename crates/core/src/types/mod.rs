//! Data model for the research DAG.
//!
//! - `document`: retrieved sources and the citation ledger
//! - `node`: one research sub-question and its vocabularies
//! - `graph`: the node arena with question-level deduplication
//! - `snapshot`: live-progress payloads
//! - `run`: run-level records and results

pub mod document;
pub mod graph;
pub mod node;
pub mod run;
pub mod snapshot;

pub use document::*;
pub use graph::*;
pub use node::*;
pub use run::*;
pub use snapshot::*;
