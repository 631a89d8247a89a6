#![deny(unused)]
//! Run artifact persistence for the deep research pipeline.
//!
//! Two [`RunRecorder`] backends: an in-memory recorder for tests and embedded
//! use, and a JSON-file recorder that writes one file per step under a run
//! directory.

pub mod file;
pub mod memory;

use std::sync::Arc;

use deep_research_core::{config::OutputConfig, RunRecorder};

pub use file::{load_graph_file, FileRunRecorder};
pub use memory::InMemoryRunRecorder;

/// Pick a recorder for the output section: files when `run_dir` is set,
/// memory otherwise.
pub fn recorder_from_config(config: &OutputConfig) -> Arc<dyn RunRecorder> {
    match &config.run_dir {
        Some(dir) => Arc::new(FileRunRecorder::new(dir)),
        None => Arc::new(InMemoryRunRecorder::new()),
    }
}
