#![deny(unused)]
//! Core types, traits, and error definitions for the deep research pipeline.
//!
//! This crate provides the building blocks shared by the store and engine
//! crates: the research graph data model, the collaborator contracts the
//! engine depends on, configuration, and tracing setup.

pub mod config;
pub mod error;
pub mod mocks;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
