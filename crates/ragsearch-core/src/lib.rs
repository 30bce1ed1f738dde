//! ragsearch-core
//!
//! Shared vocabulary for the retrieval stack: typed records exchanged with
//! the stores, the error taxonomy, the collaborator traits every adapter
//! implements, configuration loading and the backend health supervisor.

pub mod config;
pub mod error;
pub mod health;
pub mod traits;
pub mod types;

pub use error::{BackendError, SearchError};
