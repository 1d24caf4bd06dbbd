//! Endpoint detection and response back-plane: enrichment, analytics ensemble, and
//! playbook execution services sharing one library crate across three binaries.

pub mod analytics;
pub mod config;
pub mod decision;
pub mod enrichment;
pub mod error;
pub mod health;
pub mod kv;
pub mod messaging;
pub mod models;
pub mod playbooks;
pub mod storage;

pub use error::{AppError, Result};
