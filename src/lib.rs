//! Client toolkit for the VeriOps agent-run observability API.
//!
//! [`validate`] checks trace-event batches before they are sent,
//! [`normalize`] turns whatever the backend answers into the canonical
//! [`model`], and [`client`] talks to the REST API.

pub mod backoff;
pub mod client;
pub mod config;
pub mod events;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod query;
pub mod runbook;
pub mod sample;
pub mod timestamp;
pub mod validate;

pub use client::{ApiError, ClientConfig, VeriOpsClient};
pub use validate::{validate, Diagnostic, StructuralError};
