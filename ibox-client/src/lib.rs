//! REST client for the iBox storage array management API.
//!
//! The array exposes a uniform `{error, metadata, result}` envelope on every
//! endpoint under `/api/rest`. This crate owns the transport layer that
//! decodes that envelope, the typed wire records, and one module of API
//! operations per resource kind (hosts and their ports, host clusters,
//! pools, volumes, LUN mappings).
//!
//! Absence is not a failure: reads of a missing object return `Ok(None)` and
//! deletes of a missing object succeed, so callers can reconcile local state
//! without special-casing out-of-band deletions.

pub mod client;
pub mod types;
pub mod validate;

mod cluster;
mod host;
mod lun;
mod pool;
mod volume;

pub use client::{ApiError, ApiMetadata, ApiResult, Client, ClientError, Result};
