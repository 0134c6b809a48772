//! Storage abstraction for repset.
//!
//! Backend crates (repset-store-postgres, repset-store-memory) implement the
//! [`Store`] trait so `repset-core` doesn't depend on any specific database
//! engine or schema details.
//!
//! Every method that touches tenant data takes an explicit [`OrganizationId`]
//! and the backend appends it as a mandatory predicate; there is no implicit
//! "current tenant". Soft-deleted rows are excluded from default reads.

use thiserror::Error;

mod store;
pub mod types;

pub use store::Store;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced row absent, or vanished between a write and a re-read.
    #[error("not found")]
    NotFound,
    /// Unique-constraint violation (duplicate slug, duplicate per-tenant
    /// subscription) or an invalid membership lifecycle transition.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Caller-supplied data violates a precondition.
    #[error("validation: {0}")]
    Validation(String),
    /// Unclassified backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}
