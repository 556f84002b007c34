//! Skill-State: object storage for policy evaluation results
//!
//! This crate provides the persistence layer for the policy skill SDK.
//! Evaluation result payloads are written under content-derived keys, so every
//! backend only needs a conditional "create if absent" write to be idempotent
//! under duplicate or concurrent deliveries.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: write-once semantics and deterministic bucket selection.
//!
//! ## Key Components
//!
//! - `ObjectStore`: backend-agnostic blob store trait
//! - `MemoryObjectStore`: in-memory fake for tests and local evaluation
//! - `FsObjectStore`: filesystem backend with atomic no-clobber writes
//! - `GcsObjectStore`: cloud object store backend (JSON API over HTTP)

mod error;
pub mod fakes;
pub mod fs;
pub mod gcs;
pub mod storage_traits;

pub use error::StorageError;
pub use fakes::MemoryObjectStore;
pub use fs::FsObjectStore;
pub use gcs::{Environment, GcsConfig, GcsObjectStore};
pub use storage_traits::{ObjectStore, PutOutcome, StorageResult};
