//! Coverfix record store gateway
//!
//! Opens a connection to the document store (directly or through a tunnel's
//! local endpoint), verifies reachability with a bounded probe, and exposes
//! the three primitives the orchestrator needs:
//! - candidate count
//! - lazy candidate cursor
//! - field-level idempotent update of the derived attributes
//!
//! The selection predicate and the update shape live in [`record`]; the
//! connection handling in [`gateway`].

pub mod gateway;
pub mod record;

pub use gateway::{RecordGateway, RecordStore, StoreConfig, StoreError};
pub use record::{candidate_filter, CandidateRecord, COVER_HEIGHT_FIELD, COVER_WIDTH_FIELD};
