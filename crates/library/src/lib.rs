//! Snapshot-diff reconciliation of a document library against its catalog.
//!
//! A pass hashes every file in the library ([`snapshot`]), compares the result
//! with the snapshot recorded last time, extracts metadata for whatever is new
//! ([`extract`], [`mapper`]) and applies all of it to the catalog in a single
//! transaction ([`Reconciler`]).

pub mod error;
pub mod extract;
pub mod mapper;
mod reconcile;
pub mod snapshot;

pub use crate::extract::{BackendExtractor, Extraction, MetadataExtractor};
pub use crate::reconcile::{Phase, Reconciler, Report};
pub use crate::snapshot::{BackendSnapshotter, Scan, ScanFailure, Snapshotter};
