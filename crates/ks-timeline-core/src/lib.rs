//! # ks-timeline core
//!
//! Storage-agnostic engine for ks-timeline: the data model, the embedded
//! log formats, identity resolution, version tracking, event reconciliation,
//! timeline construction, and per-participant metrics.
//!
//! This crate contains no tokio, sqlx, or filesystem walking. Extractors
//! and the SQLite store live in the `ks-timeline` crate and talk to the
//! engine through [`store::Store`] and [`reconcile::ScanBatch`].

pub mod error;
pub mod formats;
pub mod identity;
pub mod ids;
pub mod metrics;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod timeline;
pub mod version;
