//! Ready-made endpoint specializations built on the pipeline.
//!
//! # Data Flow
//! ```text
//! remote      → proxy a typed request to a configured API
//! dml         → pre-control checks → one transaction per key → finalize
//! query       → command by db mode → cache → pagination → row transformer
//! attachment  → download (file response) | upload (multipart save)
//! ```
//!
//! # Design Decisions
//! - Each specialization is a plain `Handler` impl; nothing here is known
//!   to the executor
//! - Commands are validated (placeholders, verb) before any statement runs

pub mod attachment;
pub mod dml;
pub mod query;
pub mod remote;
