//! `consolida-engine`: ledger-extract unification and verification engine.
//!
//! Pure engine crate: receives pre-loaded batches, returns canonical rows
//! and verification reports. No file IO, no CLI dependencies.

pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod resolve;
pub mod stats;
pub mod unify;
pub mod verify;

pub use config::VerifyConfig;
pub use error::EngineError;
pub use model::{Batch, CanonicalRow, CompanyMapping, FieldValue, RawRecord};
pub use unify::{company_display_list, unify_batches};
pub use verify::{verify_rows, CellIssue, Severity, VerifyReport};
