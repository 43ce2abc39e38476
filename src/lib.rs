//! Longitudinal aggregation of per-session behavioral experiment exports.
//!
//! Each session file describes one animal on one experiment day. A
//! [`LongitudinalDataset`] ingests those files in any order, keeps one store
//! per metric and reshapes a metric into an animals × days matrix on demand.
//!
//! ```no_run
//! use longi::LongitudinalDataset;
//!
//! # fn main() -> longi::Result<()> {
//! let mut dataset = LongitudinalDataset::new("cohort-3");
//! dataset.ingest_summary("sessions/vole1_day1_summary.csv")?;
//! dataset.ingest_summary("sessions/vole1_day2_summary.csv")?;
//!
//! let weight = dataset.query("weight", "E1", None)?;
//! println!("{:?} × {:?}", weight.animals, weight.days);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod snapshot;

pub use config::IngestConfig;
pub use data::matrix::{Matrix, RoundMatrix};
pub use data::model::{ScalarValue, SessionKey, ValueKind, classify};
pub use dataset::{IngestReport, LongitudinalDataset, MetricStore};
pub use error::{Error, Result};
