/// Air-quality monitoring service: QA/QC of low-cost PM sensor readings and
/// statistical detection over the stored observations.
///
/// Data flow: sensor payload (`ingest`) → correction and flags (`qa`) →
/// stored observations (`store`) → detection primitives (`detect`) → JSON
/// tool boundary (`tools`).

pub mod config;
pub mod detect;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod qa;
pub mod stats;
pub mod store;
pub mod tools;
