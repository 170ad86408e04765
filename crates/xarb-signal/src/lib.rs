//! # xarb-signal
//!
//! Cross-exchange spread detection over normalized quotes.
//!
//! - [`detector`]: best-quote table per symbol and the analysis stream

pub mod detector;

pub use detector::{AnalysisStream, SpreadDetector};
