//! Core value types flowing through the pipeline.
//!
//! Prices are `rust_decimal::Decimal` end to end so that rounding and spread
//! arithmetic are exact. Wall-clock timestamps are microseconds since the Unix
//! epoch, matching [`crate::time_util::now_us`].

pub mod analysis;
pub mod market_data;

pub use analysis::*;
pub use market_data::*;
