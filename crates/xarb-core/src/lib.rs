//! # xarb-core
//!
//! Core crate for the cross-exchange spread detection system, providing:
//!
//! - **Types** (`types`): raw and normalized quotes, spread analyses
//! - **Configuration** (`config`): JSON config deserialization and validation
//! - **Error types** (`error`): `ArbitrageError`, `IngestionError`, `ConnectorError`
//! - **Circuit breaker** (`circuit_breaker`): fail-fast guard for connection attempts
//! - **Time utilities** (`time_util`): timestamps and injectable clocks
//! - **Logging** (`logging`): tracing-based structured logging

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
