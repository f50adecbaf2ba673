//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Storage implementations (sharded maps)
//! - Cache eviction policies
//! - Provider adapters
//! - Settings, logging, and the aggregator builder

pub mod builder;
pub mod clock;
pub mod config;
pub mod eviction;
pub mod providers;
pub mod storage;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. To use these mocks in integration tests, add to your
/// `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// consensus-gateway = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
