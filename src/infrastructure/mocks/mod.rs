//! Test doubles.
//!
//! Providers with scripted behavior live in [`crate::infrastructure::providers`]
//! because the demo uses them too; only the clock needs to stay out of
//! release builds.

pub mod clock;

pub use clock::MockClock;
