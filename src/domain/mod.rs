//! Domain layer - pure gateway concepts with no runtime dependencies.
//!
//! This layer contains the core values and invariants of the gateway:
//! - Caller identities
//! - Sliding-window admission state
//! - Cache key normalization and fingerprinting
//! - Provider results and consensus merging
//!
//! All types in this layer are pure and easily testable.

pub mod cache_key;
pub mod identity;
pub mod response;
pub mod window;
