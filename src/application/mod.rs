//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Window registry and sliding-window limiter (admission control)
//! - Response cache (LRU + TTL)
//! - Provider fan-out with optional circuit breakers
//! - Aggregator (the request pipeline)
//! - Background maintenance
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod aggregator;
pub mod cache;
pub mod circuit_breaker;
pub mod fanout;
pub mod limiter;
pub mod maintenance;
pub mod metrics;
pub mod ports;
pub mod registry;
