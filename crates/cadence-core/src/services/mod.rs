//! Capability registry.
//!
//! Services are registered by capability type with an explicit lifetime
//! policy and resolved through [`ServiceContainer`].

pub mod container;

pub use container::{Lifetime, ServiceContainer, ServiceFactory};
