//! Single-instance coordination.
//!
//! Arbitration between concurrently launched copies of the application:
//! a SQLite-backed claim table decides the owner atomically, and a local
//! TCP activation channel forwards activation payloads from redirected
//! launches to the owning process.

pub mod claims;
pub mod client;
pub mod coordinator;
pub mod protocol;
pub mod server;

pub use claims::{ClaimRow, ClaimStore};
pub use coordinator::{ClaimOutcome, InstanceCoordinator};
pub use protocol::{ActivationAck, ActivationMessage};
pub use server::{ActivationHandler, ActivationServer, ActivationServerHandle};
