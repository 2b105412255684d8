//! walletctl Types - Canonical domain types for the wallet-control pipeline
//!
//! This crate contains all foundational types for walletctl with zero
//! dependencies on other walletctl crates. It defines:
//!
//! - Identity types (AppId, RequestEventId, GrantId, PublicKey)
//! - Sat / millisat amounts and the wire conversion
//! - Protocol methods and error codes
//! - Permission grants and budget renewal periods
//! - Request events and their lifecycle states
//! - Per-request deadlines
//!
//! # Request Lifecycle
//!
//! ```text
//! received → handler_executed | handler_error | handler_denied
//! ```
//!
//! Every request is recorded as `received` before any work starts, and
//! reaches exactly one terminal state.

pub mod identity;
pub mod amount;
pub mod method;
pub mod permission;
pub mod request;
pub mod context;
pub mod error;

pub use identity::*;
pub use amount::*;
pub use method::*;
pub use permission::*;
pub use request::*;
pub use context::*;
pub use error::*;
