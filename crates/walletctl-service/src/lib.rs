//! walletctl Service - The balance request pipeline
//!
//! Ties the event ledger, capability checks and budget accounting to a
//! funding backend:
//!
//! 1. Record the inbound request (`received`)
//! 2. Check the application's grant for the method
//! 3. Fetch the raw balance and cap it by the remaining budget
//! 4. Advance the request to its terminal state and build the response
//!
//! # Example
//!
//! ```ignore
//! use walletctl_service::RequestHandler;
//!
//! let handler = RequestHandler::from_stores(events, grants, usage, backend);
//! let envelope = handler.handle(&ctx, &application, &request).await?;
//! println!("{}", envelope.to_json()?);
//! ```

pub mod backend;
pub mod balance;
pub mod config;
pub mod handler;
pub mod lnd;
pub mod response;

pub use backend::{BackendError, FundingBackend};
pub use balance::{AvailableBalance, BalanceError, BalanceOrchestrator, BudgetCap};
pub use config::ServiceConfig;
pub use handler::{HandlerError, RequestHandler};
pub use lnd::{LndConfig, LndRestBackend};
pub use response::{build_response, BalancePayload, Outcome, Response, ResponseEnvelope};
