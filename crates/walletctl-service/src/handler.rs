//! Request pipeline: record, authorize, compute, respond
//!
//! Every request moves `received` to exactly one terminal state:
//!
//! ```text
//! received --[permission denied]------> handler_denied
//! received --[method not budgeted]----> handler_error   (NOT_IMPLEMENTED)
//! received --[backend/store failure]--> handler_error   (INTERNAL)
//! received --[success]----------------> handler_executed
//! ```
//!
//! Only a failure to record the request escapes as an error. Once recorded,
//! the caller always gets a well-formed response, even if the terminal
//! state cannot be written. The terminal write is given a short grace
//! period past the request deadline so a timed-out request still lands in
//! `handler_error`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};
use walletctl_budget::{BudgetAccountant, UsageLedger};
use walletctl_ledger::{EventHandle, EventLedger, EventStore, LedgerError};
use walletctl_permits::{CapabilityChecker, PermissionCheck, PermissionStore};
use walletctl_types::{
    Application, ErrorCode, InboundRequest, RequestContext, ResponseError, TerminalState,
};

use crate::balance::BalanceOrchestrator;
use crate::response::{build_response, Outcome, ResponseEnvelope};
use crate::FundingBackend;

/// Minimum time a terminal state write gets, even past the request deadline
const TERMINAL_WRITE_GRACE: Duration = Duration::from_secs(5);

/// Errors that prevent any response
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Failed to record request: {0}")]
    Persistence(#[from] LedgerError),
}

/// Handles balance requests end to end
#[derive(Clone)]
pub struct RequestHandler {
    ledger: EventLedger,
    checker: CapabilityChecker,
    balances: BalanceOrchestrator,
}

impl RequestHandler {
    pub fn new(
        ledger: EventLedger,
        checker: CapabilityChecker,
        balances: BalanceOrchestrator,
    ) -> Self {
        Self {
            ledger,
            checker,
            balances,
        }
    }

    /// Wire a handler from its four stores
    pub fn from_stores(
        events: Arc<dyn EventStore>,
        grants: Arc<dyn PermissionStore>,
        usage: Arc<dyn UsageLedger>,
        backend: Arc<dyn FundingBackend>,
    ) -> Self {
        let budget = BudgetAccountant::new(usage);
        Self {
            ledger: EventLedger::new(events),
            checker: CapabilityChecker::new(grants.clone(), budget.clone()),
            balances: BalanceOrchestrator::new(backend, grants, budget),
        }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        application: &Application,
        request: &InboundRequest,
    ) -> Result<ResponseEnvelope, HandlerError> {
        let handle = match self
            .ledger
            .record(ctx, application, &request.origin_event_id, &request.content)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    origin_event_id = %request.origin_event_id,
                    app_id = %application.id,
                    error = %e,
                    "Failed to save request event"
                );
                return Err(e.into());
            }
        };
        let event_id = handle.id().clone();

        if let PermissionCheck::Denied(denial) = self
            .checker
            .check(ctx, application, request.method, request.amount)
            .await
        {
            warn!(
                event_id = %event_id,
                app_id = %application.id,
                method = %request.method,
                code = %denial.code,
                "Permission denied"
            );
            self.finish(ctx, handle, TerminalState::Denied).await;
            return Ok(build_response(&event_id, request, Outcome::Error(denial)));
        }

        if request.method.budget_source().is_none() {
            self.finish(ctx, handle, TerminalState::Error).await;
            return Ok(build_response(
                &event_id,
                request,
                Outcome::Error(ResponseError::new(
                    ErrorCode::NotImplemented,
                    format!("Unsupported method: {}", request.method),
                )),
            ));
        }

        info!(
            event_id = %event_id,
            app_id = %application.id,
            "Fetching balance"
        );

        let (outcome, state) = match self
            .balances
            .get_available_balance(ctx, application, &request.sender_pubkey, request.method)
            .await
        {
            Ok(balance) => (
                Outcome::Result(balance.to_payload()),
                TerminalState::Executed,
            ),
            Err(e) => {
                info!(
                    event_id = %event_id,
                    app_id = %application.id,
                    error = %e,
                    "Failed to fetch balance"
                );
                (
                    Outcome::Error(ResponseError::internal(format!(
                        "Something went wrong while fetching balance: {}",
                        e
                    ))),
                    TerminalState::Error,
                )
            }
        };

        self.finish(ctx, handle, state).await;
        Ok(build_response(&event_id, request, outcome))
    }

    async fn finish(&self, ctx: &RequestContext, handle: EventHandle, state: TerminalState) {
        let event_id = handle.id().clone();
        let ctx = ctx.with_grace(TERMINAL_WRITE_GRACE);
        if let Err(e) = self.ledger.advance(&ctx, handle, state).await {
            warn!(
                event_id = %event_id,
                error = %e,
                "Failed to update request event state"
            );
        }
    }
}
