use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::error::TransportError;
use crate::metrics::{Delivery, OutcomeIntake};

use super::limiter::Permit;
use super::outcome::Outcome;
use super::transport::Transport;

/// Private per-call deadline, measured from the start of the invocation.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(60);

/// Runs one call per invocation and hands the result to the aggregator.
pub struct RequestExecutor<T> {
    transport: Arc<T>,
    intake: OutcomeIntake,
    deadline: Duration,
}

impl<T> Clone for RequestExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            intake: self.intake.clone(),
            deadline: self.deadline,
        }
    }
}

impl<T: Transport> RequestExecutor<T> {
    #[must_use]
    pub const fn new(transport: Arc<T>, intake: OutcomeIntake) -> Self {
        Self {
            transport,
            intake,
            deadline: REQUEST_DEADLINE,
        }
    }

    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Performs the call, offers its outcome to the intake without blocking,
    /// then gives the permit back. The permit is released on every path,
    /// including when this future is dropped mid-call.
    ///
    /// Shutdown does not interrupt the call: it ends on its own response or
    /// at the deadline. Dropping the future records nothing.
    pub async fn execute(&self, permit: Permit) -> Delivery {
        let outcome = self.call().await;
        let delivery = self.intake.deliver(outcome);
        permit.release();
        delivery
    }

    async fn call(&self) -> Outcome {
        let result = match timeout(self.deadline, self.transport.call()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(TransportError::DeadlineExceeded {
                deadline: self.deadline,
            }),
        };

        match result {
            Ok(response) => Outcome::response(response.status),
            Err(err) => {
                debug!("Request failed: {}", err);
                Outcome::transport_failure(&err)
            }
        }
    }
}
