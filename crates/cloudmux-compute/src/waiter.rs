// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Blocking on operations

use crate::api::OperationApi;
use crate::operation::Operation;
use crate::predicates::OperationDonePredicate;
use cloudmux_core::{CloudError, CloudResult, PollSettings, RetryablePredicate};
use std::sync::Arc;
use tracing::{info, warn};

/// Polls operations until they finish
#[derive(Debug, Clone)]
pub struct OperationWaiter {
    poller: RetryablePredicate<OperationDonePredicate>,
}

impl OperationWaiter {
    /// Waiter with default poll timing
    pub fn new(api: Arc<dyn OperationApi>) -> Self {
        Self::with_settings(api, PollSettings::default())
    }

    /// Waiter with custom poll timing
    pub fn with_settings(api: Arc<dyn OperationApi>, settings: PollSettings) -> Self {
        OperationWaiter {
            poller: RetryablePredicate::new(OperationDonePredicate::new(api), settings),
        }
    }

    /// Poll timing in use
    pub fn settings(&self) -> &PollSettings {
        self.poller.settings()
    }

    /// Wait for `operation` to finish and return its final state
    ///
    /// Fails with `Timeout` when the deadline passes first and with
    /// `IllegalState` when the finished operation reports an error.
    pub async fn wait(&self, mut operation: Operation) -> CloudResult<Operation> {
        if !operation.is_done() {
            let what = format!("operation {}", operation.name);
            self.poller.await_true(&mut operation, &what).await?;
        }

        if let Some(message) = operation.failure_message() {
            warn!(operation = %operation.name, "operation failed: {}", message);
            return Err(CloudError::illegal_state(format!(
                "operation {} failed: {}",
                operation.name, message
            )));
        }

        info!(
            operation = %operation.name,
            target = operation.target_link.as_deref().unwrap_or_default(),
            "operation done"
        );
        Ok(operation)
    }
}
