use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{wait_for_step, BridgeExecutor, Step};
use crate::{logging::LogLevel, types::StepIdentifier, Error};

pub struct ProposeSetStatusStep {
    bridge: Arc<dyn BridgeExecutor>,
}

impl ProposeSetStatusStep {
    pub fn new(bridge: Arc<dyn BridgeExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for ProposeSetStatusStep {
    async fn execute(&self, ctx: &CancellationToken) -> Result<StepIdentifier, Error> {
        if let Err(e) = self.bridge.update_transactions_statuses_if_needed(ctx).await {
            self.bridge
                .print_info(LogLevel::Debug, "can not update transactions statuses", &[&"error", &e]);
            return Ok(self.identifier());
        }

        if self.bridge.is_leader() {
            self.bridge.propose_set_status_on_source(ctx).await;
        }

        if !wait_for_step(self.bridge.as_ref(), self.identifier(), ctx).await? {
            return Ok(self.identifier());
        }
        if !self.bridge.was_propose_set_status_executed_on_source(ctx).await {
            return Ok(self.identifier());
        }

        self.bridge.sign_propose_set_status_on_source(ctx).await;

        Ok(StepIdentifier::WaitingSignaturesForProposeSetStatus)
    }

    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::ProposingSetStatus
    }
}

pub struct WaitSignaturesForProposeSetStatusStep {
    bridge: Arc<dyn BridgeExecutor>,
}

impl WaitSignaturesForProposeSetStatusStep {
    pub fn new(bridge: Arc<dyn BridgeExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for WaitSignaturesForProposeSetStatusStep {
    async fn execute(&self, ctx: &CancellationToken) -> Result<StepIdentifier, Error> {
        if !wait_for_step(self.bridge.as_ref(), self.identifier(), ctx).await? {
            return Ok(self.identifier());
        }

        if self.bridge.is_quorum_reached_for_propose_set_status(ctx).await {
            return Ok(StepIdentifier::ExecutingSetStatus);
        }
        if self.bridge.was_propose_set_status_executed_on_source(ctx).await {
            self.bridge.print_info(
                LogLevel::Info,
                "quorum not reached on set status, fetching the next batch",
                &[],
            );
            self.bridge.clean_stored_signatures();
            return Ok(StepIdentifier::GettingPending);
        }

        Ok(self.identifier())
    }

    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::WaitingSignaturesForProposeSetStatus
    }
}

pub struct ExecuteSetStatusStep {
    bridge: Arc<dyn BridgeExecutor>,
}

impl ExecuteSetStatusStep {
    pub fn new(bridge: Arc<dyn BridgeExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for ExecuteSetStatusStep {
    async fn execute(&self, ctx: &CancellationToken) -> Result<StepIdentifier, Error> {
        if self.bridge.is_leader() {
            self.bridge.execute_set_status_on_source(ctx).await;
        }

        if !wait_for_step(self.bridge.as_ref(), self.identifier(), ctx).await? {
            return Ok(self.identifier());
        }
        if !self.bridge.was_set_status_executed_on_source(ctx).await {
            return Ok(self.identifier());
        }

        // The next round may be led by someone else.
        self.bridge.clean_topology();

        Ok(StepIdentifier::GettingPending)
    }

    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::ExecutingSetStatus
    }
}
