use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{wait_for_step, BridgeExecutor, Step};
use crate::{logging::LogLevel, types::StepIdentifier, Error};

pub struct GetPendingStep {
    bridge: Arc<dyn BridgeExecutor>,
}

impl GetPendingStep {
    pub fn new(bridge: Arc<dyn BridgeExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for GetPendingStep {
    async fn execute(&self, ctx: &CancellationToken) -> Result<StepIdentifier, Error> {
        if let Err(e) = self.bridge.get_pending_batch(ctx).await {
            self.bridge
                .print_info(LogLevel::Debug, "can not fetch pending batch", &[&"error", &e]);
        }
        if !self.bridge.has_pending_batch() {
            return Ok(self.identifier());
        }

        Ok(StepIdentifier::ProposingTransfer)
    }

    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::GettingPending
    }
}

pub struct ProposeTransferStep {
    bridge: Arc<dyn BridgeExecutor>,
}

impl ProposeTransferStep {
    pub fn new(bridge: Arc<dyn BridgeExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for ProposeTransferStep {
    async fn execute(&self, ctx: &CancellationToken) -> Result<StepIdentifier, Error> {
        if self.bridge.is_leader() {
            if let Err(e) = self.bridge.propose_transfer_on_destination(ctx).await {
                self.bridge
                    .print_info(LogLevel::Error, "error proposing transfer on destination", &[&"error", &e]);
                self.bridge.set_status_rejected_on_all_transactions(&e);
                return Ok(StepIdentifier::ProposingSetStatus);
            }
        }

        if !wait_for_step(self.bridge.as_ref(), self.identifier(), ctx).await? {
            return Ok(self.identifier());
        }
        if !self.bridge.was_propose_transfer_executed_on_destination(ctx).await {
            return Ok(self.identifier());
        }

        self.bridge.sign_propose_transfer_on_destination(ctx).await;

        Ok(StepIdentifier::WaitingSignaturesForProposeTransfer)
    }

    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::ProposingTransfer
    }
}

pub struct WaitSignaturesForProposeTransferStep {
    bridge: Arc<dyn BridgeExecutor>,
}

impl WaitSignaturesForProposeTransferStep {
    pub fn new(bridge: Arc<dyn BridgeExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for WaitSignaturesForProposeTransferStep {
    async fn execute(&self, ctx: &CancellationToken) -> Result<StepIdentifier, Error> {
        if !wait_for_step(self.bridge.as_ref(), self.identifier(), ctx).await? {
            return Ok(self.identifier());
        }

        if self.bridge.is_quorum_reached_for_propose_transfer(ctx).await {
            return Ok(StepIdentifier::ExecutingTransfer);
        }
        if self.bridge.was_propose_transfer_executed_on_destination(ctx).await {
            self.bridge.print_info(
                LogLevel::Info,
                "quorum not reached, moving on to the set status proposal",
                &[],
            );
            self.bridge.clean_stored_signatures();
            return Ok(StepIdentifier::ProposingSetStatus);
        }

        Ok(self.identifier())
    }

    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::WaitingSignaturesForProposeTransfer
    }
}

pub struct ExecuteTransferStep {
    bridge: Arc<dyn BridgeExecutor>,
}

impl ExecuteTransferStep {
    pub fn new(bridge: Arc<dyn BridgeExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for ExecuteTransferStep {
    async fn execute(&self, ctx: &CancellationToken) -> Result<StepIdentifier, Error> {
        if self.bridge.is_leader() {
            self.bridge.execute_transfer_on_destination(ctx).await;
        }

        if !wait_for_step(self.bridge.as_ref(), self.identifier(), ctx).await? {
            return Ok(self.identifier());
        }
        if !self.bridge.was_transfer_executed_on_destination(ctx).await {
            return Ok(self.identifier());
        }

        self.bridge.clean_stored_signatures();

        Ok(StepIdentifier::ProposingSetStatus)
    }

    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::ExecutingTransfer
    }
}
