use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{logging::LogLevel, types::StepIdentifier, Error};

mod set_status;
mod transfer;

pub use set_status::{ExecuteSetStatusStep, ProposeSetStatusStep, WaitSignaturesForProposeSetStatusStep};
pub use transfer::{ExecuteTransferStep, GetPendingStep, ProposeTransferStep, WaitSignaturesForProposeTransferStep};

/// Operations the steps run against the bridge. Everything the steps know about the
/// chains, the peers and the round goes through this trait.
#[async_trait]
pub trait BridgeExecutor: Send + Sync {
    /// Fetches the pending batch from the source and stores it for the round.
    async fn get_pending_batch(&self, ctx: &CancellationToken) -> Result<(), Error>;

    fn has_pending_batch(&self) -> bool;

    /// Re-queries the source, without touching the stored batch.
    async fn is_pending_batch_ready(&self, ctx: &CancellationToken) -> Result<bool, Error>;

    fn is_leader(&self) -> bool;

    async fn was_propose_transfer_executed_on_destination(&self, ctx: &CancellationToken) -> bool;

    async fn was_propose_set_status_executed_on_source(&self, ctx: &CancellationToken) -> bool;

    async fn was_transfer_executed_on_destination(&self, ctx: &CancellationToken) -> bool;

    async fn was_set_status_executed_on_source(&self, ctx: &CancellationToken) -> bool;

    async fn is_quorum_reached_for_propose_transfer(&self, ctx: &CancellationToken) -> bool;

    async fn is_quorum_reached_for_propose_set_status(&self, ctx: &CancellationToken) -> bool;

    async fn propose_transfer_on_destination(&self, ctx: &CancellationToken) -> Result<(), Error>;

    /// Failures are logged, never returned.
    async fn propose_set_status_on_source(&self, ctx: &CancellationToken);

    async fn sign_propose_transfer_on_destination(&self, ctx: &CancellationToken);

    async fn sign_propose_set_status_on_source(&self, ctx: &CancellationToken);

    async fn execute_transfer_on_destination(&self, ctx: &CancellationToken);

    async fn execute_set_status_on_source(&self, ctx: &CancellationToken);

    fn set_status_rejected_on_all_transactions(&self, err: &Error);

    /// Copies the destination statuses into the stored batch, unless every transaction is
    /// already rejected.
    async fn update_transactions_statuses_if_needed(&self, ctx: &CancellationToken) -> Result<(), Error>;

    async fn wait_step_to_finish(&self, step: StepIdentifier, ctx: &CancellationToken) -> Result<(), Error>;

    fn clean_stored_signatures(&self);

    fn clean_topology(&self);

    fn print_info(&self, level: LogLevel, message: &str, extras: &[&dyn fmt::Display]);
}

/// One node of the bridge state machine.
#[async_trait]
pub trait Step: Send + Sync {
    /// Runs the step and returns the identifier of the step to run next.
    /// An error stops the state machine.
    async fn execute(&self, ctx: &CancellationToken) -> Result<StepIdentifier, Error>;

    fn identifier(&self) -> StepIdentifier;
}

pub type MachineStates = HashMap<StepIdentifier, Box<dyn Step>>;

/// Builds the seven steps of the bridge flow around `bridge`.
pub fn create_steps(bridge: Arc<dyn BridgeExecutor>) -> Result<MachineStates, Error> {
    let steps: Vec<Box<dyn Step>> = vec![
        Box::new(GetPendingStep::new(bridge.clone())),
        Box::new(ProposeTransferStep::new(bridge.clone())),
        Box::new(WaitSignaturesForProposeTransferStep::new(bridge.clone())),
        Box::new(ExecuteTransferStep::new(bridge.clone())),
        Box::new(ProposeSetStatusStep::new(bridge.clone())),
        Box::new(WaitSignaturesForProposeSetStatusStep::new(bridge.clone())),
        Box::new(ExecuteSetStatusStep::new(bridge)),
    ];

    create_machine_states(steps)
}

/// Indexes the steps by identifier. Two steps sharing an identifier is an error.
pub fn create_machine_states(steps: Vec<Box<dyn Step>>) -> Result<MachineStates, Error> {
    let mut machine_states = MachineStates::with_capacity(steps.len());
    for step in steps {
        let identifier = step.identifier();
        if machine_states.contains_key(&identifier) {
            return Err(Error::DuplicatedStepIdentifier(identifier));
        }
        machine_states.insert(identifier, step);
    }

    Ok(machine_states)
}

/// Waits out the duration of `step`. Returns `Ok(false)` when the wait failed for any reason
/// other than cancellation, in which case the caller stays on the same step.
async fn wait_for_step(
    bridge: &dyn BridgeExecutor,
    step: StepIdentifier,
    ctx: &CancellationToken,
) -> Result<bool, Error> {
    match bridge.wait_step_to_finish(step, ctx).await {
        Ok(()) => Ok(true),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => {
            bridge.print_info(LogLevel::Error, "error waiting for step", &[&"step", &step, &"error", &e]);
            Ok(false)
        }
    }
}
