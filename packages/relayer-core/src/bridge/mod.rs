use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    signatures::SignatureAggregator,
    types::{ActionId, Batch, BatchId},
    Error,
};

/// Chain side of the bridge. The same contract serves as source and as destination;
/// the relayer holds two independent instances.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Fetches the batch waiting to be bridged, if any.
    async fn get_pending(&self, ctx: &CancellationToken) -> Result<Option<Batch>, Error>;

    /// Proposes the batch transfer, returning the transaction hash.
    async fn propose_transfer(&self, ctx: &CancellationToken, batch: &Batch) -> Result<String, Error>;

    /// Proposes the final statuses of the batch, returning the transaction hash.
    async fn propose_set_status(&self, ctx: &CancellationToken, batch: &Batch) -> Result<String, Error>;

    async fn was_proposed_transfer(&self, ctx: &CancellationToken, batch: &Batch) -> bool;

    async fn was_proposed_set_status(&self, ctx: &CancellationToken, batch: &Batch) -> bool;

    async fn get_action_id_for_propose_transfer(
        &self,
        ctx: &CancellationToken,
        batch: &Batch,
    ) -> Result<ActionId, Error>;

    async fn get_action_id_for_set_status_on_pending_transfer(
        &self,
        ctx: &CancellationToken,
        batch: &Batch,
    ) -> Result<ActionId, Error>;

    /// Casts this relayer's vote for the action, returning the transaction hash.
    async fn sign(&self, ctx: &CancellationToken, action_id: ActionId, batch: &Batch) -> Result<String, Error>;

    async fn signers_count(
        &self,
        ctx: &CancellationToken,
        batch: &Batch,
        action_id: ActionId,
        signatures: &dyn SignatureAggregator,
    ) -> u64;

    /// Performs the action once the quorum was reached, using the gathered signatures.
    async fn execute(
        &self,
        ctx: &CancellationToken,
        action_id: ActionId,
        batch: &Batch,
        signatures: &dyn SignatureAggregator,
    ) -> Result<String, Error>;

    async fn was_executed(&self, ctx: &CancellationToken, action_id: ActionId, batch_id: BatchId) -> bool;

    /// Statuses of the batch transactions, in the batch order.
    async fn get_transactions_statuses(&self, ctx: &CancellationToken, batch_id: BatchId) -> Result<Vec<u8>, Error>;
}

/// Tells whether this relayer leads the current round.
#[cfg_attr(test, mockall::automock)]
pub trait TopologyProvider: Send + Sync {
    fn am_i_the_leader(&self) -> bool;

    /// Resets any cached peer discovery state.
    fn clean(&self);
}

/// Provides the number of signatures an action needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuorumProvider: Send + Sync {
    async fn get_quorum(&self, ctx: &CancellationToken) -> Result<u64, Error>;
}

pub mod json_rpc;

pub use json_rpc::JsonRpcBridge;
