use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::{Bridge, QuorumProvider, TopologyProvider},
    logging::{format_extras, LogLevel, Logger},
    signatures::{SignatureAggregator, SignaturesHolder},
    status::{
        StatusHandler, METRIC_LAST_ERROR, METRIC_NUM_BATCHES, METRIC_NUM_TRANSACTIONS_REJECTED,
        METRIC_NUM_TRANSACTIONS_SUCCEEDED,
    },
    steps::BridgeExecutor,
    timer::Timer,
    types::{ActionId, Batch, BatchId, StepIdentifier, STATUS_EXECUTED, STATUS_REJECTED},
    Error,
};

/// Collaborators of [`DefaultBridgeExecutor`]. A `None` collaborator fails the construction.
#[derive(Default)]
pub struct ArgsBridgeExecutor {
    pub executor_name: String,
    pub logger: Option<Logger>,
    pub source_bridge: Option<Arc<dyn Bridge>>,
    pub destination_bridge: Option<Arc<dyn Bridge>>,
    pub topology_provider: Option<Arc<dyn TopologyProvider>>,
    pub quorum_provider: Option<Arc<dyn QuorumProvider>>,
    pub timer: Option<Arc<dyn Timer>>,
    pub durations_map: HashMap<StepIdentifier, Duration>,
    pub status_handler: Option<Arc<dyn StatusHandler>>,
}

#[derive(Debug, Default)]
struct RoundState {
    pending_batch: Option<Batch>,
    action_id: ActionId,
}

/// Runs the protocol actions for one batch at a time.
///
/// The round state (pending batch and live action ID) is not meant to be shared between
/// rounds or drivers: exactly one state machine drives an executor. The signatures holder is
/// the only part written from elsewhere (the peer listener).
pub struct DefaultBridgeExecutor {
    executor_name: String,
    logger: Logger,
    source_bridge: Arc<dyn Bridge>,
    destination_bridge: Arc<dyn Bridge>,
    topology_provider: Arc<dyn TopologyProvider>,
    quorum_provider: Arc<dyn QuorumProvider>,
    timer: Arc<dyn Timer>,
    durations_map: HashMap<StepIdentifier, Duration>,
    status_handler: Arc<dyn StatusHandler>,
    signatures: Arc<SignaturesHolder>,
    round: Mutex<RoundState>,
}

impl fmt::Debug for DefaultBridgeExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultBridgeExecutor")
            .field("executor_name", &self.executor_name)
            .field("round", &self.round)
            .finish_non_exhaustive()
    }
}

impl DefaultBridgeExecutor {
    pub fn new(args: ArgsBridgeExecutor) -> Result<Self, Error> {
        let source_bridge = args.source_bridge.ok_or(Error::NilBridge("source"))?;
        let destination_bridge = args.destination_bridge.ok_or(Error::NilBridge("destination"))?;
        let logger = args.logger.ok_or(Error::NilLogger)?;
        let topology_provider = args.topology_provider.ok_or(Error::NilTopologyProvider)?;
        let quorum_provider = args.quorum_provider.ok_or(Error::NilQuorumProvider)?;
        let timer = args.timer.ok_or(Error::NilTimer)?;
        if args.durations_map.is_empty() {
            return Err(Error::NilDurationsMap);
        }
        let status_handler = args.status_handler.ok_or(Error::NilStatusHandler)?;

        Ok(Self {
            executor_name: args.executor_name,
            logger,
            source_bridge,
            destination_bridge,
            topology_provider,
            quorum_provider,
            timer,
            durations_map: args.durations_map,
            status_handler,
            signatures: Arc::new(SignaturesHolder::new()),
            round: Mutex::new(RoundState::default()),
        })
    }

    /// Handle used by the peer listener to feed the received votes.
    pub fn signature_aggregator(&self) -> Arc<SignaturesHolder> {
        Arc::clone(&self.signatures)
    }

    pub fn pending_batch(&self) -> Option<Batch> {
        self.round.lock().pending_batch.clone()
    }

    pub fn action_id(&self) -> ActionId {
        self.round.lock().action_id
    }

    fn batch_id(&self) -> Option<BatchId> {
        self.round.lock().pending_batch.as_ref().map(|batch| batch.id)
    }

    fn batch_id_string(&self) -> String {
        self.batch_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<nil>".to_string())
    }

    fn append_message_to_name(&self, message: &str) -> String {
        format!("{}: {}", self.executor_name, message)
    }

    async fn is_quorum_reached_on_bridge(&self, ctx: &CancellationToken, bridge: &dyn Bridge) -> bool {
        let (batch, action_id) = {
            let round = self.round.lock();
            (round.pending_batch.clone(), round.action_id)
        };
        let Some(batch) = batch else {
            self.print_info(LogLevel::Debug, "no pending batch to check the quorum for", &[]);
            return false;
        };

        let count = bridge.signers_count(ctx, &batch, action_id, self.signatures.as_ref()).await;
        let quorum = match self.quorum_provider.get_quorum(ctx).await {
            Ok(quorum) => quorum,
            Err(e) => {
                self.print_info(LogLevel::Error, "error getting the quorum", &[&"error", &e]);
                return false;
            }
        };

        self.logger.info(
            &self.append_message_to_name("got signatures"),
            &[&"got", &count, &"quorum", &quorum],
        );

        count >= quorum
    }

    async fn was_executed_on_bridge(&self, ctx: &CancellationToken, bridge: &dyn Bridge) -> bool {
        let (batch_id, action_id) = {
            let round = self.round.lock();
            (round.pending_batch.as_ref().map(|batch| batch.id), round.action_id)
        };
        match batch_id {
            Some(batch_id) => bridge.was_executed(ctx, action_id, batch_id).await,
            None => false,
        }
    }

    fn update_status_in_status_handler(&self, status: u8) {
        match status {
            STATUS_EXECUTED => self.status_handler.add_int_metric(METRIC_NUM_TRANSACTIONS_SUCCEEDED, 1),
            STATUS_REJECTED => self.status_handler.add_int_metric(METRIC_NUM_TRANSACTIONS_REJECTED, 1),
            _ => {}
        }
    }
}

#[async_trait]
impl BridgeExecutor for DefaultBridgeExecutor {
    async fn get_pending_batch(&self, ctx: &CancellationToken) -> Result<(), Error> {
        self.status_handler.set_string_metric(METRIC_LAST_ERROR, "");

        match self.source_bridge.get_pending(ctx).await {
            Ok(batch) => {
                if let Some(batch) = batch.as_ref() {
                    self.print_info(LogLevel::Info, "fetched new batch", &[&"batch", batch]);
                }
                self.round.lock().pending_batch = batch;
                Ok(())
            }
            Err(e) => {
                self.round.lock().pending_batch = None;
                Err(e)
            }
        }
    }

    fn has_pending_batch(&self) -> bool {
        self.round.lock().pending_batch.is_some()
    }

    async fn is_pending_batch_ready(&self, ctx: &CancellationToken) -> Result<bool, Error> {
        let batch = self.source_bridge.get_pending(ctx).await?;
        Ok(batch.is_some())
    }

    fn is_leader(&self) -> bool {
        self.topology_provider.am_i_the_leader()
    }

    async fn was_propose_transfer_executed_on_destination(&self, ctx: &CancellationToken) -> bool {
        let Some(batch) = self.pending_batch() else {
            return false;
        };
        self.destination_bridge.was_proposed_transfer(ctx, &batch).await
    }

    async fn was_propose_set_status_executed_on_source(&self, ctx: &CancellationToken) -> bool {
        let Some(batch) = self.pending_batch() else {
            return false;
        };
        self.source_bridge.was_proposed_set_status(ctx, &batch).await
    }

    async fn was_transfer_executed_on_destination(&self, ctx: &CancellationToken) -> bool {
        self.was_executed_on_bridge(ctx, self.destination_bridge.as_ref()).await
    }

    async fn was_set_status_executed_on_source(&self, ctx: &CancellationToken) -> bool {
        self.was_executed_on_bridge(ctx, self.source_bridge.as_ref()).await
    }

    async fn is_quorum_reached_for_propose_transfer(&self, ctx: &CancellationToken) -> bool {
        self.is_quorum_reached_on_bridge(ctx, self.destination_bridge.as_ref()).await
    }

    async fn is_quorum_reached_for_propose_set_status(&self, ctx: &CancellationToken) -> bool {
        self.is_quorum_reached_on_bridge(ctx, self.source_bridge.as_ref()).await
    }

    async fn propose_transfer_on_destination(&self, ctx: &CancellationToken) -> Result<(), Error> {
        let batch = self.pending_batch().ok_or(Error::NilBatch)?;
        let hash = self.destination_bridge.propose_transfer(ctx, &batch).await?;
        self.print_info(
            LogLevel::Info,
            "proposed transfer",
            &[&"batch ID", &batch.id, &"tx hash", &hash],
        );

        Ok(())
    }

    async fn propose_set_status_on_source(&self, ctx: &CancellationToken) {
        let Some(batch) = self.pending_batch() else {
            self.print_info(LogLevel::Error, "can not propose set status", &[&"error", &Error::NilBatch]);
            return;
        };
        match self.source_bridge.propose_set_status(ctx, &batch).await {
            Ok(hash) => self.print_info(
                LogLevel::Info,
                "proposed set status",
                &[&"batch ID", &batch.id, &"tx hash", &hash],
            ),
            Err(e) => self.print_info(LogLevel::Error, "error proposing set status", &[&"error", &e]),
        }
    }

    async fn sign_propose_transfer_on_destination(&self, ctx: &CancellationToken) {
        let Some(batch) = self.pending_batch() else {
            self.print_info(LogLevel::Error, "can not sign propose transfer", &[&"error", &Error::NilBatch]);
            return;
        };
        self.print_info(LogLevel::Info, "signing propose transfer", &[&"batch ID", &batch.id]);

        let action_id = match self.destination_bridge.get_action_id_for_propose_transfer(ctx, &batch).await {
            Ok(action_id) => action_id,
            Err(e) => {
                self.print_info(LogLevel::Error, "error fetching action ID for propose transfer", &[&"error", &e]);
                return;
            }
        };
        self.round.lock().action_id = action_id;

        if let Err(e) = self.destination_bridge.sign(ctx, action_id, &batch).await {
            self.print_info(
                LogLevel::Error,
                "error signing propose transfer",
                &[&"action ID", &action_id, &"error", &e],
            );
        }
    }

    async fn sign_propose_set_status_on_source(&self, ctx: &CancellationToken) {
        let Some(batch) = self.pending_batch() else {
            self.print_info(LogLevel::Error, "can not sign set status", &[&"error", &Error::NilBatch]);
            return;
        };
        self.print_info(LogLevel::Info, "signing set status", &[&"batch ID", &batch.id]);

        let action_id = match self
            .source_bridge
            .get_action_id_for_set_status_on_pending_transfer(ctx, &batch)
            .await
        {
            Ok(action_id) => action_id,
            Err(e) => {
                self.print_info(LogLevel::Error, "error fetching action ID for set status", &[&"error", &e]);
                return;
            }
        };
        self.round.lock().action_id = action_id;

        if let Err(e) = self.source_bridge.sign(ctx, action_id, &batch).await {
            self.print_info(
                LogLevel::Error,
                "error signing set status",
                &[&"action ID", &action_id, &"error", &e],
            );
        }
    }

    async fn execute_transfer_on_destination(&self, ctx: &CancellationToken) {
        let Some(batch) = self.pending_batch() else {
            self.print_info(LogLevel::Error, "can not execute transfer", &[&"error", &Error::NilBatch]);
            return;
        };
        let action_id = self.action_id();
        match self
            .destination_bridge
            .execute(ctx, action_id, &batch, self.signatures.as_ref())
            .await
        {
            Ok(hash) => self.print_info(
                LogLevel::Info,
                "executed transfer",
                &[&"action ID", &action_id, &"tx hash", &hash],
            ),
            Err(e) => self.print_info(LogLevel::Error, "error executing transfer", &[&"error", &e]),
        }
    }

    async fn execute_set_status_on_source(&self, ctx: &CancellationToken) {
        let Some(batch) = self.pending_batch() else {
            self.print_info(LogLevel::Error, "can not execute set status", &[&"error", &Error::NilBatch]);
            return;
        };
        let action_id = self.action_id();
        match self
            .source_bridge
            .execute(ctx, action_id, &batch, self.signatures.as_ref())
            .await
        {
            Ok(hash) => self.print_info(
                LogLevel::Info,
                "executed set status",
                &[&"action ID", &action_id, &"tx hash", &hash],
            ),
            Err(e) => self.print_info(LogLevel::Error, "error executing set status", &[&"error", &e]),
        }
    }

    fn set_status_rejected_on_all_transactions(&self, err: &Error) {
        if let Some(batch) = self.round.lock().pending_batch.as_mut() {
            batch.set_status_on_all_transactions(STATUS_REJECTED, Some(err.to_string()));
        }
    }

    async fn update_transactions_statuses_if_needed(&self, ctx: &CancellationToken) -> Result<(), Error> {
        let (batch_id, all_rejected) = {
            let round = self.round.lock();
            let batch = round.pending_batch.as_ref().ok_or(Error::NilBatch)?;
            (batch.id, batch.all_rejected())
        };
        if all_rejected {
            return Ok(());
        }

        let statuses = match self.destination_bridge.get_transactions_statuses(ctx, batch_id).await {
            Ok(statuses) => statuses,
            Err(e) => {
                self.print_info(
                    LogLevel::Error,
                    "error fetching transactions statuses",
                    &[&"batch ID", &batch_id, &"error", &e],
                );
                return Err(e);
            }
        };

        let applied: Vec<u8> = {
            let mut round = self.round.lock();
            let batch = round.pending_batch.as_mut().ok_or(Error::NilBatch)?;
            for (i, tx) in batch.transactions.iter_mut().enumerate() {
                tx.status = statuses.get(i).copied().unwrap_or(STATUS_REJECTED);
            }
            batch.transactions.iter().map(|tx| tx.status).collect()
        };

        if statuses.len() != applied.len() {
            self.print_info(
                LogLevel::Warning,
                "different number of statuses fetched",
                &[
                    &"batch ID",
                    &batch_id,
                    &"local transactions",
                    &applied.len(),
                    &"fetched statuses",
                    &statuses.len(),
                ],
            );
        }

        // Metrics may hit the disk, keep them out of the round lock.
        for status in applied {
            self.update_status_in_status_handler(status);
        }
        self.status_handler.add_int_metric(METRIC_NUM_BATCHES, 1);

        Ok(())
    }

    async fn wait_step_to_finish(&self, step: StepIdentifier, ctx: &CancellationToken) -> Result<(), Error> {
        let duration = self
            .durations_map
            .get(&step)
            .copied()
            .ok_or(Error::DurationForStepNotFound(step))?;

        self.logger.debug(
            &self.append_message_to_name("waiting for step to finish"),
            &[
                &"step",
                &step,
                &"batch ID",
                &self.batch_id_string(),
                &"duration",
                &format!("{:?}", duration),
            ],
        );

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled),
            _ = self.timer.after(duration) => Ok(()),
        }
    }

    fn clean_stored_signatures(&self) {
        self.signatures.clear_stored_signatures();
    }

    fn clean_topology(&self) {
        self.topology_provider.clean();
    }

    fn print_info(&self, level: LogLevel, message: &str, extras: &[&dyn fmt::Display]) {
        let message = self.append_message_to_name(message);
        self.logger.log(level, &message, extras);

        if matches!(level, LogLevel::Warning | LogLevel::Error) {
            let last_error = format!("{}: {}{}", level, message, format_extras(extras));
            self.status_handler.set_string_metric(METRIC_LAST_ERROR, &last_error);
        }
    }
}
