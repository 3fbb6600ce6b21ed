use async_trait::async_trait;
use log::{info, warn};
use std::future::Future;
use std::sync::Arc;

use crate::{
    bridge::{Bridge, JsonRpcBridge},
    config::{ChainConfig, Config},
    executor::{ArgsBridgeExecutor, DefaultBridgeExecutor},
    logging::Logger,
    signatures::SignaturesHolder,
    state_machine::{ArgsStateMachine, StateMachine},
    status::{RelayerStatusHandler, StatusHandler},
    steps::create_steps,
    timer::{SystemTimer, Timer},
    topology::{ArgsTopologyHandler, StaticQuorumProvider, TopologyHandler},
    types::StepIdentifier,
    Error,
};

#[async_trait]
pub trait BridgeFactory: Send + Sync {
    async fn create_bridge(&self, config: &ChainConfig) -> Result<Arc<dyn Bridge>, Error>;
}

/// Talks to both chains through their JSON-RPC endpoints.
pub struct DefaultBridgeFactory;

#[async_trait]
impl BridgeFactory for DefaultBridgeFactory {
    async fn create_bridge(&self, config: &ChainConfig) -> Result<Arc<dyn Bridge>, Error> {
        if config.bridge_address.is_empty() {
            return Err(Error::Config(format!("Empty bridge address for chain {}", config.id)));
        }

        Ok(Arc::new(JsonRpcBridge::new(config.clone())))
    }
}

/// One relayer process: the executor wired to both chains, driven by the bridge state machine.
pub struct Relayer {
    config: Config,
    executor: Arc<DefaultBridgeExecutor>,
    timer: Arc<dyn Timer>,
    status_handler: Arc<dyn StatusHandler>,
}

impl Relayer {
    pub async fn new(config: Config) -> Result<Self, Error> {
        Self::with_factory(config, &DefaultBridgeFactory).await
    }

    pub async fn with_factory(config: Config, factory: &dyn BridgeFactory) -> Result<Self, Error> {
        let source_bridge = factory.create_bridge(&config.source).await?;
        let destination_bridge = factory.create_bridge(&config.destination).await?;

        let name = config.relayer.name.clone();
        let timer: Arc<dyn Timer> = Arc::new(SystemTimer::new());
        let status_handler: Arc<dyn StatusHandler> = match &config.relayer.status_file {
            Some(path) => Arc::new(RelayerStatusHandler::with_persistence(&name, path)?),
            None => Arc::new(RelayerStatusHandler::new(&name)?),
        };

        let topology_provider = TopologyHandler::new(ArgsTopologyHandler {
            relayers: config.relayer.relayers.clone(),
            address: config.relayer.address.clone(),
            timer: Some(timer.clone()),
            interval_for_leader: config.leader_interval(),
            logger: Some(Logger::new("relayer/topology")),
        })?;
        let quorum_provider = StaticQuorumProvider::new(config.relayer.quorum)?;

        let executor = DefaultBridgeExecutor::new(ArgsBridgeExecutor {
            executor_name: name,
            logger: Some(Logger::new("relayer/executor")),
            source_bridge: Some(source_bridge),
            destination_bridge: Some(destination_bridge),
            topology_provider: Some(Arc::new(topology_provider)),
            quorum_provider: Some(Arc::new(quorum_provider)),
            timer: Some(timer.clone()),
            durations_map: config.durations_map(),
            status_handler: Some(status_handler.clone()),
        })?;

        Ok(Self {
            config,
            executor: Arc::new(executor),
            timer,
            status_handler,
        })
    }

    /// Store the peer listener feeds with the signatures of the other relayers.
    pub fn signature_aggregator(&self) -> Arc<SignaturesHolder> {
        self.executor.signature_aggregator()
    }

    pub fn status_handler(&self) -> Arc<dyn StatusHandler> {
        self.status_handler.clone()
    }

    /// Runs the bridge until `shutdown` resolves or the state machine stops on its own.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send,
    {
        let name = &self.config.relayer.name;
        info!(
            "Starting relayer {} ({} -> {})",
            name, self.config.source.id, self.config.destination.id
        );

        self.timer.start();
        let steps = create_steps(self.executor.clone())?;
        let state_machine = StateMachine::new(ArgsStateMachine {
            state_machine_name: format!("{} state machine", name),
            steps,
            start_state_identifier: StepIdentifier::GettingPending,
            duration_between_steps: self.config.step_interval(),
            logger: Some(Logger::new("relayer/state-machine")),
            timer: Some(self.timer.clone()),
            status_handler: Some(self.status_handler.clone()),
        })?;

        tokio::select! {
            _ = shutdown => info!("Shutdown requested, stopping relayer {}", name),
            _ = state_machine.wait() => warn!("State machine of relayer {} stopped", name),
        }

        state_machine.close()?;
        state_machine.wait().await;
        self.timer.close()?;
        info!("Relayer {} stopped", name);

        Ok(())
    }
}
