pub mod bridge;
pub mod config;
pub mod executor;
pub mod logging;
pub mod relayer;
pub mod signatures;
pub mod state_machine;
pub mod status;
pub mod steps;
pub mod timer;
pub mod topology;
pub mod types;

pub use config::Config;
pub use types::{ActionId, Batch, BatchId, DepositTransaction, EthereumSignature, SignedMessage, StepIdentifier};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("nil bridge for the {0} bridge")]
    NilBridge(&'static str),

    #[error("nil logger")]
    NilLogger,

    #[error("nil topology provider")]
    NilTopologyProvider,

    #[error("nil quorum provider")]
    NilQuorumProvider,

    #[error("nil timer")]
    NilTimer,

    #[error("nil durations map")]
    NilDurationsMap,

    #[error("nil status handler")]
    NilStatusHandler,

    #[error("nil steps map")]
    NilStepsMap,

    #[error("nil batch")]
    NilBatch,

    #[error("duration for step not found for step {0}")]
    DurationForStepNotFound(StepIdentifier),

    #[error("duplicated step identifier used in multiple steps: {0}")]
    DuplicatedStepIdentifier(StepIdentifier),

    #[error("step not found for identifier '{0}'")]
    StepNotFound(StepIdentifier),

    #[error("empty name")]
    EmptyName,

    #[error("context cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
