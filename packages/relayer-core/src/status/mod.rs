use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::Error;

/// Counts the transactions executed with success.
pub const METRIC_NUM_TRANSACTIONS_SUCCEEDED: &str = "num transactions succeeded";
/// Counts the rejected transactions.
pub const METRIC_NUM_TRANSACTIONS_REJECTED: &str = "num transactions rejected";
/// Counts the processed batches.
pub const METRIC_NUM_BATCHES: &str = "num batches";
/// Holds the last error reported by the executor.
pub const METRIC_LAST_ERROR: &str = "last encountered error";
/// Holds the step the state machine is currently running.
pub const METRIC_CURRENT_STATE_MACHINE_STEP: &str = "current state machine step";

/// Metrics written to durable storage. Anything else lives only in memory.
pub const PERSISTED_METRICS: [&str; 3] = [
    METRIC_NUM_TRANSACTIONS_SUCCEEDED,
    METRIC_NUM_TRANSACTIONS_REJECTED,
    METRIC_NUM_BATCHES,
];

pub type IntMetrics = BTreeMap<String, i64>;
pub type StringMetrics = BTreeMap<String, String>;
pub type GeneralMetrics = serde_json::Map<String, serde_json::Value>;

/// Observability sink shared by the executor and the state machine.
pub trait StatusHandler: Send + Sync {
    fn set_int_metric(&self, metric: &str, value: i64);
    fn add_int_metric(&self, metric: &str, delta: i64);
    fn set_string_metric(&self, metric: &str, value: &str);
    fn get_int_metrics(&self) -> IntMetrics;
    fn get_string_metrics(&self) -> StringMetrics;
    fn get_all_metrics(&self) -> GeneralMetrics;
    fn name(&self) -> &str;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistenceData {
    #[serde(rename = "intMetrics", default)]
    int_metrics: IntMetrics,
    #[serde(rename = "stringMetrics", default)]
    string_metrics: StringMetrics,
}

impl PersistenceData {
    fn filtered(int_metrics: &IntMetrics, string_metrics: &StringMetrics) -> Self {
        Self {
            int_metrics: int_metrics
                .iter()
                .filter(|(key, _)| should_persist_metric(key))
                .map(|(key, value)| (key.clone(), *value))
                .collect(),
            string_metrics: string_metrics
                .iter()
                .filter(|(key, _)| should_persist_metric(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

fn should_persist_metric(metric: &str) -> bool {
    PERSISTED_METRICS.contains(&metric)
}

#[derive(Debug, Default)]
struct Metrics {
    int_metrics: IntMetrics,
    string_metrics: StringMetrics,
}

/// In-memory [`StatusHandler`], optionally mirrored to a JSON file.
#[derive(Debug)]
pub struct RelayerStatusHandler {
    name: String,
    metrics: RwLock<Metrics>,
    storage: Option<PathBuf>,
    storage_lock: Mutex<()>,
}

impl RelayerStatusHandler {
    pub fn new(name: &str) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::EmptyName);
        }

        Ok(Self {
            name: name.to_string(),
            metrics: RwLock::new(Metrics::default()),
            storage: None,
            storage_lock: Mutex::new(()),
        })
    }

    /// Creates a status handler that restores and saves the allow-listed metrics at `path`.
    pub fn with_persistence<P: AsRef<Path>>(name: &str, path: P) -> Result<Self, Error> {
        let mut handler = Self::new(name)?;
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            let buff = std::fs::read(&path)
                .map_err(|e| Error::Config(format!("Failed to read status file: {}", e)))?;
            let data: PersistenceData = serde_json::from_slice(&buff)
                .map_err(|e| Error::Serialization(format!("Failed to parse status file: {}", e)))?;
            let loaded = PersistenceData::filtered(&data.int_metrics, &data.string_metrics);

            let mut metrics = handler.metrics.write();
            metrics.int_metrics = loaded.int_metrics;
            metrics.string_metrics = loaded.string_metrics;
        }

        handler.storage = Some(path);
        Ok(handler)
    }

    /// Writes the allow-listed metrics after `metric` changed. The file is written once the
    /// metrics guard is released, so readers never wait on the disk. Writes keep the order of
    /// the updates because the storage lock is taken before the guard goes away.
    fn persist(&self, metric: &str, metrics: RwLockWriteGuard<'_, Metrics>) {
        let Some(path) = self.storage.as_ref() else {
            return;
        };
        if !should_persist_metric(metric) {
            return;
        }

        let data = PersistenceData::filtered(&metrics.int_metrics, &metrics.string_metrics);
        let _storage = self.storage_lock.lock();
        drop(metrics);

        let result = serde_json::to_vec(&data)
            .map_err(|e| e.to_string())
            .and_then(|buff| std::fs::write(path, buff).map_err(|e| e.to_string()));
        if let Err(e) = result {
            log::error!("{}: failed to persist metrics: {}", self.name, e);
        }
    }
}

impl StatusHandler for RelayerStatusHandler {
    fn set_int_metric(&self, metric: &str, value: i64) {
        let mut metrics = self.metrics.write();
        metrics.int_metrics.insert(metric.to_string(), value);
        self.persist(metric, metrics);
    }

    fn add_int_metric(&self, metric: &str, delta: i64) {
        let mut metrics = self.metrics.write();
        *metrics.int_metrics.entry(metric.to_string()).or_default() += delta;
        self.persist(metric, metrics);
    }

    fn set_string_metric(&self, metric: &str, value: &str) {
        let mut metrics = self.metrics.write();
        metrics.string_metrics.insert(metric.to_string(), value.to_string());
        self.persist(metric, metrics);
    }

    fn get_int_metrics(&self) -> IntMetrics {
        self.metrics.read().int_metrics.clone()
    }

    fn get_string_metrics(&self) -> StringMetrics {
        self.metrics.read().string_metrics.clone()
    }

    fn get_all_metrics(&self) -> GeneralMetrics {
        let metrics = self.metrics.read();
        let mut all = GeneralMetrics::new();
        for (key, value) in &metrics.int_metrics {
            all.insert(key.clone(), serde_json::Value::from(*value));
        }
        for (key, value) in &metrics.string_metrics {
            all.insert(key.clone(), serde_json::Value::from(value.clone()));
        }

        all
    }

    fn name(&self) -> &str {
        &self.name
    }
}
