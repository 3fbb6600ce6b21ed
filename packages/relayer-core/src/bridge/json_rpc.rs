use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::Bridge;
use crate::{
    config::ChainConfig,
    signatures::SignatureAggregator,
    types::{ActionId, Batch, BatchId},
    Error,
};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// [`Bridge`] that forwards every operation as a JSON-RPC call to a bridge gateway node.
pub struct JsonRpcBridge {
    config: ChainConfig,
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl JsonRpcBridge {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn chain_id(&self) -> &str {
        &self.config.id
    }

    async fn retry_with_backoff<F, Fut, T>(&self, operation: F) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    retries += 1;
                    if retries >= self.max_retries {
                        return Err(e);
                    }
                    sleep(self.retry_delay * 2u32.pow(retries - 1)).await;
                }
            }
        }
    }

    async fn call<T: DeserializeOwned>(&self, ctx: &CancellationToken, method: &str, params: Value) -> Result<T, Error> {
        let request = self.retry_with_backoff(|| self.send(method, &params));

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled),
            result = request => result,
        }
    }

    async fn send<T: DeserializeOwned>(&self, method: &str, params: &Value) -> Result<T, Error> {
        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": [
                    {
                        "bridge_address": self.config.bridge_address,
                        "args": params,
                    }
                ],
                "id": 1
            }))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let mut result: Value = response
            .json()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(error) = result.get("error").filter(|e| !e.is_null()) {
            return Err(Error::Chain(format!("{} failed: {}", method, error)));
        }

        serde_json::from_value(result["result"].take())
            .map_err(|e| Error::Serialization(format!("{} returned an invalid result: {}", method, e)))
    }

    async fn query_bool(&self, ctx: &CancellationToken, method: &str, params: Value) -> bool {
        match self.call::<bool>(ctx, method, params).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{}: {} failed: {}", self.config.id, method, e);
                false
            }
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[async_trait]
impl Bridge for JsonRpcBridge {
    async fn get_pending(&self, ctx: &CancellationToken) -> Result<Option<Batch>, Error> {
        self.call(ctx, "bridge_getPending", json!({})).await
    }

    async fn propose_transfer(&self, ctx: &CancellationToken, batch: &Batch) -> Result<String, Error> {
        self.call(ctx, "bridge_proposeTransfer", json!({ "batch": to_value(batch) }))
            .await
    }

    async fn propose_set_status(&self, ctx: &CancellationToken, batch: &Batch) -> Result<String, Error> {
        self.call(ctx, "bridge_proposeSetStatus", json!({ "batch": to_value(batch) }))
            .await
    }

    async fn was_proposed_transfer(&self, ctx: &CancellationToken, batch: &Batch) -> bool {
        self.query_bool(ctx, "bridge_wasProposedTransfer", json!({ "batch": to_value(batch) }))
            .await
    }

    async fn was_proposed_set_status(&self, ctx: &CancellationToken, batch: &Batch) -> bool {
        self.query_bool(ctx, "bridge_wasProposedSetStatus", json!({ "batch": to_value(batch) }))
            .await
    }

    async fn get_action_id_for_propose_transfer(
        &self,
        ctx: &CancellationToken,
        batch: &Batch,
    ) -> Result<ActionId, Error> {
        self.call(ctx, "bridge_getActionIdForProposeTransfer", json!({ "batch": to_value(batch) }))
            .await
    }

    async fn get_action_id_for_set_status_on_pending_transfer(
        &self,
        ctx: &CancellationToken,
        batch: &Batch,
    ) -> Result<ActionId, Error> {
        self.call(ctx, "bridge_getActionIdForSetStatus", json!({ "batch": to_value(batch) }))
            .await
    }

    async fn sign(&self, ctx: &CancellationToken, action_id: ActionId, batch: &Batch) -> Result<String, Error> {
        self.call(
            ctx,
            "bridge_sign",
            json!({ "action_id": to_value(&action_id), "batch_id": to_value(&batch.id) }),
        )
        .await
    }

    async fn signers_count(
        &self,
        ctx: &CancellationToken,
        batch: &Batch,
        action_id: ActionId,
        _signatures: &dyn SignatureAggregator,
    ) -> u64 {
        let params = json!({ "action_id": to_value(&action_id), "batch_id": to_value(&batch.id) });
        match self.call::<u64>(ctx, "bridge_signersCount", params).await {
            Ok(count) => count,
            Err(e) => {
                log::warn!("{}: bridge_signersCount failed: {}", self.config.id, e);
                0
            }
        }
    }

    async fn execute(
        &self,
        ctx: &CancellationToken,
        action_id: ActionId,
        batch: &Batch,
        signatures: &dyn SignatureAggregator,
    ) -> Result<String, Error> {
        let params = json!({ "action_id": to_value(&action_id), "batch_id": to_value(&batch.id) });
        let msg_hash: String = self.call(ctx, "bridge_getMessageHash", params).await?;
        let msg_hash = hex::decode(msg_hash.trim_start_matches("0x"))
            .map_err(|e| Error::Serialization(format!("bridge_getMessageHash returned an invalid hash: {}", e)))?;

        let mut collected: Vec<String> = signatures
            .signatures(&msg_hash)
            .iter()
            .map(hex::encode)
            .collect();
        collected.sort();

        self.call(
            ctx,
            "bridge_execute",
            json!({
                "action_id": to_value(&action_id),
                "batch": to_value(batch),
                "signatures": collected,
            }),
        )
        .await
    }

    async fn was_executed(&self, ctx: &CancellationToken, action_id: ActionId, batch_id: BatchId) -> bool {
        self.query_bool(
            ctx,
            "bridge_wasExecuted",
            json!({ "action_id": to_value(&action_id), "batch_id": to_value(&batch_id) }),
        )
        .await
    }

    async fn get_transactions_statuses(&self, ctx: &CancellationToken, batch_id: BatchId) -> Result<Vec<u8>, Error> {
        self.call(ctx, "bridge_getTransactionsStatuses", json!({ "batch_id": to_value(&batch_id) }))
            .await
    }
}
