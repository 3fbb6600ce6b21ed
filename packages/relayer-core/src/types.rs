use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a batch as assigned by the source chain.
pub type BatchId = U256;

/// Identifier of an on-chain multisig action (propose transfer or propose set status).
pub type ActionId = U256;

/// Deposit or block nonce.
pub type Nonce = U256;

/// Status of a transaction that has not been processed yet.
pub const STATUS_PENDING: u8 = 0;
/// Status of a transaction executed with success on the destination chain.
pub const STATUS_EXECUTED: u8 = 3;
/// Status of a transaction rejected by the destination chain or by the relayers.
pub const STATUS_REJECTED: u8 = 4;

/// A deposit made on the source chain that has to be executed on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositTransaction {
    pub to: String,
    pub from: String,
    pub token_address: String,
    pub amount: U256,
    pub deposit_nonce: Nonce,
    pub block_nonce: Nonce,
    pub status: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl fmt::Display for DepositTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "to: {}, from: {}, token address: {}, amount: {}, deposit nonce: {}, block nonce: {}, status: {}, error: {}",
            self.to,
            self.from,
            self.token_address,
            self.amount,
            self.deposit_nonce,
            self.block_nonce,
            self.status,
            self.error.as_deref().unwrap_or("<nil>"),
        )
    }
}

/// An ordered set of deposits gathered by the source chain into one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub transactions: Vec<DepositTransaction>,
}

impl Batch {
    /// Sets the provided status and error on every transaction of the batch.
    pub fn set_status_on_all_transactions(&mut self, status: u8, error: Option<String>) {
        for tx in self.transactions.iter_mut() {
            tx.status = status;
            tx.error = error.clone();
        }
    }

    pub fn all_rejected(&self) -> bool {
        self.transactions.iter().all(|tx| tx.status == STATUS_REJECTED)
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch ID: {}, transactions: [", self.id)?;
        for (i, tx) in self.transactions.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", tx)?;
        }
        write!(f, "]")
    }
}

/// A peer's signed statement, received over the relayers' gossip network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub payload: Vec<u8>,
    pub public_key_bytes: Vec<u8>,
    pub signature: Vec<u8>,
    pub nonce: u64,
}

impl SignedMessage {
    /// Identifies the message by its signer and nonce, so re-deliveries collapse into one entry.
    /// The separator keeps a longer key from absorbing the leading digits of the nonce.
    pub fn unique_id(&self) -> String {
        format!("{}-{}", hex::encode(&self.public_key_bytes), self.nonce)
    }
}

/// A chain-specific signature over a message hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthereumSignature {
    pub message_hash: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Identifier of a node in the bridge state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepIdentifier {
    GettingPending,
    ProposingTransfer,
    WaitingSignaturesForProposeTransfer,
    ExecutingTransfer,
    ProposingSetStatus,
    WaitingSignaturesForProposeSetStatus,
    ExecutingSetStatus,
}

impl StepIdentifier {
    pub const ALL: [StepIdentifier; 7] = [
        StepIdentifier::GettingPending,
        StepIdentifier::ProposingTransfer,
        StepIdentifier::WaitingSignaturesForProposeTransfer,
        StepIdentifier::ExecutingTransfer,
        StepIdentifier::ProposingSetStatus,
        StepIdentifier::WaitingSignaturesForProposeSetStatus,
        StepIdentifier::ExecutingSetStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepIdentifier::GettingPending => "GettingPending",
            StepIdentifier::ProposingTransfer => "ProposingTransfer",
            StepIdentifier::WaitingSignaturesForProposeTransfer => "WaitingSignaturesForProposeTransfer",
            StepIdentifier::ExecutingTransfer => "ExecutingTransfer",
            StepIdentifier::ProposingSetStatus => "ProposingSetStatus",
            StepIdentifier::WaitingSignaturesForProposeSetStatus => "WaitingSignaturesForProposeSetStatus",
            StepIdentifier::ExecutingSetStatus => "ExecutingSetStatus",
        }
    }
}

impl fmt::Display for StepIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_batch() -> Batch {
        Batch {
            id: BatchId::from(1),
            transactions: vec![
                DepositTransaction {
                    to: "to1".to_string(),
                    from: "from1".to_string(),
                    token_address: "token1".to_string(),
                    amount: U256::from(1000),
                    deposit_nonce: Nonce::from(2),
                    block_nonce: Nonce::from(2_000_000),
                    status: STATUS_PENDING,
                    error: None,
                },
                DepositTransaction {
                    to: "to2".to_string(),
                    from: "from2".to_string(),
                    token_address: "token2".to_string(),
                    amount: U256::from(1001),
                    deposit_nonce: Nonce::from(3),
                    block_nonce: Nonce::from(2_000_001),
                    status: STATUS_EXECUTED,
                    error: None,
                },
            ],
        }
    }

    #[test]
    fn set_status_on_all_transactions_marks_every_transaction() {
        let mut batch = create_batch();
        assert!(!batch.all_rejected());

        batch.set_status_on_all_transactions(STATUS_REJECTED, Some("propose failed".to_string()));

        assert!(batch.all_rejected());
        for tx in &batch.transactions {
            assert_eq!(Some("propose failed".to_string()), tx.error);
        }
    }

    #[test]
    fn clone_is_deep() {
        let batch = create_batch();
        let mut cloned = batch.clone();
        cloned.transactions[0].status = STATUS_REJECTED;

        assert_eq!(STATUS_PENDING, batch.transactions[0].status);
        assert_ne!(batch, cloned);
    }

    #[test]
    fn unique_id_combines_public_key_and_nonce() {
        let msg = SignedMessage {
            payload: b"payload".to_vec(),
            public_key_bytes: vec![0xab, 0xcd],
            signature: b"sig".to_vec(),
            nonce: 34,
        };

        assert_eq!("abcd-34", msg.unique_id());
    }

    #[test]
    fn unique_id_keeps_signers_apart() {
        let first = SignedMessage {
            payload: vec![],
            public_key_bytes: vec![0xab, 0xcd],
            signature: vec![],
            nonce: 341,
        };
        let second = SignedMessage {
            public_key_bytes: vec![0xab, 0xcd, 0x34],
            nonce: 1,
            ..first.clone()
        };

        assert_ne!(first.unique_id(), second.unique_id());
    }

    #[test]
    fn step_identifier_displays_its_name() {
        assert_eq!("ProposingSetStatus", StepIdentifier::ProposingSetStatus.to_string());
        let json = serde_json::to_string(&StepIdentifier::ExecutingTransfer).unwrap();
        assert_eq!("\"ExecutingTransfer\"", json);
    }
}
