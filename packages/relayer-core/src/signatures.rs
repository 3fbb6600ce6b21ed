use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::types::{EthereumSignature, SignedMessage};

/// Collects the votes received from the other relayers for the action in flight.
pub trait SignatureAggregator: Send + Sync {
    /// Stores a peer message together with its chain signature. Ignored if either is missing.
    fn process_new_message(&self, msg: Option<SignedMessage>, eth_sig: Option<EthereumSignature>);

    /// Snapshot of the stored signed messages, in no particular order.
    fn all_stored_signatures(&self) -> Vec<SignedMessage>;

    /// Distinct signatures gathered for `msg_hash`, in no particular order.
    fn signatures(&self, msg_hash: &[u8]) -> Vec<Vec<u8>>;

    fn clear_stored_signatures(&self);
}

#[derive(Debug, Default)]
struct StoredSignatures {
    signed_messages: HashMap<String, SignedMessage>,
    eth_signatures: Vec<EthereumSignature>,
}

/// Lock guarded [`SignatureAggregator`]. Written by the peer listener, read by the state machine.
#[derive(Debug, Default)]
pub struct SignaturesHolder {
    inner: RwLock<StoredSignatures>,
}

impl SignaturesHolder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignatureAggregator for SignaturesHolder {
    fn process_new_message(&self, msg: Option<SignedMessage>, eth_sig: Option<EthereumSignature>) {
        let (Some(msg), Some(eth_sig)) = (msg, eth_sig) else {
            return;
        };

        let mut inner = self.inner.write();
        inner.signed_messages.insert(msg.unique_id(), msg);
        inner.eth_signatures.push(eth_sig);
    }

    fn all_stored_signatures(&self) -> Vec<SignedMessage> {
        let inner = self.inner.read();
        inner.signed_messages.values().cloned().collect()
    }

    fn signatures(&self, msg_hash: &[u8]) -> Vec<Vec<u8>> {
        let inner = self.inner.read();
        let unique: HashSet<&[u8]> = inner
            .eth_signatures
            .iter()
            .filter(|sig| sig.message_hash == msg_hash)
            .map(|sig| sig.signature.as_slice())
            .collect();

        unique.into_iter().map(|sig| sig.to_vec()).collect()
    }

    fn clear_stored_signatures(&self) {
        let mut inner = self.inner.write();
        inner.signed_messages = HashMap::new();
        inner.eth_signatures = Vec::new();
    }
}
