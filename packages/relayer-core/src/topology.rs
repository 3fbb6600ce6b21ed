use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::{QuorumProvider, TopologyProvider},
    logging::Logger,
    timer::Timer,
    Error,
};

pub struct ArgsTopologyHandler {
    pub relayers: Vec<String>,
    pub address: String,
    pub timer: Option<Arc<dyn Timer>>,
    pub interval_for_leader: Duration,
    pub logger: Option<Logger>,
}

/// Rotates the leadership between the known relayers.
///
/// Every relayer derives the same index from the current time window, so all of them agree on
/// the leader without talking to each other, as long as their clocks roughly agree.
pub struct TopologyHandler {
    relayers: Vec<String>,
    address: String,
    timer: Arc<dyn Timer>,
    interval_for_leader: Duration,
    logger: Logger,
    sorted_relayers: Mutex<Option<Vec<String>>>,
}

impl TopologyHandler {
    pub fn new(args: ArgsTopologyHandler) -> Result<Self, Error> {
        let timer = args.timer.ok_or(Error::NilTimer)?;
        let logger = args.logger.ok_or(Error::NilLogger)?;
        if args.address.is_empty() {
            return Err(Error::Config("Empty relayer address".to_string()));
        }
        if args.interval_for_leader.as_secs() == 0 {
            return Err(Error::Config("Leader interval must be at least one second".to_string()));
        }

        Ok(Self {
            relayers: args.relayers,
            address: args.address,
            timer,
            interval_for_leader: args.interval_for_leader,
            logger,
            sorted_relayers: Mutex::new(None),
        })
    }

    fn sorted_relayers(&self) -> Vec<String> {
        self.sorted_relayers
            .lock()
            .get_or_insert_with(|| {
                let mut sorted = self.relayers.clone();
                sorted.sort();
                sorted.dedup();
                sorted
            })
            .clone()
    }

    /// Leader of the time window containing `now_unix`.
    pub fn leader_at(&self, now_unix: i64) -> Option<String> {
        let sorted = self.sorted_relayers();
        if sorted.is_empty() {
            return None;
        }

        let window = now_unix.max(0) as u64 / self.interval_for_leader.as_secs();
        let index = random_index(window, sorted.len() as u64) as usize;
        sorted.get(index).cloned()
    }
}

impl TopologyProvider for TopologyHandler {
    fn am_i_the_leader(&self) -> bool {
        match self.leader_at(self.timer.now_unix()) {
            Some(leader) => leader == self.address,
            None => {
                self.logger.warn("no relayers known, can not elect a leader", &[]);
                false
            }
        }
    }

    fn clean(&self) {
        *self.sorted_relayers.lock() = None;
    }
}

/// Hashes the seed and reduces it to `[0, max)`.
fn random_index(seed: u64, max: u64) -> u64 {
    if max == 0 {
        return 0;
    }

    let hash = Sha256::digest(seed.to_le_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(bytes) % max
}

/// [`QuorumProvider`] returning a fixed quorum.
#[derive(Debug, Clone)]
pub struct StaticQuorumProvider {
    quorum: u64,
}

impl StaticQuorumProvider {
    pub fn new(quorum: u64) -> Result<Self, Error> {
        if quorum == 0 {
            return Err(Error::Config("Quorum must be greater than 0".to_string()));
        }

        Ok(Self { quorum })
    }
}

#[async_trait]
impl QuorumProvider for StaticQuorumProvider {
    async fn get_quorum(&self, _ctx: &CancellationToken) -> Result<u64, Error> {
        Ok(self.quorum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::MockTimer;

    fn create_args(relayers: &[&str], address: &str, now: i64) -> ArgsTopologyHandler {
        let mut timer = MockTimer::new();
        timer.expect_now_unix().return_const(now);

        ArgsTopologyHandler {
            relayers: relayers.iter().map(|r| r.to_string()).collect(),
            address: address.to_string(),
            timer: Some(Arc::new(timer)),
            interval_for_leader: Duration::from_secs(60),
            logger: Some(Logger::new("test/topology")),
        }
    }

    #[test]
    fn new_with_invalid_arguments() {
        let mut args = create_args(&["a"], "a", 0);
        args.timer = None;
        assert!(matches!(TopologyHandler::new(args), Err(Error::NilTimer)));

        let mut args = create_args(&["a"], "a", 0);
        args.logger = None;
        assert!(matches!(TopologyHandler::new(args), Err(Error::NilLogger)));

        let args = create_args(&["a"], "", 0);
        assert!(matches!(TopologyHandler::new(args), Err(Error::Config(_))));

        let mut args = create_args(&["a"], "a", 0);
        args.interval_for_leader = Duration::from_millis(500);
        assert!(matches!(TopologyHandler::new(args), Err(Error::Config(_))));
    }

    #[test]
    fn single_relayer_is_always_the_leader() {
        for now in [0, 59, 60, 1_700_000_000] {
            let handler = TopologyHandler::new(create_args(&["solo"], "solo", now)).unwrap();
            assert!(handler.am_i_the_leader());
        }
    }

    #[test]
    fn no_relayers_means_no_leader() {
        let handler = TopologyHandler::new(create_args(&[], "a", 100)).unwrap();
        assert!(!handler.am_i_the_leader());
        assert_eq!(None, handler.leader_at(100));
    }

    #[test]
    fn relayers_agree_on_the_leader() {
        let relayers = ["relayer2", "relayer0", "relayer1"];
        let now = 1_700_000_000;

        let leaders: Vec<bool> = relayers
            .iter()
            .map(|address| {
                TopologyHandler::new(create_args(&relayers, address, now))
                    .unwrap()
                    .am_i_the_leader()
            })
            .collect();

        assert_eq!(1, leaders.iter().filter(|is_leader| **is_leader).count());
    }

    #[test]
    fn leader_is_stable_within_a_window() {
        let handler = TopologyHandler::new(create_args(&["a", "b", "c", "d"], "a", 0)).unwrap();

        let first = handler.leader_at(120);
        assert_eq!(first, handler.leader_at(150));
        assert_eq!(first, handler.leader_at(179));
    }

    #[test]
    fn leadership_rotates_between_windows() {
        let handler = TopologyHandler::new(create_args(&["a", "b", "c"], "a", 0)).unwrap();

        let mut leaders: Vec<String> = (0..50).filter_map(|window| handler.leader_at(window * 60)).collect();
        leaders.sort();
        leaders.dedup();

        assert!(leaders.len() > 1);
    }

    #[test]
    fn clean_resets_the_cached_relayers() {
        let handler = TopologyHandler::new(create_args(&["b", "a"], "a", 0)).unwrap();
        assert_eq!(vec!["a".to_string(), "b".to_string()], handler.sorted_relayers());

        handler.clean();
        assert!(handler.sorted_relayers.lock().is_none());
        assert_eq!(2, handler.sorted_relayers().len());
    }

    #[test]
    fn random_index_stays_in_range() {
        assert_eq!(0, random_index(10, 0));
        for seed in 0..100 {
            assert!(random_index(seed, 7) < 7);
        }
        assert_eq!(random_index(42, 5), random_index(42, 5));
    }

    #[tokio::test]
    async fn static_quorum_provider() {
        assert!(StaticQuorumProvider::new(0).is_err());

        let provider = StaticQuorumProvider::new(2).unwrap();
        assert_eq!(2, provider.get_quorum(&CancellationToken::new()).await.unwrap());
    }
}
