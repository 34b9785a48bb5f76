// Main node loop: five independent timers (peer discovery, mempool
// gossip, mempool cleanup, block sync, plus mining) driven from a single
// thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::codec::HASH_LEN;
use crate::config;
use crate::crypto::ecdsa::SecretKey;
use crate::log;
use crate::node::Node;
use crate::primitives::block::Block;

struct Timer {
    period: Duration,
    last_fired: Instant,
}

impl Timer {
    fn new(period: Duration) -> Self {
        Timer { period, last_fired: Instant::now() }
    }

    fn is_done(&self) -> bool {
        self.last_fired.elapsed() >= self.period
    }

    fn reset(&mut self) {
        self.last_fired = Instant::now();
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// A mining thread in flight, and the head hash it started against (used
/// to decide whether to cancel it once a new head makes its work stale).
struct MiningState {
    handle: JoinHandle<Option<Block>>,
    started_head: Option<[u8; HASH_LEN]>,
    cancel: Arc<AtomicBool>,
}

/// Drives a `Node` through its timer loop until `node.request_stop()` is
/// called (e.g. via a `Stop` message).
pub struct Coordinator {
    node: Arc<Node>,
    miner_addr: Option<[u8; 64]>,
    miner_key: Option<SecretKey>,
    mining: Mutex<Option<MiningState>>,
}

impl Coordinator {
    pub fn new(node: Arc<Node>) -> Self {
        Coordinator { node, miner_addr: None, miner_key: None, mining: Mutex::new(None) }
    }

    pub fn with_miner(mut self, addr: [u8; 64], key: SecretKey) -> Self {
        self.miner_addr = Some(addr);
        self.miner_key = Some(key);
        self
    }

    /// Runs the timer loop on the calling thread; returns once the node is
    /// asked to stop.
    pub fn run(&self) {
        let mut update_peers = Timer::new(Duration::from_secs(config::UPDATE_PEERS_SECS));
        let mut update_mempool = Timer::new(Duration::from_secs(config::UPDATE_MEMPOOL_SECS));
        let mut clean_mempool = Timer::new(Duration::from_secs(config::CLEAN_MEMPOOL_SECS));
        let mut sync_blocks = Timer::new(Duration::from_secs(config::SYNC_BLOCKS_SECS));
        let main_loop = Duration::from_millis(config::MAIN_LOOP_MILLIS);

        while self.node.is_running() {
            if update_peers.is_done() {
                self.update_peers();
                update_peers.reset();
            }
            if update_mempool.is_done() {
                self.update_mempool();
                update_mempool.reset();
            }
            if clean_mempool.is_done() {
                self.node.engine.clean_mempool(now_secs().saturating_sub(config::MEMPOOL_TTL_SECS));
                clean_mempool.reset();
            }
            if sync_blocks.is_done() {
                self.sync_blocks();
                sync_blocks.reset();
            }

            self.mining_tick();

            std::thread::sleep(main_loop);
        }
    }

    fn update_peers(&self) {
        self.node.sanitize_peers();

        if self.node.peer_count() == 0 {
            log::info("p2p", "no peers: adding initial addresses");
            for (host, port) in config::initial_addrs() {
                self.node.add_peer(host, port);
            }
        }

        if self.node.peer_count() >= config::NUM_PEERS {
            return;
        }

        // Ask each currently-live peer for the addresses it knows. Collect
        // first, then dial outside the peer-list lock `with_each_peer`
        // holds — `add_peer` takes that same lock to append.
        let advertised = self.node.advertised_addr();
        let mut discovered = Vec::new();
        self.node.with_each_peer(|peer| {
            if let Some(addrs) = peer.get_addrs(&advertised) {
                discovered.extend(addrs);
            }
        });
        for (host, port) in discovered {
            self.node.add_peer(host, port);
        }
    }

    fn update_mempool(&self) {
        let pulled = self.node.with_random_peer(|peer| peer.get_mempool());
        if let Some(Some(txs)) = pulled {
            for tx in txs {
                self.node.engine.add_transaction(tx);
            }
        }
    }

    /// Picks a random peer, compares chain height, and back-fills any
    /// blocks we're missing.
    fn sync_blocks(&self) {
        let our_height = self.node.engine.get_height();
        let result = self.node.with_random_peer(|peer| peer.sync_blocks(our_height));
        let Some((peer_height, Some(hashes))) = result else { return };
        if peer_height <= our_height || hashes.is_empty() {
            return;
        }

        let Some(missing) = missing_suffix(&hashes, |h| self.node.engine.has_block(h)) else { return };

        let fetched = self.node.with_random_peer(|peer| peer.get_blocks(&missing));
        if let Some(Some(mut blocks)) = fetched {
            // Apply oldest-first so each block's parent is already committed.
            blocks.reverse();
            self.node.try_add_blocks(blocks);
        }
    }

    /// Spawns a miner thread if we're configured to mine, none is already
    /// running, and the mempool is non-empty; reaps a finished one.
    fn mining_tick(&self) {
        let (Some(miner_addr), Some(miner_key)) = (self.miner_addr, self.miner_key.clone()) else { return };

        let mut mining = self.mining.lock().unwrap();

        if let Some(state) = mining.as_ref() {
            let head_changed = self.node.engine.get_highest_block_hash() != state.started_head;
            if head_changed {
                state.cancel.store(true, Ordering::Relaxed);
            }
        }

        if let Some(state) = mining.take() {
            if state.handle.is_finished() {
                if let Ok(Some(block)) = state.handle.join() {
                    if self.node.engine.add_block(block.clone()) {
                        self.node.broadcast_block(&block);
                        log::info("mine", &format!("mined and committed block {}", crate::crypto::hash::to_hex(&block.hash())));
                    }
                }
            } else {
                *mining = Some(state);
                return;
            }
        }

        if self.node.engine.mempool_len() == 0 {
            return;
        }

        let engine = Arc::clone(&self.node.engine);
        let started_head = self.node.engine.get_highest_block_hash();
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_for_thread = Arc::clone(&cancel);
        let handle = std::thread::spawn(move || {
            engine.mine(miner_addr, &miner_key, config::MAX_TX_PER_BLOCK, Some(cancel_for_thread.as_ref()))
        });

        *mining = Some(MiningState { handle, started_head, cancel });
    }
}

/// Given a head-first chain of hashes from a peer's `SyncBlocks` reply,
/// returns the head-first prefix we're missing — or `None` if we already
/// have the peer's head. Scans from the tail (oldest) toward the head,
/// advancing past every hash we already know; the first unknown hash marks
/// where our chain diverges, so everything before it (head side) is the
/// suffix to fetch.
fn missing_suffix(hashes: &[[u8; HASH_LEN]], has_block: impl Fn(&[u8; HASH_LEN]) -> bool) -> Option<Vec<[u8; HASH_LEN]>> {
    let mut highest_known = hashes.len();
    for i in (0..hashes.len()).rev() {
        if has_block(&hashes[i]) {
            highest_known = i;
        } else {
            break;
        }
    }
    if highest_known == 0 {
        return None;
    }
    Some(hashes[..highest_known].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn h(n: u8) -> [u8; HASH_LEN] {
        [n; HASH_LEN]
    }

    #[test]
    fn test_missing_suffix_fetches_only_the_new_head() {
        // X has [G, B1, B2]; Y has [G, B1]. X replies head-first: [B2, B1, G].
        let hashes = vec![h(2), h(1), h(0)];
        let known: HashSet<_> = [h(0), h(1)].into_iter().collect();
        let missing = missing_suffix(&hashes, |hash| known.contains(hash)).unwrap();
        assert_eq!(missing, vec![h(2)], "only the new head block should be requested");
    }

    #[test]
    fn test_missing_suffix_none_known_requests_everything() {
        let hashes = vec![h(2), h(1), h(0)];
        let missing = missing_suffix(&hashes, |_| false).unwrap();
        assert_eq!(missing, vec![h(2), h(1), h(0)]);
    }

    #[test]
    fn test_missing_suffix_already_at_head_returns_none() {
        let hashes = vec![h(2), h(1), h(0)];
        let missing = missing_suffix(&hashes, |_| true);
        assert!(missing.is_none());
    }

    #[test]
    fn test_missing_suffix_stops_at_first_unknown_from_tail() {
        // Known set has a "hole" (knows G and B2 but not B1) — the scan must
        // stop at the first unknown hash walking from the tail, not treat
        // every known hash anywhere in the list as a stopping point.
        let hashes = vec![h(2), h(1), h(0)];
        let known: HashSet<_> = [h(0), h(2)].into_iter().collect();
        let missing = missing_suffix(&hashes, |hash| known.contains(hash)).unwrap();
        assert_eq!(missing, vec![h(2), h(1)], "B2 must be refetched since B1 is missing underneath it");
    }
}
