// Node coordinator: the shared, node-scoped handle that peer clients,
// the peer server, and the RPC server all hold a reference to.

pub mod coordinator;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rand::Rng;

use crate::chain::Engine;
use crate::codec::HASH_LEN;
use crate::config;
use crate::log;
use crate::net::client::PeerClient;
use crate::primitives::block::Block;

/// Shared node state: the blockchain engine, the live peer set, and the
/// orphan-block buffer (see DESIGN.md for the buffering policy rationale).
pub struct Node {
    pub engine: Arc<Engine>,
    pub version: u32,
    hostname: String,
    listen_port: Mutex<Option<u16>>,
    peers: Mutex<Vec<PeerClient>>,
    orphans: Mutex<HashMap<[u8; HASH_LEN], Vec<Block>>>,
    running: AtomicBool,
}

impl Node {
    pub fn new(engine: Arc<Engine>, hostname: impl Into<String>) -> Self {
        Node {
            engine,
            version: config::VERSION,
            hostname: hostname.into(),
            listen_port: Mutex::new(None),
            peers: Mutex::new(Vec::new()),
            orphans: Mutex::new(HashMap::new()),
            running: AtomicBool::new(true),
        }
    }

    pub fn set_listen_port(&self, port: u16) {
        *self.listen_port.lock().unwrap() = Some(port);
    }

    pub fn listen_port(&self) -> Option<u16> {
        *self.listen_port.lock().unwrap()
    }

    /// `host:port` of our own listening server, or empty if we don't host one.
    pub fn advertised_addr(&self) -> String {
        match self.listen_port() {
            Some(port) => format!("{}:{port}", self.hostname),
            None => String::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn validate_version(&self, v: u32) -> bool {
        v == self.version
    }

    /// True iff `(host, port)` names this node's own listening server, so
    /// callers can avoid dialing themselves as a peer.
    pub fn is_me(&self, host: &str, port: u16) -> bool {
        match self.listen_port() {
            Some(my_port) => {
                port == my_port && matches!(host, h if h == self.hostname || h == "localhost" || h == "127.0.0.1")
            }
            None => false,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn peer_addrs(&self) -> Vec<(String, u16)> {
        self.peers.lock().unwrap().iter().map(|p| (p.host.clone(), p.port)).collect()
    }

    fn has_peer(&self, host: &str, port: u16) -> bool {
        self.peers.lock().unwrap().iter().any(|p| p.host == host && p.port == port)
    }

    /// Idempotent, self-excluding: dials `host:port`, performs the version
    /// handshake, and keeps the connection only if both checks pass.
    pub fn add_peer(&self, host: String, port: u16) -> bool {
        if self.has_peer(&host, port) || self.is_me(&host, port) {
            return false;
        }
        let mut client = PeerClient::new(host.clone(), port);
        if !client.connect() {
            return false;
        }
        match client.version(self.version) {
            Some(peer_version) if self.validate_version(peer_version) => {
                self.peers.lock().unwrap().push(client);
                true
            }
            other => {
                if let Some(v) = other {
                    log::warn("p2p", &format!("invalid peer version: {v}"));
                }
                client.close(&self.advertised_addr());
                false
            }
        }
    }

    pub fn remove_peer(&self, host: &str, port: u16) {
        log::info("p2p", &format!("removing peer: {host}:{port}"));
        self.peers.lock().unwrap().retain(|p| !(p.host == host && p.port == port));
    }

    pub fn sanitize_peers(&self) {
        let mut peers = self.peers.lock().unwrap();
        peers.retain_mut(|peer| {
            if !peer.is_connected() && !peer.connect() && peer.failed_attempts > config::PEER_FAILURE_LIMIT {
                log::warn("p2p", &format!("dropping peer: {}:{}", peer.host, peer.port));
                return false;
            }
            true
        });
    }

    /// Runs `f` against a uniformly-random live peer, or does nothing if
    /// the peer set is empty.
    pub fn with_random_peer<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut PeerClient) -> R,
    {
        let mut peers = self.peers.lock().unwrap();
        if peers.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..peers.len());
        Some(f(&mut peers[idx]))
    }

    /// Runs `f` against every currently-live peer.
    pub fn with_each_peer<F>(&self, mut f: F)
    where
        F: FnMut(&mut PeerClient),
    {
        let mut peers = self.peers.lock().unwrap();
        for peer in peers.iter_mut() {
            f(peer);
        }
    }

    pub fn broadcast_block(&self, block: &Block) {
        self.with_each_peer(|peer| {
            peer.add_block(block);
        });
    }

    /// Attempts to commit `block`. If its parent is unknown, parks it as an
    /// orphan instead of handing it to the engine (see DESIGN.md for the
    /// buffering policy). On success, flushes any orphans that were waiting
    /// on this block's hash.
    pub fn try_add_block(&self, block: Block) -> bool {
        if let Some(parent) = block.parent_hash {
            if !self.engine.has_block(&parent) && !self.engine.has_block(&block.hash()) {
                self.park_orphan(parent, block);
                return false;
            }
        }

        let hash = block.hash();
        let ok = self.engine.add_block(block);
        if ok {
            self.flush_orphans(hash);
        }
        ok
    }

    /// Applies each block in order, parking parent-missing blocks as
    /// orphans rather than dropping them.
    pub fn try_add_blocks(&self, blocks: Vec<Block>) {
        for block in blocks {
            self.try_add_block(block);
        }
    }

    fn park_orphan(&self, parent: [u8; HASH_LEN], block: Block) {
        self.orphans.lock().unwrap().entry(parent).or_default().push(block);
    }

    /// Recursively re-tries any blocks that were waiting on `parent_hash`.
    fn flush_orphans(&self, parent_hash: [u8; HASH_LEN]) {
        let waiting = self.orphans.lock().unwrap().remove(&parent_hash);
        if let Some(blocks) = waiting {
            for block in blocks {
                self.try_add_block(block);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ecdsa;
    use crate::primitives::transaction::Transaction;

    fn signed_block(engine: &Engine, miner_pk: [u8; 64], miner_sk: &crate::crypto::ecdsa::SecretKey, parent: Option<[u8; 32]>) -> Block {
        let mut reward = Transaction::new(miner_pk, miner_pk, engine.reward, 0);
        reward.sign(miner_sk);
        let mut block = Block::new(parent, 1_700_000_000, miner_pk, vec![reward]);
        while !block.satisfies_pow(engine.difficulty) {
            block.nonce += 1;
        }
        block.sign(miner_sk);
        block
    }

    #[test]
    fn test_is_me_requires_matching_host_and_port() {
        let engine = Arc::new(Engine::new(1, 10));
        let node = Node::new(engine, "myhost");
        node.set_listen_port(5003);
        assert!(node.is_me("myhost", 5003));
        assert!(node.is_me("localhost", 5003));
        assert!(node.is_me("127.0.0.1", 5003));
        assert!(!node.is_me("myhost", 9999));
        assert!(!node.is_me("otherhost", 5003));
    }

    #[test]
    fn test_orphan_block_is_parked_then_flushed_on_parent_arrival() {
        let engine = Arc::new(Engine::new(1, 10));
        let node = Node::new(engine.clone(), "myhost");
        let (miner_pk, miner_sk) = ecdsa::generate_keypair();

        let genesis = signed_block(&engine, miner_pk.0, &miner_sk, None);
        let child = signed_block(&engine, miner_pk.0, &miner_sk, Some(genesis.hash()));

        // Child arrives first: parked as an orphan, not committed.
        assert!(!node.try_add_block(child.clone()));
        assert!(!engine.has_block(&child.hash()));

        // Genesis arrives: commits, then flushes the parked child.
        assert!(node.try_add_block(genesis.clone()));
        assert!(engine.has_block(&child.hash()));
        assert_eq!(engine.get_highest_block_hash(), Some(child.hash()));
    }

    #[test]
    fn test_try_add_block_duplicate_parent_known_is_not_orphaned() {
        let engine = Arc::new(Engine::new(1, 10));
        let node = Node::new(engine.clone(), "myhost");
        let (miner_pk, miner_sk) = ecdsa::generate_keypair();
        let genesis = signed_block(&engine, miner_pk.0, &miner_sk, None);
        assert!(node.try_add_block(genesis));
    }
}
