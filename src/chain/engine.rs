// Blockchain engine: validation, balance accounting, chain selection,
// mempool, and mining.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::chain::balances::{self, BalanceSnapshot};
use crate::chain::mempool::Mempool;
use crate::codec::ADDR_LEN;
use crate::crypto::ecdsa::SecretKey;
use crate::primitives::block::Block;
use crate::primitives::transaction::Transaction;

/// A block that has been committed to `Engine`'s block map, with the
/// derived metadata set on commit (spec data model §3).
#[derive(Clone)]
pub struct CommittedBlock {
    pub block: Block,
    pub height: u32,
    pub time_added: u64,
    pub balances: HashMap<[u8; ADDR_LEN], u32>,
}

impl BalanceSnapshot for CommittedBlock {
    fn balances(&self) -> &HashMap<[u8; ADDR_LEN], u32> {
        &self.balances
    }
}

struct ChainState {
    blocks: HashMap<[u8; 32], CommittedBlock>,
    highest: Option<[u8; 32]>,
}

/// Two independent mutexes: whenever both are
/// needed, `mempool` is always acquired before `state`, never the reverse —
/// `add_block` and `add_transaction` both take both locks, so a consistent
/// order is what keeps them from deadlocking against each other. Debug
/// builds assert the order with a thread-local re-entrancy guard.
pub struct Engine {
    mempool: Mutex<Mempool>,
    state: Mutex<ChainState>,
    pub difficulty: usize,
    pub reward: u32,
}

#[cfg(debug_assertions)]
thread_local! {
    static HOLDING_MEMPOOL: std::cell::Cell<bool> = std::cell::Cell::new(false);
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

impl Engine {
    pub fn new(difficulty: usize, reward: u32) -> Self {
        Engine {
            mempool: Mutex::new(Mempool::new()),
            state: Mutex::new(ChainState { blocks: HashMap::new(), highest: None }),
            difficulty,
            reward,
        }
    }

    /// Validates and commits a block. See spec §4.4 for the exact ordered
    /// validation steps. Takes the mempool lock before the blocks lock, the
    /// same fixed order `add_transaction` uses — `AddBlock` also needs both
    /// locks (it evicts the block's transactions from the mempool), so it
    /// must not reverse the order or the two operations can deadlock against
    /// each other.
    pub fn add_block(&self, block: Block) -> bool {
        #[cfg(debug_assertions)]
        HOLDING_MEMPOOL.with(|h| {
            assert!(!h.get(), "mempool lock is not re-entrant across add_block calls");
            h.set(true);
        });

        let mut mempool = self.mempool.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        let result = self.add_block_locked(&mut state, &mut mempool, block);

        drop(state);
        drop(mempool);

        #[cfg(debug_assertions)]
        HOLDING_MEMPOOL.with(|h| h.set(false));

        result
    }

    fn add_block_locked(&self, state: &mut ChainState, mempool: &mut Mempool, block: Block) -> bool {
        let hash = block.hash();
        if state.blocks.contains_key(&hash) {
            return true; // duplicate commit is a silent success
        }

        if !block.validate_signature() {
            return false;
        }

        let parent_height;
        let chain_for_balances: Vec<CommittedBlock>;
        match block.parent_hash {
            None => {
                parent_height = 0;
                chain_for_balances = Vec::new();
            }
            Some(parent_hash) => {
                let parent = match state.blocks.get(&parent_hash) {
                    Some(p) => p,
                    None => return false,
                };
                parent_height = parent.height;
                chain_for_balances = match self.chain_locked(state, parent_hash) {
                    Some(c) => c,
                    None => return false,
                };
            }
        }

        if !block.satisfies_pow(self.difficulty) {
            return false;
        }

        for tx in &block.transactions {
            if !tx.validate_signature() {
                return false;
            }
        }

        let block_balances = match balances::calculate_balances(&block, &chain_for_balances) {
            Some(b) => b,
            None => return false,
        };

        let height = parent_height + 1;
        let committed = CommittedBlock {
            block: block.clone(),
            height,
            time_added: now_secs(),
            balances: block_balances,
        };
        state.blocks.insert(hash, committed);

        for tx in &block.transactions {
            mempool.remove(&tx.hash());
        }

        let replace_head = match state.highest {
            None => true,
            Some(current) => {
                let current_height = state.blocks.get(&current).map(|b| b.height).unwrap_or(0);
                height > current_height
            }
        };
        if replace_head {
            state.highest = Some(hash);
        }

        true
    }

    /// Applies each block in order; a block whose parent is not yet known
    /// simply fails like any other `AddBlock` call — callers that need
    /// out-of-order sync resilience buffer orphans themselves (see the node
    /// coordinator). Takes both locks once for the whole batch, in the same
    /// mempool-then-state order as a single `add_block`.
    pub fn add_blocks(&self, blocks: Vec<Block>) {
        let mut mempool = self.mempool.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        for block in blocks {
            self.add_block_locked(&mut state, &mut mempool, block);
        }
    }

    pub fn get_block(&self, hash: &[u8; 32]) -> Option<Block> {
        self.state.lock().unwrap().blocks.get(hash).map(|c| c.block.clone())
    }

    pub fn has_block(&self, hash: &[u8; 32]) -> bool {
        self.state.lock().unwrap().blocks.contains_key(hash)
    }

    pub fn get_height(&self) -> u32 {
        let state = self.state.lock().unwrap();
        match state.highest {
            Some(h) => state.blocks.get(&h).map(|c| c.height).unwrap_or(0),
            None => 0,
        }
    }

    pub fn get_highest_block_hash(&self) -> Option<[u8; 32]> {
        self.state.lock().unwrap().highest
    }

    pub fn get_highest_block(&self) -> Option<Block> {
        let state = self.state.lock().unwrap();
        state.highest.and_then(|h| state.blocks.get(&h).map(|c| c.block.clone()))
    }

    /// Walks parents from `hash` back to genesis, head-first. `None` if any
    /// ancestor is missing.
    pub fn get_chain(&self, hash: &[u8; 32]) -> Option<Vec<Block>> {
        let state = self.state.lock().unwrap();
        self.chain_locked(&state, *hash).map(|c| c.into_iter().map(|cb| cb.block).collect())
    }

    pub fn get_highest_chain(&self) -> Option<Vec<Block>> {
        let hash = self.get_highest_block_hash()?;
        self.get_chain(&hash)
    }

    fn chain_locked(&self, state: &ChainState, mut hash: [u8; 32]) -> Option<Vec<CommittedBlock>> {
        let mut out = Vec::new();
        loop {
            let committed = state.blocks.get(&hash)?;
            out.push(committed.clone());
            match committed.block.parent_hash {
                Some(parent) => hash = parent,
                None => break,
            }
        }
        Some(out)
    }

    /// Walks the highest chain head-first, returning the first snapshot
    /// that mentions `addr`; 0 if never set.
    pub fn get_balance(&self, addr: &[u8; ADDR_LEN]) -> u32 {
        let state = self.state.lock().unwrap();
        let highest = match state.highest {
            Some(h) => h,
            None => return 0,
        };
        match self.chain_locked(&state, highest) {
            Some(chain) => balances::lookup_in_chain(&chain, addr),
            None => 0,
        }
    }

    fn is_tx_in_highest_chain(&self, state: &ChainState, tx_hash: &[u8; 32]) -> bool {
        let highest = match state.highest {
            Some(h) => h,
            None => return false,
        };
        if let Some(chain) = self.chain_locked(state, highest) {
            chain.iter().any(|cb| cb.block.transactions.iter().any(|t| &t.hash() == tx_hash))
        } else {
            false
        }
    }

    /// Acquires mempool then state (the one operation allowed to hold both,
    /// in this fixed order). Returns true iff the signature is valid,
    /// regardless of duplicate — duplicates are idempotent successes.
    pub fn add_transaction(&self, tx: Transaction) -> bool {
        #[cfg(debug_assertions)]
        HOLDING_MEMPOOL.with(|h| {
            assert!(!h.get(), "mempool lock is not re-entrant across add_transaction calls");
            h.set(true);
        });

        let mut mempool = self.mempool.lock().unwrap();
        let state = self.state.lock().unwrap();

        let hash = tx.hash();
        let result = if self.is_tx_in_highest_chain(&state, &hash) {
            false
        } else if !tx.validate_signature() {
            false
        } else {
            mempool.insert(tx, now_secs());
            true
        };

        drop(state);
        drop(mempool);

        #[cfg(debug_assertions)]
        HOLDING_MEMPOOL.with(|h| h.set(false));

        result
    }

    pub fn clean_mempool(&self, cutoff: u64) {
        self.mempool.lock().unwrap().clean(cutoff);
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.lock().unwrap().len()
    }

    /// Snapshot of the mempool in FIFO order, for `GetMempool` replies.
    pub fn mempool_snapshot(&self) -> Vec<Transaction> {
        self.mempool.lock().unwrap().iter().cloned().collect()
    }

    /// Builds, solves PoW for, and signs a block, but does not commit it —
    /// the caller (coordinator) is responsible for `add_block`. Returns
    /// `None` if the mempool is empty or mining is cancelled via `cancel`.
    pub fn mine(
        &self,
        miner_addr: [u8; ADDR_LEN],
        priv_key: &SecretKey,
        max_tx: usize,
        cancel: Option<&AtomicBool>,
    ) -> Option<Block> {
        if self.mempool_len() == 0 {
            return None;
        }

        let (parent_hash, parent_chain) = {
            let state = self.state.lock().unwrap();
            match state.highest {
                Some(h) => (Some(h), self.chain_locked(&state, h).unwrap_or_default()),
                None => (None, Vec::new()),
            }
        };

        let mut reward_tx = Transaction::new(miner_addr, miner_addr, self.reward, 0);
        reward_tx.sign(priv_key);

        let mut tmp_balances: HashMap<[u8; ADDR_LEN], u32> = HashMap::new();
        let parent_miner_balance = balances::lookup_in_chain(&parent_chain, &miner_addr);
        tmp_balances.insert(miner_addr, parent_miner_balance + self.reward);

        let mut transactions = vec![reward_tx];
        let mut rejected: Vec<Transaction> = Vec::new();

        {
            let mut mempool = self.mempool.lock().unwrap();
            while transactions.len() < max_tx + 1 {
                let tx = match mempool.pop_front() {
                    Some(t) => t,
                    None => break,
                };
                if !tx.validate_signature() {
                    continue;
                }
                let from_current = *tmp_balances
                    .get(&tx.from_addr)
                    .unwrap_or(&balances::lookup_in_chain(&parent_chain, &tx.from_addr));
                let from_bal = (from_current as i64) - (tx.amount as i64);
                if from_bal < 0 {
                    rejected.push(tx);
                    continue;
                }
                tmp_balances.insert(tx.from_addr, from_bal as u32);
                let to_current = *tmp_balances
                    .get(&tx.to_addr)
                    .unwrap_or(&balances::lookup_in_chain(&parent_chain, &tx.to_addr));
                tmp_balances.insert(tx.to_addr, to_current + tx.amount);
                transactions.push(tx);
            }
            for tx in rejected {
                let now = now_secs();
                mempool.push_back(tx, now);
            }
        }

        let mut block = Block::new(parent_hash, now_secs() as u32, miner_addr, transactions);

        let mut nonce: u32 = 0;
        loop {
            block.nonce = nonce;
            if block.satisfies_pow(self.difficulty) {
                break;
            }
            if nonce % 4096 == 0 {
                if let Some(flag) = cancel {
                    if flag.load(Ordering::Relaxed) {
                        return None;
                    }
                }
            }
            nonce = nonce.wrapping_add(1);
        }

        block.sign(priv_key);
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ecdsa;

    fn keypair() -> (crate::crypto::ecdsa::PublicKey, SecretKey) {
        ecdsa::generate_keypair()
    }

    fn signed_block(engine: &Engine, miner: ([u8; ADDR_LEN], &SecretKey), parent: Option<[u8; 32]>, extra_txs: Vec<Transaction>) -> Block {
        let mut reward = Transaction::new(miner.0, miner.0, engine.reward, 0);
        reward.sign(miner.1);
        let mut txs = vec![reward];
        txs.extend(extra_txs);
        let mut block = Block::new(parent, 1_700_000_000, miner.0, txs);
        while !block.satisfies_pow(engine.difficulty) {
            block.nonce += 1;
        }
        block.sign(miner.1);
        block
    }

    #[test]
    fn test_mine_returns_none_on_empty_mempool() {
        let engine = Engine::new(1, 10);
        let (miner_pk, miner_sk) = keypair();
        assert!(engine.mine(miner_pk.0, &miner_sk, 10, None).is_none());
    }

    #[test]
    fn test_add_block_establishes_genesis_and_updates_head() {
        let engine = Engine::new(1, 10);
        let (miner_pk, miner_sk) = keypair();
        let genesis = signed_block(&engine, (miner_pk.0, &miner_sk), None, vec![]);
        let genesis_hash = genesis.hash();
        assert!(engine.add_block(genesis));
        assert_eq!(engine.get_highest_block_hash(), Some(genesis_hash));
        assert_eq!(engine.get_height(), 1);
    }

    #[test]
    fn test_equal_height_block_does_not_replace_head_first_arrival_wins() {
        let engine = Engine::new(1, 10);
        let (miner_pk, miner_sk) = keypair();
        let genesis = signed_block(&engine, (miner_pk.0, &miner_sk), None, vec![]);
        let genesis_hash = genesis.hash();
        assert!(engine.add_block(genesis));

        let (other_pk, other_sk) = keypair();
        let rival_genesis = signed_block(&engine, (other_pk.0, &other_sk), None, vec![]);
        assert!(engine.add_block(rival_genesis));

        assert_eq!(engine.get_highest_block_hash(), Some(genesis_hash));
    }

    #[test]
    fn test_add_transaction_duplicate_is_idempotent() {
        let engine = Engine::new(1, 10);
        let (pk, sk) = keypair();
        let (to_pk, _) = keypair();
        let mut tx = Transaction::new(pk.0, to_pk.0, 1, 1);
        tx.sign(&sk);
        assert!(engine.add_transaction(tx.clone()));
        assert!(engine.add_transaction(tx));
        assert_eq!(engine.mempool_len(), 1);
    }

    #[test]
    fn test_mine_preserves_overspending_tx_at_mempool_tail() {
        let engine = Engine::new(1, 10);
        let (miner_pk, miner_sk) = keypair();
        let genesis = signed_block(&engine, (miner_pk.0, &miner_sk), None, vec![]);
        assert!(engine.add_block(genesis));

        let (sender_pk, sender_sk) = keypair();
        let (recipient_pk, _) = keypair();
        let mut overspend = Transaction::new(sender_pk.0, recipient_pk.0, 10, 1);
        overspend.sign(&sender_sk);
        let overspend_hash = overspend.hash();
        engine.add_transaction(overspend);

        let mined = engine.mine(miner_pk.0, &miner_sk, 10, None).unwrap();
        assert_eq!(mined.transactions.len(), 1, "only the reward tx should be included");
        assert_eq!(engine.mempool_len(), 1);

        let remaining = engine.mine(miner_pk.0, &miner_sk, 10, None).unwrap();
        assert!(remaining.transactions.iter().any(|t| t.hash() == overspend_hash));
    }

    #[test]
    fn test_full_scenario_genesis_plus_two_children() {
        // Genesis block followed by two child blocks mined on top of it.
        let engine = Engine::new(2, 10);
        let (miner_pk, miner_sk) = keypair();

        let genesis = signed_block(&engine, (miner_pk.0, &miner_sk), None, vec![]);
        assert!(engine.add_block(genesis.clone()));

        let (a1_pk, a1_sk) = keypair();
        let (a2_pk, _) = keypair();
        let (a3_pk, a3_sk) = keypair();
        let (a4_pk, _) = keypair();
        let (a5_pk, _) = keypair();

        let mut t0 = Transaction::new(miner_pk.0, a1_pk.0, 10, 1);
        t0.sign(&miner_sk);
        let mut t1 = Transaction::new(a1_pk.0, a2_pk.0, 5, 1);
        t1.sign(&a1_sk);
        let mut t2 = Transaction::new(a1_pk.0, a3_pk.0, 4, 2);
        t2.sign(&a1_sk);

        let block1 = signed_block(&engine, (miner_pk.0, &miner_sk), Some(genesis.hash()), vec![t0, t1, t2]);
        assert!(engine.add_block(block1.clone()));

        let mut t3 = Transaction::new(a3_pk.0, a4_pk.0, 1, 1);
        t3.sign(&a3_sk);
        let mut t4 = Transaction::new(a3_pk.0, a5_pk.0, 3, 2);
        t4.sign(&a3_sk);

        let block2 = signed_block(&engine, (miner_pk.0, &miner_sk), Some(block1.hash()), vec![t3, t4]);
        assert!(engine.add_block(block2));

        assert_eq!(engine.get_balance(&miner_pk.0), 30);
        assert_eq!(engine.get_balance(&a1_pk.0), 1);
        assert_eq!(engine.get_balance(&a2_pk.0), 5);
        assert_eq!(engine.get_balance(&a3_pk.0), 0);
        assert_eq!(engine.get_balance(&a4_pk.0), 1);
        assert_eq!(engine.get_balance(&a5_pk.0), 3);
    }
}
