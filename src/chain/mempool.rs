// FIFO mempool of unconfirmed transactions.

use crate::primitives::transaction::Transaction;
use std::collections::HashMap;

pub struct MempoolEntry {
    pub tx: Transaction,
    pub time_added: u64,
}

/// Insertion-ordered map from tx_hash to transaction. Order is tracked with
/// an explicit `Vec<[u8; 32]>` alongside the hash map since `std::collections`
/// has no ordered map.
#[derive(Default)]
pub struct Mempool {
    order: Vec<[u8; 32]>,
    entries: HashMap<[u8; 32], MempoolEntry>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool { order: Vec::new(), entries: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, hash: &[u8; 32]) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &[u8; 32]) -> Option<&Transaction> {
        self.entries.get(hash).map(|e| &e.tx)
    }

    /// Inserts at the tail if not already present. Returns true if inserted.
    pub fn insert(&mut self, tx: Transaction, time_added: u64) -> bool {
        let hash = tx.hash();
        if self.entries.contains_key(&hash) {
            return false;
        }
        self.order.push(hash);
        self.entries.insert(hash, MempoolEntry { tx, time_added });
        true
    }

    /// Re-inserts at the tail, used to push rejected-during-mining txs back.
    pub fn push_back(&mut self, tx: Transaction, time_added: u64) {
        let hash = tx.hash();
        if self.entries.contains_key(&hash) {
            return;
        }
        self.order.push(hash);
        self.entries.insert(hash, MempoolEntry { tx, time_added });
    }

    /// Pops the oldest entry, preserving FIFO order.
    pub fn pop_front(&mut self) -> Option<Transaction> {
        if self.order.is_empty() {
            return None;
        }
        let hash = self.order.remove(0);
        self.entries.remove(&hash).map(|e| e.tx)
    }

    pub fn remove(&mut self, hash: &[u8; 32]) -> bool {
        if self.entries.remove(hash).is_some() {
            self.order.retain(|h| h != hash);
            true
        } else {
            false
        }
    }

    /// Removes every entry with `time_added < cutoff`.
    pub fn clean(&mut self, cutoff: u64) {
        let stale: Vec<[u8; 32]> = self
            .entries
            .iter()
            .filter(|(_, e)| e.time_added < cutoff)
            .map(|(h, _)| *h)
            .collect();
        for h in stale {
            self.remove(&h);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.order.iter().filter_map(move |h| self.entries.get(h)).map(|e| &e.tx)
    }
}
