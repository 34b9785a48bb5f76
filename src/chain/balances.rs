// Balance calculator: derives the per-block balance snapshot from a block
// and its parent chain.

use crate::codec::ADDR_LEN;
use crate::primitives::block::Block;
use std::collections::HashMap;

/// Anything that carries a balance snapshot keyed by address, as produced by
/// committing a block. `chain` order is parent-first (head) toward genesis
/// (last), matching `Engine::get_chain`'s return order.
pub trait BalanceSnapshot {
    fn balances(&self) -> &HashMap<[u8; ADDR_LEN], u32>;
}

/// Looks up `addr`'s balance by walking `chain` head-first; the first block
/// whose snapshot mentions `addr` wins. Zero if never seen.
pub fn lookup_in_chain<B: BalanceSnapshot>(chain: &[B], addr: &[u8; ADDR_LEN]) -> u32 {
    for block in chain {
        if let Some(bal) = block.balances().get(addr) {
            return *bal;
        }
    }
    0
}

/// Computes the fresh balance snapshot for `block`, given its parent chain
/// `chain` (head-first, genesis last). Returns `None` if any non-reward
/// transaction would drive its sender negative.
pub fn calculate_balances<B: BalanceSnapshot>(
    block: &Block,
    chain: &[B],
) -> Option<HashMap<[u8; ADDR_LEN], u32>> {
    let mut balances: HashMap<[u8; ADDR_LEN], u32> = HashMap::new();

    for tx in &block.transactions {
        if tx.is_reward_for(&block.miner) {
            let current = *balances.get(&tx.to_addr).unwrap_or(&lookup_in_chain(chain, &tx.to_addr));
            balances.insert(tx.to_addr, current + tx.amount);
            continue;
        }

        let from_current = *balances
            .get(&tx.from_addr)
            .unwrap_or(&lookup_in_chain(chain, &tx.from_addr));
        let from_bal = (from_current as i64) - (tx.amount as i64);
        if from_bal < 0 {
            return None;
        }
        balances.insert(tx.from_addr, from_bal as u32);

        let to_current = lookup_in_chain(chain, &tx.to_addr);
        balances.insert(tx.to_addr, to_current + tx.amount);
    }

    Some(balances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ecdsa;
    use crate::primitives::transaction::Transaction;

    struct FakeBlock(HashMap<[u8; ADDR_LEN], u32>);
    impl BalanceSnapshot for FakeBlock {
        fn balances(&self) -> &HashMap<[u8; ADDR_LEN], u32> {
            &self.0
        }
    }

    fn addr() -> [u8; ADDR_LEN] {
        ecdsa::generate_keypair().0 .0
    }

    #[test]
    fn test_lookup_walks_head_first() {
        let a = addr();
        let mut head = HashMap::new();
        head.insert(a, 5);
        let mut older = HashMap::new();
        older.insert(a, 99);
        let chain = vec![FakeBlock(head), FakeBlock(older)];
        assert_eq!(lookup_in_chain(&chain, &a), 5);
    }

    #[test]
    fn test_lookup_defaults_to_zero() {
        let chain: Vec<FakeBlock> = vec![];
        assert_eq!(lookup_in_chain(&chain, &addr()), 0);
    }

    #[test]
    fn test_reward_tx_credits_miner() {
        let (miner_pk, miner_sk) = ecdsa::generate_keypair();
        let mut reward = Transaction::new(miner_pk.0, miner_pk.0, 10, 0);
        reward.sign(&miner_sk);
        let block = Block::new(None, 0, miner_pk.0, vec![reward]);
        let chain: Vec<FakeBlock> = vec![];
        let balances = calculate_balances(&block, &chain).unwrap();
        assert_eq!(balances[&miner_pk.0], 10);
    }

    #[test]
    fn test_overspend_rejected() {
        let (miner_pk, miner_sk) = ecdsa::generate_keypair();
        let (sender_pk, sender_sk) = ecdsa::generate_keypair();
        let (to_pk, _) = ecdsa::generate_keypair();

        let mut reward = Transaction::new(miner_pk.0, miner_pk.0, 10, 0);
        reward.sign(&miner_sk);
        let mut overspend = Transaction::new(sender_pk.0, to_pk.0, 50, 1);
        overspend.sign(&sender_sk);

        let block = Block::new(None, 0, miner_pk.0, vec![reward, overspend]);
        let chain: Vec<FakeBlock> = vec![];
        assert!(calculate_balances(&block, &chain).is_none());
    }

    #[test]
    fn test_second_credit_to_same_address_does_not_accumulate_with_first() {
        // Two non-reward txs in the same block both pay X, starting from a
        // parent balance of 0. Each credit is looked up fresh against the
        // parent chain, not against the block-local running total, so only
        // the later credit survives rather than summing to both amounts.
        let (miner_pk, miner_sk) = ecdsa::generate_keypair();
        let (b_pk, b_sk) = ecdsa::generate_keypair();
        let (c_pk, c_sk) = ecdsa::generate_keypair();
        let (x_pk, _) = ecdsa::generate_keypair();

        let mut b_balance = HashMap::new();
        b_balance.insert(b_pk.0, 5u32);
        let mut c_balance = HashMap::new();
        c_balance.insert(c_pk.0, 5u32);
        let chain = vec![FakeBlock(c_balance), FakeBlock(b_balance)];

        let mut reward = Transaction::new(miner_pk.0, miner_pk.0, 10, 0);
        reward.sign(&miner_sk);
        let mut b_to_x = Transaction::new(b_pk.0, x_pk.0, 5, 1);
        b_to_x.sign(&b_sk);
        let mut c_to_x = Transaction::new(c_pk.0, x_pk.0, 5, 1);
        c_to_x.sign(&c_sk);

        let block = Block::new(None, 0, miner_pk.0, vec![reward, b_to_x, c_to_x]);
        let balances = calculate_balances(&block, &chain).unwrap();
        assert_eq!(balances[&x_pk.0], 5);
    }
}
