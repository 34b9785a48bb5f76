// Transaction: an account-to-account transfer value object.

use crate::codec::{self, CodecError, ADDR_LEN, INT_LEN, SIGN_LEN};
use crate::crypto::ecdsa::{self, PublicKey, SecretKey, Signature};
use crate::crypto::hash::hash_sha256;

/// Encoded length: from (64) + to (64) + amount (4) + nonce (4) + signature (64).
pub const ENCODED_LEN: usize = ADDR_LEN + ADDR_LEN + INT_LEN + INT_LEN + SIGN_LEN;

#[derive(Debug, Clone)]
pub struct Transaction {
    pub from_addr: [u8; ADDR_LEN],
    pub to_addr: [u8; ADDR_LEN],
    pub amount: u32,
    pub nonce: u32,
    pub signature: Option<Signature>,
}

impl Transaction {
    pub fn new(from_addr: [u8; ADDR_LEN], to_addr: [u8; ADDR_LEN], amount: u32, nonce: u32) -> Self {
        Transaction { from_addr, to_addr, amount, nonce, signature: None }
    }

    /// tx_hash = SHA-256(from || to || amount || nonce).
    pub fn hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(ADDR_LEN * 2 + INT_LEN * 2);
        buf.extend_from_slice(&self.from_addr);
        buf.extend_from_slice(&self.to_addr);
        buf.extend_from_slice(&codec::int_to_bytes(self.amount));
        buf.extend_from_slice(&codec::int_to_bytes(self.nonce));
        hash_sha256(&buf)
    }

    pub fn sign(&mut self, priv_key: &SecretKey) {
        let hash = self.hash();
        self.signature = ecdsa::sign(&hash, priv_key);
    }

    /// Verifies `signature` against `hash` under `from_addr`. A transaction
    /// with no signature at all is never valid.
    pub fn validate_signature(&self) -> bool {
        let sig = match &self.signature {
            Some(s) => s,
            None => return false,
        };
        let from_pk = PublicKey(self.from_addr);
        ecdsa::verify(&self.hash(), sig, &from_pk)
    }

    /// Exactly ENCODED_LEN bytes; fails if unsigned.
    pub fn encode(&self) -> Option<Vec<u8>> {
        let sig = self.signature.as_ref()?;
        let mut buf = Vec::with_capacity(ENCODED_LEN);
        buf.extend_from_slice(&self.from_addr);
        buf.extend_from_slice(&self.to_addr);
        buf.extend_from_slice(&codec::int_to_bytes(self.amount));
        buf.extend_from_slice(&codec::int_to_bytes(self.nonce));
        buf.extend_from_slice(&sig.0);
        Some(buf)
    }

    /// Rejects short input. Returns a structurally-populated transaction;
    /// signature validity is not checked here — callers must verify.
    pub fn decode(bytes: &[u8]) -> Result<Transaction, CodecError> {
        if bytes.len() < ENCODED_LEN {
            return Err(CodecError::TooShort { need: ENCODED_LEN, have: bytes.len() });
        }
        let mut off = 0;
        let mut from_addr = [0u8; ADDR_LEN];
        from_addr.copy_from_slice(&bytes[off..off + ADDR_LEN]);
        off += ADDR_LEN;
        let mut to_addr = [0u8; ADDR_LEN];
        to_addr.copy_from_slice(&bytes[off..off + ADDR_LEN]);
        off += ADDR_LEN;
        let amount = codec::bytes_to_int(&bytes[off..off + INT_LEN])?;
        off += INT_LEN;
        let nonce = codec::bytes_to_int(&bytes[off..off + INT_LEN])?;
        off += INT_LEN;
        let mut sig = [0u8; SIGN_LEN];
        sig.copy_from_slice(&bytes[off..off + SIGN_LEN]);

        Ok(Transaction { from_addr, to_addr, amount, nonce, signature: Some(Signature(sig)) })
    }

    /// True iff `from == to == miner` — the reward-transaction identity
    /// used both by mining and by balance calculation.
    pub fn is_reward_for(&self, miner: &[u8; ADDR_LEN]) -> bool {
        self.from_addr == *miner && self.to_addr == *miner
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}
impl Eq for Transaction {}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_signed_tx() -> (Transaction, PublicKey, SecretKey) {
        let (pk, sk) = ecdsa::generate_keypair();
        let (_to_pk, _to_sk) = ecdsa::generate_keypair();
        let mut tx = Transaction::new(pk.0, _to_pk.0, 10, 1);
        tx.sign(&sk);
        (tx, pk, sk)
    }

    #[test]
    fn test_valid_signed_tx_validates() {
        let (tx, _pk, _sk) = mock_signed_tx();
        assert!(tx.validate_signature());
    }

    #[test]
    fn test_unsigned_tx_is_invalid() {
        let (pk, _sk) = ecdsa::generate_keypair();
        let tx = Transaction::new(pk.0, pk.0, 5, 0);
        assert!(!tx.validate_signature());
    }

    #[test]
    fn test_hash_changes_with_each_field() {
        let (pk, sk) = ecdsa::generate_keypair();
        let (to_pk, _) = ecdsa::generate_keypair();
        let base = Transaction::new(pk.0, to_pk.0, 10, 1);
        let base_hash = base.hash();

        let mut diff_amount = base.clone();
        diff_amount.amount = 11;
        assert_ne!(diff_amount.hash(), base_hash);

        let mut diff_nonce = base.clone();
        diff_nonce.nonce = 2;
        assert_ne!(diff_nonce.hash(), base_hash);

        let mut diff_to = base.clone();
        diff_to.to_addr = pk.0;
        assert_ne!(diff_to.hash(), base_hash);

        let _ = sk;
    }

    #[test]
    fn test_encode_fails_when_unsigned() {
        let (pk, _sk) = ecdsa::generate_keypair();
        let tx = Transaction::new(pk.0, pk.0, 1, 1);
        assert!(tx.encode().is_none());
    }

    #[test]
    fn test_encode_decode_roundtrip_preserves_hash_and_validity() {
        let (tx, _pk, _sk) = mock_signed_tx();
        let encoded = tx.encode().unwrap();
        assert_eq!(encoded.len(), ENCODED_LEN);
        let decoded = Transaction::decode(&encoded).unwrap();
        assert_eq!(decoded.hash(), tx.hash());
        assert!(decoded.validate_signature());
    }

    #[test]
    fn test_decode_rejects_short_input() {
        assert!(Transaction::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_reward_identity() {
        let (pk, sk) = ecdsa::generate_keypair();
        let mut reward = Transaction::new(pk.0, pk.0, 10, 0);
        reward.sign(&sk);
        assert!(reward.is_reward_for(&pk.0));

        let (to_pk, _) = ecdsa::generate_keypair();
        let transfer = Transaction::new(pk.0, to_pk.0, 10, 0);
        assert!(!transfer.is_reward_for(&pk.0));
    }
}
