// Block: a parent-linked container of transactions.

use super::transaction::Transaction;
use crate::codec::{self, CodecError, ADDR_LEN, HASH_LEN, INT_LEN, SIGN_LEN};
use crate::crypto::ecdsa::{self, PublicKey, SecretKey, Signature};
use crate::crypto::hash::hash_sha256;

#[derive(Debug, Clone)]
pub struct Block {
    pub parent_hash: Option<[u8; HASH_LEN]>,
    pub nonce: u32,
    pub timestamp: u32,
    pub miner: [u8; ADDR_LEN],
    pub signature: Option<Signature>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        parent_hash: Option<[u8; HASH_LEN]>,
        timestamp: u32,
        miner: [u8; ADDR_LEN],
        transactions: Vec<Transaction>,
    ) -> Self {
        Block { parent_hash, nonce: 0, timestamp, miner, signature: None, transactions }
    }

    /// block_hash = SHA-256(parent || tx_count || timestamp(8B) || nonce || tx_hash_1 || … || tx_hash_n).
    pub fn hash(&self) -> [u8; 32] {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.parent_hash.unwrap_or([0u8; HASH_LEN]));
        buf.extend_from_slice(&codec::int_to_bytes(self.transactions.len() as u32));
        buf.extend_from_slice(&(self.timestamp as u64).to_be_bytes());
        buf.extend_from_slice(&codec::int_to_bytes(self.nonce));
        for tx in &self.transactions {
            buf.extend_from_slice(&tx.hash());
        }
        hash_sha256(&buf)
    }

    pub fn sign(&mut self, priv_key: &SecretKey) {
        let hash = self.hash();
        self.signature = ecdsa::sign(&hash, priv_key);
    }

    pub fn validate_signature(&self) -> bool {
        let sig = match &self.signature {
            Some(s) => s,
            None => return false,
        };
        let miner_pk = PublicKey(self.miner);
        ecdsa::verify(&self.hash(), sig, &miner_pk)
    }

    /// True iff the hex representation of the block hash starts with
    /// `difficulty` ASCII zeros.
    pub fn satisfies_pow(&self, difficulty: usize) -> bool {
        let hex_hash = crate::crypto::hash::to_hex(&self.hash());
        hex_hash.len() >= difficulty && hex_hash.as_bytes()[..difficulty].iter().all(|&b| b == b'0')
    }

    /// parent (all-zero if null) || nonce || timestamp || miner || signature
    /// || tx_count || each encoded tx.
    pub fn encode(&self) -> Option<Vec<u8>> {
        let sig = self.signature.as_ref()?;
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.parent_hash.unwrap_or([0u8; HASH_LEN]));
        buf.extend_from_slice(&codec::int_to_bytes(self.nonce));
        buf.extend_from_slice(&codec::int_to_bytes(self.timestamp));
        buf.extend_from_slice(&self.miner);
        buf.extend_from_slice(&sig.0);
        buf.extend_from_slice(&codec::int_to_bytes(self.transactions.len() as u32));
        for tx in &self.transactions {
            let encoded = tx.encode()?;
            buf.extend_from_slice(&encoded);
        }
        Some(buf)
    }

    /// Returns `(block, byte_size)`, or `None` if the input is too short or
    /// the decoded block's signature fails to verify.
    pub fn decode(bytes: &[u8]) -> Result<(Block, usize), CodecError> {
        let header_len = HASH_LEN + INT_LEN + INT_LEN + ADDR_LEN + SIGN_LEN + INT_LEN;
        if bytes.len() < header_len {
            return Err(CodecError::TooShort { need: header_len, have: bytes.len() });
        }
        let mut off = 0;
        let mut parent_raw = [0u8; HASH_LEN];
        parent_raw.copy_from_slice(&bytes[off..off + HASH_LEN]);
        off += HASH_LEN;
        let parent_hash = if parent_raw == [0u8; HASH_LEN] { None } else { Some(parent_raw) };

        let nonce = codec::bytes_to_int(&bytes[off..off + INT_LEN])?;
        off += INT_LEN;
        let timestamp = codec::bytes_to_int(&bytes[off..off + INT_LEN])?;
        off += INT_LEN;
        let mut miner = [0u8; ADDR_LEN];
        miner.copy_from_slice(&bytes[off..off + ADDR_LEN]);
        off += ADDR_LEN;
        let mut sig = [0u8; SIGN_LEN];
        sig.copy_from_slice(&bytes[off..off + SIGN_LEN]);
        off += SIGN_LEN;
        let tx_count = codec::bytes_to_int(&bytes[off..off + INT_LEN])? as usize;
        off += INT_LEN;

        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            let tx = Transaction::decode(&bytes[off..])?;
            off += super::transaction::ENCODED_LEN;
            transactions.push(tx);
        }

        let block = Block {
            parent_hash,
            nonce,
            timestamp,
            miner,
            signature: Some(Signature(sig)),
            transactions,
        };

        if !block.validate_signature() {
            return Err(CodecError::BadHex);
        }

        Ok((block, off))
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}
impl Eq for Block {}
