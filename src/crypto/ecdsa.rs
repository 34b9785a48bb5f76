// ECDSA over secp256k1 — signing and verification.
//
// Addresses are the raw 64-byte uncompressed public key point (x || y, no
// 0x04 prefix), matching the fixed-width ADDR_LEN the wire protocol assumes.
// Signatures are the 64-byte compact ECDSA form.

use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature as Secp256k1Signature;
use secp256k1::{Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey as Secp256k1SecretKey};

pub const PUBKEY_BYTES: usize = 64;
pub const PRIVKEY_BYTES: usize = 32;
pub const SIGNATURE_BYTES: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub [u8; PUBKEY_BYTES]);

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

#[derive(Clone)]
pub struct SecretKey(pub [u8; PRIVKEY_BYTES]);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_BYTES]);

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

/// Generates a fresh secp256k1 keypair using OS randomness.
pub fn generate_keypair() -> (PublicKey, SecretKey) {
    let secp = Secp256k1::new();
    let (sk, pk) = secp.generate_keypair(&mut OsRng);
    (to_public_key(&pk), to_secret_key(&sk))
}

/// Reconstructs the public key that corresponds to a secret key.
pub fn public_key_for(sk: &SecretKey) -> Option<PublicKey> {
    let secp_sk = Secp256k1SecretKey::from_slice(&sk.0).ok()?;
    let secp = Secp256k1::new();
    let pk = Secp256k1PublicKey::from_secret_key(&secp, &secp_sk);
    Some(to_public_key(&pk))
}

/// Signs a 32-byte message hash, producing a 64-byte compact signature.
pub fn sign(message_hash: &[u8; 32], sk: &SecretKey) -> Option<Signature> {
    let secp_sk = Secp256k1SecretKey::from_slice(&sk.0).ok()?;
    let secp = Secp256k1::signing_only();
    let msg = Message::from_digest(*message_hash);
    let sig = secp.sign_ecdsa(&msg, &secp_sk);
    Some(Signature(sig.serialize_compact()))
}

/// Verifies a compact ECDSA signature over a 32-byte message hash.
/// Returns false on any malformed input — never panics.
pub fn verify(message_hash: &[u8; 32], sig: &Signature, pk: &PublicKey) -> bool {
    let secp_pk = match from_public_key(pk) {
        Some(k) => k,
        None => return false,
    };
    let secp_sig = match Secp256k1Signature::from_compact(&sig.0) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest(*message_hash);
    secp.verify_ecdsa(&msg, &secp_sig, &secp_pk).is_ok()
}

fn to_public_key(pk: &Secp256k1PublicKey) -> PublicKey {
    let uncompressed = pk.serialize_uncompressed();
    let mut out = [0u8; PUBKEY_BYTES];
    out.copy_from_slice(&uncompressed[1..]);
    PublicKey(out)
}

fn to_secret_key(sk: &Secp256k1SecretKey) -> SecretKey {
    SecretKey(sk.secret_bytes())
}

fn from_public_key(pk: &PublicKey) -> Option<Secp256k1PublicKey> {
    let mut uncompressed = [0u8; 65];
    uncompressed[0] = 0x04;
    uncompressed[1..].copy_from_slice(&pk.0);
    Secp256k1PublicKey::from_slice(&uncompressed).ok()
}
