// Outbound half of a peer link — one-shot request/response methods over a
// persistent `FramedStream`.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::codec::{self, HASH_LEN};
use crate::config;
use crate::net::protocol::{msg, FramedStream};
use crate::primitives::block::Block;
use crate::primitives::transaction::{Transaction, ENCODED_LEN as TX_ENCODED_LEN};

pub struct PeerClient {
    pub host: String,
    pub port: u16,
    pub failed_attempts: u32,
    stream: Option<FramedStream>,
}

impl PeerClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        PeerClient { host: host.into(), port, failed_attempts: 0, stream: None }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Opens a TCP connection with a 500 ms connect timeout. Bumps
    /// `failed_attempts` on any connect error.
    pub fn connect(&mut self) -> bool {
        match self.try_connect() {
            Ok(stream) => {
                self.stream = Some(FramedStream::new(stream));
                self.failed_attempts = 0;
                true
            }
            Err(_) => {
                self.failed_attempts += 1;
                false
            }
        }
    }

    fn try_connect(&self) -> std::io::Result<TcpStream> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no address"))?;
        TcpStream::connect_timeout(&addr, Duration::from_millis(config::CONNECT_TIMEOUT_MS))
    }

    pub fn close(&mut self, our_advertised: &str) {
        if let Some(stream) = self.stream.as_mut() {
            let _ = stream.send(msg::CLOSE, our_advertised.as_bytes());
        }
        self.stream = None;
    }

    /// Sends our version integer; returns the peer's version iff it replies `VersionOK`.
    pub fn version(&mut self, our_version: u32) -> Option<u32> {
        let stream = self.stream.as_mut()?;
        stream.send(msg::VERSION, &codec::int_to_bytes(our_version)).ok()?;
        let (msg_type, payload) = stream.recv().ok()?;
        if msg_type == msg::VERSION_OK {
            codec::bytes_to_int(&payload).ok()
        } else {
            None
        }
    }

    /// Sends `our_advertised` (`host:port`, or empty if we don't host a
    /// server); returns the peer's known addresses.
    pub fn get_addrs(&mut self, our_advertised: &str) -> Option<Vec<(String, u16)>> {
        let stream = self.stream.as_mut()?;
        stream.send(msg::GET_ADDRS, our_advertised.as_bytes()).ok()?;
        let (msg_type, payload) = stream.recv().ok()?;
        if msg_type != msg::ADDRS {
            return None;
        }
        Some(parse_addr_list(&payload))
    }

    /// Returns the peer's mempool as a list of (structurally decoded, not
    /// re-validated) transactions.
    pub fn get_mempool(&mut self) -> Option<Vec<Transaction>> {
        let stream = self.stream.as_mut()?;
        stream.send(msg::GET_MEMPOOL, b"").ok()?;
        let (msg_type, payload) = stream.recv().ok()?;
        if msg_type != msg::MEMPOOL {
            return None;
        }
        let count = codec::bytes_to_int(payload.get(..4)?).ok()? as usize;
        let mut out = Vec::with_capacity(count);
        let mut off = 4;
        for _ in 0..count {
            let tx = Transaction::decode(payload.get(off..)?).ok()?;
            off += TX_ENCODED_LEN;
            out.push(tx);
        }
        Some(out)
    }

    /// One-way send of an encoded block; no response is expected.
    pub fn add_block(&mut self, block: &Block) -> bool {
        let Some(stream) = self.stream.as_mut() else { return false };
        let Some(encoded) = block.encode() else { return false };
        stream.send(msg::ADD_BLOCK, &encoded).is_ok()
    }

    /// Sends our height; returns `(peer_height, hashes)` in chain order
    /// head-first, or `(0, None)` if the peer isn't ahead or the reply is
    /// malformed.
    pub fn sync_blocks(&mut self, our_height: u32) -> (u32, Option<Vec<[u8; HASH_LEN]>>) {
        let Some(stream) = self.stream.as_mut() else { return (0, None) };
        if stream.send(msg::SYNC_BLOCKS, &codec::int_to_bytes(our_height)).is_err() {
            return (0, None);
        }
        let Ok((msg_type, payload)) = stream.recv() else { return (0, None) };
        if msg_type != msg::HASHES {
            return (0, None);
        }
        let Some(peer_height) = payload.get(..4).and_then(|b| codec::bytes_to_int(b).ok()) else {
            return (0, None);
        };
        if peer_height <= our_height {
            return (0, None);
        }
        let Some(num_hashes) = payload.get(4..8).and_then(|b| codec::bytes_to_int(b).ok()) else {
            return (0, None);
        };
        let mut hashes = Vec::with_capacity(num_hashes as usize);
        let mut off = 8;
        for _ in 0..num_hashes {
            let Some(slice) = payload.get(off..off + HASH_LEN) else { return (0, None) };
            let mut h = [0u8; HASH_LEN];
            h.copy_from_slice(slice);
            hashes.push(h);
            off += HASH_LEN;
        }
        (peer_height, Some(hashes))
    }

    /// Requests the blocks for `hashes`; the peer replies with a count
    /// followed by consecutive variable-length encoded blocks.
    pub fn get_blocks(&mut self, hashes: &[[u8; HASH_LEN]]) -> Option<Vec<Block>> {
        let stream = self.stream.as_mut()?;
        let mut payload = Vec::with_capacity(4 + hashes.len() * HASH_LEN);
        payload.extend_from_slice(&codec::int_to_bytes(hashes.len() as u32));
        for h in hashes {
            payload.extend_from_slice(h);
        }
        stream.send(msg::GET_BLOCKS, &payload).ok()?;
        let (msg_type, body) = stream.recv().ok()?;
        if msg_type != msg::BLOCKS {
            return None;
        }
        let num_blocks = codec::bytes_to_int(body.get(..4)?).ok()? as usize;
        let mut out = Vec::with_capacity(num_blocks);
        let mut off = 4;
        for _ in 0..num_blocks {
            let (block, consumed) = Block::decode(body.get(off..)?).ok()?;
            off += consumed;
            out.push(block);
        }
        Some(out)
    }
}

pub fn parse_addr_list(payload: &[u8]) -> Vec<(String, u16)> {
    if payload.is_empty() {
        return Vec::new();
    }
    String::from_utf8_lossy(payload)
        .split(';')
        .filter_map(|entry| {
            let (host, port) = entry.rsplit_once(':')?;
            Some((host.to_string(), port.parse().ok()?))
        })
        .collect()
}

pub fn encode_addr_list(addrs: &[(String, u16)]) -> Vec<u8> {
    addrs
        .iter()
        .map(|(h, p)| format!("{h}:{p}"))
        .collect::<Vec<_>>()
        .join(";")
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addr_list_empty() {
        assert!(parse_addr_list(b"").is_empty());
    }

    #[test]
    fn test_parse_addr_list_roundtrips_with_encode() {
        let addrs = vec![("10.0.0.1".to_string(), 5001), ("example.org".to_string(), 5002)];
        let encoded = encode_addr_list(&addrs);
        assert_eq!(parse_addr_list(&encoded), addrs);
    }

    #[test]
    fn test_connect_to_unreachable_port_bumps_failed_attempts() {
        let mut client = PeerClient::new("127.0.0.1", 1);
        assert!(!client.connect());
        assert_eq!(client.failed_attempts, 1);
    }
}
