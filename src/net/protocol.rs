// Wire framing: every message on the wire is
//   msg_type (12 ASCII bytes, right-padded with spaces) || payload_len (4 BE bytes) || payload
// Decoding trims trailing whitespace from `msg_type`. A read or write that
// returns 0 bytes is treated as a fatal broken-connection error.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};

use crate::codec::MSGTYPE_LEN;

/// Message-type tags for the peer-to-peer and RPC catalogs.
pub mod msg {
    pub const VERSION: &str = "Version";
    pub const VERSION_OK: &str = "VersionOK";
    pub const VERSION_NO: &str = "VersionNO";
    pub const GET_ADDRS: &str = "GetAddrs";
    pub const ADDRS: &str = "Addrs";
    pub const GET_MEMPOOL: &str = "GetMempool";
    pub const MEMPOOL: &str = "Mempool";
    pub const ADD_BLOCK: &str = "AddBlock";
    pub const SYNC_BLOCKS: &str = "SyncBlocks";
    pub const HASHES: &str = "Hashes";
    pub const GET_BLOCKS: &str = "GetBlocks";
    pub const BLOCKS: &str = "Blocks";
    pub const CLOSE: &str = "Close";
    pub const STOP: &str = "Stop";
    pub const BYE: &str = "Bye!";
    pub const ADD_TX: &str = "AddTx";
    pub const TX_OK: &str = "TxOK";
    pub const TX_NO: &str = "TxNO";
    pub const GET_BALANCE: &str = "GetBalance";
    pub const BALANCE: &str = "Balance";
    pub const NO_BALANCE: &str = "NoBalance";
}

fn broken(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, format!("socket connection broken ({what})"))
}

/// A blocking, length-prefixed message stream over a `TcpStream`.
pub struct FramedStream {
    stream: TcpStream,
}

impl FramedStream {
    pub fn new(stream: TcpStream) -> Self {
        FramedStream { stream }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn try_clone(&self) -> io::Result<FramedStream> {
        Ok(FramedStream { stream: self.stream.try_clone()? })
    }

    /// Sends `msg_type` (truncated/space-padded to `MSGTYPE_LEN` bytes)
    /// followed by `payload`, retrying partial writes.
    pub fn send(&mut self, msg_type: &str, payload: &[u8]) -> io::Result<()> {
        let mut frame = Vec::with_capacity(MSGTYPE_LEN + 4 + payload.len());
        let mut type_bytes = msg_type.as_bytes().to_vec();
        type_bytes.truncate(MSGTYPE_LEN);
        type_bytes.resize(MSGTYPE_LEN, b' ');
        frame.extend_from_slice(&type_bytes);
        frame.extend_from_slice(&crate::codec::int_to_bytes(payload.len() as u32));
        frame.extend_from_slice(payload);
        self.write_all_checked(&frame)
    }

    /// Receives one frame, returning `(trimmed msg_type, payload)`.
    pub fn recv(&mut self) -> io::Result<(String, Vec<u8>)> {
        let mut header = [0u8; MSGTYPE_LEN + 4];
        self.read_exact_checked(&mut header)?;
        let msg_type = String::from_utf8_lossy(&header[..MSGTYPE_LEN]).trim_end().to_string();
        let payload_len = crate::codec::bytes_to_int(&header[MSGTYPE_LEN..])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))? as usize;

        let mut payload = vec![0u8; payload_len];
        if payload_len > 0 {
            self.read_exact_checked(&mut payload)?;
        }
        Ok((msg_type, payload))
    }

    fn write_all_checked(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = self.stream.write(buf)?;
            if n == 0 {
                return Err(broken("send"));
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    fn read_exact_checked(&mut self, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = self.stream.read(buf)?;
            if n == 0 {
                return Err(broken("receive"));
            }
            buf = &mut buf[n..];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn pair() -> (FramedStream, FramedStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            FramedStream::new(stream)
        });
        let client = FramedStream::new(TcpStream::connect(addr).unwrap());
        (client, server.join().unwrap())
    }

    #[test]
    fn test_send_recv_roundtrip() {
        let (mut a, mut b) = pair();
        a.send(msg::VERSION, &crate::codec::int_to_bytes(7)).unwrap();
        let (msg_type, payload) = b.recv().unwrap();
        assert_eq!(msg_type, "Version");
        assert_eq!(crate::codec::bytes_to_int(&payload).unwrap(), 7);
    }

    #[test]
    fn test_msg_type_is_trimmed_of_padding() {
        let (mut a, mut b) = pair();
        a.send("Close", b"").unwrap();
        let (msg_type, payload) = b.recv().unwrap();
        assert_eq!(msg_type, "Close");
        assert!(payload.is_empty());
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let (mut a, mut b) = pair();
        a.send(msg::GET_ADDRS, b"").unwrap();
        let (msg_type, payload) = b.recv().unwrap();
        assert_eq!(msg_type, "GetAddrs");
        assert!(payload.is_empty());
    }

    #[test]
    fn test_recv_on_closed_socket_is_broken_connection_error() {
        let (a, mut b) = pair();
        drop(a);
        let err = b.recv().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_long_msg_type_truncated_to_twelve_bytes() {
        let (mut a, mut b) = pair();
        a.send("ThisTypeNameIsTooLongForTheField", b"").unwrap();
        let (msg_type, _) = b.recv().unwrap();
        assert_eq!(msg_type.len(), MSGTYPE_LEN);
    }
}
