// Outbound RPC client used by `rillchain-cli`.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::codec::{self, ADDR_LEN};
use crate::config;
use crate::net::protocol::{msg, FramedStream};
use crate::primitives::transaction::Transaction;

pub struct RpcClient {
    stream: FramedStream,
}

impl RpcClient {
    pub fn connect(host: &str, port: u16) -> std::io::Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no address"))?;
        let stream = TcpStream::connect_timeout(&addr, Duration::from_millis(config::CONNECT_TIMEOUT_MS))?;
        Ok(RpcClient { stream: FramedStream::new(stream) })
    }

    pub fn version(&mut self) -> std::io::Result<Option<u32>> {
        self.stream.send(msg::VERSION, b"")?;
        let (msg_type, payload) = self.stream.recv()?;
        Ok(if msg_type == msg::VERSION { codec::bytes_to_int(&payload).ok() } else { None })
    }

    pub fn add_tx(&mut self, tx: &Transaction) -> std::io::Result<bool> {
        let Some(encoded) = tx.encode() else { return Ok(false) };
        self.stream.send(msg::ADD_TX, &encoded)?;
        let (msg_type, _) = self.stream.recv()?;
        Ok(msg_type == msg::TX_OK)
    }

    pub fn get_balance(&mut self, addr: &[u8; ADDR_LEN]) -> std::io::Result<Option<u32>> {
        self.stream.send(msg::GET_BALANCE, addr)?;
        let (msg_type, payload) = self.stream.recv()?;
        if msg_type == msg::BALANCE {
            Ok(codec::bytes_to_int(&payload).ok())
        } else {
            Ok(None)
        }
    }
}
