// Inbound half of the peer link: a non-blocking accept loop (via `socket2`
// for SO_REUSEADDR) dispatching each connection's messages to a thread.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use socket2::{Domain, Socket, Type};

use crate::codec::{self, HASH_LEN};
use crate::log;
use crate::net::protocol::{msg, FramedStream};
use crate::node::Node;
use crate::primitives::block::Block;

const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Listens on `port`, accepting one thread-per-connection and dispatching
/// each received message against `node`.
pub struct PeerServer {
    node: Arc<Node>,
    port: u16,
}

impl PeerServer {
    pub fn new(node: Arc<Node>, port: u16) -> Self {
        PeerServer { node, port }
    }

    fn bind(&self) -> io::Result<TcpListener> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }

    /// Runs the accept loop until the node is stopped. Blocks the calling
    /// thread; callers typically spawn this on its own thread.
    pub fn run(&self) -> io::Result<()> {
        let listener = self.bind()?;
        self.node.set_listen_port(self.port);
        log::info("p2p", &format!("listening on port {}", self.port));

        while self.node.is_running() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    let node = Arc::clone(&self.node);
                    thread::spawn(move || handle_connection(node, stream, addr));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn handle_connection(node: Arc<Node>, stream: TcpStream, addr: SocketAddr) {
    log::info("p2p", &format!("accepted connection: {addr}"));
    let mut framed = FramedStream::new(stream);

    loop {
        let (msg_type, payload) = match framed.recv() {
            Ok(m) => m,
            Err(e) => {
                log::warn("p2p", &format!("connection to {addr} broken: {e}"));
                return;
            }
        };

        match dispatch(&node, &mut framed, &msg_type, &payload) {
            Ok(true) => continue,
            Ok(false) => return, // Close/Stop tore the connection down
            Err(e) => {
                log::error("p2p", &format!("unknown message type {msg_type:?} from {addr}: {e}"));
                return;
            }
        }
    }
}

/// Returns `Ok(true)` to keep reading, `Ok(false)` if the connection should
/// end (Close/Stop), or `Err` for an unrecognized message type (fatal).
fn dispatch(node: &Arc<Node>, stream: &mut FramedStream, msg_type: &str, payload: &[u8]) -> io::Result<bool> {
    match msg_type {
        msg::VERSION => {
            let peer_version = codec::bytes_to_int(payload).unwrap_or(0);
            if node.validate_version(peer_version) {
                stream.send(msg::VERSION_OK, &codec::int_to_bytes(node.version))?;
            } else {
                stream.send(msg::VERSION_NO, b"")?;
            }
            Ok(true)
        }

        msg::GET_ADDRS => {
            if let Ok(addr) = std::str::from_utf8(payload) {
                if let Some((host, port)) = addr.rsplit_once(':') {
                    if let Ok(port) = port.parse() {
                        node.add_peer(host.to_string(), port);
                    }
                }
            }
            let addrs = node.peer_addrs();
            stream.send(msg::ADDRS, &crate::net::client::encode_addr_list(&addrs))?;
            Ok(true)
        }

        msg::GET_MEMPOOL => {
            // Mempool entries aren't directly iterable from outside `Engine`
            // yet; report what's in the highest chain's pending set via the
            // engine's own accessor.
            let txs = node.engine.mempool_snapshot();
            let mut out = codec::int_to_bytes(txs.len() as u32).to_vec();
            for tx in &txs {
                if let Some(encoded) = tx.encode() {
                    out.extend_from_slice(&encoded);
                }
            }
            stream.send(msg::MEMPOOL, &out)?;
            Ok(true)
        }

        msg::ADD_BLOCK => {
            match Block::decode(payload) {
                Ok((block, _)) => {
                    node.try_add_block(block);
                }
                Err(e) => log::warn("p2p", &format!("dropped malformed AddBlock payload: {e}")),
            }
            Ok(true)
        }

        msg::SYNC_BLOCKS => {
            let our_height = node.engine.get_height();
            let mut out = codec::int_to_bytes(our_height).to_vec();
            match node.engine.get_highest_chain() {
                Some(chain) => {
                    out.extend_from_slice(&codec::int_to_bytes(chain.len() as u32));
                    for block in &chain {
                        out.extend_from_slice(&block.hash());
                    }
                }
                None => out.extend_from_slice(&codec::int_to_bytes(0)),
            }
            stream.send(msg::HASHES, &out)?;
            Ok(true)
        }

        msg::GET_BLOCKS => {
            let num_hashes = payload.get(..4).and_then(|b| codec::bytes_to_int(b).ok()).unwrap_or(0) as usize;
            let mut blocks = Vec::new();
            let mut off = 4;
            for _ in 0..num_hashes {
                let Some(slice) = payload.get(off..off + HASH_LEN) else { break };
                let mut hash = [0u8; HASH_LEN];
                hash.copy_from_slice(slice);
                off += HASH_LEN;
                if let Some(block) = node.engine.get_block(&hash) {
                    blocks.push(block);
                }
            }
            let mut out = codec::int_to_bytes(blocks.len() as u32).to_vec();
            for block in &blocks {
                if let Some(encoded) = block.encode() {
                    out.extend_from_slice(&encoded);
                }
            }
            stream.send(msg::BLOCKS, &out)?;
            Ok(true)
        }

        msg::CLOSE => {
            if let Ok(addr) = std::str::from_utf8(payload) {
                if let Some((host, port)) = addr.rsplit_once(':') {
                    if let Ok(port) = port.parse() {
                        node.remove_peer(host, port);
                    }
                }
            }
            Ok(false)
        }

        msg::STOP => {
            stream.send(msg::BYE, b"")?;
            node.request_stop();
            Ok(false)
        }

        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unrecognized message type: {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Engine;

    /// Binds to an ephemeral port, reads back what the OS assigned, and
    /// releases it immediately so a `PeerServer` can bind it for real.
    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    #[test]
    fn test_close_message_removes_the_named_peer() {
        let peer_node = Arc::new(Node::new(Arc::new(Engine::new(1, 10)), "127.0.0.1"));
        let peer_port = free_port();
        let peer_server = PeerServer::new(Arc::clone(&peer_node), peer_port);
        thread::spawn(move || peer_server.run());
        thread::sleep(Duration::from_millis(100));

        let node = Arc::new(Node::new(Arc::new(Engine::new(1, 10)), "127.0.0.1"));
        let our_port = free_port();
        let server = PeerServer::new(Arc::clone(&node), our_port);
        thread::spawn(move || server.run());
        thread::sleep(Duration::from_millis(100));

        assert!(node.add_peer("127.0.0.1".to_string(), peer_port));
        assert!(node.peer_addrs().contains(&("127.0.0.1".to_string(), peer_port)));

        let stream = TcpStream::connect(("127.0.0.1", our_port)).unwrap();
        let mut framed = FramedStream::new(stream);
        framed.send(msg::CLOSE, format!("127.0.0.1:{peer_port}").as_bytes()).unwrap();

        thread::sleep(Duration::from_millis(100));
        assert!(!node.peer_addrs().contains(&("127.0.0.1".to_string(), peer_port)));
    }
}
