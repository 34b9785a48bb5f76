// RPC listener: same accept-loop shape as `net::server::PeerServer`, a
// narrower dispatch table.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use socket2::{Domain, Socket, Type};

use crate::chain::Engine;
use crate::codec::{self, ADDR_LEN};
use crate::config;
use crate::log;
use crate::net::protocol::{msg, FramedStream};
use crate::primitives::transaction::Transaction;

const ACCEPT_POLL: Duration = Duration::from_millis(100);

pub struct RpcServer {
    engine: Arc<Engine>,
    port: u16,
    running: Arc<std::sync::atomic::AtomicBool>,
}

impl RpcServer {
    pub fn new(engine: Arc<Engine>, port: u16) -> Self {
        RpcServer { engine, port, running: Arc::new(std::sync::atomic::AtomicBool::new(true)) }
    }

    pub fn stop_handle(&self) -> Arc<std::sync::atomic::AtomicBool> {
        Arc::clone(&self.running)
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

    pub fn run(&self) -> io::Result<()> {
        let listener = self.bind()?;
        log::info("rpc", &format!("listening on port {}", self.port));

        while self.running.load(std::sync::atomic::Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    let engine = Arc::clone(&self.engine);
                    thread::spawn(move || handle_connection(engine, stream, addr));
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

fn handle_connection(engine: Arc<Engine>, stream: TcpStream, addr: SocketAddr) {
    log::info("rpc", &format!("accepted connection: {addr}"));
    let mut framed = FramedStream::new(stream);

    loop {
        let (msg_type, payload) = match framed.recv() {
            Ok(m) => m,
            Err(e) => {
                log::warn("rpc", &format!("connection to {addr} broken: {e}"));
                return;
            }
        };

        if let Err(e) = dispatch(&engine, &mut framed, &msg_type, &payload) {
            log::error("rpc", &format!("unrecognized message type {msg_type:?} from {addr}: {e}"));
            return;
        }
    }
}

fn dispatch(engine: &Arc<Engine>, stream: &mut FramedStream, msg_type: &str, payload: &[u8]) -> io::Result<()> {
    match msg_type {
        msg::VERSION => stream.send(msg::VERSION, &codec::int_to_bytes(config::VERSION)),

        msg::ADD_TX => match Transaction::decode(payload) {
            Ok(tx) if engine.add_transaction(tx) => stream.send(msg::TX_OK, b""),
            _ => stream.send(msg::TX_NO, b""),
        },

        msg::GET_BALANCE => {
            let Some(slice) = payload.get(..ADDR_LEN) else {
                return stream.send(msg::NO_BALANCE, b"");
            };
            let mut addr = [0u8; ADDR_LEN];
            addr.copy_from_slice(slice);
            let balance = engine.get_balance(&addr);
            stream.send(msg::BALANCE, &codec::int_to_bytes(balance))
        }

        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unrecognized message type: {other}"),
        )),
    }
}
