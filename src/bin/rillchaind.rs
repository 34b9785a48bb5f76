// rillchaind — the node daemon: server, optional RPC, optional mining.

use std::env;
use std::sync::Arc;

use colored::*;

use rillchain::chain::Engine;
use rillchain::codec;
use rillchain::config;
use rillchain::crypto::ecdsa;
use rillchain::log;
use rillchain::net::server::PeerServer;
use rillchain::node::coordinator::Coordinator;
use rillchain::node::Node;
use rillchain::rpc::server::RpcServer;

fn banner() {
    println!("{}", " rillchain ".on_bright_blue().black().bold());
    println!("{}", " a proof-of-work, account-based peer-to-peer ledger ".bright_cyan());
    println!();
}

fn print_usage() {
    println!("{}", "Usage:".bright_yellow().bold());
    println!("  {} {}", "rillchaind".bright_green(), "");
    println!("  {} {}", "rillchaind".bright_green(), "help");
    println!("  {} {}", "rillchaind".bright_green(), "genkeys");
    println!("  {} {}", "rillchaind".bright_green(), "rpc [port] [rpc_port]");
    println!("  {} {}", "rillchaind".bright_green(), "miner [priv_key_hex pub_key_hex] [port]");
}

fn print_keypair() {
    let (pk, sk) = ecdsa::generate_keypair();
    println!("{} {}", "private:".bright_white().bold(), hex::encode(sk.0));
    println!("{} {}", "public: ".bright_white().bold(), hex::encode(pk.0));
}

fn run_node(p2p_port: u16, rpc_port: Option<u16>, miner: Option<(ecdsa::PublicKey, ecdsa::SecretKey)>) {
    banner();

    let engine = Arc::new(Engine::new(config::difficulty(), config::reward()));
    let hostname = hostname();
    let node = Arc::new(Node::new(Arc::clone(&engine), hostname));

    let peer_server = PeerServer::new(Arc::clone(&node), p2p_port);
    let peer_node = Arc::clone(&node);
    std::thread::spawn(move || {
        if let Err(e) = peer_server.run() {
            log::error("p2p", &format!("server error: {e}"));
        }
        peer_node.request_stop();
    });

    if let Some(rpc_port) = rpc_port {
        let rpc_server = RpcServer::new(Arc::clone(&engine), rpc_port);
        std::thread::spawn(move || {
            if let Err(e) = rpc_server.run() {
                log::error("rpc", &format!("server error: {e}"));
            }
        });
    }

    let mut coordinator = Coordinator::new(Arc::clone(&node));
    if let Some((pk, sk)) = miner {
        log::info("mine", &format!("mining to address {}", hex::encode(pk.0)));
        coordinator = coordinator.with_miner(pk.0, sk);
    }

    coordinator.run();
}

fn hostname() -> String {
    std::process::Command::new("hostname")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn parse_keypair(priv_hex: &str, pub_hex: &str) -> Option<(ecdsa::PublicKey, ecdsa::SecretKey)> {
    let priv_bytes = hex::decode(priv_hex).ok()?;
    if priv_bytes.len() != ecdsa::PRIVKEY_BYTES {
        return None;
    }
    let mut sk_raw = [0u8; ecdsa::PRIVKEY_BYTES];
    sk_raw.copy_from_slice(&priv_bytes);
    let pub_raw = codec::addr_from_string(pub_hex).ok()?;
    Some((ecdsa::PublicKey(pub_raw), ecdsa::SecretKey(sk_raw)))
}

fn main() {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        None => run_node(config::DEFAULT_P2P_PORT, None, None),

        Some("help") => {
            print_usage();
            std::process::exit(1);
        }

        Some("genkeys") => print_keypair(),

        Some("rpc") => {
            let p2p_port = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(config::DEFAULT_RPC_SERVER_PORT);
            let rpc_port = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(config::DEFAULT_RPC_CONTROL_PORT);
            run_node(p2p_port, Some(rpc_port), None);
        }

        Some("miner") => {
            let (keypair, port_arg_index) = match (args.get(2), args.get(3)) {
                (Some(priv_hex), Some(pub_hex)) => match parse_keypair(priv_hex, pub_hex) {
                    Some(kp) => (kp, 4),
                    None => {
                        log::error("init", "invalid miner key arguments");
                        std::process::exit(1);
                    }
                },
                _ => (ecdsa::generate_keypair(), 2),
            };
            let port = args.get(port_arg_index).and_then(|s| s.parse().ok()).unwrap_or(config::DEFAULT_MINER_PORT);
            run_node(port, None, Some(keypair));
        }

        Some(other) => {
            log::error("init", &format!("unrecognized command: {other}"));
            print_usage();
            std::process::exit(1);
        }
    }
}
