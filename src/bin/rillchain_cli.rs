// rillchain-cli — RPC control client.

use std::env;

use colored::*;
use rand::Rng;

use rillchain::codec;
use rillchain::crypto::ecdsa;
use rillchain::primitives::transaction::Transaction;
use rillchain::rpc::client::RpcClient;

fn print_usage() {
    println!("{}", "Usage: rillchain-cli HOST PORT <command> [args...]".bright_yellow().bold());
    println!("  {} {}", "❯".bright_black(), "version HOST PORT");
    println!("  {} {}", "❯".bright_black(), "tx HOST PORT priv pub to amount nonce");
    println!("  {} {}", "❯".bright_black(), "randomtxs HOST PORT");
    println!("  {} {}", "❯".bright_black(), "badtx HOST PORT");
    println!("  {} {}", "❯".bright_black(), "balance HOST PORT addr");
    println!("  {} {}", "❯".bright_black(), "genkeys");
}

fn print_keypair() {
    let (pk, sk) = ecdsa::generate_keypair();
    println!("{} {}", "private:".bright_white().bold(), hex::encode(sk.0));
    println!("{} {}", "public: ".bright_white().bold(), hex::encode(pk.0));
}

fn random_keypair_tx() -> Transaction {
    let (from_pk, from_sk) = ecdsa::generate_keypair();
    let (to_pk, _) = ecdsa::generate_keypair();
    let nonce = rand::thread_rng().gen_range(0..10_000);
    let mut tx = Transaction::new(from_pk.0, to_pk.0, 0, nonce);
    tx.sign(&from_sk);
    tx
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.get(1).map(String::as_str) == Some("genkeys") {
        print_keypair();
        return;
    }

    if args.len() < 4 {
        print_usage();
        std::process::exit(1);
    }

    let host = &args[1];
    let port: u16 = match args[2].parse() {
        Ok(p) => p,
        Err(_) => {
            println!("{} invalid port: {}", "[cli]".bright_red().bold(), args[2]);
            std::process::exit(1);
        }
    };
    let command = args[3].as_str();

    let mut client = match RpcClient::connect(host, port) {
        Ok(c) => c,
        Err(e) => {
            println!("{} connect failed: {e}", "[cli]".bright_red().bold());
            std::process::exit(1);
        }
    };

    match command {
        "version" => match client.version() {
            Ok(Some(v)) => println!("{} {v}", "version:".bright_green().bold()),
            _ => println!("{} no response", "[cli]".bright_red().bold()),
        },

        "tx" => {
            if args.len() < 9 {
                println!("{} usage: tx HOST PORT priv pub to amount nonce", "[cli]".bright_red().bold());
                std::process::exit(1);
            }
            let Some((sk, from_pk)) = parse_priv_pub(&args[4], &args[5]) else {
                println!("{} invalid key arguments", "[cli]".bright_red().bold());
                std::process::exit(1);
            };
            let Ok(to_addr) = codec::addr_from_string(&args[6]) else {
                println!("{} invalid 'to' address", "[cli]".bright_red().bold());
                std::process::exit(1);
            };
            let amount: u32 = args[7].parse().unwrap_or(0);
            let nonce: u32 = args[8].parse().unwrap_or(0);
            let mut tx = Transaction::new(from_pk, to_addr, amount, nonce);
            tx.sign(&sk);
            report_tx(&mut client, tx);
        }

        "randomtxs" => {
            let tx = random_keypair_tx();
            report_tx(&mut client, tx);
        }

        "badtx" => {
            let (from_pk, from_sk) = ecdsa::generate_keypair();
            let to_addr = rillchain::crypto::hash::hash_sha256(b"2222");
            let mut to_padded = [0u8; 64];
            to_padded[..32].copy_from_slice(&to_addr);
            let mut tx = Transaction::new(from_pk.0, to_padded, 123, 0);
            // Signs with the wrong key on purpose, to exercise rejection of
            // a forged transaction.
            let (_, wrong_sk) = ecdsa::generate_keypair();
            tx.sign(&wrong_sk);
            let _ = from_sk;
            report_tx(&mut client, tx);
        }

        "balance" => {
            if args.len() < 5 {
                println!("{} usage: balance HOST PORT addr", "[cli]".bright_red().bold());
                std::process::exit(1);
            }
            let Ok(addr) = codec::addr_from_string(&args[4]) else {
                println!("{} invalid address", "[cli]".bright_red().bold());
                std::process::exit(1);
            };
            match client.get_balance(&addr) {
                Ok(Some(bal)) => println!("{} {bal}", "balance:".bright_green().bold()),
                _ => println!("{}", "no balance".bright_yellow()),
            }
        }

        other => {
            println!("{} unrecognized command: {other}", "[cli]".bright_red().bold());
            print_usage();
            std::process::exit(1);
        }
    }
}

fn parse_priv_pub(priv_hex: &str, pub_hex: &str) -> Option<(ecdsa::SecretKey, [u8; 64])> {
    let priv_bytes = hex::decode(priv_hex).ok()?;
    if priv_bytes.len() != ecdsa::PRIVKEY_BYTES {
        return None;
    }
    let mut sk_raw = [0u8; ecdsa::PRIVKEY_BYTES];
    sk_raw.copy_from_slice(&priv_bytes);
    let pub_raw = codec::addr_from_string(pub_hex).ok()?;
    Some((ecdsa::SecretKey(sk_raw), pub_raw))
}

fn report_tx(client: &mut RpcClient, tx: Transaction) {
    match client.add_tx(&tx) {
        Ok(true) => println!("{} {}", "added:".bright_green().bold(), hex::encode(tx.hash())),
        Ok(false) => println!("{} {}", "rejected:".bright_red().bold(), hex::encode(tx.hash())),
        Err(e) => println!("{} {e}", "[cli]".bright_red().bold()),
    }
}
