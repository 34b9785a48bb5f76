// Node-wide defaults, each overridable via a `RILLCHAIN_<NAME>` environment
// variable.

/// Protocol version advertised in the `Version` handshake.
pub const VERSION: u32 = 1;

/// Default P2P listen port for a plain `rillchaind` run (no subcommand).
pub const DEFAULT_P2P_PORT: u16 = 5003;
/// Default P2P port for the `rpc` subcommand.
pub const DEFAULT_RPC_SERVER_PORT: u16 = 5001;
/// Default RPC control-plane port for the `rpc` subcommand.
pub const DEFAULT_RPC_CONTROL_PORT: u16 = 4001;
/// Default P2P port for the `miner` subcommand.
pub const DEFAULT_MINER_PORT: u16 = 5002;

/// Peer cap. A fixed upper bound for now; raising it or making it dynamic
/// is future work.
pub const NUM_PEERS: usize = 5;
/// Consecutive failed connect attempts before a peer is dropped.
pub const PEER_FAILURE_LIMIT: u32 = 3;
/// Outbound connect timeout.
pub const CONNECT_TIMEOUT_MS: u64 = 500;
/// Mempool entry age-out threshold (1 hour).
pub const MEMPOOL_TTL_SECS: u64 = 3600;

/// `Engine::difficulty` default — number of leading zero nibbles a block
/// hash must have.
pub const DEFAULT_DIFFICULTY: usize = 1;
/// `Engine::reward` default — coins minted by the reward transaction of a
/// newly mined block.
pub const DEFAULT_REWARD: u32 = 10;
/// Max non-reward transactions mined into a single block.
pub const MAX_TX_PER_BLOCK: usize = 10;

/// Coordinator main-loop timer periods.
pub const UPDATE_PEERS_SECS: u64 = 5;
pub const UPDATE_MEMPOOL_SECS: u64 = 1;
pub const CLEAN_MEMPOOL_SECS: u64 = 60;
pub const SYNC_BLOCKS_SECS: u64 = 10;
pub const MAIN_LOOP_MILLIS: u64 = 100;

/// Bootstrap list consulted when a node's peer set is empty.
pub const INITIAL_ADDRS: &[(&str, u16)] = &[("PORTO", 5001)];

/// Reads `RILLCHAIN_<NAME>` and parses it as `T`, falling back to `default`.
pub fn env_override<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(format!("RILLCHAIN_{name}"))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// `RILLCHAIN_DIFFICULTY`, falling back to [`DEFAULT_DIFFICULTY`].
pub fn difficulty() -> usize {
    env_override("DIFFICULTY", DEFAULT_DIFFICULTY)
}

/// `RILLCHAIN_REWARD`, falling back to [`DEFAULT_REWARD`].
pub fn reward() -> u32 {
    env_override("REWARD", DEFAULT_REWARD)
}

/// `RILLCHAIN_INITIAL_ADDRS` as a `host:port,host:port` list, falling back
/// to [`INITIAL_ADDRS`].
pub fn initial_addrs() -> Vec<(String, u16)> {
    match std::env::var("RILLCHAIN_INITIAL_ADDRS") {
        Ok(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .filter_map(|entry| {
                let (host, port) = entry.trim().rsplit_once(':')?;
                Some((host.to_string(), port.parse().ok()?))
            })
            .collect(),
        _ => INITIAL_ADDRS.iter().map(|(h, p)| (h.to_string(), *p)).collect(),
    }
}
