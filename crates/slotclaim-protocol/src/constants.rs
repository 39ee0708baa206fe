/// JSON-RPC version string used on the control socket.
pub const JSONRPC_VERSION: &str = "2.0";

/// Delay between consecutive scout polls inside one discovery pass.
pub const DEFAULT_STAGGER_INTERVAL_MS: u64 = 1_000;

/// Pause between two attempts of the inner scan loop.
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 2_500;

/// Pause between two outer cycles.
pub const DEFAULT_ROUND_COOLDOWN_MS: u64 = 3_000;

/// Server-side processing time after `start_action`.
pub const DEFAULT_ACTION_SETTLE_MS: u64 = 8_000;

/// Pause after a successful join before configuring.
pub const DEFAULT_JOIN_SETTLE_MS: u64 = 500;

/// Pause between disconnect and connect during a reconnect.
pub const DEFAULT_RECONNECT_SETTLE_MS: u64 = 1_000;

/// Delay between consecutive scout connects.
pub const DEFAULT_SCOUT_CONNECT_STAGGER_MS: u64 = 500;

/// Penalty sleep after an unexpected error inside a cycle.
pub const DEFAULT_ERROR_PENALTY_MS: u64 = 5_000;

/// Timeout for ordinary requests (quota, configuration, join).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Timeout for `list_candidates`.
pub const DEFAULT_LIST_TIMEOUT_MS: u64 = 5_000;

/// Timeout for `commit_configuration` and `start_action`.
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 15_000;

/// Interval for automatic keep-alives on unmanaged connections.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Upper bound on attempts of the inner scan loop.
pub const DEFAULT_MAX_SCAN_ATTEMPTS: u32 = 20;

/// Failed claims after which a target is permanently excluded.
pub const DEFAULT_BLACKLIST_THRESHOLD: u32 = 2;

/// Rank values that carry no reward and are never claimed.
pub const DEFAULT_DISALLOWED_RANKS: [i64; 5] = [-1, 3, 6, 9, 12];

/// How long a resolved identity credential stays valid in the cache.
pub const CREDENTIAL_TTL_SECS: i64 = 86_400; // 24 hours

/// Reply suffixes stripped before falling back to command-name correlation.
pub const REPLY_SUFFIXES: [&str; 3] = ["_reply", "_ack", "_resp"];

/// Join error fragments meaning the claimant already holds the target.
pub const ALREADY_JOINED_MARKERS: [&str; 3] =
    ["already in that room", "already joined", "already a member"];

/// Maximum number of entries kept in the operator event log.
pub const EVENT_LOG_CAPACITY: usize = 1_000;
