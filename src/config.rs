//! Runtime configuration: environment-variable overrides with safe fallback
//! defaults, no config file and no CLI parser.

/// Default worker-pool size used by [`crate::api::init_from_env`] when
/// `H5CORO_POOL_THREADS` is unset.
pub const DEFAULT_POOL_THREADS: usize = 4;

/// The handful of runtime knobs worth tuning without a recompile: worker
/// pool size and the optional I/O trace log.
#[derive(Debug, Clone)]
pub struct Config {
    pub pool_threads: usize,
    pub io_log: Option<String>,
    pub io_log_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_threads: DEFAULT_POOL_THREADS,
            io_log: None,
            io_log_limit: usize::MAX,
        }
    }
}

impl Config {
    /// Read `H5CORO_POOL_THREADS`, `H5CORO_IO_LOG`, `H5CORO_IO_LOG_LIMIT`
    /// from the environment, falling back to defaults for anything unset or
    /// unparseable — never an error.
    pub fn from_env() -> Self {
        let pool_threads = std::env::var("H5CORO_POOL_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POOL_THREADS);
        let io_log = std::env::var("H5CORO_IO_LOG").ok();
        let io_log_limit = std::env::var("H5CORO_IO_LOG_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(usize::MAX);
        Self {
            pool_threads,
            io_log,
            io_log_limit,
        }
    }
}
