mod load_style;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::err::SqliteServerError;

pub use load_style::Format;

/// The seven literal tunables from spec §6's "Environment / JVM properties"
/// table, each overridable by an environment variable named after the
/// spec-literal property with dots replaced by underscores and upper-cased
/// (e.g. `org.sqlite.server.worker.ioRatio` -> `ORG_SQLITE_SERVER_WORKER_IO_RATIO`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerTunables {
    /// Share (1-100) of post-I/O time budgeted to queue processing (§4.5 step 4).
    pub io_ratio: u8,
    /// Minimum re-poll wait, in ms, for a busy processor that is ready but not
    /// sleepable while the write lock is still held elsewhere (§4.5 step 2).
    pub busy_min_wait_ms: u64,
}

impl Default for WorkerTunables {
    fn default() -> Self {
        WorkerTunables { io_ratio: 50, busy_min_wait_ms: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorTunables {
    pub init_read_buffer: usize,
    pub max_read_buffer: usize,
    pub max_write_times: usize,
    pub max_write_queue: usize,
    pub max_write_buffer: usize,
}

impl Default for ProcessorTunables {
    fn default() -> Self {
        ProcessorTunables {
            init_read_buffer: 4096,
            max_read_buffer: 65536,
            max_write_times: 1024,
            max_write_queue: 1024,
            max_write_buffer: 4096,
        }
    }
}

/// Per-state idle timeouts swept by the worker's idle-check pass (§4.5 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleTimeouts {
    pub auth_ms: i64,
    pub sleep_ms: i64,
    pub sleep_in_tx_ms: i64,
}

impl Default for IdleTimeouts {
    fn default() -> Self {
        IdleTimeouts { auth_ms: 15_000, sleep_ms: 8 * 60 * 60 * 1000, sleep_in_tx_ms: 5 * 60 * 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub worker_count: usize,
    pub max_conns: usize,
    /// 0 = surface busy immediately, < 0 = wait on the write lock forever (§8).
    pub busy_timeout_ms: i64,
    pub worker: WorkerTunables,
    pub processor: ProcessorTunables,
    pub idle: IdleTimeouts,
    pub trace: bool,
    pub trace_error: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            data_dir: PathBuf::from("."),
            host: "0.0.0.0".to_string(),
            port: 3306,
            worker_count: 4,
            max_conns: 512,
            busy_timeout_ms: 50_000,
            worker: WorkerTunables::default(),
            processor: ProcessorTunables::default(),
            idle: IdleTimeouts::default(),
            trace: false,
            trace_error: false,
        }
    }
}

impl ServerConfig {
    /// Reads an optional TOML config file, then layers environment-variable
    /// overrides on top, mirroring the teacher's `read_config` + `merge`
    /// precedence (`binlog_cli/src/main.rs`). CLI flags are layered by the
    /// caller afterward since they take the highest precedence.
    pub fn load(path: Option<&Path>) -> Result<Self, SqliteServerError> {
        let mut config = match path {
            Some(p) => {
                let text = fs::read_to_string(p).map_err(SqliteServerError::Io)?;
                toml::from_str(&text).map_err(|e| SqliteServerError::Config(e.to_string()))?
            }
            None => ServerConfig::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_usize("ORG_SQLITE_SERVER_WORKER_COUNT") {
            self.worker_count = v;
        }
        if let Some(v) = env_usize("ORG_SQLITE_SERVER_MAX_CONNS") {
            self.max_conns = v;
        }
        if let Some(v) = env_u8("ORG_SQLITE_SERVER_WORKER_IO_RATIO") {
            self.worker.io_ratio = v;
        }
        if let Some(v) = env_u64("ORG_SQLITE_SERVER_WORKER_BUSY_MIN_WAIT") {
            self.worker.busy_min_wait_ms = v;
        }
        if let Some(v) = env_usize("ORG_SQLITE_SERVER_PROCESSOR_INIT_READ_BUFFER") {
            self.processor.init_read_buffer = v;
        }
        if let Some(v) = env_usize("ORG_SQLITE_SERVER_PROCESSOR_MAX_READ_BUFFER") {
            self.processor.max_read_buffer = v;
        }
        if let Some(v) = env_usize("ORG_SQLITE_SERVER_PROCESSOR_MAX_WRITE_TIMES") {
            self.processor.max_write_times = v;
        }
        if let Some(v) = env_usize("ORG_SQLITE_SERVER_PROCESSOR_MAX_WRITE_QUEUE") {
            self.processor.max_write_queue = v;
        }
        if let Some(v) = env_usize("ORG_SQLITE_SERVER_PROCESSOR_MAX_WRITE_BUFFER") {
            self.processor.max_write_buffer = v;
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u8(name: &str) -> Option<u8> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_spec_literal_values() {
        let config = ServerConfig::default();
        assert_eq!(config.worker.io_ratio, 50);
        assert_eq!(config.worker.busy_min_wait_ms, 100);
        assert_eq!(config.processor.init_read_buffer, 4096);
        assert_eq!(config.processor.max_read_buffer, 65536);
        assert_eq!(config.processor.max_write_times, 1024);
    }

    #[test]
    fn env_override_applies_on_top_of_defaults() {
        env::set_var("ORG_SQLITE_SERVER_WORKER_IO_RATIO", "75");
        let mut config = ServerConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.worker.io_ratio, 75);
        env::remove_var("ORG_SQLITE_SERVER_WORKER_IO_RATIO");
    }
}
