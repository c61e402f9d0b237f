//! Settings shared by the server binary and the connection services.
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::wire::DEFAULT_MAX_MESSAGE_SIZE;

mod parsers;

pub use parsers::{parse, ConfigFormat};

// Default io_uring/epoll entries: 32k
const DEFAULT_ENTRIES: u32 = 32768;
const DEFAULT_WARN_DISPATCH: u32 = 1;
const DEFAULT_POOL_CAPACITY: usize = 8;

pub const MIN_SQPOLL_IDLE_TIME: u32 = 1000; // 1s idle time.
pub const FALLBACK_PARALLELISM: NonZeroUsize = NonZeroUsize::MIN;

macro_rules! define_const {
    ($name: ident, $val: expr, $type: ty) => {
        const fn $name() -> $type {
            $val
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default = "default_workers")]
    pub worker_threads: usize,
    #[serde(default = "default_entries")]
    pub entries: u32,
    pub sqpoll_idle: Option<u32>,
    #[serde(default)]
    pub runtime_type: RuntimeType,
    #[serde(default = "default_cpu_affinity")]
    pub cpu_affinity: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            worker_threads: default_workers(),
            entries: default_entries(),
            sqpoll_idle: None,
            runtime_type: Default::default(),
            cpu_affinity: default_cpu_affinity(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .unwrap_or(FALLBACK_PARALLELISM)
        .into()
}

define_const!(default_entries, DEFAULT_ENTRIES, u32);
define_const!(default_cpu_affinity, true, bool);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeType {
    #[cfg(target_os = "linux")]
    IoUring,
    Legacy,
}

impl Default for RuntimeType {
    #[cfg(target_os = "linux")]
    fn default() -> Self {
        Self::IoUring
    }
    #[cfg(not(target_os = "linux"))]
    fn default() -> Self {
        Self::Legacy
    }
}

/// Dispatch behaviour.
///
/// `warn_dispatch` controls fault logging: above 0 unclassified faults are logged as
/// warnings, above 1 routing failures are too.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchConfig {
    #[serde(default = "default_warn_dispatch")]
    pub warn_dispatch: u32,
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            warn_dispatch: default_warn_dispatch(),
            pool_capacity: default_pool_capacity(),
            max_message_size: default_max_message_size(),
        }
    }
}

define_const!(default_warn_dispatch, DEFAULT_WARN_DISPATCH, u32);
define_const!(default_pool_capacity, DEFAULT_POOL_CAPACITY, usize);
define_const!(default_max_message_size, DEFAULT_MAX_MESSAGE_SIZE, usize);
