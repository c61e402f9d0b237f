use std::{future::Future, io};

#[cfg(target_os = "linux")]
use monoio::{utils::detect_uring, IoUringDriver};
use monoio::{time::TimeDriver, LegacyDriver, Runtime, RuntimeBuilder};
#[cfg(target_os = "linux")]
use servolake_core::config::MIN_SQPOLL_IDLE_TIME;
use servolake_core::config::{RuntimeConfig, RuntimeType};

/// One worker's event loop: io_uring when the kernel has it, epoll/kqueue otherwise.
pub enum RuntimeWrapper {
    #[cfg(target_os = "linux")]
    IoUring(Runtime<TimeDriver<IoUringDriver>>),
    Legacy(Runtime<TimeDriver<LegacyDriver>>),
}

impl TryFrom<&RuntimeConfig> for RuntimeWrapper {
    type Error = io::Error;

    fn try_from(config: &RuntimeConfig) -> io::Result<Self> {
        #[cfg(target_os = "linux")]
        let runtime_type = if config.runtime_type == RuntimeType::IoUring && detect_uring() {
            RuntimeType::IoUring
        } else {
            RuntimeType::Legacy
        };
        #[cfg(not(target_os = "linux"))]
        let runtime_type = RuntimeType::Legacy;

        match runtime_type {
            #[cfg(target_os = "linux")]
            RuntimeType::IoUring => {
                let builder = match config.sqpoll_idle {
                    Some(idle) => {
                        let builder = RuntimeBuilder::<IoUringDriver>::new();
                        let idle = MIN_SQPOLL_IDLE_TIME.max(idle);
                        let mut uring_builder = io_uring::IoUring::builder();
                        uring_builder.setup_sqpoll(idle);
                        builder.uring_builder(uring_builder)
                    }
                    None => RuntimeBuilder::<IoUringDriver>::new(),
                };
                let runtime = builder
                    .enable_timer()
                    .with_entries(config.entries)
                    .build()?;
                Ok(RuntimeWrapper::IoUring(runtime))
            }
            RuntimeType::Legacy => {
                let runtime = RuntimeBuilder::<LegacyDriver>::new()
                    .enable_timer()
                    .with_entries(config.entries)
                    .build()?;
                Ok(RuntimeWrapper::Legacy(runtime))
            }
        }
    }
}

impl RuntimeWrapper {
    pub fn block_on<F>(&mut self, future: F) -> F::Output
    where
        F: Future,
    {
        match self {
            #[cfg(target_os = "linux")]
            RuntimeWrapper::IoUring(driver) => driver.block_on(future),
            RuntimeWrapper::Legacy(driver) => driver.block_on(future),
        }
    }

    pub fn kind(&self) -> RuntimeType {
        match self {
            #[cfg(target_os = "linux")]
            RuntimeWrapper::IoUring(_) => RuntimeType::IoUring,
            RuntimeWrapper::Legacy(_) => RuntimeType::Legacy,
        }
    }
}
