use std::io;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, warn};

use crate::errors::SessionError;

/// Above this many workers, each thread gets its own core.
pub const PIN_THRESHOLD: usize = 10;

/// Worker pools shared by every generation call for the process lifetime.
pub struct ThreadPools {
    pub primary: ThreadPool,
    pub inner: ThreadPool,
    num_threads: usize,
}

impl ThreadPools {
    pub fn new(num_threads: usize) -> Result<Self, SessionError> {
        let primary = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("gen-worker-{}", i))
            .build()
            .map_err(|e| SessionError::Generation(format!("primary pool: {}", e)))?;
        let inner = ThreadPoolBuilder::new()
            .num_threads(1)
            .thread_name(|_| "gen-inner".to_string())
            .build()
            .map_err(|e| SessionError::Generation(format!("inner pool: {}", e)))?;

        Ok(Self {
            primary,
            inner,
            num_threads,
        })
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}

pub trait CorePinner: Sync {
    fn pin_current_thread(&self, core: usize) -> io::Result<()>;
}

/// Pins through the OS scheduler. Linux only; elsewhere every call fails
/// with `Unsupported` and the caller carries on unpinned.
pub struct OsCorePinner;

impl CorePinner for OsCorePinner {
    #[cfg(target_os = "linux")]
    fn pin_current_thread(&self, core: usize) -> io::Result<()> {
        if core >= libc::CPU_SETSIZE as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("core {} outside cpu set", core),
            ));
        }
        // SAFETY: cpu_set_t is plain data; pid 0 targets the calling thread.
        let rc = unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(core, &mut set);
            libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn pin_current_thread(&self, _core: usize) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "thread pinning is only implemented on linux",
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinReport {
    pub main_core: Option<usize>,
    pub pinned_workers: usize,
    pub failures: usize,
}

impl PinReport {
    fn skipped() -> Self {
        Self {
            main_core: None,
            pinned_workers: 0,
            failures: 0,
        }
    }
}

/// One-time setup step, run before the session loop. Changes the affinity
/// of the calling thread and of every primary worker for the rest of the
/// process; there is no undo.
pub fn pin_threads(pools: &ThreadPools, pinner: &dyn CorePinner) -> PinReport {
    let n = pools.num_threads();
    if n <= PIN_THRESHOLD {
        info!("{} threads, leaving affinity to the scheduler", n);
        return PinReport::skipped();
    }

    let mut failures = 0;
    let main_core = n - 1;
    if let Err(e) = pinner.pin_current_thread(main_core) {
        warn!("could not pin main thread to core {}: {}", main_core, e);
        failures += 1;
    }

    let results = pools.primary.broadcast(|ctx| {
        let core = ctx.index();
        pinner
            .pin_current_thread(core)
            .map_err(|e| warn!("could not pin worker {} to core {}: {}", core, core, e))
            .is_ok()
    });
    let pinned_workers = results.iter().filter(|ok| **ok).count();
    failures += results.len() - pinned_workers;

    info!(
        "pinned main thread to core {} and {} workers",
        main_core, pinned_workers
    );

    PinReport {
        main_core: Some(main_core),
        pinned_workers,
        failures,
    }
}
