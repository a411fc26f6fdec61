//! CPU topology: core detection and thread pinning.
//!
//! The scheduler only needs two capabilities from the platform, so they sit
//! behind [`CpuTopology`]. [`SystemTopology`] asks the OS; [`StaticTopology`]
//! reports a fixed core count and treats pinning as a no-op, which keeps pool
//! sizing deterministic in tests and containers.

use crate::error::SchedulerError;
use std::fmt;
use sysinfo::{CpuRefreshKind, System};

/// Platform capability used by the pools at construction.
pub trait CpuTopology: Send + Sync + fmt::Debug {
    /// Number of logical cores available to this process.
    fn logical_cores(&self) -> usize;

    /// Number of cores `pin_current_thread` accepts, numbered from 0.
    fn pinnable_cores(&self) -> usize {
        self.logical_cores()
    }

    /// Binds the calling thread to logical core `core`.
    fn pin_current_thread(&self, core: usize) -> Result<(), SchedulerError>;
}

/// Topology detected from the running system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTopology;

impl SystemTopology {
    pub fn new() -> Self {
        SystemTopology
    }
}

impl CpuTopology for SystemTopology {
    /// Cores in this process's affinity mask, so a cpuset-limited container
    /// reports its allowed set rather than the host's CPUs.
    fn logical_cores(&self) -> usize {
        if let Some(ids) = core_affinity::get_core_ids().filter(|ids| !ids.is_empty()) {
            return ids.len();
        }

        let mut system = System::new();
        system.refresh_cpu_specifics(CpuRefreshKind::everything());
        let detected = system.cpus().len();
        if detected > 0 {
            return detected;
        }

        // Some sandboxes hide /proc/cpuinfo; fall back to the scheduler's view.
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn pinnable_cores(&self) -> usize {
        core_affinity::get_core_ids().map_or(0, |ids| ids.len())
    }

    fn pin_current_thread(&self, core: usize) -> Result<(), SchedulerError> {
        let core_ids = core_affinity::get_core_ids().ok_or_else(|| SchedulerError::PinningFailure {
            core,
            reason: "core ids are not available on this platform".to_string(),
        })?;
        let core_id = core_ids
            .get(core)
            .copied()
            .ok_or_else(|| SchedulerError::PinningFailure {
                core,
                reason: format!("only {} cores are available", core_ids.len()),
            })?;

        if core_affinity::set_for_current(core_id) {
            Ok(())
        } else {
            Err(SchedulerError::PinningFailure {
                core,
                reason: "the operating system rejected the affinity request".to_string(),
            })
        }
    }
}

/// Topology with a fixed core count. Pinning always succeeds and does nothing.
#[derive(Debug, Clone, Copy)]
pub struct StaticTopology {
    cores: usize,
}

impl StaticTopology {
    pub fn new(cores: usize) -> Self {
        StaticTopology { cores }
    }
}

impl CpuTopology for StaticTopology {
    fn logical_cores(&self) -> usize {
        self.cores
    }

    fn pin_current_thread(&self, _core: usize) -> Result<(), SchedulerError> {
        Ok(())
    }
}
