//! Reload notification for the scraper process
//!
//! The default notifier scans the process table and sends SIGHUP to every
//! process whose executable path contains the configured name.

use crate::apis::metrics::record_reload_signal;
use std::path::Path;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, Signal, System, UpdateKind};
use tracing::{debug, info, warn};

/// Something that can tell the consumer of the export directory to reload
pub trait ReloadNotifier: Send + Sync {
    fn reload(&self);
}

/// Sends SIGHUP to matching processes
#[derive(Debug, Clone)]
pub struct ProcessSignalNotifier {
    process_name: String,
}

impl ProcessSignalNotifier {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Signal every match; returns the number of successful deliveries
    pub fn signal_matching(&self) -> usize {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_processes(ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet)),
        );
        let own_pid = sysinfo::get_current_pid().ok();

        let mut delivered = 0;
        for (pid, process) in system.processes() {
            if Some(*pid) == own_pid {
                continue;
            }
            let Some(exe) = process.exe() else {
                continue;
            };
            if !exe_matches(exe, &self.process_name) {
                continue;
            }

            if send_hangup(*pid, process.kill_with(Signal::Hangup)) {
                delivered += 1;
            }
        }

        if delivered == 0 {
            debug!(process = %self.process_name, "No process reloaded");
        }
        delivered
    }
}

impl ReloadNotifier for ProcessSignalNotifier {
    fn reload(&self) {
        self.signal_matching();
    }
}

/// Log the outcome of one delivery; failures never stop the scan
fn send_hangup(pid: Pid, outcome: Option<bool>) -> bool {
    match outcome {
        Some(true) => {
            info!(pid = %pid, "Reloaded process");
            record_reload_signal("delivered");
            true
        }
        Some(false) => {
            warn!(pid = %pid, "Failed to deliver reload signal");
            record_reload_signal("failed");
            false
        }
        None => {
            warn!(pid = %pid, "Reload signal not supported on this platform");
            record_reload_signal("failed");
            false
        }
    }
}

/// Substring match on the full executable path
pub fn exe_matches(exe: &Path, process_name: &str) -> bool {
    !process_name.is_empty() && exe.to_string_lossy().contains(process_name)
}
