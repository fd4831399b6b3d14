//! Cached identity of the foreign process.

use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info};

/// Process table queries used to resolve the target's pid.
pub trait ProcessLookup: Send + Sync {
    /// First running process whose name matches (case-insensitive).
    fn find_by_name(&self, name: &str) -> Option<u32>;

    fn is_alive(&self, pid: u32) -> bool;
}

/// [`ProcessLookup`] backed by the `sysinfo` process table.
#[derive(Debug, Default)]
pub struct SysinfoLookup;

impl ProcessLookup for SysinfoLookup {
    fn find_by_name(&self, name: &str) -> Option<u32> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let wanted = name.to_lowercase();
        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, p)| p.name().to_string_lossy().to_lowercase() == wanted)
            .map(|(pid, _)| pid.as_u32())
            .collect();
        // Helpers share the name prefix but not the exact name; among exact matches the
        // oldest (lowest pid) is the main app process.
        pids.sort_unstable();
        pids.into_iter().next()
    }

    fn is_alive(&self, pid: u32) -> bool {
        let mut system = System::new();
        let pid = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).is_some()
    }
}

/// Pid of the target resolved once and reused until the process is found to have exited.
pub struct ProcessCache {
    process_name: String,
    lookup: Box<dyn ProcessLookup>,
    pid: Mutex<Option<u32>>,
}

impl ProcessCache {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self::with_lookup(process_name, Box::new(SysinfoLookup))
    }

    pub fn with_lookup(process_name: impl Into<String>, lookup: Box<dyn ProcessLookup>) -> Self {
        Self {
            process_name: process_name.into(),
            lookup,
            pid: Mutex::new(None),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Current pid of the target, resolving it if nothing is cached or the cached process
    /// has exited.
    pub fn pid(&self) -> Option<u32> {
        let mut cached = self.pid.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pid) = *cached {
            if self.lookup.is_alive(pid) {
                return Some(pid);
            }
            info!(pid, process = %self.process_name, "Cached process exited, re-resolving");
            *cached = None;
        }

        let resolved = self.lookup.find_by_name(&self.process_name);
        debug!(pid = ?resolved, process = %self.process_name, "Resolved process id");
        *cached = resolved;
        resolved
    }

    pub fn invalidate(&self) {
        let mut cached = self.pid.lock().unwrap_or_else(|e| e.into_inner());
        *cached = None;
    }
}

impl std::fmt::Debug for ProcessCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessCache")
            .field("process_name", &self.process_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeLookup {
        current: Arc<AtomicU32>,
        lookups: Arc<AtomicUsize>,
    }

    impl ProcessLookup for FakeLookup {
        fn find_by_name(&self, _name: &str) -> Option<u32> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            match self.current.load(Ordering::SeqCst) {
                0 => None,
                pid => Some(pid),
            }
        }

        fn is_alive(&self, pid: u32) -> bool {
            self.current.load(Ordering::SeqCst) == pid
        }
    }

    fn cache() -> (ProcessCache, Arc<AtomicU32>, Arc<AtomicUsize>) {
        let current = Arc::new(AtomicU32::new(0));
        let lookups = Arc::new(AtomicUsize::new(0));
        let cache = ProcessCache::with_lookup(
            "WhatsApp",
            Box::new(FakeLookup {
                current: current.clone(),
                lookups: lookups.clone(),
            }),
        );
        (cache, current, lookups)
    }

    #[test]
    fn test_resolves_once_while_alive() {
        let (cache, current, lookups) = cache();
        current.store(100, Ordering::SeqCst);

        assert_eq!(cache.pid(), Some(100));
        assert_eq!(cache.pid(), Some(100));
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_restart_triggers_re_resolution() {
        let (cache, current, lookups) = cache();
        current.store(100, Ordering::SeqCst);
        assert_eq!(cache.pid(), Some(100));

        current.store(200, Ordering::SeqCst);
        assert_eq!(cache.pid(), Some(200));
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_process() {
        let (cache, _current, _lookups) = cache();
        assert_eq!(cache.pid(), None);
    }

    #[test]
    fn test_invalidate_forces_lookup() {
        let (cache, current, lookups) = cache();
        current.store(7, Ordering::SeqCst);
        cache.pid();
        cache.invalidate();
        cache.pid();
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }
}
