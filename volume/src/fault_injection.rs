use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;

/// Fault injection state for testing. Flags are toggled in-process by the
/// test harness; a node started from the binary never sets them.
#[derive(Debug, Default)]
pub struct FaultInjector {
    // STORE failures
    pub fail_store_once: AtomicBool,
    pub fail_store_always: AtomicBool,

    // GET failures
    pub fail_get_once: AtomicBool,
    pub fail_get_always: AtomicBool,

    // DELETE failures
    pub fail_delete_once: AtomicBool,
    pub fail_delete_always: AtomicBool,

    // GET returns damaged bytes under the original checksum
    pub corrupt_get_once: AtomicBool,
    pub corrupt_get_always: AtomicBool,

    // Latency injection
    pub inject_latency_ms: AtomicU64,
}

fn take(once: &AtomicBool, always: &AtomicBool) -> bool {
    if always.load(Ordering::Relaxed) {
        return true;
    }
    once.swap(false, Ordering::Relaxed)
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_fail_store(&self) -> bool {
        take(&self.fail_store_once, &self.fail_store_always)
    }

    pub fn should_fail_get(&self) -> bool {
        take(&self.fail_get_once, &self.fail_get_always)
    }

    pub fn should_fail_delete(&self) -> bool {
        take(&self.fail_delete_once, &self.fail_delete_always)
    }

    pub fn should_corrupt_get(&self) -> bool {
        take(&self.corrupt_get_once, &self.corrupt_get_always)
    }

    pub fn set_latency_ms(&self, ms: u64) {
        self.inject_latency_ms.store(ms, Ordering::Relaxed);
    }

    pub async fn apply_latency(&self) {
        let ms = self.inject_latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Reset all fault injection flags
    pub fn reset(&self) {
        for flag in [
            &self.fail_store_once,
            &self.fail_store_always,
            &self.fail_get_once,
            &self.fail_get_always,
            &self.fail_delete_once,
            &self.fail_delete_always,
            &self.corrupt_get_once,
            &self.corrupt_get_always,
        ] {
            flag.store(false, Ordering::Relaxed);
        }
        self.inject_latency_ms.store(0, Ordering::Relaxed);
    }
}
