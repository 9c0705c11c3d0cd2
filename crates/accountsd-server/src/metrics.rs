use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub struct Metrics {
    started: Instant,
    pub rescans_total: AtomicU64,
    pub groups_changed_total: AtomicU64,
    pub mutations_total: AtomicU64,
    pub mutations_failed_total: AtomicU64,
    pub denials_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            rescans_total: AtomicU64::new(0),
            groups_changed_total: AtomicU64::new(0),
            mutations_total: AtomicU64::new(0),
            mutations_failed_total: AtomicU64::new(0),
            denials_total: AtomicU64::new(0),
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn inc_rescans(&self) {
        self.rescans_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_groups_changed(&self, n: u64) {
        self.groups_changed_total.fetch_add(n, Ordering::Relaxed);
    }
    pub fn inc_mutations(&self) {
        self.mutations_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_mutations_failed(&self) {
        self.mutations_failed_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_denials(&self) {
        self.denials_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
