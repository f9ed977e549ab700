//! Retention-bounded in-memory log aggregation queried by RPC. Never
//! persists to disk — persistence is the responsibility of services that
//! also write to their own log files.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::debug;

/// One log line pushed by a managed service (or emitted by the supervisor
/// itself about a service).
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub service_name: String,
    pub level: String,
    pub message: String,
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub service_name: Option<String>,
    pub min_level: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

fn level_rank(level: &str) -> u8 {
    match level.to_ascii_lowercase().as_str() {
        "trace" => 0,
        "debug" => 1,
        "info" => 2,
        "warn" | "warning" => 3,
        "error" => 4,
        _ => 2,
    }
}

/// Bounded ring buffer of [`LogEntry`]. `append` is non-blocking: it takes a
/// write lock on an in-memory `VecDeque`, never touches disk.
pub struct LogStore {
    entries: RwLock<VecDeque<LogEntry>>,
    capacity: usize,
    retention_days: u32,
}

const DEFAULT_CAPACITY: usize = 50_000;

impl LogStore {
    pub fn new(retention_days: u32) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(1024)),
            capacity: DEFAULT_CAPACITY,
            retention_days,
        }
    }

    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.entries.write().expect("log store lock poisoned");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn query(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let entries = self.entries.read().expect("log store lock poisoned");
        let min_rank = filter.min_level.as_deref().map(level_rank);
        let mut matched: Vec<LogEntry> = entries
            .iter()
            .filter(|e| {
                filter
                    .service_name
                    .as_deref()
                    .is_none_or(|n| n == e.service_name)
            })
            .filter(|e| min_rank.is_none_or(|min| level_rank(&e.level) >= min))
            .filter(|e| filter.since.is_none_or(|since| e.timestamp >= since))
            .filter(|e| filter.until.is_none_or(|until| e.timestamp <= until))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Evict entries older than `retention_days`. Run by a background sweep
    /// on the same cancellation contract as [`crate::health::HealthMonitor`].
    pub fn evict_expired(&self) {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(self.retention_days));
        let mut entries = self.entries.write().expect("log store lock poisoned");
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired log entries");
        }
    }

    /// Background sweep loop. Exits within one tick of `shutdown` firing.
    pub async fn run(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.evict_expired(),
                _ = shutdown.recv() => {
                    debug!("log store sweep loop shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(service: &str, level: &str, ts: DateTime<Utc>) -> LogEntry {
        LogEntry {
            timestamp: ts,
            service_name: service.to_string(),
            level: level.to_string(),
            message: "hello".to_string(),
            fields: HashMap::new(),
        }
    }

    #[test]
    fn query_filters_by_service_and_level() {
        let store = LogStore::new(7);
        let now = Utc::now();
        store.append(entry("core", "info", now));
        store.append(entry("mesh", "error", now));
        store.append(entry("core", "error", now));

        let filter = LogFilter {
            service_name: Some("core".to_string()),
            min_level: Some("error".to_string()),
            ..Default::default()
        };
        let results = store.query(&filter);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].service_name, "core");
    }

    #[test]
    fn eviction_drops_entries_past_retention() {
        let store = LogStore::new(1);
        let old = Utc::now() - ChronoDuration::days(2);
        store.append(entry("core", "info", old));
        store.append(entry("core", "info", Utc::now()));
        store.evict_expired();
        assert_eq!(store.query(&LogFilter::default()).len(), 1);
    }

    #[test]
    fn ring_buffer_is_bounded() {
        let store = LogStore {
            entries: RwLock::new(VecDeque::new()),
            capacity: 2,
            retention_days: 30,
        };
        store.append(entry("a", "info", Utc::now()));
        store.append(entry("b", "info", Utc::now()));
        store.append(entry("c", "info", Utc::now()));
        let all = store.query(&LogFilter::default());
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].service_name, "b");
    }
}
