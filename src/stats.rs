use crate::engine::BlockReason;
use crate::validator::{EmailValidationResult, SyntaxStatus};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{self, Duration};
use tracing::info;

const BLOCK_REASONS: [BlockReason; 3] = [
    BlockReason::UserBlocklist,
    BlockReason::GlobalBlocklist,
    BlockReason::GithubDisposable,
];

fn reason_index(reason: BlockReason) -> usize {
    match reason {
        BlockReason::UserBlocklist => 0,
        BlockReason::GlobalBlocklist => 1,
        BlockReason::GithubDisposable => 2,
    }
}

fn reason_name(reason: BlockReason) -> &'static str {
    match reason {
        BlockReason::UserBlocklist => "user_blocklist",
        BlockReason::GlobalBlocklist => "global_blocklist",
        BlockReason::GithubDisposable => "github_disposable",
    }
}

#[derive(Debug)]
pub struct StatsCollector {
    total: AtomicU64,
    valid: AtomicU64,
    invalid_syntax: AtomicU64,
    blocked: AtomicU64,
    disposable: AtomicU64,
    // Indexed by `reason_index`; three reasons, lock-free.
    blocks_by_reason: [AtomicU64; 3],
    total_response_ms: AtomicU64,
    started_at: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasonCount {
    pub reason: &'static str,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_validations: u64,
    pub valid_emails: u64,
    pub invalid_syntax: u64,
    pub blocked_emails: u64,
    pub disposable_emails: u64,
    pub blocks_by_reason: Vec<ReasonCount>,
    pub avg_response_time_ms: f64,
    pub started_at: u64,
}

impl StatsCollector {
    /// Creates a collector. With a non-zero `log_interval_sec` a background
    /// task dumps the counters to the log at that interval.
    pub fn new(log_interval_sec: u64) -> Arc<Self> {
        let stats = Arc::new(Self {
            total: AtomicU64::new(0),
            valid: AtomicU64::new(0),
            invalid_syntax: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            disposable: AtomicU64::new(0),
            blocks_by_reason: [0; 3].map(|_| AtomicU64::new(0)),
            total_response_ms: AtomicU64::new(0),
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        });

        if log_interval_sec > 0 {
            let stats_clone = stats.clone();
            let interval = Duration::from_secs(log_interval_sec);
            tokio::spawn(async move {
                stats_clone.run_logger(interval).await;
            });
        }

        stats
    }

    pub fn record(&self, result: &EmailValidationResult) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.total_response_ms
            .fetch_add(result.response_time_ms, Ordering::Relaxed);

        if result.valid {
            self.valid.fetch_add(1, Ordering::Relaxed);
        }
        if result.disposable {
            self.disposable.fetch_add(1, Ordering::Relaxed);
        }
        if result.blocked {
            self.blocked.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(reason) = result.details.block_reason {
            self.blocks_by_reason[reason_index(reason)].fetch_add(1, Ordering::Relaxed);
        }
        if result.details.syntax == SyntaxStatus::Invalid {
            self.invalid_syntax.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get_snapshot(&self) -> StatsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let total_ms = self.total_response_ms.load(Ordering::Relaxed);

        StatsSnapshot {
            total_validations: total,
            valid_emails: self.valid.load(Ordering::Relaxed),
            invalid_syntax: self.invalid_syntax.load(Ordering::Relaxed),
            blocked_emails: self.blocked.load(Ordering::Relaxed),
            disposable_emails: self.disposable.load(Ordering::Relaxed),
            blocks_by_reason: BLOCK_REASONS
                .iter()
                .map(|&reason| ReasonCount {
                    reason: reason_name(reason),
                    count: self.blocks_by_reason[reason_index(reason)].load(Ordering::Relaxed),
                })
                .collect(),
            avg_response_time_ms: if total > 0 {
                total_ms as f64 / total as f64
            } else {
                0.0
            },
            started_at: self.started_at,
        }
    }

    async fn run_logger(&self, period: Duration) {
        let mut interval = time::interval(period);
        loop {
            interval.tick().await;
            self.dump_stats();
        }
    }

    fn dump_stats(&self) {
        let snapshot = self.get_snapshot();
        let total = snapshot.total_validations;
        let pct = |n: u64| {
            if total > 0 {
                (n as f64 / total as f64) * 100.0
            } else {
                0.0
            }
        };

        let mut block_stats = String::new();
        for item in snapshot.blocks_by_reason.iter().filter(|r| r.count > 0) {
            block_stats.push_str(&format!("[{}: {}] ", item.reason, item.count));
        }

        info!(
            "STATS DUMP: Total: {}, Valid: {} ({:.1}%), Blocked: {} ({:.1}%), InvalidSyntax: {}, AvgLatency: {:.1}ms {}",
            total,
            snapshot.valid_emails,
            pct(snapshot.valid_emails),
            snapshot.blocked_emails,
            pct(snapshot.blocked_emails),
            snapshot.invalid_syntax,
            snapshot.avg_response_time_ms,
            block_stats
        );
    }
}
