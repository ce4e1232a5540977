use std::{future::Future, time::Duration};

use serde::Serialize;
use tokio::time::Instant;

use crate::Result;

/// Counters for media transfers of one operation.
#[derive(Debug)]
pub struct TransferMetrics {
    total: u64,
    successful: u64,
    failed: u64,
    skipped: u64,
    total_bytes: u64,
    durations: Vec<Duration>,
    started: Instant,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,
    pub success_rate: f64,
    pub total_bytes: u64,
    pub total_mb: f64,
    pub elapsed_seconds: f64,
    pub average_speed_mbps: f64,
    pub avg_duration_secs: Option<f64>,
    pub min_duration_secs: Option<f64>,
    pub max_duration_secs: Option<f64>,
}

impl Default for TransferMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferMetrics {
    pub fn new() -> Self {
        Self {
            total: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            total_bytes: 0,
            durations: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn record_success(&mut self, bytes: u64, duration: Duration) {
        self.total += 1;
        self.successful += 1;
        self.total_bytes += bytes;
        if duration > Duration::ZERO {
            self.durations.push(duration);
        }
    }

    pub fn record_failure(&mut self) {
        self.total += 1;
        self.failed += 1;
    }

    /// A transfer deliberately not attempted (too large, nothing to fetch).
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn successful(&self) -> u64 {
        self.successful
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let elapsed = self.started.elapsed().as_secs_f64();
        let total_mb = self.total_bytes as f64 / (1024.0 * 1024.0);
        let secs: Vec<f64> = self.durations.iter().map(|d| d.as_secs_f64()).collect();

        MetricsSnapshot {
            total: self.total,
            successful: self.successful,
            failed: self.failed,
            skipped: self.skipped,
            success_rate: if self.total > 0 {
                self.successful as f64 / self.total as f64 * 100.0
            } else {
                0.0
            },
            total_bytes: self.total_bytes,
            total_mb,
            elapsed_seconds: elapsed,
            average_speed_mbps: if elapsed > 0.0 { total_mb / elapsed } else { 0.0 },
            avg_duration_secs: if secs.is_empty() {
                None
            } else {
                Some(secs.iter().sum::<f64>() / secs.len() as f64)
            },
            min_duration_secs: secs.iter().copied().reduce(f64::min),
            max_duration_secs: secs.iter().copied().reduce(f64::max),
        }
    }

    pub fn log_statistics(&self) {
        let s = self.snapshot();
        tracing::info!(
            "Transfer statistics: {}/{} successful ({:.1}%), {} skipped, {:.2} MB, avg speed {:.2} MB/s",
            s.successful,
            s.total,
            s.success_rate,
            s.skipped,
            s.total_mb,
            s.average_speed_mbps
        );
    }
}

/// Run `fut`, logging how long it took and whether it failed.
pub async fn timed<T, Fut>(name: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    tracing::debug!("Started: {name}");
    let res = fut.await;
    let elapsed = started.elapsed().as_secs_f64();
    match &res {
        Ok(_) => tracing::info!("Completed: {name} in {elapsed:.2}s"),
        Err(e) => tracing::error!("Failed: {name} after {elapsed:.2}s - {e}"),
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    #[test]
    fn snapshot_aggregates_counts_and_durations() {
        let mut m = TransferMetrics::new();
        m.record_success(1024 * 1024, Duration::from_millis(500));
        m.record_success(1024 * 1024, Duration::from_millis(1500));
        m.record_failure();
        m.record_skip();

        let s = m.snapshot();
        assert_eq!(s.total, 3);
        assert_eq!(s.successful, 2);
        assert_eq!(s.failed, 1);
        assert_eq!(s.skipped, 1);
        assert!((s.total_mb - 2.0).abs() < 1e-9);
        assert!((s.success_rate - 66.666).abs() < 0.01);
        assert_eq!(s.min_duration_secs, Some(0.5));
        assert_eq!(s.max_duration_secs, Some(1.5));
        assert_eq!(s.avg_duration_secs, Some(1.0));
    }

    #[test]
    fn empty_snapshot_has_no_rates() {
        let s = TransferMetrics::new().snapshot();
        assert_eq!(s.success_rate, 0.0);
        assert_eq!(s.avg_duration_secs, None);
    }

    #[tokio::test]
    async fn timed_passes_results_through() {
        assert_eq!(timed("ok", async { Ok(7) }).await.unwrap(), 7);
        let err = timed("bad", async { Err::<(), _>(Error::Cancelled) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
