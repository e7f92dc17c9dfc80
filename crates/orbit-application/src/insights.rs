//! Read-only statistics over operation history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use orbit_core::backend::BackendId;
use orbit_core::operation::{Operation, OperationStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    fn add(&mut self, status: OperationStatus) {
        self.total += 1;
        match status {
            OperationStatus::Pending | OperationStatus::Running => self.running += 1,
            OperationStatus::Completed => self.completed += 1,
            OperationStatus::Failed => self.failed += 1,
            OperationStatus::Cancelled => self.cancelled += 1,
        }
    }

    fn terminal(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    /// Completed share of terminal operations, `0.0` when none finished.
    pub fn success_rate(&self) -> f64 {
        match self.terminal() {
            0 => 0.0,
            n => self.completed as f64 / n as f64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendInsights {
    pub counts: StatusCounts,
    pub success_rate: f64,
    pub mean_latency_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsightsReport {
    pub counts: StatusCounts,
    pub success_rate: f64,
    pub mean_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<u64>,
    /// Terminal operations per minute between the first start and last end
    pub throughput_per_minute: f64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub by_backend: BTreeMap<BackendId, BackendInsights>,
}

pub struct InsightsAggregator;

impl InsightsAggregator {
    pub fn compute(operations: &[Operation]) -> InsightsReport {
        let mut report = InsightsReport::default();
        let mut latencies = Vec::new();
        let mut per_backend: BTreeMap<BackendId, (StatusCounts, Vec<u64>)> = BTreeMap::new();
        let mut first_start: Option<DateTime<Utc>> = None;
        let mut last_end: Option<DateTime<Utc>> = None;

        for op in operations {
            report.counts.add(op.status);
            let backend = per_backend.entry(op.backend).or_default();
            backend.0.add(op.status);

            report.total_tokens += op.tokens.unwrap_or(0);
            report.total_cost += op.cost.unwrap_or(0.0);

            if !op.is_terminal() {
                continue;
            }
            if let Some(ms) = op.duration_ms {
                latencies.push(ms);
                backend.1.push(ms);
            }
            first_start = Some(first_start.map_or(op.started_at, |t| t.min(op.started_at)));
            if let Some(end) = op.ended_at {
                last_end = Some(last_end.map_or(end, |t| t.max(end)));
            }
        }

        report.success_rate = report.counts.success_rate();
        report.mean_latency_ms = mean(&latencies);
        report.p95_latency_ms = percentile(&mut latencies, 0.95);

        let terminal = report.counts.terminal();
        if let (Some(start), Some(end)) = (first_start, last_end) {
            // Shorter windows are stretched to one second.
            let window_ms = (end - start).num_milliseconds().max(1_000) as f64;
            report.throughput_per_minute = terminal as f64 / (window_ms / 60_000.0);
        }

        report.by_backend = per_backend
            .into_iter()
            .map(|(id, (counts, latencies))| {
                let insights = BackendInsights {
                    success_rate: counts.success_rate(),
                    mean_latency_ms: mean(&latencies),
                    counts,
                };
                (id, insights)
            })
            .collect();
        report
    }
}

fn mean(values: &[u64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<u64>() as f64 / values.len() as f64)
}

/// Nearest-rank percentile.
fn percentile(values: &mut [u64], p: f64) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let rank = (p * values.len() as f64).ceil() as usize;
    Some(values[rank.clamp(1, values.len()) - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use orbit_core::backend::OperationType;
    use orbit_core::operation::{CancelReason, OperationOutput, OperationRequest};

    fn op(backend: BackendId, op_type: OperationType, status: OperationStatus, ms: u64) -> Operation {
        let mut op = Operation::new(&OperationRequest::new(backend, op_type));
        let start = Utc::now() - Duration::seconds(120);
        op.status = status;
        op.started_at = start;
        if status.is_terminal() {
            op.ended_at = Some(start + Duration::milliseconds(ms as i64));
            op.duration_ms = Some(ms);
        }
        op
    }

    #[test]
    fn test_empty_history() {
        let report = InsightsAggregator::compute(&[]);
        assert_eq!(report.counts.total, 0);
        assert_eq!(report.success_rate, 0.0);
        assert!(report.mean_latency_ms.is_none());
        assert!(report.p95_latency_ms.is_none());
        assert_eq!(report.throughput_per_minute, 0.0);
    }

    #[test]
    fn test_rates_and_latency() {
        let mut ops: Vec<Operation> = (1..=19)
            .map(|i| op(BackendId::Cli, OperationType::Chat, OperationStatus::Completed, i * 10))
            .collect();
        ops.push(op(BackendId::WebScraper, OperationType::Scrape, OperationStatus::Failed, 1_000));
        ops.push(op(BackendId::Cli, OperationType::Chat, OperationStatus::Running, 0));

        let report = InsightsAggregator::compute(&ops);
        assert_eq!(report.counts.total, 21);
        assert_eq!(report.counts.running, 1);
        assert_eq!(report.counts.completed, 19);
        assert!((report.success_rate - 0.95).abs() < 1e-9);
        assert_eq!(report.p95_latency_ms, Some(190));
        assert!((report.mean_latency_ms.unwrap() - 145.0).abs() < 1e-9);

        let scraper = &report.by_backend[&BackendId::WebScraper];
        assert_eq!(scraper.counts.failed, 1);
        assert_eq!(scraper.success_rate, 0.0);
        assert_eq!(report.by_backend[&BackendId::Cli].counts.total, 20);
    }

    #[test]
    fn test_usage_totals_and_throughput() {
        let mut a = Operation::new(&OperationRequest::new(BackendId::Cli, OperationType::Chat));
        a.start().unwrap();
        a.complete(OperationOutput::success("x", 5).with_usage(100, 0.5)).unwrap();
        let mut b = Operation::new(&OperationRequest::new(BackendId::Cli, OperationType::Chat));
        b.start().unwrap();
        b.cancel(CancelReason::Timeout).unwrap();

        let report = InsightsAggregator::compute(&[a, b]);
        assert_eq!(report.total_tokens, 100);
        assert!((report.total_cost - 0.5).abs() < 1e-9);
        // Both ended within one second: the window is stretched to 1s.
        assert!((report.throughput_per_minute - 120.0).abs() < 1e-6);
    }
}
