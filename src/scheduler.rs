//! Bounded fan-out of independent work units.
//!
//! Every unit runs in its own task under a semaphore permit. Errors and
//! panics are captured into the unit's report; siblings keep running. A
//! fixed delay between submissions keeps upstream quotas happy and stacks on
//! top of the concurrency bound.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

/// How one unit ended.
#[derive(Debug)]
pub enum UnitOutcome<T, E> {
    Done(T),
    Failed(E),
    Panicked(String),
}

impl<T, E> UnitOutcome<T, E> {
    pub fn is_done(&self) -> bool {
        matches!(self, UnitOutcome::Done(_))
    }
}

/// Result of one unit, tagged with its label.
#[derive(Debug)]
pub struct UnitReport<T, E> {
    pub label: String,
    pub outcome: UnitOutcome<T, E>,
    pub elapsed: Duration,
}

/// Success/failure tally of a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl SchedulerSummary {
    pub fn from_reports<T, E>(reports: &[UnitReport<T, E>]) -> Self {
        let succeeded = reports.iter().filter(|r| r.outcome.is_done()).count();
        Self {
            succeeded,
            failed: reports.len() - succeeded,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Bounded worker pool for one ingestion or enrichment phase.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    workers: usize,
    request_delay: Duration,
}

impl Scheduler {
    pub fn new(workers: usize, request_delay: Duration) -> Self {
        Self {
            workers: workers.max(1),
            request_delay,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    /// Run every unit, at most `workers` at a time, and collect all reports.
    ///
    /// Report order follows completion, not submission.
    pub async fn run<U, T, E, L, F, Fut>(
        &self,
        units: Vec<U>,
        label: L,
        work: F,
    ) -> Vec<UnitReport<T, E>>
    where
        U: Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
        L: Fn(&U) -> String,
        F: Fn(U) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let total = units.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let work = Arc::new(work);
        let mut set = JoinSet::new();

        for (index, unit) in units.into_iter().enumerate() {
            if index > 0 && self.request_delay > Duration::ZERO {
                tokio::time::sleep(self.request_delay).await;
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                error!("Scheduler semaphore closed, {} units not submitted", total - index);
                break;
            };

            let unit_label = label(&unit);
            let work = work.clone();
            set.spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                // Inner task so a panic surfaces as a JoinError we can attribute.
                let outcome = match tokio::spawn(work(unit)).await {
                    Ok(Ok(value)) => UnitOutcome::Done(value),
                    Ok(Err(e)) => {
                        warn!("{}: {}", unit_label, e);
                        UnitOutcome::Failed(e)
                    }
                    Err(join_error) => {
                        let message = panic_message(join_error);
                        error!("{}: unit panicked: {}", unit_label, message);
                        UnitOutcome::Panicked(message)
                    }
                };
                UnitReport {
                    label: unit_label,
                    outcome,
                    elapsed: started.elapsed(),
                }
            });
        }

        let mut reports = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => {
                    debug!("{} finished in {:?}", report.label, report.elapsed);
                    reports.push(report);
                }
                Err(e) => error!("Scheduler wrapper task failed: {}", e),
            }
        }
        reports
    }
}

fn panic_message(join_error: JoinError) -> String {
    if join_error.is_cancelled() {
        return "cancelled".to_string();
    }
    let payload: Box<dyn Any + Send> = join_error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn failures_do_not_cancel_siblings() {
        let scheduler = Scheduler::new(3, Duration::ZERO);
        let reports = scheduler
            .run(
                (0..10).collect::<Vec<u32>>(),
                |n| format!("unit {}", n),
                |n| async move {
                    if n % 3 == 0 {
                        Err(format!("unit {} failed", n))
                    } else {
                        Ok(n * 2)
                    }
                },
            )
            .await;

        let summary = SchedulerSummary::from_reports(&reports);
        assert_eq!(summary.total(), 10);
        assert_eq!(summary.failed, 4);
        assert_eq!(summary.succeeded, 6);
    }

    #[tokio::test]
    async fn panics_are_captured() {
        let scheduler = Scheduler::new(2, Duration::ZERO);
        let reports = scheduler
            .run(
                vec![1u32, 2, 3],
                |n| format!("unit {}", n),
                |n| async move {
                    if n == 2 {
                        panic!("boom");
                    }
                    Ok::<_, String>(n)
                },
            )
            .await;

        assert_eq!(reports.len(), 3);
        let panicked: Vec<_> = reports
            .iter()
            .filter_map(|r| match &r.outcome {
                UnitOutcome::Panicked(msg) => Some((r.label.clone(), msg.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(panicked, vec![("unit 2".to_string(), "boom".to_string())]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(4, Duration::ZERO);

        let (f, p) = (in_flight.clone(), peak.clone());
        let reports = scheduler
            .run(
                (0..20).collect::<Vec<u32>>(),
                |n| n.to_string(),
                move |_| {
                    let (f, p) = (f.clone(), p.clone());
                    async move {
                        let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                        p.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        f.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, String>(())
                    }
                },
            )
            .await;

        assert_eq!(reports.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn request_delay_spaces_submissions() {
        let scheduler = Scheduler::new(10, Duration::from_secs(2));
        let started = tokio::time::Instant::now();
        let reports = scheduler
            .run(
                vec![1u32, 2, 3, 4],
                |n| n.to_string(),
                |n| async move { Ok::<_, String>(n) },
            )
            .await;
        assert_eq!(reports.len(), 4);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn empty_input_yields_no_reports() {
        let scheduler = Scheduler::new(2, Duration::from_secs(1));
        let reports = scheduler
            .run(
                Vec::<u32>::new(),
                |n| n.to_string(),
                |n| async move { Ok::<_, String>(n) },
            )
            .await;
        assert!(reports.is_empty());
    }
}
