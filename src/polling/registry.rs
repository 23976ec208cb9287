use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::PollingConfig;
use crate::observability::metrics::POLLING_JOBS_ACTIVE;
use crate::polling::job::{JobStatus, PollingJob};
use crate::polling::worker;

/// In-process registry of polling jobs.
///
/// One coarse lock serializes every map mutation: job insertion, status
/// transitions, and removal. Workers take the lock only for the brief
/// read/mutate of their own entry and never hold it across a sleep, so
/// jobs do not serialize on each other's timers.
pub struct PollingRegistry {
    inner: Mutex<Inner>,
    default_provider: String,
    fetch_delay: Duration,
}

struct Inner {
    jobs: HashMap<String, PollingJob>,
    tasks: HashMap<String, JoinHandle<()>>,
    counter: u64,
}

impl PollingRegistry {
    pub fn new(config: &PollingConfig) -> Arc<Self> {
        Arc::new(PollingRegistry {
            inner: Mutex::new(Inner {
                jobs: HashMap::new(),
                tasks: HashMap::new(),
                counter: 0,
            }),
            default_provider: config.default_provider.clone(),
            fetch_delay: Duration::from_secs(config.fetch_delay_secs),
        })
    }

    /// Register a job and launch its background cycle. Interval zero and
    /// empty symbol lists are accepted as-is; the cycle then busy-loops or
    /// no-ops respectively.
    pub fn create(
        self: Arc<Self>,
        symbols: Vec<String>,
        interval_secs: u64,
        provider: Option<String>,
    ) -> PollingJob {
        let provider = provider.unwrap_or_else(|| self.default_provider.clone());

        let job = {
            let mut inner = self.inner.lock().unwrap();
            inner.counter += 1;
            let job = PollingJob {
                id: format!("poll_{}", inner.counter),
                symbols,
                interval_secs,
                provider,
                status: JobStatus::Created,
                created_at: Utc::now(),
                last_run: None,
                last_completed: None,
                data_points_fetched: None,
                error: None,
            };
            inner.jobs.insert(job.id.clone(), job.clone());
            POLLING_JOBS_ACTIVE.set(inner.jobs.len() as i64);
            job
        };

        let handle = tokio::spawn(worker::run(
            Arc::clone(&self),
            job.id.clone(),
            Duration::from_secs(interval_secs),
            self.fetch_delay,
        ));
        self.inner
            .lock()
            .unwrap()
            .tasks
            .insert(job.id.clone(), handle);

        info!(
            "Started polling job {} for {} symbol(s) every {}s",
            job.id,
            job.symbols.len(),
            interval_secs
        );
        job
    }

    /// Snapshot of one job's state.
    pub fn get(&self, job_id: &str) -> Option<PollingJob> {
        self.inner.lock().unwrap().jobs.get(job_id).cloned()
    }

    /// Snapshots of every job, in unspecified order.
    pub fn list(&self) -> Vec<PollingJob> {
        self.inner.lock().unwrap().jobs.values().cloned().collect()
    }

    /// Cancel and remove one job. Returns whether it existed.
    pub fn delete(&self, job_id: &str) -> bool {
        let handle = {
            let mut inner = self.inner.lock().unwrap();
            let Some(job) = inner.jobs.get_mut(job_id) else {
                return false;
            };
            job.status = JobStatus::Deleted;
            inner.jobs.remove(job_id);
            let handle = inner.tasks.remove(job_id);
            POLLING_JOBS_ACTIVE.set(inner.jobs.len() as i64);
            handle
        };

        // Abort outside the lock; the task dies at its next suspension
        // point without completing the in-flight cycle.
        if let Some(handle) = handle {
            handle.abort();
        }

        info!("Deleted polling job {}", job_id);
        true
    }

    /// Cancel every job and clear the registry. Idempotent on empty.
    pub fn delete_all(&self) -> usize {
        let (count, handles) = {
            let mut inner = self.inner.lock().unwrap();
            let count = inner.jobs.len();
            inner.jobs.clear();
            let handles: Vec<JoinHandle<()>> = inner.tasks.drain().map(|(_, h)| h).collect();
            POLLING_JOBS_ACTIVE.set(0);
            (count, handles)
        };

        for handle in handles {
            handle.abort();
        }

        info!("Deleted all polling jobs ({})", count);
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Worker-facing transitions ───────────────────────────────────

    /// Mark the job running for a new cycle and hand back its symbol list.
    /// `None` tells the worker its entry is gone and the loop must stop.
    pub(crate) fn begin_cycle(&self, job_id: &str) -> Option<Vec<String>> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.jobs.get_mut(job_id)?;
        if job.status == JobStatus::Deleted {
            return None;
        }
        job.status = JobStatus::Running;
        job.last_run = Some(Utc::now());
        Some(job.symbols.clone())
    }

    pub(crate) fn complete_cycle(&self, job_id: &str, fetched: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.status = JobStatus::Completed;
            job.last_completed = Some(Utc::now());
            job.data_points_fetched = Some(fetched);
            job.error = None;
        }
    }

    /// A failed cycle is recorded on the job and nowhere else; the worker
    /// retries after the normal interval.
    pub(crate) fn fail_cycle(&self, job_id: &str, error: String) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.status = JobStatus::Failed;
            job.error = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> Arc<PollingRegistry> {
        PollingRegistry::new(&PollingConfig::default())
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn create_assigns_fresh_monotonic_ids() {
        let registry = test_registry();
        let a = registry.clone().create(symbols(&["AAPL"]), 60, None);
        let b = registry.clone().create(symbols(&["MSFT"]), 60, None);
        assert_eq!(a.id, "poll_1");
        assert_eq!(b.id, "poll_2");
        assert_ne!(a.id, b.id);
        registry.delete_all();
    }

    #[tokio::test]
    async fn created_job_is_listed_with_live_status() {
        let registry = test_registry();
        let job = registry.clone().create(symbols(&["AAPL", "MSFT"]), 60, None);

        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, job.id);
        assert!(matches!(
            listed[0].status,
            JobStatus::Created | JobStatus::Running
        ));
        registry.delete_all();
    }

    #[tokio::test]
    async fn provider_defaults_from_config() {
        let registry = test_registry();
        let job = registry.clone().create(symbols(&["AAPL"]), 60, None);
        assert_eq!(job.provider, "alpha_vantage");

        let job = registry.clone().create(symbols(&["AAPL"]), 60, Some("finnhub".to_string()));
        assert_eq!(job.provider, "finnhub");
        registry.delete_all();
    }

    #[tokio::test]
    async fn get_unknown_job_is_none() {
        let registry = test_registry();
        assert!(registry.get("poll_999").is_none());
    }

    #[tokio::test]
    async fn delete_removes_from_get_and_list() {
        let registry = test_registry();
        let job = registry.clone().create(symbols(&["AAPL"]), 60, None);

        assert!(registry.delete(&job.id));
        assert!(registry.get(&job.id).is_none());
        assert!(registry.list().is_empty());

        // Second delete of the same id is a miss.
        assert!(!registry.delete(&job.id));
    }

    #[tokio::test]
    async fn delete_all_is_idempotent() {
        let registry = test_registry();
        assert_eq!(registry.delete_all(), 0);
        assert!(registry.is_empty());

        registry.clone().create(symbols(&["AAPL"]), 60, None);
        registry.clone().create(symbols(&["MSFT"]), 60, None);
        assert_eq!(registry.delete_all(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.delete_all(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_completes_and_records_progress() {
        let registry = test_registry();
        let job = registry.clone().create(symbols(&["AAPL", "MSFT"]), 30, None);

        // Two simulated fetches at one second each; land just past them.
        tokio::time::sleep(Duration::from_millis(2_100)).await;

        let snapshot = registry.get(&job.id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.data_points_fetched, Some(2));
        assert!(snapshot.last_run.is_some());
        assert!(snapshot.last_completed.is_some());
        assert!(snapshot.error.is_none());
        registry.delete_all();
    }

    #[tokio::test(start_paused = true)]
    async fn completed_job_runs_again_after_interval() {
        let registry = test_registry();
        let job = registry.clone().create(symbols(&["AAPL"]), 30, None);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let first = registry.get(&job.id).unwrap();
        assert_eq!(first.status, JobStatus::Completed);

        // Past the interval: the next cycle has begun (and may already
        // have finished its single fetch).
        tokio::time::sleep(Duration::from_secs(31)).await;
        let second = registry.get(&job.id).unwrap();
        assert!(matches!(
            second.status,
            JobStatus::Running | JobStatus::Completed
        ));
        assert!(second.last_run.unwrap() > first.last_run.unwrap());
        registry.delete_all();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_records_error_and_survives() {
        let registry = test_registry();
        // A blank symbol makes the simulated fetch fail.
        let job = registry.clone().create(symbols(&["  "]), 30, None);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let snapshot = registry.get(&job.id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(snapshot.error.is_some());

        // One job's failure never aborts the registry or other jobs.
        let healthy = registry.clone().create(symbols(&["AAPL"]), 30, None);
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(
            registry.get(&healthy.id).unwrap().status,
            JobStatus::Completed
        );
        registry.delete_all();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_symbol_list_no_ops_each_cycle() {
        let registry = test_registry();
        let job = registry.clone().create(Vec::new(), 30, None);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = registry.get(&job.id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.data_points_fetched, Some(0));
        registry.delete_all();
    }
}
