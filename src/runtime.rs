//! Stage scaffolding: wall-clock deadlines, host sharding and worker pools.
//!
//! The spider and downloader shard their batches by host: each host group is
//! handled by one OS thread driving its own current-thread event loop, with
//! a bounded number of in-flight requests to that host. There is no global
//! event loop shared between hosts.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use url::Url;

/// Wall-clock budget for one stage run. Zero minutes means unbounded.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn from_minutes(minutes: u64) -> Self {
        let budget = (minutes > 0).then(|| Duration::from_secs(minutes * 60));
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Checked between batches only; in-flight work is never cancelled.
    pub fn expired(&self) -> bool {
        self.budget.is_some_and(|budget| self.started.elapsed() > budget)
    }
}

/// The netloc of a URL: host plus any explicit port.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Group items by the host of the URL `key` extracts. Items with
/// unparseable URLs share the empty-host group and are still processed.
pub fn group_by_host<T>(items: Vec<T>, key: impl Fn(&T) -> &str) -> HashMap<String, Vec<T>> {
    let mut hosts: HashMap<String, Vec<T>> = HashMap::new();
    for item in items {
        let host = host_of(key(&item)).unwrap_or_default();
        hosts.entry(host).or_default().push(item);
    }
    hosts
}

/// Worker count for the extractor stages: one per core minus one for the
/// rest of the system, capped by the configured maximum.
pub fn worker_count(max_processors: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    cores.saturating_sub(1).clamp(1, max_processors.max(1))
}

/// Run `job` once per worker on dedicated OS threads, each driving its own
/// current-thread tokio runtime, and collect the results.
pub async fn run_worker_pool<F, Fut, R>(workers: usize, job: F) -> Vec<R>
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R>,
    R: Send + 'static,
{
    let job = Arc::new(job);
    let pool = tokio::task::spawn_blocking(move || {
        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for worker_id in 0..workers.max(1) {
                let job = job.clone();
                handles.push(scope.spawn(move || {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed to build worker runtime");
                    runtime.block_on((*job)(worker_id))
                }));
            }
            handles
                .into_iter()
                .filter_map(|handle| handle.join().ok())
                .collect()
        })
    });

    match pool.await {
        Ok(results) => results,
        Err(err) => {
            tracing::error!("worker pool failed: {}", err);
            Vec::new()
        }
    }
}

/// Process host groups with one worker thread per host, at most
/// `max_threads` threads at a time. Each invocation of `job` sees the full
/// batch for a single host.
pub async fn run_host_workers<T, F, Fut, R>(
    groups: HashMap<String, Vec<T>>,
    max_threads: usize,
    job: F,
) -> Vec<R>
where
    T: Send + 'static,
    F: Fn(String, Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R>,
    R: Send + 'static,
{
    if groups.is_empty() {
        return Vec::new();
    }

    let queue: Arc<Mutex<Vec<(String, Vec<T>)>>> =
        Arc::new(Mutex::new(groups.into_iter().collect()));
    let pending = queue.lock().map(|q| q.len()).unwrap_or(0);
    let workers = max_threads.max(1).min(pending);
    let job = Arc::new(job);

    let results = run_worker_pool(workers, move |_worker_id| {
        let queue = queue.clone();
        let job = job.clone();
        async move {
            let mut outcomes = Vec::new();
            loop {
                let next = queue.lock().ok().and_then(|mut q| q.pop());
                let Some((host, items)) = next else { break };
                outcomes.push((*job)(host, items).await);
            }
            outcomes
        }
    })
    .await;

    results.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of_includes_explicit_port() {
        assert_eq!(
            host_of("http://127.0.0.1:8080/a.pdf"),
            Some("127.0.0.1:8080".to_string())
        );
        assert_eq!(host_of("https://example.org/x"), Some("example.org".to_string()));
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn test_group_by_host() {
        let urls = vec![
            "https://a.example/1".to_string(),
            "https://b.example/2".to_string(),
            "https://a.example/3".to_string(),
        ];
        let groups = group_by_host(urls, |u| u.as_str());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["a.example"].len(), 2);
        assert_eq!(groups["b.example"].len(), 1);
    }

    #[test]
    fn test_deadline_zero_is_unbounded() {
        assert!(!Deadline::from_minutes(0).expired());
    }

    #[tokio::test]
    async fn test_host_workers_visit_every_group() {
        let mut groups = HashMap::new();
        groups.insert("a".to_string(), vec![1, 2]);
        groups.insert("b".to_string(), vec![3]);
        groups.insert("c".to_string(), vec![4, 5, 6]);

        let mut sizes = run_host_workers(groups, 2, |_host, items: Vec<i32>| async move {
            items.len()
        })
        .await;
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2, 3]);
    }
}
