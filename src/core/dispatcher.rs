//! Worker pool draining (parameter, technique) detection jobs

use crate::sqli::error::{Result, SqliError};
use crate::sqli::techniques::{DetectionResult, InjectionRequest, Technique};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// One `Technique::detect` call
#[derive(Clone)]
pub struct Job {
    pub request: Arc<InjectionRequest>,
    pub technique: Arc<dyn Technique>,
}

/// A finished job and its verdict
#[derive(Clone)]
pub struct Detection {
    pub request: Arc<InjectionRequest>,
    pub technique: Arc<dyn Technique>,
    pub result: DetectionResult,
}

/// Everything the pool produced. Order does not follow submission order.
#[derive(Default)]
pub struct DispatchReport {
    pub detections: Vec<Detection>,
    pub errors: Vec<String>,
}

type Outcome = (Job, Result<DetectionResult>);

pub struct Dispatcher {
    workers: usize,
}

impl Dispatcher {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub async fn run(&self, cancel: &CancellationToken, jobs: Vec<Job>) -> Result<DispatchReport> {
        if cancel.is_cancelled() {
            return Err(SqliError::Cancelled);
        }

        let total = jobs.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        let (tx, mut rx) = mpsc::channel::<Outcome>(self.workers * 2);
        let mut pool = JoinSet::new();

        for id in 0..self.workers.min(total) {
            pool.spawn(worker(id, cancel.clone(), queue.clone(), tx.clone()));
        }
        // Workers hold the only senders; the channel closes when they all exit
        drop(tx);

        let mut report = DispatchReport::default();
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    pool.abort_all();
                    return Err(SqliError::Cancelled);
                }
                outcome = rx.recv() => outcome,
            };

            let Some((job, result)) = outcome else { break };
            match result {
                Ok(result) => {
                    if result.injectable {
                        tracing::info!(
                            param = %job.request.parameter.name,
                            "{} injection confirmed ({:.0}%)",
                            result.technique,
                            result.confidence * 100.0
                        );
                    }
                    report.detections.push(Detection {
                        request: job.request,
                        technique: job.technique,
                        result,
                    });
                }
                Err(SqliError::Cancelled) => {
                    pool.abort_all();
                    return Err(SqliError::Cancelled);
                }
                Err(err) => {
                    tracing::warn!(
                        param = %job.request.parameter.name,
                        "{} failed: {}",
                        job.technique.name(),
                        err
                    );
                    report.errors.push(format!(
                        "{} on {}: {}",
                        job.technique.name(),
                        job.request.parameter.name,
                        err
                    ));
                }
            }
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    report.errors.push(format!("worker panicked: {}", err));
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(SqliError::Cancelled);
        }

        tracing::debug!(
            jobs = total,
            detections = report.detections.len(),
            errors = report.errors.len(),
            "dispatch finished"
        );
        Ok(report)
    }
}

async fn worker(
    id: usize,
    cancel: CancellationToken,
    queue: Arc<Mutex<VecDeque<Job>>>,
    tx: mpsc::Sender<Outcome>,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let next = queue.lock().pop_front();
        let Some(job) = next else { break };

        tracing::debug!(
            worker = id,
            param = %job.request.parameter.name,
            "running {}",
            job.technique.name()
        );
        let result = job.technique.detect(&cancel, &job.request).await;

        if tx.send((job, result)).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockTransport;
    use crate::sqli::techniques::testing::injection;
    use crate::sqli::techniques::{ExtractionRequest, ExtractionResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Flags parameter `id`, fails on `broken`, counts every call
    struct Stub {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Technique for Stub {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn priority(&self) -> u8 {
            1
        }

        async fn detect(
            &self,
            cancel: &CancellationToken,
            req: &InjectionRequest,
        ) -> Result<DetectionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cancel.is_cancelled() {
                return Err(SqliError::Cancelled);
            }
            match req.parameter.name.as_str() {
                "broken" => Err(SqliError::Transport(anyhow::anyhow!("connection reset"))),
                "id" => Ok(DetectionResult {
                    injectable: true,
                    confidence: 0.9,
                    ..DetectionResult::negative("stub")
                }),
                _ => Ok(DetectionResult::negative("stub")),
            }
        }

        async fn extract(
            &self,
            _cancel: &CancellationToken,
            _req: &ExtractionRequest,
        ) -> Result<ExtractionResult> {
            Ok(ExtractionResult::default())
        }
    }

    fn job(name: &str, technique: Arc<dyn Technique>) -> Job {
        let mut request = injection(Arc::new(MockTransport::fixed("ok")), "ok", "");
        request.parameter.name = name.to_string();
        Job {
            request: Arc::new(request),
            technique,
        }
    }

    #[tokio::test]
    async fn test_runs_every_job() {
        let stub = Arc::new(Stub {
            calls: AtomicUsize::new(0),
        });
        let jobs = (0..8)
            .map(|i| job(if i == 0 { "id" } else { "q" }, stub.clone()))
            .collect();

        let report = Dispatcher::new(3)
            .run(&CancellationToken::new(), jobs)
            .await
            .unwrap();

        assert_eq!(stub.calls.load(Ordering::SeqCst), 8);
        assert_eq!(report.detections.len(), 8);
        assert_eq!(
            report.detections.iter().filter(|d| d.result.injectable).count(),
            1
        );
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_job_errors_do_not_stop_the_pool() {
        let stub = Arc::new(Stub {
            calls: AtomicUsize::new(0),
        });
        let jobs = vec![job("broken", stub.clone()), job("id", stub.clone())];

        let report = Dispatcher::new(1)
            .run(&CancellationToken::new(), jobs)
            .await
            .unwrap();

        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("broken"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let stub = Arc::new(Stub {
            calls: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Dispatcher::new(4)
            .run(&cancel, vec![job("id", stub.clone())])
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SqliError::Cancelled));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let report = Dispatcher::new(0)
            .run(&CancellationToken::new(), Vec::new())
            .await
            .unwrap();
        assert!(report.detections.is_empty());
    }
}
