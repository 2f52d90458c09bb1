use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct RateLimiter {
    interval_nanos: AtomicU64,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// rate = requests per second, 0 disables limiting
    pub fn new(rate: u32) -> Self {
        Self {
            interval_nanos: AtomicU64::new(interval_for(rate).as_nanos() as u64),
            last_request: Mutex::new(None),
        }
    }

    pub fn set_rate(&self, rate: u32) {
        self.interval_nanos
            .store(interval_for(rate).as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_nanos.load(Ordering::Relaxed))
    }

    pub async fn wait(&self) {
        let interval = self.interval();
        if interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }

        *last = Some(Instant::now());
    }
}

fn interval_for(rate: u32) -> Duration {
    if rate == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(1.0 / rate as f64)
    }
}
