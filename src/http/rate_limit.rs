/// Token bucket + concurrency gate composition.
///
/// The two primitives are independently owned values; the façade in
/// `client.rs` composes them rather than letting one hold a back-pointer
/// into the other.
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{Duration, Instant};

/// Continuous-refill token bucket. `take()` suspends cooperatively
/// (short polling sleeps) until at least one token is available.
pub struct TokenBucket {
    inner: Mutex<TokenBucketState>,
}

struct TokenBucketState {
    capacity: f64,
    tokens: f64,
    refill_per_ms: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute as f64;
        Self {
            inner: Mutex::new(TokenBucketState {
                capacity,
                tokens: capacity,
                refill_per_ms: capacity / 60_000.0,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn take(&self) {
        loop {
            let wait = {
                let mut state = self.inner.lock().await;
                state.refill();
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let shortfall = 1.0 - state.tokens;
                    let ms = (shortfall / state.refill_per_ms).ceil().max(1.0);
                    Some(Duration::from_millis(ms as u64))
                }
            };

            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d.min(Duration::from_millis(100))).await,
            }
        }
    }
}

impl TokenBucketState {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_refill).as_secs_f64() * 1000.0;
        if elapsed_ms > 0.0 {
            self.tokens = (self.tokens + elapsed_ms * self.refill_per_ms).min(self.capacity);
            self.last_refill = now;
        }
    }
}

/// Bounds the number of in-flight requests. A thin wrapper over
/// `tokio::sync::Semaphore` kept here so the façade doesn't need to know
/// about `tokio` concurrency primitives directly.
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn bucket_admits_roughly_its_capacity_per_minute() {
        let bucket = TokenBucket::new(6000); // scaled up so the test runs fast
        let start = StdInstant::now();
        for _ in 0..6000 {
            bucket.take().await;
        }
        // with a full bucket, 6000 immediate takes should not need to wait
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn concurrency_gate_serializes_when_capacity_is_one() {
        let gate = Arc::new(ConcurrencyGate::new(1));
        let g1 = gate.clone();
        let permit1 = g1.acquire().await;

        let g2 = gate.clone();
        let handle = tokio::spawn(async move {
            let _permit2 = g2.acquire().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        drop(permit1);
        handle.await.unwrap();
    }
}
