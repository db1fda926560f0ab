//! Token-bucket rate limiting as an actor.
//!
//! Each external API (one bucket per configured source, one for the LLM) gets
//! its own [`RateKey`]. Callers `Acquire` before every request and wait for the
//! permit; the limiter computes the wait and replies from a detached timer so
//! its own mailbox never blocks.
use crate::actor::{Actor, Addr, Context};
use anyhow::{anyhow, Result};
use std::{collections::HashMap, fmt, time::Duration};
use tokio::{
    sync::oneshot,
    time::{sleep, Instant},
};

/// Lowest refill rate accepted; smaller values would make waits unbounded.
const MIN_QPS: f64 = 0.001;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RateKey(pub String);

impl RateKey {
    pub fn source(id: &str) -> Self {
        Self(format!("source:{id}"))
    }

    pub fn llm(model: &str) -> Self {
        Self(format!("llm:{model}"))
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub enum RateMsg {
    /// Insert/update bucket config.
    Upsert { key: RateKey, qps: f64, burst: u32 },
    /// Acquire `cost` tokens; replies when allowed.
    Acquire {
        key: RateKey,
        cost: u32,
        reply: oneshot::Sender<RatePermit>,
    },
}

#[derive(Debug)]
pub struct RatePermit;

#[derive(Clone, Copy, Debug)]
struct BucketCfg {
    qps: f64,
    burst: f64,
}

impl BucketCfg {
    fn new(qps: f64, burst: u32) -> Self {
        Self {
            qps: if qps.is_finite() { qps.max(MIN_QPS) } else { MIN_QPS },
            burst: f64::from(burst.max(1)),
        }
    }
}

#[derive(Debug)]
struct BucketState {
    cfg: BucketCfg,
    tokens: f64,
    last: Instant,
}

impl BucketState {
    fn new(cfg: BucketCfg, now: Instant) -> Self {
        Self {
            cfg,
            tokens: cfg.burst,
            last: now,
        }
    }

    /// Take `need` tokens and return how long the caller must wait for them.
    ///
    /// Tokens may go negative: later callers queue behind earlier ones instead
    /// of all waking at the same refill instant.
    fn reserve(&mut self, need: f64, now: Instant) -> Duration {
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + dt * self.cfg.qps).min(self.cfg.burst);
        self.tokens -= need;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.cfg.qps)
        }
    }
}

pub struct RateLimiter {
    buckets: HashMap<RateKey, BucketState>,
    default_cfg: BucketCfg,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            default_cfg: BucketCfg::new(1.0, 1),
        }
    }

    /// Bucket settings used for keys that were never upserted.
    pub fn with_default(mut self, qps: f64, burst: u32) -> Self {
        self.default_cfg = BucketCfg::new(qps, burst);
        self
    }

    fn upsert(&mut self, key: RateKey, qps: f64, burst: u32) {
        let cfg = BucketCfg::new(qps, burst);
        tracing::debug!(%key, qps = cfg.qps, burst = cfg.burst, "rate.upsert");
        let now = Instant::now();
        self.buckets
            .entry(key)
            .and_modify(|b| {
                b.cfg = cfg;
                b.tokens = b.tokens.min(cfg.burst);
            })
            .or_insert_with(|| BucketState::new(cfg, now));
    }

    fn reserve(&mut self, key: RateKey, cost: u32) -> Duration {
        let now = Instant::now();
        let default_cfg = self.default_cfg;
        self.buckets
            .entry(key)
            .or_insert_with(|| BucketState::new(default_cfg, now))
            .reserve(f64::from(cost), now)
    }
}

#[async_trait::async_trait]
impl Actor for RateLimiter {
    type Msg = RateMsg;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
        match msg {
            RateMsg::Upsert { key, qps, burst } => {
                self.upsert(key, qps, burst);
            }
            RateMsg::Acquire { key, cost, mut reply } => {
                let wait = self.reserve(key.clone(), cost);
                if wait.is_zero() {
                    let _ = reply.send(RatePermit);
                } else {
                    tracing::trace!(%key, wait_ms = wait.as_millis() as u64, "rate.acquire.wait");
                    tokio::spawn(async move {
                        // Skip the timer when the caller already gave up.
                        tokio::select! {
                            _ = sleep(wait) => {
                                let _ = reply.send(RatePermit);
                            }
                            _ = reply.closed() => {}
                        }
                    });
                }
            }
        }
        Ok(())
    }
}

/// Ask `limiter` for `cost` tokens under `key` and wait for the permit.
pub async fn acquire(limiter: &Addr<RateLimiter>, key: &RateKey, cost: u32) -> Result<RatePermit> {
    let (tx, rx) = oneshot::channel();
    limiter
        .send(RateMsg::Acquire {
            key: key.clone(),
            cost,
            reply: tx,
        })
        .await
        .map_err(|_| anyhow!("rate limiter actor dropped"))?;
    rx.await
        .map_err(|_| anyhow!("failed to receive rate permit for {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::spawn_actor;

    #[test]
    fn bucket_refills_at_qps_and_caps_at_burst() {
        let t0 = Instant::now();
        let mut b = BucketState::new(BucketCfg::new(2.0, 2), t0);
        assert_eq!(b.reserve(1.0, t0), Duration::ZERO);
        assert_eq!(b.reserve(1.0, t0), Duration::ZERO);
        // Empty bucket at 2 qps: one token takes half a second.
        assert_eq!(b.reserve(1.0, t0), Duration::from_millis(500));

        // A long idle period refills only up to the burst size.
        let later = t0 + Duration::from_secs(60);
        assert_eq!(b.reserve(2.0, later), Duration::ZERO);
        assert!(b.reserve(1.0, later) > Duration::ZERO);
    }

    #[test]
    fn zero_qps_is_clamped_instead_of_dividing_by_zero() {
        let t0 = Instant::now();
        let mut b = BucketState::new(BucketCfg::new(0.0, 0), t0);
        assert_eq!(b.reserve(1.0, t0), Duration::ZERO);
        let wait = b.reserve(1.0, t0);
        assert!(wait.as_secs_f64().is_finite());
        assert!(wait > Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_callers_are_spaced_by_the_refill_rate() {
        let limiter = spawn_actor(RateLimiter::new(), 8).addr;
        let key = RateKey::source("reddit-webdev");
        limiter
            .send(RateMsg::Upsert {
                key: key.clone(),
                qps: 1.0,
                burst: 2,
            })
            .await
            .unwrap();

        let start = Instant::now();
        acquire(&limiter, &key, 1).await.unwrap();
        acquire(&limiter, &key, 1).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));

        acquire(&limiter, &key, 1).await.unwrap();
        acquire(&limiter, &key, 1).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn buckets_are_independent_per_key() {
        let limiter = spawn_actor(RateLimiter::new().with_default(1.0, 1), 8).addr;
        let a = RateKey::source("a");
        let b = RateKey::source("b");

        let start = Instant::now();
        acquire(&limiter, &a, 1).await.unwrap();
        acquire(&limiter, &b, 1).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_waiter_does_not_wedge_the_limiter() {
        let limiter = spawn_actor(RateLimiter::new().with_default(1.0, 1), 8).addr;
        let key = RateKey::llm("gpt-4o-mini");
        acquire(&limiter, &key, 1).await.unwrap();

        // The second caller must wait a full second; it gives up after 100ms.
        let gave_up = tokio::time::timeout(Duration::from_millis(100), acquire(&limiter, &key, 1)).await;
        assert!(gave_up.is_err());

        // Its reservation still counts, so the next permit arrives after both slots.
        let start = Instant::now();
        acquire(&limiter, &key, 1).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1800));
    }
}
