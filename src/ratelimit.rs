//! Request throttling for both directions of the service: a token bucket in
//! front of each upstream provider and a fixed window at the HTTP boundary.
//! Both policies share one mechanism: a permit counter, a bounded FIFO queue
//! of waiters and a background replenisher task.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::error::{ExchangeError, ExchangeResult};

enum Replenish {
    TokenBucket { tokens_per_period: usize },
    FixedWindow,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

struct State {
    available: usize,
    queue: VecDeque<Waiter>,
    next_waiter_id: u64,
}

struct Inner {
    state: Mutex<State>,
    limit: usize,
    queue_limit: usize,
    replenish: Replenish,
}

impl Inner {
    fn replenish(&self) {
        let mut state = self.state.lock().unwrap();
        state.available = match self.replenish {
            Replenish::TokenBucket { tokens_per_period } => {
                (state.available + tokens_per_period).min(self.limit)
            }
            Replenish::FixedWindow => self.limit,
        };
        self.grant_waiters(&mut state);
    }

    /// Hands permits to queued waiters, oldest first. Callers hold the state
    /// lock.
    fn grant_waiters(&self, state: &mut State) {
        while state.available > 0 {
            let waiter = match state.queue.pop_front() {
                Some(waiter) => waiter,
                None => break,
            };
            // A waiter whose receiver is already gone consumed nothing.
            if waiter.tx.send(()).is_ok() {
                state.available -= 1;
            }
        }
    }
}

/// Lease handed out by [`RateLimiter::acquire`]. Consuming a permit is
/// final; capacity only comes back through replenishment.
#[must_use]
#[derive(Debug)]
pub struct RatePermit(());

/// Removes its queue entry when an acquire future is dropped mid-wait. A
/// grant that raced the drop is handed back and passed on.
struct QueueSlot {
    inner: Arc<Inner>,
    id: u64,
    rx: oneshot::Receiver<()>,
    granted: bool,
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        let mut state = self.inner.state.lock().unwrap();
        if let Some(pos) = state.queue.iter().position(|w| w.id == self.id) {
            state.queue.remove(pos);
            return;
        }
        // Not queued anymore: the replenisher granted us between the drop
        // and this lock. Return the unobserved permit.
        if self.rx.try_recv().is_ok() {
            state.available = (state.available + 1).min(self.inner.limit);
            self.inner.grant_waiters(&mut state);
        }
    }
}

pub struct RateLimiter {
    inner: Arc<Inner>,
    replenisher: JoinHandle<()>,
}

impl RateLimiter {
    /// Token bucket: starts full and gains `tokens_per_period` every
    /// `period`, capped at `token_limit`.
    pub fn token_bucket(
        token_limit: usize,
        tokens_per_period: usize,
        period: Duration,
        queue_limit: usize,
    ) -> Self {
        Self::start(
            token_limit,
            queue_limit,
            Replenish::TokenBucket { tokens_per_period },
            period,
        )
    }

    /// Fixed window: `permit_limit` requests per `window`, the counter
    /// resetting when the window rolls over.
    pub fn fixed_window(permit_limit: usize, window: Duration, queue_limit: usize) -> Self {
        Self::start(permit_limit, queue_limit, Replenish::FixedWindow, window)
    }

    fn start(limit: usize, queue_limit: usize, replenish: Replenish, period: Duration) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                available: limit,
                queue: VecDeque::new(),
                next_waiter_id: 0,
            }),
            limit,
            queue_limit,
            replenish,
        });

        let task_inner = Arc::clone(&inner);
        let replenisher = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                task_inner.replenish();
            }
        });

        Self { inner, replenisher }
    }

    /// Takes a permit, queueing behind earlier callers when none are
    /// available. Fails fast with [`ExchangeError::RateLimitExceeded`] when
    /// the queue is full. Dropping the returned future mid-wait consumes
    /// nothing.
    pub async fn acquire(&self) -> ExchangeResult<RatePermit> {
        let mut slot = {
            let mut state = self.inner.state.lock().unwrap();
            if state.queue.is_empty() && state.available > 0 {
                state.available -= 1;
                return Ok(RatePermit(()));
            }
            if state.queue.len() >= self.inner.queue_limit {
                debug!("Rate limiter queue full, rejecting");
                return Err(ExchangeError::RateLimitExceeded);
            }

            let (tx, rx) = oneshot::channel();
            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            state.queue.push_back(Waiter { id, tx });
            QueueSlot {
                inner: Arc::clone(&self.inner),
                id,
                rx,
                granted: false,
            }
        };

        match (&mut slot.rx).await {
            Ok(()) => {
                slot.granted = true;
                Ok(RatePermit(()))
            }
            // The sender lives in the queue until granted or removed; a
            // closed channel means the limiter itself went away.
            Err(_) => Err(ExchangeError::Cancelled),
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.replenisher.abort();
    }
}

/// HTTP client wrapper that takes a rate limiter permit before every
/// outbound request. Waiting for a permit is interrupted by shutdown; an
/// in-flight request is not.
#[derive(Clone)]
pub struct RateLimitedClient {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    shutdown: watch::Receiver<bool>,
}

impl RateLimitedClient {
    pub fn new(
        http: reqwest::Client,
        limiter: Arc<RateLimiter>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            http,
            limiter,
            shutdown,
        }
    }

    pub async fn get(&self, url: &str) -> ExchangeResult<reqwest::Response> {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return Err(ExchangeError::Cancelled);
        }
        let _permit = tokio::select! {
            permit = self.limiter.acquire() => permit?,
            _ = shutdown.changed() => return Err(ExchangeError::Cancelled),
        };
        Ok(self.http.get(url).send().await?)
    }
}
