use parking_lot::Mutex;
use tokio::time::Instant;

/// Token bucket bounding outbound calls to the analysis service.
///
/// Refill is lazy (computed from elapsed time on each acquire), so there is no
/// timer task. Check-and-decrement happens under one lock.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Starts full. `capacity` must be positive and `refill_per_sec`
    /// non-negative; both are validated with the rest of the config.
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn try_acquire(&self, n: u32) -> bool {
        self.try_acquire_at(n, Instant::now())
    }

    pub fn try_acquire_at(&self, n: u32, now: Instant) -> bool {
        let needed = f64::from(n);
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        if state.tokens >= needed {
            state.tokens -= needed;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, after applying any pending refill.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        // A stale `now` (earlier than the last refill) adds nothing.
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            state.last_refill = now;
        }
    }
}
