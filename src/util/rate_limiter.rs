use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Sliding-window rate limiter shared across workers.
///
/// Grants at most `max_requests` permits per `window` and enforces a minimum
/// gap between consecutive permits. A mutex guards the deque of recent grant
/// timestamps; the lock is never held across a suspension point.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    min_gap: Duration,
    history: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, min_gap: Duration) -> Self {
        RateLimiter {
            max_requests,
            window,
            min_gap,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Suspends until the next request is allowed to go out.
    pub async fn wait(&self) {
        loop {
            let delay = {
                let mut history = self.history.lock().unwrap();
                let now = Instant::now();

                while let Some(front) = history.front() {
                    if now.duration_since(*front) >= self.window {
                        history.pop_front();
                    } else {
                        break;
                    }
                }

                if history.len() >= self.max_requests {
                    // Wait until the oldest grant leaves the window.
                    Some(self.window - now.duration_since(*history.front().unwrap()))
                } else if let Some(last) = history.back() {
                    let elapsed = now.duration_since(*last);
                    if elapsed < self.min_gap {
                        Some(self.min_gap - elapsed)
                    } else {
                        history.push_back(now);
                        None
                    }
                } else {
                    history.push_back(now);
                    None
                }
            };

            match delay {
                Some(delay) => sleep(delay).await,
                None => return,
            }
        }
    }
}
