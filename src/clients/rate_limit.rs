// =============================================================================
// Sliding-Window Rate Limiter — keeps us under the vendor's request ceiling
// =============================================================================
//
// Both vendors enforce roughly 120 requests/minute; we hard-cap ourselves at
// 100/minute for headroom. Every request timestamps itself into a deque;
// before each call the window is trimmed to the last 60 seconds, and when the
// window is full the caller sleeps until the oldest entry expires plus a
// 50 ms cushion.
//
// Timestamps use `tokio::time::Instant` so tests can drive the clock with
// paused time. The async mutex is held only while inspecting the deque,
// never across the sleep.
// =============================================================================

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Internal cap per rolling minute (vendor ceiling is ~120).
pub const DEFAULT_WINDOW_CAP: usize = 100;
/// The rolling window length.
const WINDOW: Duration = Duration::from_secs(60);
/// Cushion added after the oldest entry expires.
const RELEASE_CUSHION: Duration = Duration::from_millis(50);

/// Sliding-window limiter shared by every request path of one vendor.
pub struct SlidingWindowLimiter {
    timestamps: Mutex<VecDeque<Instant>>,
    cap: usize,
}

impl SlidingWindowLimiter {
    pub fn new(cap: usize) -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::with_capacity(cap + 1)),
            cap: cap.max(1),
        }
    }

    /// Block until a request slot is free, then claim it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.timestamps.lock().await;
                let now = Instant::now();

                // Trim entries older than the window.
                while let Some(&front) = window.front() {
                    if now.duration_since(front) >= WINDOW {
                        window.pop_front();
                    } else {
                        break;
                    }
                }

                if window.len() < self.cap {
                    window.push_back(now);
                    None
                } else {
                    // Full: wait for the oldest entry to age out.
                    let oldest = *window.front().expect("window is full");
                    let elapsed = now.duration_since(oldest);
                    Some(WINDOW.saturating_sub(elapsed) + RELEASE_CUSHION)
                }
            };

            match wait {
                None => return,
                Some(delay) => {
                    debug!(delay_ms = delay.as_millis() as u64, "rate limiter saturated — waiting");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Requests currently inside the rolling window.
    pub async fn in_window(&self) -> usize {
        let mut window = self.timestamps.lock().await;
        let now = Instant::now();
        while let Some(&front) = window.front() {
            if now.duration_since(front) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
        window.len()
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAP)
    }
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("cap", &self.cap)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_under_cap_is_immediate() {
        let limiter = SlidingWindowLimiter::new(5);
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.in_window().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_acquire_waits_for_oldest_entry() {
        let limiter = SlidingWindowLimiter::new(2);
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        // With paused time, the sleep inside acquire auto-advances the clock.
        limiter.acquire().await;
        let waited = start.elapsed();

        // Must have waited about the full window plus the cushion.
        assert!(waited >= Duration::from_secs(60), "waited {waited:?}");
        assert!(waited <= Duration::from_secs(61), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn entries_age_out_of_window() {
        let limiter = SlidingWindowLimiter::new(10);
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.in_window().await, 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.in_window().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn window_count_never_exceeds_cap() {
        let limiter = SlidingWindowLimiter::new(3);
        // 10 acquires over paused time: every acquire beyond the cap waits
        // for a slot first, so the window can never exceed 3.
        for _ in 0..10 {
            limiter.acquire().await;
            assert!(limiter.in_window().await <= 3);
        }
    }
}
