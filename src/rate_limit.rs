// =============================================================================
// Rate Limiter — fixed-window admission control per (route, client)
// =============================================================================
//
// One counter per (route, client-identity) key, reset at fixed window
// boundaries. When a bucket's post-increment count exceeds the configured
// maximum the request is rejected with a retry-after hint of
// `max(1, window - elapsed)` whole seconds.
//
// Buckets are never explicitly collected; a stale bucket is simply reset the
// next time its client shows up. Bounding the bucket count is a deployment
// concern, not a correctness one.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected { retry_after_secs: u64 },
}

struct WindowBucket {
    window_start: Instant,
    count: u32,
}

/// Fixed-window request limiter. Constructed once and shared; one mutex
/// serialises access to the bucket map.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, WindowBucket>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request from `client` on `route`.
    pub fn admit(&self, route: &str, client: &str) -> Admission {
        self.admit_at(route, client, Instant::now())
    }

    fn admit_at(&self, route: &str, client: &str, now: Instant) -> Admission {
        let key = format!("{route}:{client}");
        let mut buckets = self.buckets.lock();

        match buckets.get_mut(&key) {
            Some(bucket) if now.duration_since(bucket.window_start) < self.window => {
                bucket.count += 1;
                if bucket.count > self.max_requests {
                    let remaining =
                        self.window.as_secs_f64() - now.duration_since(bucket.window_start).as_secs_f64();
                    let retry_after_secs = remaining.floor().max(1.0) as u64;
                    Admission::Rejected { retry_after_secs }
                } else {
                    Admission::Allowed
                }
            }
            _ => {
                // No bucket yet, or the window elapsed — start fresh.
                buckets.insert(
                    key,
                    WindowBucket {
                        window_start: now,
                        count: 1,
                    },
                );
                Admission::Allowed
            }
        }
    }
}

/// Derive the client identity for rate limiting: the first entry of a
/// forwarded-for header when present, else the direct peer address.
pub fn client_identity(forwarded_for: Option<&str>, peer: &str) -> String {
    match forwarded_for.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw
            .split(',')
            .next()
            .unwrap_or(raw)
            .trim()
            .to_string(),
        _ => peer.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourth_request_in_window_is_rejected() {
        let limiter = RateLimiter::new(3, 60);
        let t0 = Instant::now();

        // Four requests within 10 seconds from the same client.
        for i in 0..3 {
            let at = t0 + Duration::from_secs(i * 3);
            assert_eq!(limiter.admit_at("history", "1.2.3.4", at), Admission::Allowed);
        }
        let at = t0 + Duration::from_secs(10);
        match limiter.admit_at("history", "1.2.3.4", at) {
            Admission::Rejected { retry_after_secs } => {
                assert!(
                    (50..=60).contains(&retry_after_secs),
                    "retry-after {retry_after_secs} outside [50, 60]"
                );
            }
            Admission::Allowed => panic!("fourth request should be rejected"),
        }
    }

    #[test]
    fn elapsed_window_resets_the_bucket() {
        let limiter = RateLimiter::new(1, 60);
        let t0 = Instant::now();

        assert_eq!(limiter.admit_at("r", "c", t0), Admission::Allowed);
        assert!(matches!(
            limiter.admit_at("r", "c", t0 + Duration::from_secs(1)),
            Admission::Rejected { .. }
        ));
        // Exactly at the boundary the window has elapsed.
        assert_eq!(
            limiter.admit_at("r", "c", t0 + Duration::from_secs(60)),
            Admission::Allowed
        );
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let limiter = RateLimiter::new(1, 60);
        let t0 = Instant::now();
        limiter.admit_at("r", "c", t0);

        // Rejection just shy of the boundary still hints at least 1 second.
        let at = t0 + Duration::from_millis(59_800);
        match limiter.admit_at("r", "c", at) {
            Admission::Rejected { retry_after_secs } => assert_eq!(retry_after_secs, 1),
            Admission::Allowed => panic!("should be rejected"),
        }
    }

    #[test]
    fn clients_and_routes_are_independent() {
        let limiter = RateLimiter::new(1, 60);
        let t0 = Instant::now();

        assert_eq!(limiter.admit_at("r", "alice", t0), Admission::Allowed);
        assert_eq!(limiter.admit_at("r", "bob", t0), Admission::Allowed);
        assert_eq!(limiter.admit_at("other", "alice", t0), Admission::Allowed);
        assert!(matches!(
            limiter.admit_at("r", "alice", t0 + Duration::from_secs(1)),
            Admission::Rejected { .. }
        ));
    }

    #[test]
    fn client_identity_prefers_first_forwarded_entry() {
        assert_eq!(
            client_identity(Some("10.0.0.1, 192.168.1.1"), "127.0.0.1"),
            "10.0.0.1"
        );
        assert_eq!(client_identity(Some("  10.0.0.2  "), "127.0.0.1"), "10.0.0.2");
    }

    #[test]
    fn client_identity_falls_back_to_peer() {
        assert_eq!(client_identity(None, "127.0.0.1"), "127.0.0.1");
        assert_eq!(client_identity(Some(""), "127.0.0.1"), "127.0.0.1");
        assert_eq!(client_identity(Some("   "), "127.0.0.1"), "127.0.0.1");
    }
}
