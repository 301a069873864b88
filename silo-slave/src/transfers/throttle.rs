//! Transfer rate limiting
//!
//! The limiter never sleeps itself. It tracks how far the transfer is ahead
//! of its allowed rate and returns how long the caller must pause, so the
//! caller can race that pause against an abort.

use std::num::NonZeroU64;
use std::time::{Duration, Instant};

const MICROS_PER_SECOND: u128 = 1_000_000;

/// Pauses shorter than this are carried over as debt instead
const MINIMUM_SLEEP_MICROS: u128 = 1_000;

/// Smallest read size the limiter recommends
const MIN_CHUNK: usize = 512;

/// Token-bucket style limiter for one transfer
#[derive(Debug, Clone)]
pub struct Throttle {
    limit: NonZeroU64,
    debt: u128,
    last: Option<Instant>,
}

impl Throttle {
    /// Limit to `limit` bytes per second
    pub fn new(limit: NonZeroU64) -> Self {
        Self {
            limit,
            debt: 0,
            last: None,
        }
    }

    /// Limiter for an optional cap (0 = unlimited)
    pub fn for_max_speed(max_speed: u64) -> Option<Self> {
        NonZeroU64::new(max_speed).map(Self::new)
    }

    /// Configured bytes per second
    pub fn limit(&self) -> u64 {
        self.limit.get()
    }

    /// Read size that keeps pauses short (about 1/8 s of data)
    pub fn chunk_size(&self, buffer_len: usize) -> usize {
        let eighth = usize::try_from(self.limit.get() / 8).unwrap_or(usize::MAX);
        buffer_len.min(eighth.max(MIN_CHUNK)).max(1)
    }

    /// Record `bytes` moved now and return the pause owed
    pub fn register(&mut self, bytes: usize) -> Duration {
        self.register_at(bytes, Instant::now())
    }

    /// Record `bytes` moved at `now` and return the pause owed
    ///
    /// The caller is assumed to pause for the full returned duration.
    pub fn register_at(&mut self, bytes: usize, now: Instant) -> Duration {
        if bytes == 0 {
            return Duration::ZERO;
        }
        self.debt = self.debt.saturating_add(bytes as u128);

        let rate = u128::from(self.limit.get());
        if let Some(last) = self.last {
            let elapsed_us = now.saturating_duration_since(last).as_micros();
            let allowed = elapsed_us.saturating_mul(rate) / MICROS_PER_SECOND;
            self.debt = self.debt.saturating_sub(allowed);
        }

        let sleep_us = self.debt.saturating_mul(MICROS_PER_SECOND) / rate;
        if sleep_us < MINIMUM_SLEEP_MICROS {
            self.last = Some(now);
            return Duration::ZERO;
        }

        let pause = Duration::from_micros(u64::try_from(sleep_us).unwrap_or(u64::MAX));
        self.debt = 0;
        self.last = Some(now + pause);
        pause
    }
}
