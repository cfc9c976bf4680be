/*
 *  ticker.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Fixed rate tick for the poll loop
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::time::{Duration, Instant};

// ceiling for a single hold off, one day
const MAX_DELAY_SECS: u64 = 24 * 60 * 60;

/// Fixed interval ticker that never bursts.
///
/// A late tick reschedules from the moment it fired, it doesn't try to
/// catch up on the ticks it missed.
pub struct Ticker {
    interval: Duration,
    last: Option<Instant>,
    hold_until: Option<Instant>,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None, hold_until: None }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Takes effect for the next deadline, counted from the last tick.
    #[inline]
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Hold off the next tick for at least `by` from `now`.
    /// Saturates far in the future rather than overflowing.
    pub fn delay(&mut self, now: Instant, by: Duration) {
        let until = now
            .checked_add(by)
            .unwrap_or_else(|| now + Duration::from_secs(MAX_DELAY_SECS));
        self.hold_until = Some(self.hold_until.map_or(until, |h| h.max(until)));
    }

    /// When the next tick is due. The first tick is due immediately.
    pub fn deadline(&self) -> Option<Instant> {
        let regular = self.last.map(|t| t + self.interval);
        match (regular, self.hold_until) {
            (Some(r), Some(h)) => Some(r.max(h)),
            (r, h) => r.or(h),
        }
    }

    /// Returns true if a tick is due; if so it also schedules the next one.
    pub fn poll_tick(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now < deadline => false,
            _ => {
                self.last = Some(now);
                self.hold_until = None;
                true
            }
        }
    }

    /// Sleep until the next tick is due.
    pub async fn tick(&mut self) {
        if let Some(deadline) = self.deadline() {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
        }
        self.poll_tick(Instant::now());
    }
}
