//! Wall-clock gating in the venue time zone.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use theta_core::{Clock, TimeWindow};
use tracing::info;

/// Blocks until the venue clock enters a daily window.
#[derive(Clone)]
pub struct WindowGate {
    clock: Arc<dyn Clock>,
    timezone: Tz,
    poll_interval: Duration,
}

impl WindowGate {
    pub fn new(clock: Arc<dyn Clock>, timezone: Tz, poll_interval: Duration) -> Self {
        Self {
            clock,
            timezone,
            poll_interval,
        }
    }

    /// Current time in the venue time zone.
    #[must_use]
    pub fn venue_now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.timezone)
    }

    fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
        let local = date.and_time(time);
        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .unwrap_or_else(|| self.timezone.from_utc_datetime(&local))
    }

    /// Today's `[start, end)` for `window`, computed fresh on every call.
    #[must_use]
    pub fn bounds(&self, window: &TimeWindow) -> (DateTime<Tz>, DateTime<Tz>) {
        let today = self.venue_now().date_naive();
        (self.at(today, window.start), self.at(today, window.end))
    }

    #[must_use]
    pub fn is_open(&self, window: &TimeWindow) -> bool {
        let (start, end) = self.bounds(window);
        let now = self.venue_now();
        start <= now && now < end
    }

    /// True once today's window has opened, including after it has closed.
    #[must_use]
    pub fn has_started(&self, window: &TimeWindow) -> bool {
        let (start, _) = self.bounds(window);
        self.venue_now() >= start
    }

    /// Polls once per interval until `window` is open.
    pub async fn wait_for(&self, window: &TimeWindow) {
        loop {
            if self.is_open(window) {
                info!(window = %window, venue_time = %self.venue_now().format("%H:%M:%S"), "Window open");
                return;
            }
            info!(
                window = %window,
                venue_time = %self.venue_now().format("%H:%M:%S"),
                "Waiting for window"
            );
            self.clock.sleep(self.poll_interval).await;
        }
    }

    /// One poll interval.
    pub async fn tick(&self) {
        self.clock.sleep(self.poll_interval).await;
    }
}
