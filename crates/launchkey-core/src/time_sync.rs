use crate::error::{LaunchKeyError, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::debug;

/// Wire format the service uses for `launchkey_time` and `stamped`.
pub const SERVICE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn freshness_window() -> Duration {
    Duration::minutes(5)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSyncState {
    Unsynced,
    Synced {
        skew: Duration,
        measured_at: DateTime<Utc>,
    },
}

/// Tracks the offset between the service clock and ours.
#[derive(Debug, Clone)]
pub struct TimeSync {
    state: TimeSyncState,
    window: Duration,
}

impl Default for TimeSync {
    fn default() -> Self {
        Self::new(freshness_window())
    }
}

impl TimeSync {
    pub fn new(window: Duration) -> Self {
        Self {
            state: TimeSyncState::Unsynced,
            window,
        }
    }

    pub fn state(&self) -> TimeSyncState {
        self.state
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn needs_resync(&self) -> bool {
        self.needs_resync_at(Utc::now())
    }

    pub fn needs_resync_at(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            TimeSyncState::Unsynced => true,
            TimeSyncState::Synced { measured_at, .. } => now - measured_at > self.window,
        }
    }

    pub fn record(&mut self, server_time: DateTime<Utc>, local_now: DateTime<Utc>) {
        let skew = server_time - local_now;
        debug!(
            %server_time,
            skew_ms = skew.num_milliseconds(),
            "service time updated"
        );
        self.state = TimeSyncState::Synced {
            skew,
            measured_at: local_now,
        };
    }

    /// Zero until the first successful record.
    pub fn skew(&self) -> Duration {
        match self.state {
            TimeSyncState::Unsynced => Duration::zero(),
            TimeSyncState::Synced { skew, .. } => skew,
        }
    }

    pub fn adjusted_now(&self) -> DateTime<Utc> {
        self.adjusted_at(Utc::now())
    }

    pub fn adjusted_at(&self, local: DateTime<Utc>) -> DateTime<Utc> {
        local + self.skew()
    }
}

pub fn format_service_time(time: DateTime<Utc>) -> String {
    time.format(SERVICE_TIME_FORMAT).to_string()
}

/// Service timestamps carry no zone; they are UTC. RFC 3339 is accepted too.
pub fn parse_service_time(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, SERVICE_TIME_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LaunchKeyError::Encoding(format!("service time {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, h, m, s).unwrap()
    }

    #[test]
    fn unsynced_needs_resync() {
        let sync = TimeSync::default();
        assert!(sync.needs_resync());
        assert_eq!(sync.state(), TimeSyncState::Unsynced);
        assert_eq!(sync.skew(), Duration::zero());
    }

    #[test]
    fn freshness_boundaries() {
        let mut sync = TimeSync::default();
        let measured = at(12, 0, 0);
        sync.record(at(12, 0, 30), measured);
        assert!(!sync.needs_resync_at(measured));
        assert!(!sync.needs_resync_at(at(12, 4, 59)));
        assert!(!sync.needs_resync_at(at(12, 5, 0)));
        assert!(sync.needs_resync_at(at(12, 5, 1)));
    }

    #[test]
    fn record_computes_skew() {
        let mut sync = TimeSync::default();
        sync.record(at(12, 0, 30), at(12, 0, 0));
        assert_eq!(sync.skew(), Duration::seconds(30));
        assert_eq!(sync.adjusted_at(at(13, 0, 0)), at(13, 0, 30));

        sync.record(at(11, 59, 0), at(12, 0, 0));
        assert_eq!(sync.skew(), Duration::seconds(-60));
        assert_eq!(sync.adjusted_at(at(13, 0, 0)), at(12, 59, 0));
    }

    #[test]
    fn service_time_roundtrip() {
        let t = at(8, 9, 10);
        assert_eq!(format_service_time(t), "2026-10-18 08:09:10");
        assert_eq!(parse_service_time("2026-10-18 08:09:10").unwrap(), t);
        assert_eq!(parse_service_time("2026-10-18T08:09:10Z").unwrap(), t);
        assert!(parse_service_time("yesterday").is_err());
    }
}
