//! Time source and local-calendar helpers.
//!
//! Every decision that depends on "today" takes `now` as a value. The zone carried
//! by `now` is the learner's local zone, and it is a fixed UTC offset: day
//! boundaries and the midnight countdown are computed with that one offset for
//! every instant. Daylight-saving rules are not applied. `SystemClock` holds the
//! offset it was built with (configured, or the host's offset at startup), so it
//! does not drift when the host changes its clock.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock seen from one fixed learner offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemClock {
    zone: FixedOffset,
}

impl SystemClock {
    pub fn new(zone: FixedOffset) -> Self {
        Self { zone }
    }

    /// The host's offset as of now, kept for the life of the clock.
    pub fn host() -> Self {
        Self::new(*Local::now().offset())
    }

    pub fn zone(&self) -> FixedOffset {
        self.zone
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.zone)
    }
}

/// Pinned clock for tests. `set` moves it.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock(std::sync::Mutex<DateTime<FixedOffset>>);

#[cfg(test)]
impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self(std::sync::Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.0.lock().unwrap() = now;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.0.lock().unwrap()
    }
}

/// Calendar date of `instant` as seen from the zone of `now`.
pub fn local_date_of(instant: DateTime<Utc>, now: &DateTime<FixedOffset>) -> NaiveDate {
    instant.with_timezone(now.offset()).date_naive()
}

/// True when `instant` falls on the same local calendar day as `now`.
pub fn is_same_local_day(instant: DateTime<Utc>, now: &DateTime<FixedOffset>) -> bool {
    local_date_of(instant, now) == now.date_naive()
}

/// Whole seconds from `now` to the next local midnight, rounded up so that a
/// fractional remainder never reads as zero. Always in `1..=86_400`.
pub fn seconds_until_local_midnight(now: &DateTime<FixedOffset>) -> i64 {
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|naive| naive.and_local_timezone(*now.offset()).single());

    match next_midnight {
        Some(midnight) => {
            let millis = (midnight - *now).num_milliseconds();
            ((millis + 999) / 1000).clamp(1, Duration::days(1).num_seconds())
        }
        // Only reachable at the very end of chrono's date range.
        None => Duration::days(1).num_seconds(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 1800).unwrap()
    }

    #[test]
    fn same_day_uses_the_zone_of_now() {
        // 20:00 UTC on the 1st is 01:30 on the 2nd in IST.
        let spin = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        let now_ist = ist().with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        assert!(is_same_local_day(spin, &now_ist));

        let now_utc = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 2, 9, 0, 0)
            .unwrap();
        assert!(!is_same_local_day(spin, &now_utc));
    }

    #[test]
    fn midnight_countdown_bounds() {
        let late = ist().with_ymd_and_hms(2024, 3, 2, 23, 59, 30).unwrap();
        assert_eq!(seconds_until_local_midnight(&late), 30);

        let at_midnight = ist().with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        assert_eq!(seconds_until_local_midnight(&at_midnight), 86_400);

        let fractional = late + Duration::milliseconds(29_500);
        assert_eq!(seconds_until_local_midnight(&fractional), 1);
    }

    #[test]
    fn system_clock_keeps_its_configured_offset() {
        let clock = SystemClock::new(ist());
        let first = clock.now();
        let second = clock.now();
        assert_eq!(first.offset(), &ist());
        assert_eq!(second.offset(), &ist());
        assert!(second >= first);
        assert_eq!(clock.zone(), ist());
    }

    #[test]
    fn earlier_instants_use_the_same_offset_as_now() {
        // A spin 01:00 UTC on the 2nd is 06:30 local; it shares a day with 23:00 local.
        let spin = Utc.with_ymd_and_hms(2024, 3, 2, 1, 0, 0).unwrap();
        let late = ist().with_ymd_and_hms(2024, 3, 2, 23, 0, 0).unwrap();
        assert_eq!(local_date_of(spin, &late), late.date_naive());
        assert_eq!(seconds_until_local_midnight(&late), 3_600);
    }

    #[test]
    fn fixed_clock_moves_when_set() {
        let start = ist().with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);
        clock.set(start + Duration::days(1));
        assert_eq!(clock.now(), start + Duration::days(1));
    }
}
