//! Probe payload codec.
//!
//! A probe is the send time as RFC 3339 text. Outgoing probes always carry
//! nine fractional digits and a `Z` suffix so they have a fixed width and
//! sort lexicographically. Incoming probes may use any RFC 3339 form.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Length of an encoded probe: `YYYY-MM-DDTHH:MM:SS.nnnnnnnnnZ`
pub const PROBE_LEN: usize = 30;

/// A timestamped probe payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProbeMessage {
    sent_at: DateTime<Utc>,
}

impl ProbeMessage {
    /// Probe stamped with the current time
    #[must_use]
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Probe stamped with `sent_at`
    #[must_use]
    pub fn at(sent_at: DateTime<Utc>) -> Self {
        Self { sent_at }
    }

    /// Send time
    #[must_use]
    pub fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    /// Fixed-width text form
    #[must_use]
    pub fn encode(&self) -> String {
        self.sent_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Parse a received payload. Returns `None` for anything that is not an
    /// RFC 3339 timestamp.
    #[must_use]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?;
        DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|t| Self::at(t.with_timezone(&Utc)))
    }

    /// Elapsed time between sending and `now`. Clock skew that would make it
    /// negative yields zero.
    #[must_use]
    pub fn rtt_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.sent_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Elapsed time since sending
    #[must_use]
    pub fn rtt(&self) -> Duration {
        self.rtt_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_encode_fixed_width() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let encoded = ProbeMessage::at(t).encode();
        assert_eq!(encoded, "2024-03-01T12:00:00.000000000Z");
        assert_eq!(encoded.len(), PROBE_LEN);
    }

    #[test]
    fn test_parse_accepts_other_rfc3339_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(250);

        for text in [
            "2024-03-01T12:00:00.25Z",
            "2024-03-01T13:00:00.250+01:00",
            "2024-03-01T12:00:00.250000000Z\n",
        ] {
            let probe = ProbeMessage::parse(text.as_bytes()).unwrap();
            assert_eq!(probe.sent_at(), expected, "{text}");
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ProbeMessage::parse(b"Hello world").is_none());
        assert!(ProbeMessage::parse(b"").is_none());
        assert!(ProbeMessage::parse(&[0xff, 0xfe, 0x00]).is_none());
        assert!(ProbeMessage::parse(b"2024-13-01T00:00:00Z").is_none());
    }

    #[test]
    fn test_rtt_clamps_skew() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let probe = ProbeMessage::at(t0);

        let later = t0 + chrono::Duration::milliseconds(42);
        assert_eq!(probe.rtt_at(later), Duration::from_millis(42));

        let earlier = t0 - chrono::Duration::milliseconds(5);
        assert_eq!(probe.rtt_at(earlier), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn prop_encoding_sorts_like_time(a in 0i64..4_102_444_800_000_000_000, b in 0i64..4_102_444_800_000_000_000) {
            let pa = ProbeMessage::at(Utc.timestamp_nanos(a));
            let pb = ProbeMessage::at(Utc.timestamp_nanos(b));
            prop_assert_eq!(pa.encode().len(), PROBE_LEN);
            prop_assert_eq!(pa.encode().cmp(&pb.encode()), a.cmp(&b));
            prop_assert_eq!(ProbeMessage::parse(pa.encode().as_bytes()), Some(pa));
        }

        #[test]
        fn prop_rtt_bounded_by_elapsed(sent in 0i64..1_000_000_000_000, delay in 0i64..10_000_000_000) {
            let t0 = Utc.timestamp_nanos(1_700_000_000_000_000_000 + sent);
            let t1 = t0 + chrono::Duration::nanoseconds(delay);
            let rtt = ProbeMessage::at(t0).rtt_at(t1);
            prop_assert!(rtt <= Duration::from_nanos(delay as u64));
        }
    }
}
