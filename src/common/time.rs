use std::sync::OnceLock;
use std::time::Duration;
use regex::Regex;
use crate::common::types::Timestamp;
use crate::error::{DatasourceError, DatasourceResult};

const NANOS_PER_MILLI: i128 = 1_000_000;
const NANOS_PER_SEC: i128 = 1_000_000_000;

static DURATION_RE: OnceLock<Regex> = OnceLock::new();

fn duration_regex() -> &'static Regex {
    DURATION_RE.get_or_init(|| {
        Regex::new(r"^(?:(\d+)y)?(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?(?:(\d+)ms)?$")
            .expect("valid duration regex")
    })
}

/// Parses a Prometheus-style duration such as `30s`, `1h30m` or `2w`.
pub fn parse_duration(s: &str) -> DatasourceResult<Duration> {
    const UNIT_MILLIS: [u64; 7] = [
        365 * 24 * 3600 * 1000,
        7 * 24 * 3600 * 1000,
        24 * 3600 * 1000,
        3600 * 1000,
        60 * 1000,
        1000,
        1,
    ];

    let invalid = || DatasourceError::Config(format!("Failed to parse duration: \"{s}\""));
    if s.is_empty() {
        return Err(invalid());
    }
    let caps = duration_regex().captures(s).ok_or_else(invalid)?;

    let mut total: u64 = 0;
    for (i, unit) in UNIT_MILLIS.iter().enumerate() {
        if let Some(m) = caps.get(i + 1) {
            let count: u64 = m.as_str().parse().map_err(|_| invalid())?;
            total = count
                .checked_mul(*unit)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(invalid)?;
        }
    }
    Ok(Duration::from_millis(total))
}

/// Aligns `ts` down to a multiple of `step`, shifted by `offset_secs` so that
/// bucket boundaries follow the caller's UTC offset.
pub fn align_time(ts: Timestamp, step: Duration, offset_secs: i64) -> Timestamp {
    let step_ns = step.as_nanos() as i128;
    if step_ns == 0 {
        return ts;
    }
    let offset_ns = offset_secs as i128 * NANOS_PER_SEC;
    let t_ns = ts as i128 * NANOS_PER_MILLI;
    let aligned = (t_ns + offset_ns).div_euclid(step_ns) * step_ns - offset_ns;
    aligned.div_euclid(NANOS_PER_MILLI) as Timestamp
}

/// Converts a float number of seconds (Prometheus wire timestamps) to millis.
#[inline]
pub fn time_from_float_secs(secs: f64) -> Timestamp {
    (secs * 1000.0) as Timestamp
}

/// Parses a Loki stream timestamp and returns unix nanoseconds.
///
/// Regular values carry nanosecond precision in their last 9 digits. Numerals
/// shorter than 19 characters, or exactly 19 characters starting with `1`, are
/// read as a plain nanosecond count; anything longer is split into a seconds
/// part (first 10 characters) and a nanoseconds part.
pub fn time_from_loki_string(s: &str) -> DatasourceResult<i64> {
    let invalid = || DatasourceError::PointParse(format!("invalid stream timestamp \"{s}\""));

    if s.len() < 19 || (s.len() == 19 && s.starts_with('1')) {
        return s.parse::<i64>().map_err(|_| invalid());
    }

    let (secs, nanos) = match (s.get(..10), s.get(10..)) {
        (Some(secs), Some(nanos)) => (secs, nanos),
        _ => return Err(invalid()),
    };
    let secs: i64 = secs.parse().map_err(|_| invalid())?;
    let nanos: i64 = nanos.parse().map_err(|_| invalid())?;
    secs.checked_mul(NANOS_PER_SEC as i64)
        .and_then(|v| v.checked_add(nanos))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1ms", 1)]
    #[test_case("15s", 15_000)]
    #[test_case("1m", 60_000)]
    #[test_case("1h30m", 5_400_000)]
    #[test_case("2d", 172_800_000)]
    #[test_case("1w", 604_800_000)]
    #[test_case("1y", 31_536_000_000)]
    #[test_case("1m30s500ms", 90_500)]
    fn test_parse_duration(input: &str, expected_ms: u64) {
        assert_eq!(parse_duration(input).unwrap(), Duration::from_millis(expected_ms));
    }

    #[test_case("")]
    #[test_case("abc")]
    #[test_case("1x")]
    #[test_case("-5s")]
    #[test_case("1.5s")]
    #[test_case("30m1h")]
    fn test_parse_duration_rejects(input: &str) {
        assert!(matches!(parse_duration(input), Err(DatasourceError::Config(_))));
    }

    #[test]
    fn test_align_time() {
        let step = Duration::from_secs(60);
        assert_eq!(align_time(1_700_000_059_999, step, 0), 1_699_999_980_000);
        assert_eq!(align_time(1_699_999_980_000, step, 0), 1_699_999_980_000);
        // zero step leaves the timestamp untouched
        assert_eq!(align_time(1_234, Duration::ZERO, 0), 1_234);
    }

    #[test]
    fn test_align_time_with_offset() {
        let day = Duration::from_secs(86_400);
        // UTC+2: buckets start at 22:00 UTC of the previous day
        let offset = 2 * 3600;
        let noon = 86_400_000 * 10 + 12 * 3_600_000;
        assert_eq!(align_time(noon, day, offset), 86_400_000 * 10 - 2 * 3_600_000);
    }

    #[test]
    fn test_align_time_negative() {
        let step = Duration::from_secs(10);
        assert_eq!(align_time(-1, step, 0), -10_000);
    }

    #[test]
    fn test_time_from_float_secs() {
        assert_eq!(time_from_float_secs(1_700_000_000.0), 1_700_000_000_000);
        assert_eq!(time_from_float_secs(1_435_781_451.781), 1_435_781_451_781);
    }

    #[test]
    fn test_loki_timestamps() {
        assert_eq!(
            time_from_loki_string("1645030246277587968").unwrap(),
            1_645_030_246_277_587_968
        );
        assert_eq!(time_from_loki_string("123456789").unwrap(), 123_456_789);
        // 19 digits starting with 2 take the split path
        assert_eq!(
            time_from_loki_string("2645030246277587968").unwrap(),
            2_645_030_246 * 1_000_000_000 + 277_587_968
        );
        assert!(time_from_loki_string("not-a-time").is_err());
        assert!(time_from_loki_string("").is_err());
    }
}
