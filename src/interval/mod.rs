use std::fmt::{self, Display, Write};
use std::time::Duration;
use tracing::debug;
use crate::common::time::parse_duration;
use crate::common::TimeRange;
use crate::error::{DatasourceError, DatasourceResult};


/// Point budget used when a request carries no `maxDataPoints`.
pub const DEFAULT_RESOLUTION: i64 = 1500;
/// Point budget backing the safe interval floor.
pub const SAFE_RESOLUTION: i64 = 11000;
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1);
/// Step used when neither the query nor the data source supplies an interval.
pub const DEFAULT_TIME_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_SCRAPE_INTERVAL: &str = "15s";

pub const VAR_INTERVAL: &str = "$__interval";
pub const VAR_INTERVAL_MS: &str = "$__interval_ms";
pub const VAR_RATE_INTERVAL: &str = "$__rate_interval";
pub const VAR_INTERVAL_ALT: &str = "${__interval}";
pub const VAR_INTERVAL_MS_ALT: &str = "${__interval_ms}";
pub const VAR_RATE_INTERVAL_ALT: &str = "${__rate_interval}";

const MILLIS_PER_SECOND: u64 = 1000;
const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: u64 = 24 * MILLIS_PER_HOUR;
const MILLIS_PER_YEAR: u64 = 365 * MILLIS_PER_DAY;

/// A resolved sampling step together with its display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub text: String,
    pub value: Duration,
}

impl Interval {
    pub fn new(value: Duration) -> Self {
        Interval {
            text: format_duration(value),
            value,
        }
    }

    pub fn millis(&self) -> i64 {
        self.value.as_millis() as i64
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

pub trait Calculator {
    /// Returns the step for `range` given the query interval hint and the
    /// maximum number of points the panel can render.
    fn calculate(&self, range: &TimeRange, query_interval: Duration, max_data_points: i64) -> Interval;

    /// Returns the interval that keeps `range` under `safe_resolution` points.
    fn calculate_safe_interval(&self, range: &TimeRange, safe_resolution: i64) -> Interval;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalculatorOptions {
    pub min_interval: Duration,
}

impl Default for CalculatorOptions {
    fn default() -> Self {
        CalculatorOptions {
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalCalculator {
    min_interval: Duration,
}

impl IntervalCalculator {
    pub fn new(options: CalculatorOptions) -> Self {
        let min_interval = if options.min_interval.is_zero() {
            DEFAULT_MIN_INTERVAL
        } else {
            options.min_interval
        };
        IntervalCalculator { min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

impl Default for IntervalCalculator {
    fn default() -> Self {
        Self::new(CalculatorOptions::default())
    }
}

fn divide_span(range: &TimeRange, resolution: i64) -> Duration {
    let resolution = if resolution <= 0 {
        DEFAULT_RESOLUTION
    } else {
        resolution
    };
    let nanos = range.span().as_nanos() / resolution as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

impl Calculator for IntervalCalculator {
    fn calculate(&self, range: &TimeRange, query_interval: Duration, max_data_points: i64) -> Interval {
        let hint = query_interval.max(self.min_interval);
        let naive = divide_span(range, max_data_points);
        if naive < hint {
            return Interval::new(hint);
        }
        // rounding may land below a hint that is not itself a rung
        Interval::new(round_interval(naive).max(hint))
    }

    fn calculate_safe_interval(&self, range: &TimeRange, safe_resolution: i64) -> Interval {
        Interval::new(round_interval(divide_span(range, safe_resolution)))
    }
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Below(u64),
    UpTo(u64),
}

impl Bound {
    fn contains(&self, d: Duration) -> bool {
        match *self {
            Bound::Below(ms) => d < Duration::from_millis(ms),
            Bound::UpTo(ms) => d <= Duration::from_millis(ms),
        }
    }
}

/// Threshold table for `round_interval`, in milliseconds. Each threshold sits
/// midway between two rungs. The 10ms, 24h and 1w bounds are exclusive so that
/// every rung maps to itself.
const LADDER: [(Bound, u64); 30] = [
    (Bound::Below(10), 1),
    (Bound::UpTo(15), 10),
    (Bound::UpTo(35), 20),
    (Bound::UpTo(75), 50),
    (Bound::UpTo(150), 100),
    (Bound::UpTo(350), 200),
    (Bound::UpTo(750), 500),
    (Bound::UpTo(1500), 1000),
    (Bound::UpTo(3500), 2000),
    (Bound::UpTo(7500), 5000),
    (Bound::UpTo(12500), 10_000),
    (Bound::UpTo(17500), 15_000),
    (Bound::UpTo(25000), 20_000),
    (Bound::UpTo(45000), 30_000),
    (Bound::UpTo(90000), 60_000),
    (Bound::UpTo(210_000), 120_000),
    (Bound::UpTo(450_000), 300_000),
    (Bound::UpTo(750_000), 600_000),
    (Bound::UpTo(1_050_000), 900_000),
    (Bound::UpTo(1_500_000), 1_200_000),
    (Bound::UpTo(2_700_000), 1_800_000),
    (Bound::UpTo(5_400_000), 3_600_000),
    (Bound::UpTo(9_000_000), 7_200_000),
    (Bound::UpTo(16_200_000), 10_800_000),
    (Bound::UpTo(32_400_000), 21_600_000),
    (Bound::Below(86_400_000), 43_200_000),
    (Bound::UpTo(172_800_000), 86_400_000),
    (Bound::Below(604_800_000), 86_400_000),
    (Bound::UpTo(1_814_400_000), 604_800_000),
    (Bound::Below(3_628_800_000), 2_592_000_000),
];

/// Snaps `interval` to the closest "nice" duration of the ladder
/// (1ms, 10ms, 20ms ... 1w, 30d, 1y).
pub fn round_interval(interval: Duration) -> Duration {
    LADDER
        .iter()
        .find(|(bound, _)| bound.contains(interval))
        .map(|(_, rung)| Duration::from_millis(*rung))
        .unwrap_or(Duration::from_millis(MILLIS_PER_YEAR))
}

/// Renders `d` in its largest whole unit among y, d, h, m, s and ms,
/// truncating the remainder. Anything below a millisecond renders as `1ms`.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis() as u64;
    const UNITS: [(u64, &str); 5] = [
        (MILLIS_PER_YEAR, "y"),
        (MILLIS_PER_DAY, "d"),
        (MILLIS_PER_HOUR, "h"),
        (MILLIS_PER_MINUTE, "m"),
        (MILLIS_PER_SECOND, "s"),
    ];
    for (unit, suffix) in UNITS {
        if ms >= unit {
            return format!("{}{suffix}", ms / unit);
        }
    }
    if ms >= 1 {
        return format!("{ms}ms");
    }
    "1ms".to_string()
}

/// Renders `d` as a compound duration (`1h30m`, `2m5s`, `500ms`) that
/// PromQL range selectors accept.
pub fn format_compound_duration(d: Duration) -> String {
    let mut ms = d.as_millis() as u64;
    if ms == 0 {
        return "0s".to_string();
    }
    let mut res = String::with_capacity(12);
    for (unit, suffix) in [
        (MILLIS_PER_HOUR, "h"),
        (MILLIS_PER_MINUTE, "m"),
        (MILLIS_PER_SECOND, "s"),
        (1, "ms"),
    ] {
        let count = ms / unit;
        if count > 0 {
            let _ = write!(res, "{count}{suffix}");
            ms -= count * unit;
        }
    }
    res
}

/// Renders `d` the way Go's `time.Duration` prints: `1h0m0s`, `1m30s`, `1.5s`,
/// and `ms`/`µs`/`ns` with a decimal fraction below one second.
pub fn format_go_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < NANOS_PER_SECOND {
        let (scale, unit) = match nanos {
            0..=999 => (1, "ns"),
            1_000..=999_999 => (1_000, "µs"),
            _ => (1_000_000, "ms"),
        };
        return format!("{}{unit}", decimal(nanos, scale));
    }

    let secs = d.as_secs();
    let (hours, minutes) = (secs / 3600, secs / 60 % 60);
    let mut res = String::with_capacity(16);
    if hours > 0 {
        let _ = write!(res, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(res, "{minutes}m");
    }
    let rem = (secs % 60) as u128 * NANOS_PER_SECOND + d.subsec_nanos() as u128;
    let _ = write!(res, "{}s", decimal(rem, NANOS_PER_SECOND));
    res
}

const NANOS_PER_SECOND: u128 = 1_000_000_000;

// `value / scale` with trailing fractional zeros dropped; `scale` is a power of ten
fn decimal(value: u128, scale: u128) -> String {
    let (whole, frac) = (value / scale, value % scale);
    if frac == 0 {
        return whole.to_string();
    }
    let width = scale.ilog10() as usize;
    let digits = format!("{frac:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

pub fn is_variable_interval(interval: &str) -> bool {
    matches!(
        interval,
        VAR_INTERVAL
            | VAR_INTERVAL_MS
            | VAR_RATE_INTERVAL
            | VAR_INTERVAL_ALT
            | VAR_INTERVAL_MS_ALT
            | VAR_RATE_INTERVAL_ALT
    )
}

pub fn is_rate_interval(interval: &str) -> bool {
    interval == VAR_RATE_INTERVAL || interval == VAR_RATE_INTERVAL_ALT
}

/// Picks the query interval hint: the per-query `interval` string first, then
/// `intervalMs`, then the data source `timeInterval`, then `default_interval`.
/// `"0s"` and template variables count as unset.
pub fn get_interval_from(
    time_interval: &str,
    query_interval: &str,
    query_interval_ms: i64,
    default_interval: Duration,
) -> DatasourceResult<Duration> {
    let mut interval = query_interval;
    if interval == "0s" || is_variable_interval(interval) {
        interval = "";
    }

    if interval.is_empty() {
        if query_interval_ms > 0 {
            return Ok(Duration::from_millis(query_interval_ms as u64));
        }
        interval = time_interval;
    }
    if interval.is_empty() {
        return Ok(default_interval);
    }

    parse_interval_string(interval)
}

/// Parses an interval hint such as `>10s`, `<1m` or a bare number of seconds.
pub fn parse_interval_string(interval: &str) -> DatasourceResult<Duration> {
    let formatted = interval.replacen('<', "", 1).replacen('>', "", 1);
    let formatted = formatted.trim();
    if !formatted.is_empty() && formatted.bytes().all(|b| b.is_ascii_digit()) {
        let secs: u64 = formatted
            .parse()
            .map_err(|_| DatasourceError::Config(format!("invalid interval \"{interval}\"")))?;
        return Ok(Duration::from_secs(secs));
    }
    parse_duration(formatted)
        .map_err(|_| DatasourceError::Config(format!("invalid interval \"{interval}\"")))
}

/// Returns the window for `$__rate_interval`: `max(interval + scrape, 4 * scrape)`.
/// An empty `scrape_interval` falls back to 15s.
pub fn rate_interval(interval: Duration, scrape_interval: &str) -> DatasourceResult<Duration> {
    let scrape = if scrape_interval.is_empty() {
        DEFAULT_SCRAPE_INTERVAL
    } else {
        scrape_interval
    };
    let scrape = parse_interval_string(scrape)?;
    let overflow = || {
        DatasourceError::Config(format!("rate interval overflows for scrape interval \"{scrape_interval}\""))
    };
    let padded = interval.checked_add(scrape).ok_or_else(overflow)?;
    let floor = scrape.checked_mul(4).ok_or_else(overflow)?;
    let res = padded.max(floor);
    debug!(
        interval = interval.as_millis() as u64,
        scrape = scrape.as_millis() as u64,
        "rate interval {}",
        format_compound_duration(res)
    );
    Ok(res)
}
