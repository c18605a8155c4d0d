use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use crate::decoder::{DecodeOptions, UnknownFieldPolicy};
use crate::error::{DatasourceError, DatasourceResult};
use crate::interval::{
    parse_interval_string, CalculatorOptions, IntervalCalculator, DEFAULT_MIN_INTERVAL, DEFAULT_RESOLUTION,
    DEFAULT_TIME_INTERVAL, SAFE_RESOLUTION,
};

const ENV_PREFIX: &str = "PROMQL_DS_";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Max data points used when a request carries none.
    pub default_resolution: i64,
    /// Point budget for the safe interval floor.
    pub safe_resolution: i64,
    pub min_interval: Duration,
    /// Step used when neither the query nor the data source gives a hint.
    pub default_time_interval: Duration,
    /// Data source wide scrape interval (`timeInterval`), e.g. `15s`.
    pub scrape_interval: String,
    /// Matrix and vector results are decoded as one wide frame when set.
    pub wide_series: bool,
    pub unknown_fields: UnknownFieldPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_resolution: DEFAULT_RESOLUTION,
            safe_resolution: SAFE_RESOLUTION,
            min_interval: DEFAULT_MIN_INTERVAL,
            default_time_interval: DEFAULT_TIME_INTERVAL,
            scrape_interval: String::new(),
            wide_series: false,
            unknown_fields: UnknownFieldPolicy::Ignore,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `PROMQL_DS_*` environment variables. Values that
    /// fail to parse are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like `from_env`, reading the prefixed keys through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        if let Some(v) = get_setting(&lookup, "DEFAULT_RESOLUTION") {
            settings.default_resolution = v;
        }
        if let Some(v) = get_setting(&lookup, "SAFE_RESOLUTION") {
            settings.safe_resolution = v;
        }
        if let Some(v) = get_duration(&lookup, "MIN_INTERVAL") {
            settings.min_interval = v;
        }
        if let Some(v) = get_duration(&lookup, "DEFAULT_TIME_INTERVAL") {
            settings.default_time_interval = v;
        }
        if let Some(v) = get_setting::<String, _>(&lookup, "SCRAPE_INTERVAL") {
            settings.scrape_interval = v;
        }
        if let Some(v) = get_setting(&lookup, "WIDE_SERIES") {
            settings.wide_series = v;
        }
        if let Some(v) = get_setting(&lookup, "UNKNOWN_FIELDS") {
            settings.unknown_fields = v;
        }
        settings
    }

    pub fn validate(&self) -> DatasourceResult<()> {
        if self.default_resolution <= 0 {
            return Err(DatasourceError::Config(format!(
                "default_resolution must be positive, got {}",
                self.default_resolution
            )));
        }
        if self.safe_resolution <= 0 {
            return Err(DatasourceError::Config(format!(
                "safe_resolution must be positive, got {}",
                self.safe_resolution
            )));
        }
        if !self.scrape_interval.is_empty() {
            parse_interval_string(&self.scrape_interval)?;
        }
        Ok(())
    }

    pub fn calculator(&self) -> IntervalCalculator {
        IntervalCalculator::new(CalculatorOptions {
            min_interval: self.min_interval,
        })
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            unknown_fields: self.unknown_fields,
            ..DecodeOptions::wide(self.wide_series)
        }
    }
}

static GLOBAL_SETTINGS: OnceLock<Settings> = OnceLock::new();

pub fn get_global_settings() -> &'static Settings {
    GLOBAL_SETTINGS.get_or_init(Settings::from_env)
}

fn get_setting<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(&format!("{ENV_PREFIX}{name}")).and_then(|v| v.trim().parse::<T>().ok())
}

fn get_duration<F>(lookup: &F, name: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    get_setting::<String, _>(lookup, name).and_then(|v| parse_interval_string(&v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.default_resolution, 1500);
        assert_eq!(settings.safe_resolution, 11000);
        assert_eq!(settings.min_interval, Duration::from_millis(1));
        assert_eq!(settings.default_time_interval, Duration::from_secs(15));
        assert!(settings.scrape_interval.is_empty());
        assert!(!settings.wide_series);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"scrape_interval":"30s","wide_series":true,"unknown_fields":"collect"}"#).unwrap();
        assert_eq!(settings.scrape_interval, "30s");
        assert!(settings.wide_series);
        assert_eq!(settings.unknown_fields, UnknownFieldPolicy::Collect);
        assert_eq!(settings.safe_resolution, SAFE_RESOLUTION);

        let options = settings.decode_options();
        assert!(options.matrix_wide && options.vector_wide);
        assert_eq!(options.unknown_fields, UnknownFieldPolicy::Collect);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let settings = Settings {
            scrape_interval: "soon".to_string(),
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(DatasourceError::Config(_))));

        let settings = Settings {
            safe_resolution: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PROMQL_DS_SAFE_RESOLUTION", " 2000 "),
            ("PROMQL_DS_MIN_INTERVAL", "10s"),
            ("PROMQL_DS_WIDE_SERIES", "not-a-bool"),
            ("PROMQL_DS_UNKNOWN_FIELDS", "fail"),
            ("SCRAPE_INTERVAL", "1m"),
        ]);
        let settings = Settings::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.safe_resolution, 2000);
        assert_eq!(settings.min_interval, Duration::from_secs(10));
        assert!(!settings.wide_series);
        assert_eq!(settings.unknown_fields, UnknownFieldPolicy::Fail);
        // unprefixed keys are not read
        assert!(settings.scrape_interval.is_empty());
        assert_eq!(settings.default_resolution, DEFAULT_RESOLUTION);
        assert_eq!(settings.calculator().min_interval(), Duration::from_secs(10));
    }
}
