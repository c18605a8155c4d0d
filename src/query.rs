use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::common::time::align_time;
use crate::common::TimeRange;
use crate::config::Settings;
use crate::decoder::SeriesSelection;
use crate::error::{DatasourceError, DatasourceResult};
use crate::interval::{
    format_compound_duration, format_duration, get_interval_from, is_rate_interval, is_variable_interval,
    rate_interval, Calculator, VAR_INTERVAL, VAR_INTERVAL_ALT, VAR_INTERVAL_MS, VAR_INTERVAL_MS_ALT,
    VAR_RATE_INTERVAL, VAR_RATE_INTERVAL_ALT,
};

const VAR_RANGE: &str = "$__range";
const VAR_RANGE_S: &str = "$__range_s";
const VAR_RANGE_MS: &str = "$__range_ms";
const VAR_RANGE_ALT: &str = "${__range}";
const VAR_RANGE_S_ALT: &str = "${__range_s}";
const VAR_RANGE_MS_ALT: &str = "${__range_ms}";

/// The per-query JSON sent by the panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryModel {
    pub expr: String,
    pub legend_format: String,
    pub interval: String,
    #[serde(rename = "intervalMS")]
    pub interval_ms: i64,
    pub interval_factor: i64,
    #[serde(rename = "range")]
    pub range_query: bool,
    #[serde(rename = "instant")]
    pub instant_query: bool,
    #[serde(rename = "exemplar")]
    pub exemplar_query: bool,
    pub utc_offset_sec: i64,
    /// Algorithm series to keep (`anomaly`, `upper`, ...). Empty keeps all.
    pub series: String,
    /// Algorithm name, version and JSON parameters for algorithm queries.
    pub name: String,
    pub version: String,
    pub params: String,
}

impl QueryModel {
    pub fn from_json(json: &[u8]) -> DatasourceResult<Self> {
        serde_json::from_slice(json).map_err(|e| DatasourceError::Config(format!("invalid query model: {e}")))
    }
}

/// A query as handed over by the host, before the step is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub ref_id: String,
    pub time_range: TimeRange,
    pub max_data_points: i64,
    pub model: QueryModel,
}

/// A query with its step resolved and template variables expanded.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub ref_id: String,
    pub expr: String,
    pub step: Duration,
    pub legend_format: String,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
    pub range_query: bool,
    pub instant_query: bool,
    pub exemplar_query: bool,
    pub utc_offset_sec: i64,
    pub series: SeriesSelection,
    pub name: String,
    pub version: String,
    pub params: String,
}

impl Query {
    pub fn parse<C: Calculator>(request: &QueryRequest, settings: &Settings, calculator: &C) -> DatasourceResult<Self> {
        let model = &request.model;
        let step = calculate_step(model, &request.time_range, request.max_data_points, settings, calculator)?;
        let expr = interpolate_variables(model, step, request.time_range.span(), &settings.scrape_interval)?;

        debug!(
            ref_id = request.ref_id.as_str(),
            step = step.as_millis() as u64,
            "resolved query: {expr}"
        );

        Ok(Query {
            ref_id: request.ref_id.clone(),
            expr,
            step,
            legend_format: model.legend_format.clone(),
            start: request.time_range.start,
            end: request.time_range.end,
            // neither flag set means a range query
            range_query: model.range_query || !model.instant_query,
            instant_query: model.instant_query,
            exemplar_query: model.exemplar_query,
            utc_offset_sec: model.utc_offset_sec,
            series: SeriesSelection::parse(&model.series),
            name: model.name.clone(),
            version: model.version.clone(),
            params: model.params.clone(),
        })
    }

    /// Start and end aligned down to the step, honouring the UTC offset.
    pub fn time_range(&self) -> TimeRange {
        let start = align_time(self.start.timestamp_millis(), self.step, self.utc_offset_sec);
        let end = align_time(self.end.timestamp_millis(), self.step, self.utc_offset_sec);
        TimeRange::from_millis(start, end).with_step(self.step)
    }
}

/// Resolves the step of a query: the calculated interval, floored by the safe
/// interval, then either turned into a rate window or scaled by the interval
/// factor.
pub fn calculate_step<C: Calculator>(
    model: &QueryModel,
    range: &TimeRange,
    max_data_points: i64,
    settings: &Settings,
    calculator: &C,
) -> DatasourceResult<Duration> {
    let hint = if is_variable_interval(&model.interval) {
        ""
    } else {
        model.interval.as_str()
    };
    let query_interval = get_interval_from(
        &settings.scrape_interval,
        hint,
        model.interval_ms,
        settings.default_time_interval,
    )?;

    let max_data_points = if max_data_points <= 0 {
        settings.default_resolution
    } else {
        max_data_points
    };
    let calculated = calculator.calculate(range, query_interval, max_data_points);
    let safe = calculator.calculate_safe_interval(range, settings.safe_resolution);
    let adjusted = calculated.value.max(safe.value);
    debug!(
        calculated = calculated.text.as_str(),
        safe = safe.text.as_str(),
        "interval for query hint {}",
        format_compound_duration(query_interval)
    );

    if is_rate_interval(&model.interval) {
        return rate_interval(adjusted, &settings.scrape_interval);
    }
    let factor = u32::try_from(model.interval_factor.max(1)).unwrap_or(u32::MAX);
    adjusted
        .checked_mul(factor)
        .ok_or_else(|| DatasourceError::Config(format!("interval factor {factor} overflows the step")))
}

/// Replaces the interval and range template variables in the expression.
pub fn interpolate_variables(
    model: &QueryModel,
    step: Duration,
    range: Duration,
    scrape_interval: &str,
) -> DatasourceResult<String> {
    let range_ms = range.as_millis();
    let range_s = (range_ms as f64 / 1000.0).round() as u64;
    let rate = if is_rate_interval(&model.interval) {
        step
    } else {
        rate_interval(step, scrape_interval)?
    };

    let interval_ms = step.as_millis().to_string();
    let interval = format_duration(step);
    let range_ms = range_ms.to_string();
    let range_secs = range_s.to_string();
    let range_text = format!("{range_s}s");
    let rate = format_compound_duration(rate);

    // longer tokens first so `$__interval` never eats `$__interval_ms`
    let replacements: [(&str, &str); 12] = [
        (VAR_INTERVAL_MS, &interval_ms),
        (VAR_INTERVAL, &interval),
        (VAR_RANGE_MS, &range_ms),
        (VAR_RANGE_S, &range_secs),
        (VAR_RANGE, &range_text),
        (VAR_RATE_INTERVAL, &rate),
        (VAR_INTERVAL_MS_ALT, &interval_ms),
        (VAR_INTERVAL_ALT, &interval),
        (VAR_RANGE_MS_ALT, &range_ms),
        (VAR_RANGE_S_ALT, &range_secs),
        (VAR_RANGE_ALT, &range_text),
        (VAR_RATE_INTERVAL_ALT, &rate),
    ];
    let mut expr = model.expr.clone();
    for (token, value) in replacements {
        if expr.contains(token) {
            expr = expr.replace(token, value);
        }
    }
    Ok(expr)
}
