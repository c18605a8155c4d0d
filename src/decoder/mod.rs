use std::fmt::Display;
use std::io::Read;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::common::Labels;
use crate::error::{DatasourceError, DatasourceResult};
use crate::frame::Frame;

pub mod algorithm;
pub mod cursor;
pub mod prometheus;

pub use algorithm::*;
pub use cursor::*;

/// The wire shape a response body is expected to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// `{status, data: {resultType, result}, error, errorType, warnings}`
    #[default]
    Prometheus,
    /// `{status, data: [entry...], message, code}` from the analytics backend
    Algorithm,
    /// Prometheus matrices wrapped by the analytics backend's realtime tasks
    RealtimeResult,
}

/// The payload variants the decoder knows how to turn into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    Vector,
    Matrix,
    Scalar,
    String,
    Streams,
    Histogram,
    AlgorithmEnvelope,
    ArrayRoot,
    Exemplar,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Vector => "vector",
            ResultKind::Matrix => "matrix",
            ResultKind::Scalar => "scalar",
            ResultKind::String => "string",
            ResultKind::Streams => "streams",
            ResultKind::Histogram => "histogram",
            ResultKind::AlgorithmEnvelope => "algorithm",
            ResultKind::ArrayRoot => "array",
            ResultKind::Exemplar => "exemplar",
        }
    }

    /// Maps a Prometheus `resultType` tag to its variant.
    pub fn from_result_type(result_type: &str) -> Option<Self> {
        match result_type {
            "vector" => Some(ResultKind::Vector),
            "matrix" => Some(ResultKind::Matrix),
            "scalar" => Some(ResultKind::Scalar),
            "string" => Some(ResultKind::String),
            "streams" => Some(ResultKind::Streams),
            _ => None,
        }
    }
}

impl Display for ResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to do with object members the decoder does not recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFieldPolicy {
    /// Skip the value, logging at debug level.
    #[default]
    Ignore,
    /// Skip the value and record its path in `DecodeResult::unknown_fields`.
    Collect,
    /// Abort the decode with `DatasourceError::UnknownField`.
    Fail,
}

impl UnknownFieldPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            UnknownFieldPolicy::Ignore => "ignore",
            UnknownFieldPolicy::Collect => "collect",
            UnknownFieldPolicy::Fail => "fail",
        }
    }
}

impl Display for UnknownFieldPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for UnknownFieldPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            value if value.eq_ignore_ascii_case("ignore") => Ok(UnknownFieldPolicy::Ignore),
            value if value.eq_ignore_ascii_case("collect") => Ok(UnknownFieldPolicy::Collect),
            value if value.eq_ignore_ascii_case("fail") => Ok(UnknownFieldPolicy::Fail),
            _ => Err(format!("unknown field policy: {}", s)),
        }
    }
}

/// Named arrays of an algorithm envelope entry, in frame emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlgorithmSeries {
    Value,
    Upper,
    Lower,
    Baseline,
    Anomaly,
    Significance,
}

impl AlgorithmSeries {
    pub const ALL: [AlgorithmSeries; 6] = [
        AlgorithmSeries::Value,
        AlgorithmSeries::Upper,
        AlgorithmSeries::Lower,
        AlgorithmSeries::Baseline,
        AlgorithmSeries::Anomaly,
        AlgorithmSeries::Significance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmSeries::Value => "value",
            AlgorithmSeries::Upper => "upper",
            AlgorithmSeries::Lower => "lower",
            AlgorithmSeries::Baseline => "baseline",
            AlgorithmSeries::Anomaly => "anomaly",
            AlgorithmSeries::Significance => "significance",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_name(name: &str) -> Option<Self> {
        AlgorithmSeries::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl Display for AlgorithmSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which algorithm series the caller wants frames for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeriesSelection {
    #[default]
    All,
    Only(AlgorithmSeries),
}

impl SeriesSelection {
    /// Parses the query model's `series` string. Empty or unrecognised names select everything.
    pub fn parse(series: &str) -> Self {
        match AlgorithmSeries::from_name(series.trim()) {
            Some(s) => SeriesSelection::Only(s),
            None => SeriesSelection::All,
        }
    }

    pub fn includes(&self, series: AlgorithmSeries) -> bool {
        match self {
            SeriesSelection::All => true,
            SeriesSelection::Only(s) => *s == series,
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, SeriesSelection::Only(_))
    }
}

/// Per-entry series metadata supplied by the caller when an algorithm entry
/// does not carry its own `labels`/`interval`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesMeta {
    pub labels: Labels,
    /// Sampling interval in seconds.
    pub interval: Option<f64>,
}

impl SeriesMeta {
    /// Builds metadata from the string forms the task API hands out: a JSON
    /// label map and a float number of seconds.
    pub fn from_strings(labels: &str, interval: &str) -> DatasourceResult<Self> {
        let labels = if labels.trim().is_empty() {
            Labels::new()
        } else {
            serde_json::from_str::<Labels>(labels)
                .map_err(|e| DatasourceError::Config(format!("invalid series labels: {e}")))?
        };
        let interval = match interval.trim() {
            "" => None,
            value => Some(
                value
                    .parse::<f64>()
                    .map_err(|_| DatasourceError::Config(format!("invalid series interval \"{value}\"")))?,
            ),
        };
        Ok(SeriesMeta { labels, interval })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    pub matrix_wide: bool,
    pub vector_wide: bool,
    pub unknown_fields: UnknownFieldPolicy,
    pub series: SeriesSelection,
    pub series_meta: Vec<SeriesMeta>,
}

impl DecodeOptions {
    pub fn wide(wide: bool) -> Self {
        DecodeOptions {
            matrix_wide: wide,
            vector_wide: wide,
            ..Default::default()
        }
    }
}

/// Output of one decode call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeResult {
    pub frames: Vec<Frame>,
    /// Response level failure, or the non-fatal `EmptyResult`.
    pub error: Option<DatasourceError>,
    /// Points skipped because their timestamp or value could not be parsed.
    pub dropped_points: usize,
    /// Paths of unrecognised members, filled under `UnknownFieldPolicy::Collect`.
    pub unknown_fields: Vec<String>,
    /// Failures reported by individual algorithm entries.
    pub series_errors: Vec<DatasourceError>,
}

impl DecodeResult {
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        let mut res = DecodeResult {
            frames,
            ..Default::default()
        };
        if res.frames.is_empty() {
            res.error = Some(DatasourceError::EmptyResult);
        }
        res
    }

    pub fn from_error(err: DatasourceError) -> Self {
        DecodeResult {
            error: Some(err),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.error, Some(DatasourceError::EmptyResult))
    }

    /// True when a hard failure was recorded.
    pub fn is_err(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.is_fatal())
    }
}

/// Mutable state shared by the decode functions of a single call.
#[derive(Debug)]
pub(crate) struct DecodeContext {
    policy: UnknownFieldPolicy,
    unknown: Vec<String>,
    dropped_points: usize,
}

impl DecodeContext {
    pub(crate) fn new(policy: UnknownFieldPolicy) -> Self {
        DecodeContext {
            policy,
            unknown: Vec::new(),
            dropped_points: 0,
        }
    }

    /// Consumes the value of an unrecognised member according to the policy.
    pub(crate) fn unknown_field<R: Read>(
        &mut self,
        cursor: &mut JsonCursor<R>,
        path: &str,
        key: &str,
    ) -> DatasourceResult<()> {
        let full = if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        };
        if self.policy == UnknownFieldPolicy::Fail {
            return Err(DatasourceError::UnknownField(full));
        }
        cursor.skip_value()?;
        match self.policy {
            UnknownFieldPolicy::Collect => self.unknown.push(full),
            _ => debug!(field = full.as_str(), "skipping unknown field"),
        }
        Ok(())
    }

    pub(crate) fn drop_point(&mut self, reason: &str) {
        self.dropped_points += 1;
        debug!(dropped = self.dropped_points, "dropping point: {reason}");
    }

    pub(crate) fn dropped_points(&self) -> usize {
        self.dropped_points
    }

    pub(crate) fn add_dropped(&mut self, count: usize) {
        if count > 0 {
            self.dropped_points += count;
            debug!(dropped = self.dropped_points, "dropping {count} unaligned points");
        }
    }

    fn finish(self, res: &mut DecodeResult) {
        res.dropped_points += self.dropped_points;
        res.unknown_fields.extend(self.unknown);
    }
}

/// Decodes one response body into frames.
///
/// The body is read once, front to back. Structural problems abort the decode
/// and are returned as the result's error with no frames attached.
pub fn decode<R: Read>(reader: R, format: ResponseFormat, options: &DecodeOptions) -> DecodeResult {
    let mut cursor = JsonCursor::new(reader);
    let mut ctx = DecodeContext::new(options.unknown_fields);

    let decoded = match format {
        ResponseFormat::Prometheus => prometheus::read_prometheus_result(&mut cursor, options, &mut ctx),
        ResponseFormat::Algorithm => algorithm::read_algorithm_result(&mut cursor, options, &mut ctx),
        ResponseFormat::RealtimeResult => algorithm::read_realtime_result(&mut cursor, &mut ctx),
    };
    let depth = cursor.depth();
    let decoded = decoded.and_then(|res| cursor.expect_end().map(|_| res));

    let mut res = match decoded {
        Ok(res) => res,
        Err(err) => {
            debug!(depth, "decode aborted: {err}");
            return DecodeResult::from_error(err);
        }
    };
    ctx.finish(&mut res);

    debug!(
        frames = res.frames.len(),
        dropped = res.dropped_points,
        "decoded {:?} response",
        format
    );
    res
}

/// Decodes a Prometheus-style response held in memory.
pub fn decode_slice(body: &[u8], options: &DecodeOptions) -> DecodeResult {
    decode(body, ResponseFormat::Prometheus, options)
}

/// Reads a label map. Non-string values are kept in their JSON text form.
pub(crate) fn read_labels<R: Read>(cursor: &mut JsonCursor<R>) -> DatasourceResult<Labels> {
    let mut labels = Labels::new();
    if cursor.peek_kind()? == TokenKind::Null {
        cursor.read_null()?;
        return Ok(labels);
    }
    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        let value = read_string_lenient(cursor)?;
        labels.insert(key, value);
    }
    Ok(labels)
}

/// Reads any value as text: strings verbatim, everything else as JSON.
pub(crate) fn read_string_lenient<R: Read>(cursor: &mut JsonCursor<R>) -> DatasourceResult<String> {
    match cursor.peek_kind()? {
        TokenKind::String => cursor.read_string(),
        _ => Ok(cursor.read_value()?.to_string()),
    }
}

/// Reads a float that may be encoded as a JSON number or a numeric string.
/// Returns `None` for anything that does not parse.
pub(crate) fn read_float_lenient<R: Read>(cursor: &mut JsonCursor<R>) -> DatasourceResult<Option<f64>> {
    match cursor.peek_kind()? {
        TokenKind::Number => cursor.read_f64().map(Some),
        TokenKind::String => Ok(parse_float(&cursor.read_string()?)),
        _ => {
            cursor.skip_value()?;
            Ok(None)
        }
    }
}

/// Parses Prometheus sample values, including `NaN` and `+Inf`/`-Inf`.
pub fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}
