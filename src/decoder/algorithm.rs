use std::io::Read;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use crate::common::{Labels, Timestamp, METRIC_NAME_LABEL};
use crate::decoder::prometheus::read_sample_pair;
use crate::decoder::{
    read_float_lenient, read_labels, read_string_lenient, AlgorithmSeries, DecodeContext, DecodeOptions,
    DecodeResult, JsonCursor, ResultKind, SeriesMeta, TokenKind,
};
use crate::error::{DatasourceError, DatasourceResult};
use crate::frame::{Field, FieldValues, Frame, FrameMeta, FrameType, Notice, VALUE_FIELD_NAME};

/// Custom metadata key naming the algorithm series a frame carries.
pub const SERIES_KEY: &str = "series";

/// Scene whose algorithms are offered for time series panels.
pub const ANOMALY_DETECTION_SCENE: &str = "timeseries_anomaly_detection";

/// `{code, status, message, messageCn}` attached to an envelope entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryStatus {
    #[serde(default, deserialize_with = "deserialize_code")]
    pub code: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub message_cn: String,
}

impl EntryStatus {
    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("error") || self.status.eq_ignore_ascii_case("failed")
    }

    pub fn to_error(&self) -> DatasourceError {
        let message = if self.message.is_empty() {
            &self.message_cn
        } else {
            &self.message
        };
        DatasourceError::upstream(self.code, message.as_str())
    }
}

fn read_entry_status<R: Read>(cursor: &mut JsonCursor<R>, ctx: &mut DecodeContext) -> DatasourceResult<EntryStatus> {
    let mut status = EntryStatus::default();
    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        match key.as_str() {
            "code" => status.code = read_code(cursor)?,
            "status" => status.status = read_string_lenient(cursor)?,
            "message" | "msg" => status.message = read_string_lenient(cursor)?,
            "messageCn" => status.message_cn = read_string_lenient(cursor)?,
            _ => ctx.unknown_field(cursor, "data.status", &key)?,
        }
    }
    Ok(status)
}

fn read_code<R: Read>(cursor: &mut JsonCursor<R>) -> DatasourceResult<i64> {
    Ok(read_float_lenient(cursor)?.map(|v| v as i64).unwrap_or_default())
}

/// Columns accumulated for one envelope entry.
#[derive(Debug, Default)]
struct AlgorithmEntry {
    labels: Option<Labels>,
    interval: Option<f64>,
    timestamps: Vec<Option<Timestamp>>,
    columns: [Option<Vec<f64>>; 6],
    status: Option<EntryStatus>,
    label_error: Option<DatasourceError>,
}

impl AlgorithmEntry {
    fn column_mut(&mut self, series: AlgorithmSeries) -> &mut Vec<f64> {
        self.columns[series.index()].get_or_insert_with(Vec::new)
    }
}

fn read_timestamps<R: Read>(cursor: &mut JsonCursor<R>) -> DatasourceResult<Vec<Option<Timestamp>>> {
    let mut res = Vec::new();
    cursor.enter_array()?;
    while cursor.next_element()? {
        res.push(read_timestamp(cursor)?);
    }
    Ok(res)
}

/// Algorithm timestamps are integer milliseconds.
fn read_timestamp<R: Read>(cursor: &mut JsonCursor<R>) -> DatasourceResult<Option<Timestamp>> {
    match cursor.peek_kind()? {
        TokenKind::Number => cursor.read_i64().map(Some),
        _ => Ok(read_float_lenient(cursor)?.map(|v| v as Timestamp)),
    }
}

/// Missing and unparseable values become NaN so the column stays aligned.
fn read_series_value<R: Read>(cursor: &mut JsonCursor<R>) -> DatasourceResult<f64> {
    Ok(read_float_lenient(cursor)?.unwrap_or(f64::NAN))
}

fn read_series_values<R: Read>(cursor: &mut JsonCursor<R>) -> DatasourceResult<Vec<f64>> {
    let mut res = Vec::new();
    cursor.enter_array()?;
    while cursor.next_element()? {
        res.push(read_series_value(cursor)?);
    }
    Ok(res)
}

/// Reads the members shared by entries and their `data` object: the
/// timestamp array and the named value arrays. Returns false for other keys.
fn read_parallel_member<R: Read>(
    cursor: &mut JsonCursor<R>,
    key: &str,
    entry: &mut AlgorithmEntry,
) -> DatasourceResult<bool> {
    if key == "timestamp" {
        entry.timestamps = read_timestamps(cursor)?;
        return Ok(true);
    }
    match AlgorithmSeries::from_name(key) {
        Some(series) => {
            *entry.column_mut(series) = read_series_values(cursor)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Reads `data` given as an array of `{timestamp, value, upper, ...}` rows.
fn read_rows<R: Read>(
    cursor: &mut JsonCursor<R>,
    entry: &mut AlgorithmEntry,
    ctx: &mut DecodeContext,
) -> DatasourceResult<()> {
    cursor.enter_array()?;
    while cursor.next_element()? {
        let mut ts = None;
        let mut row: [Option<f64>; 6] = [None; 6];
        cursor.enter_object()?;
        while let Some(key) = cursor.next_key()? {
            if key == "timestamp" {
                ts = read_timestamp(cursor)?;
                continue;
            }
            match AlgorithmSeries::from_name(&key) {
                Some(series) => row[series.index()] = Some(read_series_value(cursor)?),
                None => ctx.unknown_field(cursor, "data.data", &key)?,
            }
        }

        let rows = entry.timestamps.len();
        entry.timestamps.push(ts);
        for series in AlgorithmSeries::ALL {
            let value = row[series.index()];
            if value.is_none() && entry.columns[series.index()].is_none() {
                continue;
            }
            let column = entry.column_mut(series);
            column.resize(rows, f64::NAN);
            column.push(value.unwrap_or(f64::NAN));
        }
    }
    Ok(())
}

fn read_entry_data<R: Read>(
    cursor: &mut JsonCursor<R>,
    entry: &mut AlgorithmEntry,
    ctx: &mut DecodeContext,
) -> DatasourceResult<()> {
    match cursor.peek_kind()? {
        TokenKind::Array => read_rows(cursor, entry, ctx),
        TokenKind::Object => {
            cursor.enter_object()?;
            while let Some(key) = cursor.next_key()? {
                if !read_parallel_member(cursor, &key, entry)? {
                    ctx.unknown_field(cursor, "data.data", &key)?;
                }
            }
            Ok(())
        }
        _ => cursor.skip_value(),
    }
}

fn read_entry<R: Read>(cursor: &mut JsonCursor<R>, ctx: &mut DecodeContext) -> DatasourceResult<AlgorithmEntry> {
    let mut entry = AlgorithmEntry::default();
    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        match key.as_str() {
            "labels" => match cursor.peek_kind()? {
                TokenKind::String => {
                    let text = cursor.read_string()?;
                    match serde_json::from_str::<Labels>(&text) {
                        Ok(labels) => entry.labels = Some(labels),
                        Err(e) => {
                            entry.label_error = Some(DatasourceError::structural(format!("invalid labels: {e}")))
                        }
                    }
                }
                _ => entry.labels = Some(read_labels(cursor)?),
            },
            "interval" => entry.interval = read_float_lenient(cursor)?,
            "status" => entry.status = Some(read_entry_status(cursor, ctx)?),
            "data" => read_entry_data(cursor, &mut entry, ctx)?,
            _ => {
                if !read_parallel_member(cursor, &key, &mut entry)? {
                    ctx.unknown_field(cursor, "data", &key)?;
                }
            }
        }
    }
    Ok(entry)
}

fn algorithm_frame(
    series: AlgorithmSeries,
    timestamps: &[Option<Timestamp>],
    values: &[f64],
    labels: &Labels,
    interval: Option<f64>,
    ctx: &mut DecodeContext,
) -> Frame {
    let n = timestamps.len().min(values.len());
    ctx.add_dropped(timestamps.len().max(values.len()) - n);

    let mut times = Vec::with_capacity(n);
    let mut column = Vec::with_capacity(n);
    for (ts, value) in timestamps.iter().zip(values.iter()) {
        match ts {
            Some(ts) => {
                times.push(*ts);
                column.push(*value);
            }
            None => ctx.drop_point("invalid algorithm timestamp"),
        }
    }

    let mut time_field = Field::time(times);
    time_field.config.interval_ms = interval.map(|secs| secs * 1000.0);
    let value_field = Field::new(VALUE_FIELD_NAME, FieldValues::Float64(column)).with_labels(labels.clone());

    let mut meta = FrameMeta::new(
        Some(FrameType::TimeSeriesMany),
        Some(ResultKind::AlgorithmEnvelope.as_str()),
    );
    meta.custom
        .insert(SERIES_KEY.to_string(), Value::String(series.as_str().to_string()));
    Frame::new(series.as_str(), vec![time_field, value_field]).with_meta(meta)
}

/// Reads the analytics backend envelope: `{status, data: [entry...], message, code}`.
///
/// Each entry yields one frame per non-empty named array allowed by the
/// selection, in `value, upper, lower, baseline, anomaly, significance` order.
/// A failed entry is recorded in `series_errors` without aborting the decode.
pub(crate) fn read_algorithm_result<R: Read>(
    cursor: &mut JsonCursor<R>,
    options: &DecodeOptions,
    ctx: &mut DecodeContext,
) -> DatasourceResult<DecodeResult> {
    if cursor.peek_kind()? != TokenKind::Object {
        return Err(DatasourceError::structural("expected object at top level"));
    }

    let mut status = String::from("unknown");
    let mut message = String::new();
    let mut message_cn = String::new();
    let mut code = 0;
    let mut frames = Vec::new();
    let mut series_errors = Vec::new();

    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        match key.as_str() {
            "status" => status = read_string_lenient(cursor)?,
            "message" | "msg" => message = read_string_lenient(cursor)?,
            "messageCn" => message_cn = read_string_lenient(cursor)?,
            "code" => code = read_code(cursor)?,
            "data" => match cursor.peek_kind()? {
                TokenKind::Array => {
                    cursor.enter_array()?;
                    let mut idx = 0;
                    while cursor.next_element()? {
                        let entry = read_entry(cursor, ctx)?;
                        append_entry_frames(entry, idx, options, ctx, &mut frames, &mut series_errors);
                        idx += 1;
                    }
                }
                TokenKind::Object => {
                    let entry = read_entry(cursor, ctx)?;
                    append_entry_frames(entry, 0, options, ctx, &mut frames, &mut series_errors);
                }
                _ => cursor.skip_value()?,
            },
            _ => ctx.unknown_field(cursor, "", &key)?,
        }
    }

    if status == "error" {
        let message = if message.is_empty() { message_cn } else { message };
        warn!(code, "algorithm backend returned an error: {message}");
        return Ok(DecodeResult::from_error(DatasourceError::upstream(code, message)));
    }

    debug!(
        frames = frames.len(),
        failed_series = series_errors.len(),
        "read algorithm result"
    );
    let mut res = DecodeResult::from_frames(frames);
    res.series_errors = series_errors;
    Ok(res)
}

fn append_entry_frames(
    entry: AlgorithmEntry,
    idx: usize,
    options: &DecodeOptions,
    ctx: &mut DecodeContext,
    frames: &mut Vec<Frame>,
    series_errors: &mut Vec<DatasourceError>,
) {
    let meta = options.series_meta.get(idx);
    let labels = entry
        .labels
        .or_else(|| meta.map(|m| m.labels.clone()))
        .unwrap_or_default();
    let interval = entry.interval.or_else(|| meta.and_then(|m| m.interval));

    let failure = entry.status.as_ref().filter(|s| s.is_error()).map(|s| s.to_error());
    if let Some(err) = entry.label_error.clone() {
        series_errors.push(err);
    }
    if let Some(err) = &failure {
        warn!(entry = idx, "algorithm series failed: {err}");
        series_errors.push(err.clone());
    }

    for series in AlgorithmSeries::ALL {
        if !options.series.includes(series) {
            continue;
        }
        let Some(values) = entry.columns[series.index()].as_deref() else {
            continue;
        };
        if values.is_empty() {
            continue;
        }
        let mut frame = algorithm_frame(series, &entry.timestamps, values, &labels, interval, ctx);
        if let Some(err) = &failure {
            frame.append_notice(Notice::error(err.to_string()));
        }
        frames.push(frame);
    }
}

const REALTIME_SERIES_PREFIXES: [&str; 5] = ["upper", "lower", "baseline", "anomaly", "significance"];

/// Reads realtime task results: `{status, data: [{data: {result: [matrix entry...]}}]}`.
/// Series are named after their `__name__` label; only algorithm outputs are kept.
pub(crate) fn read_realtime_result<R: Read>(
    cursor: &mut JsonCursor<R>,
    ctx: &mut DecodeContext,
) -> DatasourceResult<DecodeResult> {
    if cursor.peek_kind()? != TokenKind::Object {
        return Err(DatasourceError::structural("expected object at top level"));
    }

    let mut status = String::from("unknown");
    let mut message = String::new();
    let mut code = 0;
    let mut frames = Vec::new();

    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        match key.as_str() {
            "status" => status = read_string_lenient(cursor)?,
            "message" | "msg" => message = read_string_lenient(cursor)?,
            "messageCn" => {
                let cn = read_string_lenient(cursor)?;
                if message.is_empty() {
                    message = cn;
                }
            }
            "code" => code = read_code(cursor)?,
            "data" => match cursor.peek_kind()? {
                TokenKind::Array => {
                    cursor.enter_array()?;
                    while cursor.next_element()? {
                        read_realtime_item(cursor, ctx, &mut frames)?;
                    }
                }
                TokenKind::Object => read_realtime_item(cursor, ctx, &mut frames)?,
                _ => cursor.skip_value()?,
            },
            _ => ctx.unknown_field(cursor, "", &key)?,
        }
    }

    if status == "error" {
        warn!(code, "realtime task returned an error: {message}");
        return Ok(DecodeResult::from_error(DatasourceError::upstream(code, message)));
    }
    Ok(DecodeResult::from_frames(frames))
}

fn read_realtime_item<R: Read>(
    cursor: &mut JsonCursor<R>,
    ctx: &mut DecodeContext,
    frames: &mut Vec<Frame>,
) -> DatasourceResult<()> {
    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        if key != "data" || cursor.peek_kind()? != TokenKind::Object {
            ctx.unknown_field(cursor, "data", &key)?;
            continue;
        }
        cursor.enter_object()?;
        while let Some(key) = cursor.next_key()? {
            match key.as_str() {
                "result" => {
                    cursor.enter_array()?;
                    while cursor.next_element()? {
                        if let Some(frame) = read_realtime_series(cursor, ctx)? {
                            frames.push(frame);
                        }
                    }
                }
                "resultType" => cursor.skip_value()?,
                _ => ctx.unknown_field(cursor, "data.data", &key)?,
            }
        }
    }
    Ok(())
}

fn read_realtime_series<R: Read>(
    cursor: &mut JsonCursor<R>,
    ctx: &mut DecodeContext,
) -> DatasourceResult<Option<Frame>> {
    let mut labels = Labels::new();
    let mut times = Vec::new();
    let mut values = Vec::new();
    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        match key.as_str() {
            "metric" => labels = read_labels(cursor)?,
            "values" => {
                cursor.enter_array()?;
                while cursor.next_element()? {
                    if let Some(sample) = read_sample_pair(cursor, ctx)? {
                        times.push(sample.timestamp);
                        values.push(sample.value);
                    }
                }
            }
            "value" => {
                if let Some(sample) = read_sample_pair(cursor, ctx)? {
                    times.push(sample.timestamp);
                    values.push(sample.value);
                }
            }
            _ => ctx.unknown_field(cursor, "data.data.result", &key)?,
        }
    }

    let name = labels.get(METRIC_NAME_LABEL).unwrap_or_default().to_string();
    if !REALTIME_SERIES_PREFIXES.iter().any(|p| name.starts_with(p)) {
        debug!(name = name.as_str(), "skipping realtime series");
        return Ok(None);
    }
    let fields = vec![
        Field::time(times),
        Field::new(VALUE_FIELD_NAME, FieldValues::Float64(values)).with_labels(labels),
    ];
    Ok(Some(Frame::new(name, fields).with_meta(FrameMeta::new(
        Some(FrameType::TimeSeriesMany),
        Some(ResultKind::Matrix.as_str()),
    ))))
}

fn deserialize_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|v| v as i64)).unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn deserialize_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Value::deserialize(deserializer).map(value_to_text)
}

/// Envelope of the analytics backend's management endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreResponse<T> {
    #[serde(default)]
    pub status: String,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default, alias = "msg")]
    pub message: String,
    #[serde(default, deserialize_with = "deserialize_code")]
    pub code: i64,
}

impl<T> CoreResponse<T> {
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }

    fn map_data<U>(self, f: impl FnOnce(T) -> U) -> CoreResponse<U> {
        CoreResponse {
            status: self.status,
            data: self.data.map(f),
            message: self.message,
            code: self.code,
        }
    }

    /// Returns the payload, or the upstream failure.
    pub fn into_result(self) -> DatasourceResult<T> {
        if self.is_error() {
            return Err(DatasourceError::upstream(self.code, self.message));
        }
        self.data.ok_or(DatasourceError::EmptyResult)
    }
}

fn read_core<T: DeserializeOwned, R: Read>(reader: R) -> DatasourceResult<CoreResponse<T>> {
    let res: CoreResponse<T> = serde_json::from_reader(reader)?;
    if res.is_error() {
        warn!(code = res.code, "core request failed: {}", res.message);
    }
    Ok(res)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmInfo {
    pub id: String,
    pub name: String,
    pub algorithm_name: String,
    pub algorithm_version: String,
    pub display_names: String,
    pub descriptions: String,
    /// JSON text describing the tunable parameters.
    pub parameters: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAlgorithmList {
    Scenes(Vec<RawScene>),
    Legacy(RawLegacyList),
}

#[derive(Debug, Deserialize)]
struct RawScene {
    #[serde(default)]
    name: String,
    #[serde(default)]
    algorithms: Vec<RawAlgorithm>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAlgorithm {
    #[serde(default, deserialize_with = "deserialize_text")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    display_names: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    descriptions: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    params: String,
}

#[derive(Debug, Deserialize)]
struct RawLegacyList {
    #[serde(default)]
    content: Vec<RawLegacyAlgorithm>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLegacyAlgorithm {
    #[serde(default, deserialize_with = "deserialize_text")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    algorithm_name: String,
    #[serde(default)]
    algorithm_version: String,
    #[serde(default)]
    builtin_display_names: String,
    #[serde(default)]
    builtin_descriptions: String,
    #[serde(default)]
    parameters: Vec<RawParameter>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawParameter {
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    value: String,
}

impl From<RawAlgorithmList> for Vec<AlgorithmInfo> {
    fn from(raw: RawAlgorithmList) -> Self {
        match raw {
            RawAlgorithmList::Scenes(scenes) => scenes
                .into_iter()
                .filter(|scene| scene.name == ANOMALY_DETECTION_SCENE)
                .flat_map(|scene| scene.algorithms)
                .map(|a| AlgorithmInfo {
                    id: a.id,
                    name: a.name.clone(),
                    algorithm_name: a.name,
                    algorithm_version: a.version,
                    display_names: a.display_names,
                    descriptions: a.descriptions,
                    parameters: a.params,
                })
                .collect(),
            RawAlgorithmList::Legacy(list) => list
                .content
                .into_iter()
                .map(|a| AlgorithmInfo {
                    id: a.id,
                    name: a.name,
                    algorithm_name: a.algorithm_name,
                    algorithm_version: a.algorithm_version,
                    display_names: a.builtin_display_names,
                    descriptions: a.builtin_descriptions,
                    parameters: serde_json::to_string(&a.parameters).unwrap_or_default(),
                })
                .collect(),
        }
    }
}

/// Reads the algorithm catalogue, keeping only anomaly detection algorithms.
pub fn read_algorithm_list<R: Read>(reader: R) -> DatasourceResult<CoreResponse<Vec<AlgorithmInfo>>> {
    let res: CoreResponse<RawAlgorithmList> = read_core(reader)?;
    let res = res.map_data(Vec::<AlgorithmInfo>::from);
    debug!(
        algorithms = res.data.as_ref().map(|d| d.len()).unwrap_or_default(),
        "read algorithm list"
    );
    Ok(res)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub params: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub meta_info: String,
}

#[derive(Debug, Deserialize)]
struct MetaInfo {
    #[serde(default, deserialize_with = "deserialize_text")]
    labels: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    interval: String,
}

impl TaskInfo {
    /// Decodes `metaInfo` (`{"labels": "<json>", "interval": "<secs>"}`) into
    /// the per-series metadata used when decoding task results.
    pub fn series_meta(&self) -> DatasourceResult<SeriesMeta> {
        if self.meta_info.trim().is_empty() {
            return Ok(SeriesMeta::default());
        }
        let meta: MetaInfo = serde_json::from_str(&self.meta_info)
            .map_err(|e| DatasourceError::Config(format!("invalid task meta info: {e}")))?;
        SeriesMeta::from_strings(&meta.labels, &meta.interval)
    }
}

#[derive(Debug, Deserialize)]
struct RawTaskEntry {
    #[serde(default)]
    status: Option<EntryStatus>,
    #[serde(default)]
    data: Option<TaskInfo>,
}

/// Reads the response to a task initialisation request.
pub fn read_task_init<R: Read>(reader: R) -> DatasourceResult<CoreResponse<Vec<TaskInfo>>> {
    let res: CoreResponse<Vec<RawTaskEntry>> = read_core(reader)?;
    Ok(res.map_data(|entries| {
        entries
            .into_iter()
            .filter_map(|entry| {
                if let Some(status) = entry.status.as_ref().filter(|s| s.is_error()) {
                    warn!(code = status.code, "task initialisation failed: {}", status.message);
                }
                entry.data
            })
            .collect()
    }))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAck {
    #[serde(default)]
    pub task_id: String,
}

/// Reads the `{taskId}` acknowledgement returned when a task is saved.
pub fn read_task_ack<R: Read>(reader: R) -> DatasourceResult<CoreResponse<TaskAck>> {
    read_core(reader)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub query: String,
}

/// Reads the list of saved realtime tasks.
pub fn read_task_list<R: Read>(reader: R) -> DatasourceResult<CoreResponse<Vec<TaskSummary>>> {
    read_core(reader)
}

#[derive(Debug, Deserialize)]
struct RawToken {
    #[serde(rename = "Token", default)]
    token: String,
}

/// Reads a generated access token.
pub fn read_token<R: Read>(reader: R) -> DatasourceResult<CoreResponse<String>> {
    let res: CoreResponse<RawToken> = read_core(reader)?;
    Ok(res.map_data(|t| t.token))
}
