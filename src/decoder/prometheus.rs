use std::collections::BTreeMap;
use ahash::AHashMap;
use std::io::Read;
use serde_json::Value;
use tracing::{debug, warn};
use crate::common::time::{time_from_float_secs, time_from_loki_string};
use crate::common::{Labels, Sample, Timestamp};
use crate::decoder::{
    read_float_lenient, read_labels, read_string_lenient, DecodeContext, DecodeOptions, DecodeResult,
    JsonCursor, ResultKind, TokenKind,
};
use crate::error::{DatasourceError, DatasourceResult};
use crate::frame::{
    Field, FieldType, FieldValues, Frame, FrameMeta, FrameType, Notice, TIME_FIELD_NAME, VALUE_FIELD_NAME,
};

const STREAM_LABELS_FIELD: &str = "__labels";
const STREAM_LINE_FIELD: &str = "line";
const STREAM_TS_FIELD: &str = "TS";

/// Reads a full Prometheus API envelope.
pub(crate) fn read_prometheus_result<R: Read>(
    cursor: &mut JsonCursor<R>,
    options: &DecodeOptions,
    ctx: &mut DecodeContext,
) -> DatasourceResult<DecodeResult> {
    match cursor.peek_kind()? {
        TokenKind::Object => {}
        TokenKind::Array => return read_array_data(cursor, ctx).map(DecodeResult::from_frames),
        other => {
            return Err(DatasourceError::structural(format!(
                "expected object or array at top level, found {other:?}"
            )))
        }
    }

    let mut status = String::from("unknown");
    let mut error_type = String::new();
    let mut error = String::new();
    let mut warnings: Vec<Notice> = Vec::new();
    let mut data: Option<DecodeResult> = None;

    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        match key.as_str() {
            "status" => status = read_string_lenient(cursor)?,
            "data" => data = Some(read_data(cursor, options, ctx)?),
            "error" => error = read_string_lenient(cursor)?,
            "errorType" => error_type = read_string_lenient(cursor)?,
            "warnings" => warnings = read_warnings(cursor)?,
            "infos" => cursor.skip_value()?,
            _ => ctx.unknown_field(cursor, "", &key)?,
        }
    }

    if status == "error" {
        warn!(error_type = error_type.as_str(), "upstream returned an error: {error}");
        return Ok(DecodeResult::from_error(DatasourceError::upstream(error_type, error)));
    }

    let mut res = data.unwrap_or_else(|| DecodeResult::from_frames(vec![]));
    if !warnings.is_empty() {
        for frame in res.frames.iter_mut() {
            frame.meta_mut().notices.extend(warnings.iter().cloned());
        }
    }
    Ok(res)
}

fn read_warnings<R: Read>(cursor: &mut JsonCursor<R>) -> DatasourceResult<Vec<Notice>> {
    let mut warnings = Vec::new();
    if cursor.peek_kind()? != TokenKind::Array {
        cursor.skip_value()?;
        return Ok(warnings);
    }
    cursor.enter_array()?;
    while cursor.next_element()? {
        if cursor.peek_kind()? == TokenKind::String {
            warnings.push(Notice::warning(cursor.read_string()?));
        } else {
            cursor.skip_value()?;
        }
    }
    Ok(warnings)
}

fn read_data<R: Read>(
    cursor: &mut JsonCursor<R>,
    options: &DecodeOptions,
    ctx: &mut DecodeContext,
) -> DatasourceResult<DecodeResult> {
    match cursor.peek_kind()? {
        TokenKind::Object => {}
        TokenKind::Array => return read_array_data(cursor, ctx).map(DecodeResult::from_frames),
        other => {
            return Err(DatasourceError::structural(format!(
                "expected object for \"data\", found {other:?}"
            )))
        }
    }

    let mut result_type = String::new();
    let mut res: Option<DecodeResult> = None;

    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        match key.as_str() {
            "resultType" => result_type = cursor.read_string()?,
            "result" => {
                let kind = ResultKind::from_result_type(&result_type).ok_or_else(|| {
                    DatasourceError::structural(format!("unknown result type: \"{result_type}\""))
                })?;
                debug!(result_type = kind.as_str(), "reading result");
                let frames = match kind {
                    ResultKind::Matrix if options.matrix_wide => read_matrix_or_vector_wide(cursor, kind, ctx)?,
                    ResultKind::Vector if options.vector_wide => read_matrix_or_vector_wide(cursor, kind, ctx)?,
                    ResultKind::Matrix | ResultKind::Vector => read_matrix_or_vector_multi(cursor, kind, ctx)?,
                    ResultKind::Scalar => vec![read_scalar(cursor, ctx)?],
                    ResultKind::String => vec![read_string_result(cursor, ctx)?],
                    ResultKind::Streams => read_streams(cursor, ctx)?,
                    _ => {
                        return Err(DatasourceError::structural(format!(
                            "unexpected result type: \"{result_type}\""
                        )))
                    }
                };
                res = Some(DecodeResult::from_frames(frames));
            }
            "status" => {
                let status = cursor.read_value()?;
                if let Some(frame) = res.as_mut().and_then(|r| r.frames.first_mut()) {
                    frame.set_custom("status", status);
                }
            }
            "stats" => cursor.skip_value()?,
            _ => ctx.unknown_field(cursor, "data", &key)?,
        }
    }

    Ok(res.unwrap_or_else(|| DecodeResult::from_frames(vec![])))
}

/// Reads a `[time, "value"]` pair. Unparseable pairs are dropped.
pub(crate) fn read_sample_pair<R: Read>(
    cursor: &mut JsonCursor<R>,
    ctx: &mut DecodeContext,
) -> DatasourceResult<Option<Sample>> {
    cursor.enter_array()?;
    let mut ts = None;
    let mut value = None;
    let mut idx = 0;
    while cursor.next_element()? {
        match idx {
            0 => ts = read_float_lenient(cursor)?,
            1 => value = read_float_lenient(cursor)?,
            _ => cursor.skip_value()?,
        }
        idx += 1;
    }
    match (ts, value) {
        (Some(ts), Some(value)) => Ok(Some(Sample::new(time_from_float_secs(ts), value))),
        _ => {
            ctx.drop_point("invalid sample pair");
            Ok(None)
        }
    }
}

#[derive(Debug, Default)]
struct HistogramColumns {
    time: Vec<Timestamp>,
    y_min: Vec<f64>,
    y_max: Vec<f64>,
    count: Vec<f64>,
    y_layout: Vec<i8>,
}

impl HistogramColumns {
    fn push(&mut self, ts: Timestamp, bucket: HistogramBucket) {
        self.time.push(ts);
        self.y_layout.push(bucket.layout);
        self.y_min.push(bucket.lower);
        self.y_max.push(bucket.upper);
        self.count.push(bucket.count);
    }

    fn into_frame(self, labels: Labels) -> Frame {
        let fields = vec![
            Field::new("xMax", FieldValues::Time(self.time)),
            Field::new("yMin", FieldValues::Float64(self.y_min)).with_labels(labels),
            Field::new("yMax", FieldValues::Float64(self.y_max)),
            Field::new("count", FieldValues::Float64(self.count)),
            Field::new("yLayout", FieldValues::Int8(self.y_layout)),
        ];
        Frame::new("", fields).with_meta(FrameMeta::new(
            Some(FrameType::HeatmapCells),
            Some(ResultKind::Histogram.as_str()),
        ))
    }
}

#[derive(Debug, Clone, Copy)]
struct HistogramBucket {
    layout: i8,
    lower: f64,
    upper: f64,
    count: f64,
}

/// Reads a native histogram sample: `[time, {count, sum, buckets: [[layout, lo, hi, count]...]}]`.
fn read_histogram<R: Read>(
    cursor: &mut JsonCursor<R>,
    hist: &mut HistogramColumns,
    ctx: &mut DecodeContext,
) -> DatasourceResult<()> {
    cursor.enter_array()?;
    let mut ts: Option<Timestamp> = None;
    let mut idx = 0;
    while cursor.next_element()? {
        match idx {
            0 => ts = read_float_lenient(cursor)?.map(time_from_float_secs),
            1 => read_histogram_body(cursor, ts, hist, ctx)?,
            _ => cursor.skip_value()?,
        }
        idx += 1;
    }
    Ok(())
}

fn read_histogram_body<R: Read>(
    cursor: &mut JsonCursor<R>,
    ts: Option<Timestamp>,
    hist: &mut HistogramColumns,
    ctx: &mut DecodeContext,
) -> DatasourceResult<()> {
    if cursor.peek_kind()? != TokenKind::Object {
        return cursor.skip_value();
    }
    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        match key.as_str() {
            "count" | "sum" => cursor.skip_value()?,
            "buckets" => {
                cursor.enter_array()?;
                while cursor.next_element()? {
                    match (ts, read_histogram_bucket(cursor)?) {
                        (Some(ts), Some(bucket)) => hist.push(ts, bucket),
                        _ => ctx.drop_point("invalid histogram bucket"),
                    }
                }
            }
            _ => ctx.unknown_field(cursor, "histogram", &key)?,
        }
    }
    Ok(())
}

fn read_histogram_bucket<R: Read>(cursor: &mut JsonCursor<R>) -> DatasourceResult<Option<HistogramBucket>> {
    cursor.enter_array()?;
    let mut parts: [Option<f64>; 4] = [None; 4];
    let mut idx = 0;
    while cursor.next_element()? {
        match parts.get_mut(idx) {
            Some(slot) => *slot = read_float_lenient(cursor)?,
            None => cursor.skip_value()?,
        }
        idx += 1;
    }
    let [Some(layout), Some(lower), Some(upper), Some(count)] = parts else {
        return Ok(None);
    };
    if layout.fract() != 0.0 || layout < i8::MIN as f64 || layout > i8::MAX as f64 {
        return Ok(None);
    }
    Ok(Some(HistogramBucket {
        layout: layout as i8,
        lower,
        upper,
        count,
    }))
}

/// One element of a matrix or vector `result` array.
#[derive(Debug, Default)]
struct SeriesEntry {
    labels: Labels,
    samples: Vec<Sample>,
    has_samples: bool,
    histogram: Option<HistogramColumns>,
}

fn read_series_entry<R: Read>(cursor: &mut JsonCursor<R>, ctx: &mut DecodeContext) -> DatasourceResult<SeriesEntry> {
    let mut entry = SeriesEntry::default();
    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        match key.as_str() {
            "metric" => entry.labels = read_labels(cursor)?,
            "value" => {
                entry.has_samples = true;
                if let Some(sample) = read_sample_pair(cursor, ctx)? {
                    entry.samples.push(sample);
                }
            }
            "values" => {
                entry.has_samples = true;
                cursor.enter_array()?;
                while cursor.next_element()? {
                    if let Some(sample) = read_sample_pair(cursor, ctx)? {
                        entry.samples.push(sample);
                    }
                }
            }
            "histogram" => {
                let hist = entry.histogram.get_or_insert_with(HistogramColumns::default);
                read_histogram(cursor, hist, ctx)?;
            }
            "histograms" => {
                let hist = entry.histogram.get_or_insert_with(HistogramColumns::default);
                cursor.enter_array()?;
                while cursor.next_element()? {
                    read_histogram(cursor, hist, ctx)?;
                }
            }
            _ => ctx.unknown_field(cursor, "data.result", &key)?,
        }
    }
    Ok(entry)
}

fn series_frame(entry: SeriesEntry, kind: ResultKind) -> Frame {
    let (timestamps, values): (Vec<Timestamp>, Vec<f64>) =
        entry.samples.iter().map(|s| (s.timestamp, s.value)).unzip();
    let fields = vec![
        Field::time(timestamps),
        Field::new(VALUE_FIELD_NAME, FieldValues::Float64(values)).with_labels(entry.labels),
    ];
    Frame::new("", fields).with_meta(FrameMeta::new(Some(FrameType::TimeSeriesMany), Some(kind.as_str())))
}

/// One frame per series.
fn read_matrix_or_vector_multi<R: Read>(
    cursor: &mut JsonCursor<R>,
    kind: ResultKind,
    ctx: &mut DecodeContext,
) -> DatasourceResult<Vec<Frame>> {
    let mut frames = Vec::new();
    cursor.enter_array()?;
    while cursor.next_element()? {
        let mut entry = read_series_entry(cursor, ctx)?;
        let histogram = entry.histogram.take();
        let labels = entry.labels.clone();
        if entry.has_samples || histogram.is_none() {
            frames.push(series_frame(entry, kind));
        }
        if let Some(hist) = histogram {
            frames.push(hist.into_frame(labels));
        }
    }
    Ok(frames)
}

/// One frame with a shared, sorted time column and a nullable value column per series.
fn read_matrix_or_vector_wide<R: Read>(
    cursor: &mut JsonCursor<R>,
    kind: ResultKind,
    ctx: &mut DecodeContext,
) -> DatasourceResult<Vec<Frame>> {
    let mut entries: Vec<(Labels, Vec<Sample>)> = Vec::new();
    let mut histograms: Vec<Frame> = Vec::new();

    cursor.enter_array()?;
    while cursor.next_element()? {
        let mut entry = read_series_entry(cursor, ctx)?;
        let histogram = entry.histogram.take();
        if entry.has_samples || histogram.is_none() {
            entries.push((entry.labels.clone(), entry.samples));
        }
        if let Some(hist) = histogram {
            histograms.push(hist.into_frame(entry.labels));
        }
    }

    let mut frames = Vec::with_capacity(histograms.len() + 1);
    if !entries.is_empty() {
        frames.push(build_wide_frame(entries, kind));
    }
    frames.extend(histograms);
    Ok(frames)
}

fn build_wide_frame(entries: Vec<(Labels, Vec<Sample>)>, kind: ResultKind) -> Frame {
    let mut rows: BTreeMap<Timestamp, usize> = BTreeMap::new();
    for (_, samples) in entries.iter() {
        for sample in samples {
            rows.insert(sample.timestamp, 0);
        }
    }
    for (i, row) in rows.values_mut().enumerate() {
        *row = i;
    }

    let mut fields = Vec::with_capacity(entries.len() + 1);
    fields.push(Field::time(rows.keys().copied().collect()));
    for (labels, samples) in entries {
        let mut values: Vec<Option<f64>> = vec![None; rows.len()];
        for sample in samples {
            if let Some(row) = rows.get(&sample.timestamp) {
                values[*row] = Some(sample.value);
            }
        }
        fields.push(Field::new(VALUE_FIELD_NAME, FieldValues::NullableFloat64(values)).with_labels(labels));
    }
    Frame::new("", fields).with_meta(FrameMeta::new(Some(FrameType::TimeSeriesWide), Some(kind.as_str())))
}

fn read_scalar<R: Read>(cursor: &mut JsonCursor<R>, ctx: &mut DecodeContext) -> DatasourceResult<Frame> {
    let mut timestamps = Vec::with_capacity(1);
    let mut values = Vec::with_capacity(1);
    if let Some(sample) = read_sample_pair(cursor, ctx)? {
        timestamps.push(sample.timestamp);
        values.push(sample.value);
    }
    let fields = vec![
        Field::time(timestamps),
        Field::new(VALUE_FIELD_NAME, FieldValues::Float64(values)).with_labels(Labels::new()),
    ];
    Ok(Frame::new("", fields).with_meta(FrameMeta::new(
        Some(FrameType::TimeSeriesMany),
        Some(ResultKind::Scalar.as_str()),
    )))
}

fn read_string_result<R: Read>(cursor: &mut JsonCursor<R>, ctx: &mut DecodeContext) -> DatasourceResult<Frame> {
    let mut ts = None;
    let mut text = None;
    cursor.enter_array()?;
    let mut idx = 0;
    while cursor.next_element()? {
        match idx {
            0 => ts = read_float_lenient(cursor)?,
            1 => text = Some(read_string_lenient(cursor)?),
            _ => cursor.skip_value()?,
        }
        idx += 1;
    }

    let mut timestamps = Vec::with_capacity(1);
    let mut values = Vec::with_capacity(1);
    match (ts, text) {
        (Some(ts), Some(text)) => {
            timestamps.push(time_from_float_secs(ts));
            values.push(text);
        }
        _ => ctx.drop_point("invalid string result"),
    }
    let fields = vec![
        Field::time(timestamps),
        Field::new(VALUE_FIELD_NAME, FieldValues::String(values)).with_labels(Labels::new()),
    ];
    Ok(Frame::new("", fields).with_meta(FrameMeta::new(
        Some(FrameType::TimeSeriesMany),
        Some(ResultKind::String.as_str()),
    )))
}

/// Reads a Loki-style `streams` result into a single frame of
/// `__labels, Time, line, TS` columns.
fn read_streams<R: Read>(cursor: &mut JsonCursor<R>, ctx: &mut DecodeContext) -> DatasourceResult<Vec<Frame>> {
    let mut labels_col: Vec<Value> = Vec::new();
    let mut time_col: Vec<Timestamp> = Vec::new();
    let mut line_col: Vec<String> = Vec::new();
    let mut ts_col: Vec<String> = Vec::new();

    cursor.enter_array()?;
    while cursor.next_element()? {
        let mut labels = Labels::new();
        let mut rows: Vec<(Timestamp, String, String)> = Vec::new();
        cursor.enter_object()?;
        while let Some(key) = cursor.next_key()? {
            match key.as_str() {
                "stream" => labels = read_labels(cursor)?,
                "values" => {
                    cursor.enter_array()?;
                    while cursor.next_element()? {
                        if let Some(row) = read_stream_row(cursor, ctx)? {
                            rows.push(row);
                        }
                    }
                }
                _ => ctx.unknown_field(cursor, "data.result", &key)?,
            }
        }
        let labels_json = labels.to_json();
        for (time, line, raw) in rows {
            labels_col.push(labels_json.clone());
            time_col.push(time);
            line_col.push(line);
            ts_col.push(raw);
        }
    }

    // an empty stream result still yields the (zero-row) logs frame
    let fields = vec![
        Field::new(STREAM_LABELS_FIELD, FieldValues::Json(labels_col)),
        Field::new(TIME_FIELD_NAME, FieldValues::Time(time_col)),
        Field::new(STREAM_LINE_FIELD, FieldValues::String(line_col)),
        Field::new(STREAM_TS_FIELD, FieldValues::String(ts_col)),
    ];
    Ok(vec![Frame::new("", fields).with_meta(FrameMeta::new(None, Some(ResultKind::Streams.as_str())))])
}

fn read_stream_row<R: Read>(
    cursor: &mut JsonCursor<R>,
    ctx: &mut DecodeContext,
) -> DatasourceResult<Option<(Timestamp, String, String)>> {
    cursor.enter_array()?;
    let mut raw = None;
    let mut line = None;
    let mut idx = 0;
    while cursor.next_element()? {
        match idx {
            0 => raw = Some(read_string_lenient(cursor)?),
            1 => line = Some(read_string_lenient(cursor)?),
            _ => cursor.skip_value()?,
        }
        idx += 1;
    }
    let (Some(raw), Some(line)) = (raw, line) else {
        ctx.drop_point("incomplete stream entry");
        return Ok(None);
    };
    match time_from_loki_string(&raw) {
        Ok(nanos) => Ok(Some((nanos.div_euclid(1_000_000), line, raw))),
        Err(err) => {
            ctx.drop_point(&err.to_string());
            Ok(None)
        }
    }
}

/// Appends string columns named after label keys, keeping every column at the
/// same length.
#[derive(Debug, Default)]
struct LabelColumns {
    fields: Vec<Field>,
    index: AHashMap<String, usize>,
    rows: usize,
}

impl LabelColumns {
    fn column_mut(&mut self, name: &str) -> &mut Field {
        let idx = match self.index.get(name) {
            Some(idx) => *idx,
            None => {
                self.fields
                    .push(Field::new(name, FieldValues::with_type(FieldType::String, self.rows)));
                self.index.insert(name.to_string(), self.fields.len() - 1);
                self.fields.len() - 1
            }
        };
        &mut self.fields[idx]
    }

    fn push_row(&mut self, pairs: Vec<(String, String)>) {
        for (name, value) in pairs {
            if let FieldValues::String(values) = &mut self.column_mut(&name).values {
                values.push(value);
            }
        }
        let max = self.fields.iter().map(|f| f.len()).max().unwrap_or(0);
        self.rows = max.max(self.rows + 1);
        for field in self.fields.iter_mut() {
            field.values.extend_to(self.rows);
        }
    }
}

/// Reads a bare array `data` payload: label names, label sets from the series
/// endpoint, or exemplar containers.
fn read_array_data<R: Read>(cursor: &mut JsonCursor<R>, ctx: &mut DecodeContext) -> DatasourceResult<Vec<Frame>> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut strings: Vec<String> = Vec::new();
    let mut label_columns: Option<(usize, LabelColumns)> = None;

    cursor.enter_array()?;
    while cursor.next_element()? {
        match cursor.peek_kind()? {
            TokenKind::String => strings.push(cursor.read_string()?),
            TokenKind::Object => match read_label_or_exemplars(cursor, ctx)? {
                LabelsOrExemplars::Exemplars(frame) => frames.push(frame),
                LabelsOrExemplars::Labels(pairs) => {
                    let (_, columns) = label_columns.get_or_insert_with(|| {
                        frames.push(Frame::new("", vec![]));
                        (frames.len() - 1, LabelColumns::default())
                    });
                    columns.push_row(pairs);
                }
            },
            _ => strings.push(cursor.read_value()?.to_string()),
        }
    }

    if let Some((idx, columns)) = label_columns {
        if let Some(frame) = frames.get_mut(idx) {
            frame.fields = columns.fields;
        }
    }
    if !strings.is_empty() {
        frames.push(Frame::new("", vec![Field::new(VALUE_FIELD_NAME, FieldValues::String(strings))]));
    }
    debug!(frames = frames.len(), "read array data");
    Ok(frames)
}

enum LabelsOrExemplars {
    Labels(Vec<(String, String)>),
    Exemplars(Frame),
}

#[derive(Debug)]
struct ExemplarRow {
    timestamp: Timestamp,
    value: f64,
    labels: Vec<(String, String)>,
}

fn read_label_or_exemplars<R: Read>(
    cursor: &mut JsonCursor<R>,
    ctx: &mut DecodeContext,
) -> DatasourceResult<LabelsOrExemplars> {
    let mut pairs = Vec::new();
    let mut series_labels = Labels::new();
    let mut exemplars: Option<Vec<ExemplarRow>> = None;
    let mut notices: Vec<Notice> = Vec::new();

    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        match key.as_str() {
            "seriesLabels" => series_labels = read_labels(cursor)?,
            "exemplars" => {
                let rows = exemplars.get_or_insert_with(Vec::new);
                cursor.enter_array()?;
                while cursor.next_element()? {
                    if let Some(row) = read_exemplar(cursor, ctx, &mut notices)? {
                        rows.push(row);
                    }
                }
            }
            _ => pairs.push((key, read_string_lenient(cursor)?)),
        }
    }

    let Some(rows) = exemplars else {
        return Ok(LabelsOrExemplars::Labels(pairs));
    };

    let mut timestamps = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len());
    let mut columns = LabelColumns::default();
    for row in rows {
        timestamps.push(row.timestamp);
        values.push(row.value);
        columns.push_row(row.labels);
    }

    let mut fields = vec![
        Field::time(timestamps),
        Field::new(VALUE_FIELD_NAME, FieldValues::Float64(values)).with_labels(series_labels),
    ];
    fields.extend(columns.fields);
    let mut meta = FrameMeta::new(None, Some(ResultKind::Exemplar.as_str()));
    meta.notices = notices;
    Ok(LabelsOrExemplars::Exemplars(Frame::new("", fields).with_meta(meta)))
}

fn read_exemplar<R: Read>(
    cursor: &mut JsonCursor<R>,
    ctx: &mut DecodeContext,
    notices: &mut Vec<Notice>,
) -> DatasourceResult<Option<ExemplarRow>> {
    let mut timestamp = None;
    let mut value = None;
    let mut labels = Vec::new();

    cursor.enter_object()?;
    while let Some(key) = cursor.next_key()? {
        match key.as_str() {
            "value" => value = read_float_lenient(cursor)?,
            "timestamp" => timestamp = read_float_lenient(cursor)?.map(time_from_float_secs),
            "labels" => {
                labels = read_labels(cursor)?
                    .iter()
                    .map(|l| (l.name.clone(), l.value.clone()))
                    .collect()
            }
            _ => {
                ctx.unknown_field(cursor, "data.exemplars", &key)?;
                notices.push(Notice::error(format!("unable to parse key: {key} in response body")));
            }
        }
    }

    match (timestamp, value) {
        (Some(timestamp), Some(value)) => Ok(Some(ExemplarRow {
            timestamp,
            value,
            labels,
        })),
        _ => {
            ctx.drop_point("invalid exemplar");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::UnknownFieldPolicy;

    fn cursor(s: &str) -> JsonCursor<&[u8]> {
        JsonCursor::new(s.as_bytes())
    }

    #[test]
    fn test_read_sample_pair() {
        let mut ctx = DecodeContext::new(UnknownFieldPolicy::Ignore);
        let sample = read_sample_pair(&mut cursor(r#"[1435781451.781, "1"]"#), &mut ctx)
            .unwrap()
            .unwrap();
        assert_eq!(sample, Sample::new(1_435_781_451_781, 1.0));

        assert!(read_sample_pair(&mut cursor(r#"[1, "x"]"#), &mut ctx).unwrap().is_none());
        assert!(read_sample_pair(&mut cursor("[1]"), &mut ctx).unwrap().is_none());
        assert_eq!(ctx.dropped_points(), 2);
    }

    #[test]
    fn test_histogram_bucket_requires_all_parts() {
        let bucket = read_histogram_bucket(&mut cursor(r#"[0, "-0.5", "0.5", "3"]"#))
            .unwrap()
            .unwrap();
        assert_eq!(bucket.layout, 0);
        assert_eq!(bucket.count, 3.0);
        assert!(read_histogram_bucket(&mut cursor(r#"[0, "x", "0.5", "3"]"#)).unwrap().is_none());
        assert!(read_histogram_bucket(&mut cursor(r#"[900, "0", "0.5", "3"]"#)).unwrap().is_none());
    }

    #[test]
    fn test_label_columns_stay_aligned() {
        let mut columns = LabelColumns::default();
        columns.push_row(vec![("a".into(), "1".into())]);
        columns.push_row(vec![("b".into(), "2".into())]);
        columns.push_row(vec![("a".into(), "3".into()), ("b".into(), "4".into())]);
        assert_eq!(columns.fields.len(), 2);
        assert_eq!(
            columns.fields[0].values,
            FieldValues::String(vec!["1".into(), "".into(), "3".into()])
        );
        assert_eq!(
            columns.fields[1].values,
            FieldValues::String(vec!["".into(), "2".into(), "4".into()])
        );
    }
}
