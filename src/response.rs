use std::io::Read;
use tracing::{debug, warn};
use crate::assembler::FrameAssembler;
use crate::config::Settings;
use crate::decoder::{decode, DecodeOptions, DecodeResult, ResponseFormat, SeriesMeta};
use crate::error::DatasourceError;
use crate::exemplar::process_exemplars;
use crate::frame::{Frame, FrameMeta};
use crate::query::Query;

/// Frames and status returned for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub frames: Vec<Frame>,
    pub error: Option<DatasourceError>,
    pub dropped_points: usize,
    pub unknown_fields: Vec<String>,
    pub series_errors: Vec<DatasourceError>,
}

impl QueryResponse {
    pub fn from_error(err: DatasourceError) -> Self {
        QueryResponse {
            error: Some(err),
            ..Default::default()
        }
    }

    /// Folds the response of another sub-query (range, instant or exemplar)
    /// into this one. A later error only replaces the current one when set.
    pub fn merge(&mut self, other: QueryResponse) {
        self.frames.extend(other.frames);
        if other.error.is_some() {
            self.error = other.error;
        }
        self.dropped_points += other.dropped_points;
        self.unknown_fields.extend(other.unknown_fields);
        self.series_errors.extend(other.series_errors);
    }

    pub fn is_err(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.is_fatal())
    }

    fn set_ref_id(&mut self, ref_id: &str) {
        for frame in self.frames.iter_mut() {
            frame.ref_id = ref_id.to_string();
        }
    }
}

impl From<DecodeResult> for QueryResponse {
    fn from(res: DecodeResult) -> Self {
        QueryResponse {
            frames: res.frames,
            error: res.error,
            dropped_points: res.dropped_points,
            unknown_fields: res.unknown_fields,
            series_errors: res.series_errors,
        }
    }
}

fn log_outcome(query: &Query, res: &QueryResponse) {
    match &res.error {
        Some(err) if err.is_fatal() => warn!(ref_id = query.ref_id.as_str(), "query failed: {err}"),
        _ => debug!(
            ref_id = query.ref_id.as_str(),
            frames = res.frames.len(),
            dropped = res.dropped_points,
            "query response parsed"
        ),
    }
}

/// Decodes a Prometheus-style body, names the frames and samples exemplars.
pub fn parse_response<R: Read>(reader: R, query: &Query, settings: &Settings) -> QueryResponse {
    let decoded = decode(reader, ResponseFormat::Prometheus, &settings.decode_options());
    let mut res = QueryResponse::from(decoded);

    FrameAssembler::from_query(query).annotate(&mut res.frames, settings.wide_series);
    res.frames = process_exemplars(std::mem::take(&mut res.frames), query.step, query.utc_offset_sec);
    res.set_ref_id(&query.ref_id);

    log_outcome(query, &res);
    res
}

/// Metadata for a frame of the selected series: the caller's first frame,
/// with the decoder's own custom keys and notices kept on top.
fn inherit_meta(template: &FrameMeta, own: Option<FrameMeta>) -> FrameMeta {
    let mut meta = template.clone();
    if let Some(own) = own {
        meta.custom.extend(own.custom);
        meta.notices.extend(own.notices);
        if meta.frame_type.is_none() {
            meta.frame_type = own.frame_type;
        }
    }
    meta
}

/// Decodes an algorithm envelope for `query`.
///
/// With a single series selected the decoded frames replace `prior`, each
/// inheriting the metadata of the first prior frame. Otherwise they are
/// appended after `prior`.
pub fn parse_algorithm_response<R: Read>(
    reader: R,
    query: &Query,
    prior: Vec<Frame>,
    series_meta: Vec<SeriesMeta>,
    settings: &Settings,
) -> QueryResponse {
    let options = DecodeOptions {
        unknown_fields: settings.unknown_fields,
        series: query.series,
        series_meta,
        ..Default::default()
    };
    let mut res = QueryResponse::from(decode(reader, ResponseFormat::Algorithm, &options));

    if query.series.is_single() {
        if let Some(template) = prior.first().and_then(|f| f.meta.as_ref()) {
            for frame in res.frames.iter_mut() {
                frame.meta = Some(inherit_meta(template, frame.meta.take()));
            }
        }
    } else {
        let mut frames = prior;
        frames.append(&mut res.frames);
        res.frames = frames;
    }
    res.set_ref_id(&query.ref_id);

    log_outcome(query, &res);
    res
}

/// Decodes the results of a realtime algorithm task.
pub fn parse_realtime_response<R: Read>(reader: R, query: &Query, settings: &Settings) -> QueryResponse {
    let options = DecodeOptions {
        unknown_fields: settings.unknown_fields,
        ..Default::default()
    };
    let mut res = QueryResponse::from(decode(reader, ResponseFormat::RealtimeResult, &options));
    res.set_ref_id(&query.ref_id);

    log_outcome(query, &res);
    res
}
