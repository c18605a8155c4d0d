use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::debug;
use crate::common::time::align_time;
use crate::common::{Labels, Timestamp};
use crate::decoder::ResultKind;
use crate::frame::{Field, FieldValues, Frame, VALUE_FIELD_NAME};

pub const EXEMPLAR_FRAME_NAME: &str = "exemplar";

/// Running count, mean and sum of squared deviations (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    pub count: usize,
    pub mean: f64,
    pub m2: f64,
}

impl Accumulator {
    #[must_use]
    pub fn update(self, value: f64) -> Self {
        let count = self.count + 1;
        let delta = value - self.mean;
        let mean = self.mean + delta / count as f64;
        let m2 = self.m2 + delta * (value - mean);
        Accumulator { count, mean, m2 }
    }

    /// Sample variance. Zero until two values have been seen.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        self.m2 / (self.count - 1) as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exemplar {
    pub timestamp: Timestamp,
    pub value: f64,
    pub series_labels: Labels,
    pub labels: Labels,
}

impl Exemplar {
    /// Point label value, falling back to the series label of the same name.
    pub fn label(&self, name: &str) -> &str {
        self.labels
            .get(name)
            .filter(|v| !v.is_empty())
            .or_else(|| self.series_labels.get(name))
            .unwrap_or_default()
    }
}

/// Buckets exemplars by step-aligned timestamp and thins each bucket down to
/// the points that stand out from their neighbours.
#[derive(Debug, Default)]
pub struct ExemplarSampler {
    buckets: BTreeMap<Timestamp, Vec<Exemplar>>,
    label_names: BTreeSet<String>,
    stats: Accumulator,
    utc_offset_secs: i64,
}

impl ExemplarSampler {
    pub fn new(utc_offset_secs: i64) -> Self {
        ExemplarSampler {
            utc_offset_secs,
            ..Default::default()
        }
    }

    pub fn update(&mut self, step: Duration, exemplar: Exemplar) {
        let bucket = align_time(exemplar.timestamp, step, self.utc_offset_secs);
        for name in exemplar.labels.names().chain(exemplar.series_labels.names()) {
            if !self.label_names.contains(name) {
                self.label_names.insert(name.to_string());
            }
        }
        self.stats = self.stats.update(exemplar.value);
        self.buckets.entry(bucket).or_default().push(exemplar);
    }

    pub fn stats(&self) -> Accumulator {
        self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.label_names.iter().map(|s| s.as_str())
    }

    /// Surviving exemplars ordered by timestamp.
    ///
    /// Each bucket is walked from the largest value down. The first point is
    /// always kept; later points are kept only when they sit more than two
    /// standard deviations below the last kept one.
    pub fn sampled(&self) -> Vec<&Exemplar> {
        let std_dev = self.stats.std_dev();
        let threshold = std_dev * 2.0;
        let mut res = Vec::with_capacity(self.buckets.len());
        for bucket in self.buckets.values() {
            let mut sorted: Vec<&Exemplar> = bucket.iter().collect();
            sorted.sort_by(|a, b| b.value.total_cmp(&a.value));

            let mut last: Option<f64> = None;
            for ex in sorted {
                let keep = match last {
                    None => true,
                    Some(prev) => std_dev != 0.0 && prev - ex.value > threshold,
                };
                if keep {
                    last = Some(ex.value);
                    res.push(ex);
                }
            }
        }
        res.sort_by_key(|ex| ex.timestamp);
        res
    }

    /// Builds the `Time, Value, <label>...` frame, or `None` when nothing survived.
    pub fn to_frame(&self) -> Option<Frame> {
        let sampled = self.sampled();
        if sampled.is_empty() {
            return None;
        }

        let mut times = Vec::with_capacity(sampled.len());
        let mut values = Vec::with_capacity(sampled.len());
        let mut columns: Vec<Vec<String>> = vec![Vec::with_capacity(sampled.len()); self.label_names.len()];
        for ex in &sampled {
            times.push(ex.timestamp);
            values.push(ex.value);
            for (column, name) in columns.iter_mut().zip(self.label_names.iter()) {
                column.push(ex.label(name).to_string());
            }
        }

        let mut fields = vec![
            Field::time(times),
            Field::new(VALUE_FIELD_NAME, FieldValues::Float64(values)),
        ];
        fields.extend(
            self.label_names
                .iter()
                .zip(columns)
                .map(|(name, column)| Field::new(name.as_str(), FieldValues::String(column))),
        );
        Some(Frame::new(EXEMPLAR_FRAME_NAME, fields))
    }
}

pub fn is_exemplar_frame(frame: &Frame) -> bool {
    frame.result_type() == Some(ResultKind::Exemplar.as_str())
}

fn frame_step(frame: &Frame, default_step: Duration) -> Duration {
    frame
        .fields
        .first()
        .and_then(|f| f.config.interval_ms)
        .filter(|ms| *ms > 0.0)
        .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok())
        .unwrap_or(default_step)
}

fn feed_frame(sampler: &mut ExemplarSampler, frame: &Frame, step: Duration) {
    let (Some(time_field), Some(value_field)) = (frame.fields.first(), frame.fields.get(1)) else {
        return;
    };
    let Some(times) = time_field.values.as_time() else {
        return;
    };
    let series_labels = value_field.labels.clone().unwrap_or_default();
    let label_fields: Vec<(&str, &[String])> = frame.fields[2..]
        .iter()
        .filter_map(|f| f.values.as_strings().map(|values| (f.name.as_str(), values)))
        .collect();

    for (row, ts) in times.iter().enumerate() {
        let Some(value) = value_field.values.float_at(row).filter(|v| !v.is_nan()) else {
            continue;
        };
        let labels = label_fields
            .iter()
            .filter_map(|(name, values)| values.get(row).map(|v| (*name, v.as_str())))
            .collect();
        sampler.update(
            step,
            Exemplar {
                timestamp: *ts,
                value,
                series_labels: series_labels.clone(),
                labels,
            },
        );
    }
}

/// Replaces every exemplar frame with a single sampled `exemplar` frame.
///
/// When no exemplar survives, the input is returned untouched.
pub fn process_exemplars(frames: Vec<Frame>, step: Duration, utc_offset_secs: i64) -> Vec<Frame> {
    let mut sampler = ExemplarSampler::new(utc_offset_secs);
    let mut source: Option<&Frame> = None;
    for frame in frames.iter().filter(|f| is_exemplar_frame(f)) {
        feed_frame(&mut sampler, frame, frame_step(frame, step));
        source = Some(frame);
    }

    let Some(source) = source else {
        return frames;
    };
    let Some(mut exemplar_frame) = sampler.to_frame() else {
        return frames;
    };
    exemplar_frame.ref_id = source.ref_id.clone();
    exemplar_frame.meta = source.meta.clone();

    debug!(
        buffered = sampler.stats().count,
        kept = exemplar_frame.rows(),
        "sampled exemplars"
    );

    let mut res: Vec<Frame> = frames.into_iter().filter(|f| !is_exemplar_frame(f)).collect();
    res.push(exemplar_frame);
    res
}
