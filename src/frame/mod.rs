use std::collections::BTreeMap;
use std::fmt::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::common::{Labels, Timestamp};
use crate::error::{DatasourceError, DatasourceResult};

pub const TIME_FIELD_NAME: &str = "Time";
pub const VALUE_FIELD_NAME: &str = "Value";

/// Custom metadata key holding the wire `resultType` a frame was built from.
pub const RESULT_TYPE_KEY: &str = "resultType";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Time,
    Float64,
    NullableFloat64,
    Int8,
    String,
    Json,
}

/// Column storage. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "camelCase")]
pub enum FieldValues {
    Time(Vec<Timestamp>),
    Float64(Vec<f64>),
    NullableFloat64(Vec<Option<f64>>),
    Int8(Vec<i8>),
    String(Vec<String>),
    Json(Vec<Value>),
}

impl FieldValues {
    pub fn with_type(field_type: FieldType, len: usize) -> Self {
        let mut values = match field_type {
            FieldType::Time => FieldValues::Time(Vec::with_capacity(len)),
            FieldType::Float64 => FieldValues::Float64(Vec::with_capacity(len)),
            FieldType::NullableFloat64 => FieldValues::NullableFloat64(Vec::with_capacity(len)),
            FieldType::Int8 => FieldValues::Int8(Vec::with_capacity(len)),
            FieldType::String => FieldValues::String(Vec::with_capacity(len)),
            FieldType::Json => FieldValues::Json(Vec::with_capacity(len)),
        };
        values.extend_to(len);
        values
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValues::Time(_) => FieldType::Time,
            FieldValues::Float64(_) => FieldType::Float64,
            FieldValues::NullableFloat64(_) => FieldType::NullableFloat64,
            FieldValues::Int8(_) => FieldType::Int8,
            FieldValues::String(_) => FieldType::String,
            FieldValues::Json(_) => FieldType::Json,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldValues::Time(v) => v.len(),
            FieldValues::Float64(v) => v.len(),
            FieldValues::NullableFloat64(v) => v.len(),
            FieldValues::Int8(v) => v.len(),
            FieldValues::String(v) => v.len(),
            FieldValues::Json(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldValues::Float64(_) | FieldValues::NullableFloat64(_))
    }

    /// Pads the column with zero values (`None` for nullable columns) up to `len` rows.
    pub fn extend_to(&mut self, len: usize) {
        match self {
            FieldValues::Time(v) => v.resize(len.max(v.len()), 0),
            FieldValues::Float64(v) => v.resize(len.max(v.len()), 0.0),
            FieldValues::NullableFloat64(v) => v.resize(len.max(v.len()), None),
            FieldValues::Int8(v) => v.resize(len.max(v.len()), 0),
            FieldValues::String(v) => v.resize(len.max(v.len()), String::new()),
            FieldValues::Json(v) => v.resize(len.max(v.len()), Value::Null),
        }
    }

    pub fn truncate(&mut self, len: usize) {
        match self {
            FieldValues::Time(v) => v.truncate(len),
            FieldValues::Float64(v) => v.truncate(len),
            FieldValues::NullableFloat64(v) => v.truncate(len),
            FieldValues::Int8(v) => v.truncate(len),
            FieldValues::String(v) => v.truncate(len),
            FieldValues::Json(v) => v.truncate(len),
        }
    }

    /// Reorders rows so that row `i` becomes the old row `order[i]`.
    pub fn reorder(&mut self, order: &[usize]) {
        fn pick<T: Clone>(v: &mut Vec<T>, order: &[usize]) {
            let res: Vec<T> = order.iter().filter_map(|i| v.get(*i).cloned()).collect();
            *v = res;
        }
        match self {
            FieldValues::Time(v) => pick(v, order),
            FieldValues::Float64(v) => pick(v, order),
            FieldValues::NullableFloat64(v) => pick(v, order),
            FieldValues::Int8(v) => pick(v, order),
            FieldValues::String(v) => pick(v, order),
            FieldValues::Json(v) => pick(v, order),
        }
    }

    pub fn as_time(&self) -> Option<&[Timestamp]> {
        match self {
            FieldValues::Time(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            FieldValues::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the numeric value at `idx`. Nulls and non-numeric columns yield `None`.
    pub fn float_at(&self, idx: usize) -> Option<f64> {
        match self {
            FieldValues::Float64(v) => v.get(idx).copied(),
            FieldValues::NullableFloat64(v) => v.get(idx).copied().flatten(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<f64>,
    #[serde(rename = "displayNameFromDS", skip_serializing_if = "Option::is_none")]
    pub display_name_from_ds: Option<String>,
}

impl FieldConfig {
    pub fn is_empty(&self) -> bool {
        self.interval_ms.is_none() && self.display_name_from_ds.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Labels>,
    #[serde(default, skip_serializing_if = "FieldConfig::is_empty")]
    pub config: FieldConfig,
    pub values: FieldValues,
}

impl Field {
    pub fn new(name: impl Into<String>, values: FieldValues) -> Self {
        Field {
            name: name.into(),
            labels: None,
            config: FieldConfig::default(),
            values,
        }
    }

    pub fn time(values: Vec<Timestamp>) -> Self {
        Self::new(TIME_FIELD_NAME, FieldValues::Time(values))
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn field_type(&self) -> FieldType {
        self.values.field_type()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    #[serde(rename = "timeseries-many")]
    TimeSeriesMany,
    #[serde(rename = "timeseries-wide")]
    TimeSeriesWide,
    #[serde(rename = "heatmap-cells")]
    HeatmapCells,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::TimeSeriesMany => "timeseries-many",
            FrameType::TimeSeriesWide => "timeseries-wide",
            FrameType::HeatmapCells => "heatmap-cells",
        }
    }
}

impl Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub text: String,
}

impl Notice {
    pub fn warning(text: impl Into<String>) -> Self {
        Notice {
            severity: NoticeSeverity::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Notice {
            severity: NoticeSeverity::Error,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMeta {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub frame_type: Option<FrameType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<Notice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_query_string: Option<String>,
}

impl FrameMeta {
    pub fn new(frame_type: Option<FrameType>, result_type: Option<&str>) -> Self {
        let mut meta = FrameMeta {
            frame_type,
            ..Default::default()
        };
        if let Some(result_type) = result_type {
            meta.custom
                .insert(RESULT_TYPE_KEY.to_string(), Value::String(result_type.to_string()));
        }
        meta
    }
}

/// A table of equal-length columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ref_id: String,
    pub fields: Vec<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<FrameMeta>,
}

impl Frame {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Frame {
            name: name.into(),
            ref_id: String::new(),
            fields,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: FrameMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Row count, taken from the first field.
    pub fn rows(&self) -> usize {
        self.fields.first().map(|f| f.len()).unwrap_or(0)
    }

    pub fn meta_mut(&mut self) -> &mut FrameMeta {
        self.meta.get_or_insert_with(FrameMeta::default)
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        self.meta.as_ref().and_then(|m| m.frame_type)
    }

    pub fn custom(&self, key: &str) -> Option<&Value> {
        self.meta.as_ref().and_then(|m| m.custom.get(key))
    }

    pub fn set_custom(&mut self, key: impl Into<String>, value: Value) {
        self.meta_mut().custom.insert(key.into(), value);
    }

    /// The `resultType` recorded by the decoder, e.g. `matrix` or `exemplar`.
    pub fn result_type(&self) -> Option<&str> {
        self.custom(RESULT_TYPE_KEY).and_then(|v| v.as_str())
    }

    pub fn append_notice(&mut self, notice: Notice) {
        self.meta_mut().notices.push(notice);
    }

    pub fn notices(&self) -> &[Notice] {
        self.meta.as_ref().map(|m| m.notices.as_slice()).unwrap_or_default()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn time_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.field_type() == FieldType::Time)
    }

    /// Checks that every field has the same length.
    pub fn validate(&self) -> DatasourceResult<()> {
        let rows = self.rows();
        match self.fields.iter().find(|f| f.len() != rows) {
            Some(field) => Err(DatasourceError::structural(format!(
                "frame \"{}\": field \"{}\" has {} rows, expected {rows}",
                self.name,
                field.name,
                field.len()
            ))),
            None => Ok(()),
        }
    }

    /// Sorts all rows by the first time field, ascending. Ties keep their order.
    pub fn sort_by_time(&mut self) {
        let Some(times) = self.time_field().and_then(|f| f.values.as_time()) else {
            return;
        };
        if times.windows(2).all(|w| w[0] <= w[1]) {
            return;
        }
        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by_key(|i| times[*i]);
        for field in self.fields.iter_mut() {
            field.values.reorder(&order);
        }
    }
}
