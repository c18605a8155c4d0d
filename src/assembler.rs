use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Duration;
use regex::{Captures, Regex};
use crate::common::Labels;
use crate::frame::{Field, Frame};
use crate::interval::format_go_duration;
use crate::query::Query;

/// Legend hint asking the host to derive names itself.
pub const LEGEND_FORMAT_AUTO: &str = "__auto";

fn legend_format_regex() -> &'static Regex {
    static LEGEND_RE: OnceLock<Regex> = OnceLock::new();
    LEGEND_RE.get_or_init(|| Regex::new(r"\{\{\s*(.+?)\s*\}\}").unwrap())
}

/// Renders a legend format against a label set.
///
/// `{{name}}` placeholders become the label's value, or nothing when the label
/// is absent. Without a format the name is `metric{k="v", ...}`, and an empty
/// label set (`{}`) falls back to the query expression.
pub fn display_name(legend_format: &str, expr: &str, labels: &Labels) -> String {
    let legend = match legend_format {
        LEGEND_FORMAT_AUTO if !labels.is_empty() => String::new(),
        LEGEND_FORMAT_AUTO | "" => labels.prometheus_metric_name(),
        format => legend_format_regex()
            .replace_all(format, |caps: &Captures| {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                labels.get(name).unwrap_or_default().to_string()
            })
            .into_owned(),
    };

    if legend == "{}" {
        return expr.to_string();
    }
    legend
}

/// The `Expr:`/`Step:` text shown as a frame's executed query.
pub fn executed_query_string(expr: &str, step: Duration) -> String {
    format!("Expr: {expr}\nStep: {}", format_go_duration(step))
}

/// Attaches names, interval hints and the executed query to decoded frames.
/// Point data is never touched.
#[derive(Debug, Clone)]
pub struct FrameAssembler<'a> {
    pub expr: Cow<'a, str>,
    pub legend_format: Cow<'a, str>,
    pub step: Duration,
}

impl<'a> FrameAssembler<'a> {
    pub fn new(expr: impl Into<Cow<'a, str>>, legend_format: impl Into<Cow<'a, str>>, step: Duration) -> Self {
        FrameAssembler {
            expr: expr.into(),
            legend_format: legend_format.into(),
            step,
        }
    }

    pub fn from_query(query: &'a Query) -> Self {
        FrameAssembler::new(query.expr.as_str(), query.legend_format.as_str(), query.step)
    }

    pub fn field_name(&self, field: &Field) -> String {
        match &field.labels {
            Some(labels) => display_name(&self.legend_format, &self.expr, labels),
            None => display_name(&self.legend_format, &self.expr, &Labels::new()),
        }
    }

    fn annotate_common(&self, frame: &mut Frame) -> bool {
        frame.meta_mut().executed_query_string = Some(executed_query_string(&self.expr, self.step));
        if frame.fields.len() < 2 {
            return false;
        }
        frame.name = self.field_name(&frame.fields[1]);
        frame.fields[0].config.interval_ms = Some(self.step.as_millis() as f64);
        true
    }

    /// One series per frame: the frame and its value column share the name.
    pub fn annotate_multi(&self, frame: &mut Frame) {
        if !self.annotate_common(frame) {
            return;
        }
        if !frame.name.is_empty() {
            frame.fields[1].config.display_name_from_ds = Some(frame.name.clone());
        }
    }

    /// Shared time column: every numeric column is named from its own labels.
    pub fn annotate_wide(&self, frame: &mut Frame) {
        if !self.annotate_common(frame) {
            return;
        }
        for idx in 0..frame.fields.len() {
            if frame.fields[idx].values.is_numeric() {
                frame.fields[idx].name = self.field_name(&frame.fields[idx]);
            }
        }
    }

    pub fn annotate(&self, frames: &mut [Frame], wide: bool) {
        for frame in frames.iter_mut() {
            if wide {
                self.annotate_wide(frame);
            } else {
                self.annotate_multi(frame);
            }
        }
    }
}
