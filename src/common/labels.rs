use std::fmt;
use enquote::enquote;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use super::METRIC_NAME_LABEL;

/// Label is a key/value pair of strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A set of labels with unique names.
///
/// Insertion order is kept so labels render the way the upstream sent them,
/// but two sets compare equal whenever they hold the same pairs.
#[derive(Debug, Clone, Default)]
pub struct Labels(Vec<Label>);

impl Labels {
    pub fn new() -> Self {
        Labels(Vec::new())
    }

    pub fn with_capacity(n: usize) -> Self {
        Labels(Vec::with_capacity(n))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sets `name` to `value`, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|l| l.name == name) {
            Some(label) => label.value = value,
            None => self.0.push(Label { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|l| l.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|l| l.name.as_str())
    }

    /// Returns the labels ordered by name.
    pub fn sorted(&self) -> Vec<&Label> {
        let mut labels: Vec<&Label> = self.0.iter().collect();
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        labels
    }

    /// Renders the set as a JSON object with keys in name order.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|l| (l.name.clone(), serde_json::Value::String(l.value.clone())))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Get the full metric name of the series in Prometheus format, for example
    ///
    /// `http_requests_total{method="POST", status="500"}`
    ///
    /// Labels other than `__name__` are sorted by name. An empty set renders as `{}`.
    pub fn prometheus_metric_name(&self) -> String {
        let metric_name = self.get(METRIC_NAME_LABEL).unwrap_or_default();
        let others: Vec<&Label> = self
            .sorted()
            .into_iter()
            .filter(|l| l.name != METRIC_NAME_LABEL)
            .collect();

        if others.is_empty() {
            if self.contains(METRIC_NAME_LABEL) {
                return metric_name.to_string();
            }
            return "{}".to_string();
        }

        let size_hint = metric_name.len()
            + others.iter().map(|l| l.name.len() + l.value.len() + 5).sum::<usize>();
        let mut full_name = String::with_capacity(size_hint);
        full_name.push_str(metric_name);
        full_name.push('{');
        for (i, label) in others.iter().enumerate() {
            if i > 0 {
                full_name.push_str(", ");
            }
            full_name.push_str(&label.name);
            full_name.push('=');
            full_name.push_str(&enquote('"', &label.value));
        }
        full_name.push('}');
        full_name
    }
}

impl PartialEq for Labels {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.0.iter().all(|l| other.get(&l.name) == Some(l.value.as_str()))
    }
}

impl Eq for Labels {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut labels = Labels::new();
        for (k, v) in iter {
            labels.insert(k, v);
        }
        labels
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prometheus_metric_name())
    }
}

impl Serialize for Labels {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for label in self.0.iter() {
            map.serialize_entry(&label.name, &label.value)?;
        }
        map.end()
    }
}

struct LabelsVisitor;

impl<'de> Visitor<'de> for LabelsVisitor {
    type Value = Labels;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of label names to string values")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
        let mut labels = Labels::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, value)) = access.next_entry::<String, String>()? {
            labels.insert(name, value);
        }
        Ok(labels)
    }
}

impl<'de> Deserialize<'de> for Labels {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(LabelsVisitor)
    }
}
