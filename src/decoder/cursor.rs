use std::io::Read;
use serde_json::Value;
use struson::reader::{JsonReader, JsonStreamReader, ReaderSettings, ValueType};
use crate::error::{DatasourceError, DatasourceResult};

/// Maximum container nesting accepted before the input is rejected.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
}

impl From<ValueType> for TokenKind {
    fn from(value: ValueType) -> Self {
        match value {
            ValueType::Object => TokenKind::Object,
            ValueType::Array => TokenKind::Array,
            ValueType::String => TokenKind::String,
            ValueType::Number => TokenKind::Number,
            ValueType::Boolean => TokenKind::Bool,
            ValueType::Null => TokenKind::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    /// `has_key` is set between reading a member name and reading its value.
    Object { has_key: bool },
    Array,
}

/// Forward-only JSON token reader.
///
/// Containers are walked with `enter_object`/`next_key` and
/// `enter_array`/`next_element`; scalars are read with the typed `read_*`
/// calls. Tokenizing is done by a `struson` stream reader, so only its read
/// buffer is held in memory. Out-of-order calls fail with a structural error
/// instead of reaching the reader.
pub struct JsonCursor<R: Read> {
    reader: JsonStreamReader<R>,
    stack: Vec<Container>,
    /// The top-level value has been read completely.
    finished: bool,
}

impl<R: Read> JsonCursor<R> {
    pub fn new(reader: R) -> Self {
        let settings = ReaderSettings {
            // enter_* enforces MAX_DEPTH itself; this bounds skip_value and read_value
            max_nesting_depth: Some(MAX_DEPTH as u32 + 1),
            ..Default::default()
        };
        JsonCursor {
            reader: JsonStreamReader::new_custom(reader, settings),
            stack: Vec::with_capacity(8),
            finished: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn check_value_position(&self) -> DatasourceResult<()> {
        match self.stack.last() {
            Some(Container::Object { has_key: false }) => {
                Err(DatasourceError::structural("expected an object key before a value"))
            }
            None if self.finished => Err(DatasourceError::structural("unexpected data after top-level value")),
            _ => Ok(()),
        }
    }

    fn begin_value(&mut self) -> DatasourceResult<()> {
        self.check_value_position()?;
        if let Some(Container::Object { has_key }) = self.stack.last_mut() {
            *has_key = false;
        }
        Ok(())
    }

    fn end_value(&mut self) {
        if self.stack.is_empty() {
            self.finished = true;
        }
    }

    /// Returns the kind of the next value without consuming it.
    pub fn peek_kind(&mut self) -> DatasourceResult<TokenKind> {
        self.check_value_position()?;
        Ok(self.reader.peek()?.into())
    }

    fn push(&mut self, container: Container) -> DatasourceResult<()> {
        if self.stack.len() >= MAX_DEPTH {
            return Err(DatasourceError::structural("maximum nesting depth exceeded"));
        }
        self.begin_value()?;
        match container {
            Container::Object { .. } => self.reader.begin_object()?,
            Container::Array => self.reader.begin_array()?,
        }
        self.stack.push(container);
        Ok(())
    }

    pub fn enter_object(&mut self) -> DatasourceResult<()> {
        self.push(Container::Object { has_key: false })
    }

    pub fn enter_array(&mut self) -> DatasourceResult<()> {
        self.push(Container::Array)
    }

    /// Advances to the next member of the current object and returns its key,
    /// or `None` once the closing brace has been consumed.
    pub fn next_key(&mut self) -> DatasourceResult<Option<String>> {
        match self.stack.last() {
            Some(Container::Object { has_key: false }) => {}
            Some(Container::Object { has_key: true }) => {
                return Err(DatasourceError::structural("value of the previous member was not read"))
            }
            _ => return Err(DatasourceError::structural("next_key called outside of an object")),
        }
        if self.reader.has_next()? {
            let key = self.reader.next_name_owned()?;
            if let Some(Container::Object { has_key }) = self.stack.last_mut() {
                *has_key = true;
            }
            return Ok(Some(key));
        }
        self.reader.end_object()?;
        self.stack.pop();
        self.end_value();
        Ok(None)
    }

    /// Advances to the next element of the current array. Returns `false` once
    /// the closing bracket has been consumed.
    pub fn next_element(&mut self) -> DatasourceResult<bool> {
        if self.stack.last() != Some(&Container::Array) {
            return Err(DatasourceError::structural("next_element called outside of an array"));
        }
        if self.reader.has_next()? {
            return Ok(true);
        }
        self.reader.end_array()?;
        self.stack.pop();
        self.end_value();
        Ok(false)
    }

    pub fn read_string(&mut self) -> DatasourceResult<String> {
        self.begin_value()?;
        let s = self.reader.next_string()?;
        self.end_value();
        Ok(s)
    }

    fn read_number_text(&mut self) -> DatasourceResult<String> {
        self.begin_value()?;
        let text = self.reader.next_number_as_string()?;
        self.end_value();
        Ok(text)
    }

    pub fn read_f64(&mut self) -> DatasourceResult<f64> {
        let text = self.read_number_text()?;
        text.parse::<f64>()
            .map_err(|_| DatasourceError::structural(format!("invalid number \"{text}\"")))
    }

    /// Reads an integer. Fractional or exponent forms are truncated toward zero.
    pub fn read_i64(&mut self) -> DatasourceResult<i64> {
        let text = self.read_number_text()?;
        if let Ok(v) = text.parse::<i64>() {
            return Ok(v);
        }
        text.parse::<f64>()
            .map(|v| v as i64)
            .map_err(|_| DatasourceError::structural(format!("invalid number \"{text}\"")))
    }

    pub fn read_bool(&mut self) -> DatasourceResult<bool> {
        self.begin_value()?;
        let v = self.reader.next_bool()?;
        self.end_value();
        Ok(v)
    }

    pub fn read_null(&mut self) -> DatasourceResult<()> {
        self.begin_value()?;
        self.reader.next_null()?;
        self.end_value();
        Ok(())
    }

    /// Consumes the next value, whatever its shape.
    pub fn skip_value(&mut self) -> DatasourceResult<()> {
        self.begin_value()?;
        self.reader.skip_value()?;
        self.end_value();
        Ok(())
    }

    /// Materializes the next value. Only used for small sub-trees such as label
    /// maps or opaque metadata.
    pub fn read_value(&mut self) -> DatasourceResult<Value> {
        self.begin_value()?;
        let value: Value = self
            .reader
            .deserialize_next()
            .map_err(|e| DatasourceError::structural(e.to_string()))?;
        self.end_value();
        Ok(value)
    }

    /// Fails unless the top-level value was read completely and only
    /// whitespace follows it.
    pub fn expect_end(self) -> DatasourceResult<()> {
        if !self.stack.is_empty() {
            return Err(DatasourceError::structural("unclosed container"));
        }
        if !self.finished {
            return Err(DatasourceError::structural("top-level value was not read"));
        }
        self.reader.consume_trailing_whitespace()?;
        Ok(())
    }
}
