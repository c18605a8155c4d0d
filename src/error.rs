use thiserror::Error;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
/// Enum for the failure modes of query resolution and response decoding.
pub enum DatasourceError {
  #[error("Malformed response. {0}")]
  Structural(String),

  #[error("{code}: {message}")]
  UpstreamStatus { code: String, message: String },

  #[error("Invalid point. {0}")]
  PointParse(String),

  #[error("empty query result")]
  EmptyResult,

  #[error("Invalid configuration. {0}")]
  Config(String),

  #[error("Unexpected field \"{0}\" in response body")]
  UnknownField(String),

  #[error("Read error. {0}")]
  Io(String),
}

impl DatasourceError {
  pub fn structural<S: Into<String>>(msg: S) -> Self {
    DatasourceError::Structural(msg.into())
  }

  pub fn upstream<C: ToString, M: Into<String>>(code: C, message: M) -> Self {
    DatasourceError::UpstreamStatus {
      code: code.to_string(),
      message: message.into(),
    }
  }

  /// `EmptyResult` is a "no data" status rather than a failure.
  pub fn is_fatal(&self) -> bool {
    !matches!(self, DatasourceError::EmptyResult)
  }
}

impl From<std::io::Error> for DatasourceError {
  fn from(e: std::io::Error) -> Self {
    DatasourceError::Io(e.to_string())
  }
}

impl From<struson::reader::ReaderError> for DatasourceError {
  fn from(e: struson::reader::ReaderError) -> Self {
    DatasourceError::Structural(e.to_string())
  }
}

impl From<serde_json::Error> for DatasourceError {
  fn from(e: serde_json::Error) -> Self {
    DatasourceError::Structural(e.to_string())
  }
}

pub type DatasourceResult<T> = Result<T, DatasourceError>;
