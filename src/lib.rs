pub mod assembler;
pub mod common;
pub mod config;
pub mod decoder;
pub mod error;
pub mod exemplar;
pub mod frame;
pub mod interval;
pub mod query;
pub mod response;

#[cfg(test)]
mod tests;

pub use config::{get_global_settings, Settings};
pub use decoder::{decode, DecodeOptions, DecodeResult, ResponseFormat, UnknownFieldPolicy};
pub use error::{DatasourceError, DatasourceResult};
pub use frame::Frame;
pub use query::{Query, QueryModel, QueryRequest};
pub use response::{parse_algorithm_response, parse_realtime_response, parse_response, QueryResponse};
