//! Error taxonomy of the engine.

use std::time::Duration;

use gnmilite_core::tree::TreeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GnmiError {
    #[error("only one model is currently supported")]
    AmbiguousModel,

    #[error("you must use models or use origin as model")]
    ModelOrOriginRequired,

    #[error("no module with name '{0}' found")]
    NoSuchModule(String),

    #[error("cannot resolve '{path}': {source}")]
    UnresolvedPath {
        path: String,
        #[source]
        source: TreeError,
    },

    #[error("found keys when '{0}' is not a list")]
    KeysOnNonList(String),

    #[error("no prefix or path found")]
    NoSelection,

    #[error("empty value for {0}")]
    EmptyValue(String),

    #[error("encoding '{0}' not supported")]
    UnsupportedEncoding(&'static str),

    #[error("no sample interval given")]
    NoSampleInterval,

    #[error("sample interval {given:?} is below the minimum of {min:?}")]
    SampleIntervalTooShort { given: Duration, min: Duration },

    #[error("invalid JSON document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("subscription stream closed")]
    SinkClosed,

    #[error("subscription stream is not keeping up")]
    SinkFull,
}

impl GnmiError {
    /// gRPC-style status code name reported by the transport.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AmbiguousModel
            | Self::ModelOrOriginRequired
            | Self::KeysOnNonList(_)
            | Self::NoSelection
            | Self::EmptyValue(_)
            | Self::NoSampleInterval
            | Self::SampleIntervalTooShort { .. }
            | Self::InvalidDocument(_) => "invalid_argument",
            Self::NoSuchModule(_) | Self::UnresolvedPath { .. } => "not_found",
            Self::UnsupportedEncoding(_) => "unimplemented",
            Self::Tree(e) if e.is_navigation() => "not_found",
            Self::Tree(_) => "failed_precondition",
            Self::SinkClosed => "unavailable",
            Self::SinkFull => "resource_exhausted",
        }
    }
}

pub type Result<T> = std::result::Result<T, GnmiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(GnmiError::AmbiguousModel.code(), "invalid_argument");
        assert_eq!(GnmiError::NoSuchModule("boat".into()).code(), "not_found");
        assert_eq!(GnmiError::UnsupportedEncoding("int_val").code(), "unimplemented");
        assert_eq!(GnmiError::SinkClosed.code(), "unavailable");
        assert_eq!(GnmiError::SinkFull.code(), "resource_exhausted");
        let short = GnmiError::SampleIntervalTooShort {
            given: Duration::from_nanos(1),
            min: Duration::from_millis(1),
        };
        assert_eq!(short.code(), "invalid_argument");
        let schema = TreeError::Schema {
            at: "x/me".into(),
            reason: "unknown field 'shoe'".into(),
        };
        assert_eq!(GnmiError::from(schema).code(), "failed_precondition");
        assert_eq!(
            GnmiError::from(TreeError::NotAList("x/me".into())).code(),
            "not_found"
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            GnmiError::NoSuchModule("boat".into()).to_string(),
            "no module with name 'boat' found"
        );
        assert_eq!(
            GnmiError::EmptyValue("x/me".into()).to_string(),
            "empty value for x/me"
        );
    }
}
