//! Environment variable keys. Every key carries the `GNMILITE_` prefix.

/// Server surface
pub mod server {
    /// Listen address for the TCP JSON-Lines transport, e.g. `127.0.0.1:9339`.
    pub const GNMILITE_LISTEN: &str = "GNMILITE_LISTEN";

    /// Comma-separated list of module definition files.
    pub const GNMILITE_MODELS: &str = "GNMILITE_MODELS";

    /// Maximum size of one request line, in bytes.
    pub const GNMILITE_MAX_REQUEST_BYTES: &str = "GNMILITE_MAX_REQUEST_BYTES";
}

/// Observability and logging
pub mod observability {
    pub const GNMILITE_QUIET: &str = "GNMILITE_QUIET";
    pub const GNMILITE_LOG_LEVEL: &str = "GNMILITE_LOG_LEVEL";
    pub const GNMILITE_LOG_JSON: &str = "GNMILITE_LOG_JSON";
}
