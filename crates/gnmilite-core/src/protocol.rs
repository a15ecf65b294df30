//! Wire-level request/response types for the four RPCs.
//!
//! These are the shared "currency" between the transport, the driver and the
//! engine. They carry only what crosses the wire: paths, typed values,
//! notifications and results. Intervals are nanoseconds, timestamps are Unix
//! nanoseconds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Protocol version reported by Capabilities.
pub const GNMI_VERSION: &str = "0.8.0";

// ─── Paths ───────────────────────────────────────────────────────────────────

/// One element of a [`Path`]. `key` is only meaningful when the addressed
/// schema node is a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathElem {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub key: BTreeMap<String, String>,
}

impl PathElem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: BTreeMap::new(),
        }
    }

    /// Add one key predicate, builder style.
    pub fn with_key(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.key.insert(field.into(), value.into());
        self
    }
}

/// A wire path: optional origin (module) plus ordered elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elem: Vec<PathElem>,
}

impl Path {
    /// Path rooted at a module, with no elements.
    pub fn origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            elem: Vec::new(),
        }
    }

    /// Path made of plain element names, no origin.
    pub fn elems<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origin: String::new(),
            elem: names.into_iter().map(PathElem::new).collect(),
        }
    }

    pub fn with_elem(mut self, elem: PathElem) -> Self {
        self.elem.push(elem);
        self
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.origin.is_empty() {
            write!(f, "{}:", self.origin)?;
        }
        if self.elem.is_empty() {
            return write!(f, "/");
        }
        for e in &self.elem {
            write!(f, "/{}", e.name)?;
            for (k, v) in &e.key {
                write!(f, "[{}={}]", k, v)?;
            }
        }
        Ok(())
    }
}

// ─── Values ──────────────────────────────────────────────────────────────────

/// Value carried by an update. Only the two JSON variants are supported by
/// the engine; the rest exist so a client can send them and receive a
/// precise `UnsupportedEncoding` instead of a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypedValue {
    JsonVal(String),
    JsonIetfVal(String),
    StringVal(String),
    IntVal(i64),
    UintVal(u64),
    BoolVal(bool),
    BytesVal(Vec<u8>),
    AsciiVal(String),
    DecimalVal(String),
}

impl TypedValue {
    pub fn json(text: impl Into<String>) -> Self {
        Self::JsonVal(text.into())
    }

    pub fn json_ietf(text: impl Into<String>) -> Self {
        Self::JsonIetfVal(text.into())
    }

    /// Payload of the JSON variants, `None` for everything else.
    pub fn json_text(&self) -> Option<&str> {
        match self {
            Self::JsonVal(s) | Self::JsonIetfVal(s) => Some(s),
            _ => None,
        }
    }

    /// Wire name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JsonVal(_) => "json_val",
            Self::JsonIetfVal(_) => "json_ietf_val",
            Self::StringVal(_) => "string_val",
            Self::IntVal(_) => "int_val",
            Self::UintVal(_) => "uint_val",
            Self::BoolVal(_) => "bool_val",
            Self::BytesVal(_) => "bytes_val",
            Self::AsciiVal(_) => "ascii_val",
            Self::DecimalVal(_) => "decimal_val",
        }
    }
}

/// Byte-exact equality: same variant and identical payload. Both absent is
/// equal, exactly one absent is not. Semantically equal JSON that differs in
/// formatting or field order compares unequal.
pub fn is_equal_values(a: Option<&TypedValue>, b: Option<&TypedValue>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Encodings advertised in Capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Encoding {
    Json,
    JsonIetf,
}

// ─── Capabilities ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelData {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl ModelData {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            organization: String::new(),
            version: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityResponse {
    pub supported_models: Vec<ModelData>,
    pub supported_encodings: Vec<Encoding>,
    pub gnmi_version: String,
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub path: Path,
    pub val: TypedValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update: Vec<Update>,
}

// ─── Get ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<Path>,
    #[serde(default)]
    pub path: Vec<Path>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub use_models: Vec<ModelData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub notification: Vec<Notification>,
}

// ─── Set ─────────────────────────────────────────────────────────────────────

/// A replace or update entry. `val` is optional on the wire so that a missing
/// value surfaces as `EmptyValue` rather than a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetUpdate {
    pub path: Path,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<TypedValue>,
}

impl SetUpdate {
    pub fn new(path: Path, val: TypedValue) -> Self {
        Self {
            path,
            val: Some(val),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<Path>,
    #[serde(default)]
    pub delete: Vec<Path>,
    #[serde(default)]
    pub replace: Vec<SetUpdate>,
    #[serde(default)]
    pub update: Vec<SetUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateOp {
    Delete,
    Replace,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub op: UpdateOp,
    pub path: Path,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetResponse {
    pub timestamp: i64,
    pub response: Vec<UpdateResult>,
}

// ─── Subscribe ───────────────────────────────────────────────────────────────

/// Delivery mode of a whole subscription list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListMode {
    #[default]
    Stream,
    Once,
    Poll,
}

/// Per-subscription stream sub-mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionMode {
    #[default]
    TargetDefined,
    OnChange,
    Sample,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,
    #[serde(default)]
    pub mode: SubscriptionMode,
    /// Nanoseconds.
    #[serde(default)]
    pub sample_interval: u64,
    /// Nanoseconds.
    #[serde(default)]
    pub heartbeat_interval: u64,
}

impl SubscriptionSpec {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_nanos(self.heartbeat_interval)
    }

    /// Sample interval when set, otherwise the heartbeat interval.
    pub fn effective_sample_interval(&self) -> Duration {
        if self.sample_interval == 0 {
            self.heartbeat()
        } else {
            Duration::from_nanos(self.sample_interval)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<Path>,
    #[serde(default)]
    pub subscription: Vec<SubscriptionSpec>,
    #[serde(default)]
    pub mode: ListMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub use_models: Vec<ModelData>,
}

/// Client → server message on the Subscribe stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeRequest {
    Subscribe(SubscriptionList),
    /// Re-run every POLL subscription created on this stream.
    Poll {},
}

/// Server → client message on the Subscribe stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeResponse {
    Update(Notification),
}

impl SubscribeResponse {
    pub fn notification(&self) -> &Notification {
        match self {
            Self::Update(n) => n,
        }
    }
}

/// Current wall-clock time as Unix nanoseconds.
pub fn now_nanos() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}
