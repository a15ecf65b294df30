//! Declarative module schema for the in-memory tree.
//!
//! A module definition names its module, lists schema nodes and optionally
//! carries initial data:
//!
//! ```yaml
//! name: car
//! organization: freeconf
//! revision: 2023-03-27
//! children:
//!   - { name: speed, kind: leaf, type: int }
//!   - name: tire
//!     kind: list
//!     key: [pos]
//!     children:
//!       - { name: pos, kind: leaf, type: int }
//!       - { name: size, kind: leaf, type: string }
//! data:
//!   speed: 1000
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::TreeError;

/// One module: metadata, schema and optional initial data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDef {
    pub name: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub children: Vec<SchemaNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A named schema node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaNode {
    pub name: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Container {
        #[serde(default)]
        children: Vec<Arc<SchemaNode>>,
    },
    List {
        key: Vec<String>,
        #[serde(default)]
        children: Vec<Arc<SchemaNode>>,
    },
    Leaf {
        #[serde(rename = "type")]
        leaf_type: LeafType,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafType {
    String,
    Int,
    Uint,
    Decimal,
    Bool,
    Enumeration(Vec<String>),
}

impl SchemaNode {
    pub fn leaf(name: impl Into<String>, leaf_type: LeafType) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Leaf { leaf_type },
        }
    }

    pub fn container(name: impl Into<String>, children: Vec<SchemaNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Container {
                children: children.into_iter().map(Arc::new).collect(),
            },
        }
    }

    pub fn list(name: impl Into<String>, key: &[&str], children: Vec<SchemaNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::List {
                key: key.iter().map(|k| k.to_string()).collect(),
                children: children.into_iter().map(Arc::new).collect(),
            },
        }
    }

    pub fn children(&self) -> &[Arc<SchemaNode>] {
        match &self.kind {
            NodeKind::Container { children } | NodeKind::List { children, .. } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    pub fn child(&self, name: &str) -> Option<&Arc<SchemaNode>> {
        self.children().iter().find(|c| c.name == name)
    }

    pub fn keys(&self) -> Option<&[String]> {
        match &self.kind {
            NodeKind::List { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn leaf_type(&self) -> Option<&LeafType> {
        match &self.kind {
            NodeKind::Leaf { leaf_type } => Some(leaf_type),
            _ => None,
        }
    }

    /// Check the definition itself: list keys must name leaf children.
    pub(crate) fn check(&self) -> Result<(), TreeError> {
        if let NodeKind::List { key, .. } = &self.kind {
            if key.is_empty() {
                return Err(schema_err(&self.name, "list declares no key"));
            }
            for k in key {
                if self.child(k).and_then(|c| c.leaf_type()).is_none() {
                    return Err(schema_err(
                        &self.name,
                        format!("key '{}' is not a leaf child", k),
                    ));
                }
            }
        }
        self.children().iter().try_for_each(|c| c.check())
    }

    /// Validate `doc` against this node and return it with leaf values
    /// coerced to their declared types.
    pub(crate) fn normalize(&self, at: &str, doc: &Value) -> Result<Value, TreeError> {
        match &self.kind {
            NodeKind::Leaf { leaf_type } => leaf_type.coerce(at, doc),
            NodeKind::Container { children } => normalize_object(children, at, doc).map(Value::Object),
            NodeKind::List { .. } => {
                let entries = doc.as_array().ok_or_else(|| schema_err(at, "expected an array"))?;
                entries
                    .iter()
                    .map(|e| self.normalize_entry(at, e))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
        }
    }

    /// Validate one list entry; every key field must be present.
    pub(crate) fn normalize_entry(&self, at: &str, doc: &Value) -> Result<Value, TreeError> {
        let entry = normalize_object(self.children(), at, doc)?;
        for k in self.keys().unwrap_or_default() {
            if !entry.contains_key(k) {
                return Err(schema_err(at, format!("list entry is missing key '{}'", k)));
            }
        }
        Ok(Value::Object(entry))
    }
}

pub(crate) fn normalize_object(
    children: &[Arc<SchemaNode>],
    at: &str,
    doc: &Value,
) -> Result<Map<String, Value>, TreeError> {
    let obj = doc.as_object().ok_or_else(|| schema_err(at, "expected an object"))?;
    let mut out = Map::new();
    for (k, v) in obj {
        let child = children
            .iter()
            .find(|c| &c.name == k)
            .ok_or_else(|| schema_err(at, format!("unknown field '{}'", k)))?;
        out.insert(k.clone(), child.normalize(&format!("{}/{}", at, k), v)?);
    }
    Ok(out)
}

impl LeafType {
    /// Coerce a JSON value to this type. Numeric and boolean types also
    /// accept their textual form, strings accept any scalar.
    pub fn coerce(&self, at: &str, v: &Value) -> Result<Value, TreeError> {
        let bad = |want: &str| TreeError::InvalidValue {
            at: at.to_string(),
            reason: format!("expected {}, got {}", want, v),
        };
        match self {
            LeafType::String => match v {
                Value::String(_) => Ok(v.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err(bad("string")),
            },
            LeafType::Int => match v {
                Value::Number(n) if n.is_i64() => Ok(v.clone()),
                Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| bad("int")),
                _ => Err(bad("int")),
            },
            LeafType::Uint => match v {
                Value::Number(n) if n.is_u64() => Ok(v.clone()),
                Value::String(s) => s.trim().parse::<u64>().map(Value::from).map_err(|_| bad("uint")),
                _ => Err(bad("uint")),
            },
            LeafType::Decimal => match v {
                Value::Number(_) => Ok(v.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| bad("decimal")),
                _ => Err(bad("decimal")),
            },
            LeafType::Bool => match v {
                Value::Bool(_) => Ok(v.clone()),
                Value::String(s) if s == "true" => Ok(Value::Bool(true)),
                Value::String(s) if s == "false" => Ok(Value::Bool(false)),
                _ => Err(bad("bool")),
            },
            LeafType::Enumeration(allowed) => match v {
                Value::String(s) if allowed.iter().any(|a| a == s) => Ok(v.clone()),
                _ => Err(bad(&format!("one of [{}]", allowed.join(", ")))),
            },
        }
    }

    /// Whether raw, non-JSON text is acceptable as-is for this type.
    pub(crate) fn accepts_raw_text(&self) -> bool {
        matches!(self, LeafType::String | LeafType::Enumeration(_))
    }
}

pub(crate) fn schema_err(at: &str, reason: impl Into<String>) -> TreeError {
    TreeError::Schema {
        at: at.to_string(),
        reason: reason.into(),
    }
}
