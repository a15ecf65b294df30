//! Tree Access Port: the capability interface the engine drives.
//!
//! A [`Device`] hands out root cursors per module; a [`Selection`] is a cursor
//! bound to one schema node. Moving a cursor never mutates it, it produces a
//! new one. Implementations serialize their own concurrent reads and writes.
//!
//! [`MemoryDevice`] is the in-process implementation backed by JSON documents
//! and a small declarative schema ([`ModuleDef`]).

mod loader;
mod memory;
mod schema;
pub mod testing;

pub use loader::{load_device, load_module_def};
pub use memory::MemoryDevice;
pub use schema::{LeafType, ModuleDef, NodeKind, SchemaNode};

use std::fmt;
use thiserror::Error;

/// Errors reported by a tree implementation.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("'{ident}' not found under '{at}'")]
    NotFound { at: String, ident: String },

    #[error("'{0}' is not a list")]
    NotAList(String),

    #[error("no value at '{0}'")]
    NoValue(String),

    #[error("schema violation at '{at}': {reason}")]
    Schema { at: String, reason: String },

    #[error("invalid value for '{at}': {reason}")]
    InvalidValue { at: String, reason: String },

    #[error("cannot decode document: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TreeError {
    /// Navigation failures (unknown child, missing list entry). Everything
    /// else is a data or schema failure.
    pub fn is_navigation(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NotAList(_))
    }
}

/// Module metadata reported by Capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub organization: String,
    pub revision: String,
}

/// Reacts to edits of one module. Called with the module's whole document
/// as it would look after the edit; an error rejects the edit and leaves the
/// stored document unchanged.
pub trait EditObserver: Send + Sync {
    fn apply(&self, doc: &serde_json::Value) -> Result<(), TreeError>;
}

/// Source of module root cursors.
pub trait Device: Send + Sync {
    /// Root cursor of `module`. Fails with [`TreeError::NotFound`] when the
    /// module is not loaded.
    fn browser(&self, module: &str) -> Result<Box<dyn Selection>, TreeError>;

    /// Metadata for every loaded module, ordered by name.
    fn modules(&self) -> Vec<ModuleInfo>;
}

/// Cursor on one node of the tree.
pub trait Selection: Send + Sync + fmt::Debug {
    /// Human-readable location, used for logging.
    fn path(&self) -> String;

    /// Independent cursor on the same node.
    fn clone_box(&self) -> Box<dyn Selection>;

    /// Move to a child. `ident` is a plain child name or, for list entries,
    /// `name=k1,k2` with key values in the list's declared key order.
    fn find(&self, ident: &str) -> Result<Box<dyn Selection>, TreeError>;

    fn is_leaf(&self) -> bool;

    /// Declared key fields, in order, when this node is list-typed.
    fn list_key_fields(&self) -> Option<Vec<String>>;

    /// Current leaf value as JSON text.
    fn read_scalar(&self) -> Result<String, TreeError>;

    /// Set a leaf from text. The text is parsed as JSON when possible and
    /// taken verbatim otherwise.
    fn write_scalar(&self, text: &str) -> Result<(), TreeError>;

    /// Serialize the subtree rooted here as JSON.
    fn to_json(&self) -> Result<String, TreeError>;

    /// Remove the subtree rooted here.
    fn delete(&self) -> Result<(), TreeError>;

    /// Upsert `doc` into the subtree; fields absent from `doc` are kept.
    fn merge(&self, doc: &serde_json::Value) -> Result<(), TreeError>;

    /// Overwrite the subtree with `doc`; fields absent from `doc` are removed.
    fn replace(&self, doc: &serde_json::Value) -> Result<(), TreeError>;
}
