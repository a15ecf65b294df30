//! In-memory implementation of the Tree Access Port.
//!
//! Each module keeps its data as one JSON document guarded by an `RwLock`.
//! Containers are objects, lists are arrays of objects. A cursor records the
//! steps from the module root and the schema node it is bound to; it holds no
//! lock between calls.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};

use super::schema::{normalize_object, schema_err, ModuleDef, NodeKind, SchemaNode};
use super::{Device, EditObserver, ModuleInfo, Selection, TreeError};

struct ModuleStore {
    info: ModuleInfo,
    /// Synthesized container named after the module.
    root: Arc<SchemaNode>,
    data: RwLock<Value>,
    observer: Option<Arc<dyn EditObserver>>,
}

impl fmt::Debug for ModuleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleStore")
            .field("info", &self.info)
            .field("observed", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl ModuleStore {
    fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one edit. An observed module edits a copy and stores it only once
    /// the observer accepts it.
    fn edit<F>(&self, f: F) -> Result<(), TreeError>
    where
        F: FnOnce(&mut Value) -> Result<(), TreeError>,
    {
        let mut data = self.write();
        let Some(observer) = &self.observer else {
            return f(&mut *data);
        };
        let mut next = data.clone();
        f(&mut next)?;
        observer.apply(&next)?;
        *data = next;
        Ok(())
    }
}

/// Device holding any number of in-memory modules.
#[derive(Debug, Default)]
pub struct MemoryDevice {
    modules: BTreeMap<String, Arc<ModuleStore>>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, validating its schema and initial data. A module with
    /// the same name is replaced.
    pub fn add_module(&mut self, def: ModuleDef) -> Result<(), TreeError> {
        self.insert_module(def, None)
    }

    /// [`add_module`](Self::add_module) with an observer that sees, and may
    /// reject, every later edit of the module.
    pub fn add_observed_module(
        &mut self,
        def: ModuleDef,
        observer: Arc<dyn EditObserver>,
    ) -> Result<(), TreeError> {
        self.insert_module(def, Some(observer))
    }

    fn insert_module(
        &mut self,
        def: ModuleDef,
        observer: Option<Arc<dyn EditObserver>>,
    ) -> Result<(), TreeError> {
        let root = SchemaNode::container(def.name.clone(), def.children);
        root.check()?;
        let data = match def.data {
            Some(doc) => root.normalize(&def.name, &doc)?,
            None => Value::Object(Map::new()),
        };
        tracing::debug!(module = %def.name, "module loaded");
        let store = ModuleStore {
            info: ModuleInfo {
                name: def.name.clone(),
                organization: def.organization,
                revision: def.revision,
            },
            root: Arc::new(root),
            data: RwLock::new(data),
            observer,
        };
        self.modules.insert(def.name, Arc::new(store));
        Ok(())
    }

    /// Builder-style [`add_module`](Self::add_module).
    pub fn with_module(mut self, def: ModuleDef) -> Result<Self, TreeError> {
        self.add_module(def)?;
        Ok(self)
    }

    /// Copy of a module's whole data document.
    pub fn snapshot(&self, module: &str) -> Option<Value> {
        self.modules.get(module).map(|m| m.read().clone())
    }
}

impl Device for MemoryDevice {
    fn browser(&self, module: &str) -> Result<Box<dyn Selection>, TreeError> {
        let store = self.modules.get(module).ok_or_else(|| TreeError::NotFound {
            at: "/".to_string(),
            ident: module.to_string(),
        })?;
        Ok(Box::new(MemorySelection {
            store: Arc::clone(store),
            schema: Arc::clone(&store.root),
            at: At::Node,
            steps: Vec::new(),
        }))
    }

    fn modules(&self) -> Vec<ModuleInfo> {
        self.modules.values().map(|m| m.info.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Field(String),
    Entry {
        list: String,
        fields: Vec<String>,
        key: Vec<String>,
    },
}

/// Whether a list cursor addresses the list itself or one of its entries.
#[derive(Debug, Clone, Copy, PartialEq)]
enum At {
    Node,
    Entry,
}

#[derive(Debug, Clone)]
struct MemorySelection {
    store: Arc<ModuleStore>,
    schema: Arc<SchemaNode>,
    at: At,
    steps: Vec<Step>,
}

impl MemorySelection {
    fn child(&self, schema: &Arc<SchemaNode>, at: At, step: Step) -> Box<dyn Selection> {
        let mut steps = self.steps.clone();
        steps.push(step);
        Box::new(MemorySelection {
            store: Arc::clone(&self.store),
            schema: Arc::clone(schema),
            at,
            steps,
        })
    }

    fn is_list_node(&self) -> bool {
        matches!(self.schema.kind, NodeKind::List { .. }) && self.at == At::Node
    }

    /// Node name as a document would wrap it: the module name at the root.
    fn own_name(&self) -> &str {
        &self.schema.name
    }

    /// Drop a single-key wrapper object named after this node, so
    /// `{"me": {...}}` and `{...}` are both accepted at `me`.
    fn unwrap_self_named<'a>(&self, doc: &'a Value) -> &'a Value {
        if let Some(obj) = doc.as_object() {
            if obj.len() == 1 && self.schema.child(self.own_name()).is_none() {
                if let Some(inner) = obj.get(self.own_name()) {
                    return inner;
                }
            }
        }
        doc
    }

    fn entry_key(&self) -> Option<&[String]> {
        match self.steps.last() {
            Some(Step::Entry { key, .. }) if self.at == At::Entry => Some(key),
            _ => None,
        }
    }

    /// Validate an entry document and make its key fields agree with the
    /// entry this cursor addresses.
    fn normalize_entry_doc(&self, doc: &Value, partial: bool) -> Result<Value, TreeError> {
        let at = self.path();
        let key_fields = self.schema.keys().unwrap_or_default();
        let key_values = self.entry_key().unwrap_or_default();
        let mut entry = normalize_object(self.schema.children(), &at, doc)?;
        for (field, want) in key_fields.iter().zip(key_values) {
            match entry.get(field) {
                Some(have) if !key_matches(have, want) => {
                    return Err(TreeError::InvalidValue {
                        at,
                        reason: format!("key '{}' cannot change from '{}'", field, want),
                    });
                }
                Some(_) => {}
                None if partial => {}
                None => {
                    let leaf = self.schema.child(field).and_then(|c| c.leaf_type());
                    let value = match leaf {
                        Some(t) => t.coerce(&at, &Value::String(want.clone()))?,
                        None => Value::String(want.clone()),
                    };
                    entry.insert(field.clone(), value);
                }
            }
        }
        Ok(Value::Object(entry))
    }

    fn set_leaf(&self, value: Value) -> Result<(), TreeError> {
        let Some((Step::Field(name), parent)) = self.steps.split_last() else {
            return Err(schema_err(&self.path(), "leaf cursor without a parent"));
        };
        self.store.edit(|data| {
            let obj = locate_mut(data, parent, true)
                .and_then(Value::as_object_mut)
                .ok_or_else(|| TreeError::NoValue(self.path()))?;
            obj.insert(name.clone(), value);
            Ok(())
        })
    }

    /// Overwrite whatever this cursor addresses with an already-validated value.
    fn put(&self, value: Value) -> Result<(), TreeError> {
        self.store.edit(|data| match self.steps.split_last() {
            None => {
                *data = value;
                Ok(())
            }
            Some((Step::Field(name), parent)) => {
                let obj = locate_mut(data, parent, true)
                    .and_then(Value::as_object_mut)
                    .ok_or_else(|| TreeError::NoValue(self.path()))?;
                obj.insert(name.clone(), value);
                Ok(())
            }
            Some((last @ Step::Entry { .. }, parent)) => {
                let slot = locate_mut(data, parent, false)
                    .and_then(|p| step_get_mut(p, last))
                    .ok_or_else(|| TreeError::NoValue(self.path()))?;
                *slot = value;
                Ok(())
            }
        })
    }
}

impl Selection for MemorySelection {
    fn path(&self) -> String {
        let mut out = self.store.info.name.clone();
        for step in &self.steps {
            match step {
                Step::Field(name) => {
                    out.push('/');
                    out.push_str(name);
                }
                Step::Entry { list, key, .. } => {
                    out.push('/');
                    out.push_str(list);
                    out.push('=');
                    out.push_str(&key.join(","));
                }
            }
        }
        out
    }

    fn clone_box(&self) -> Box<dyn Selection> {
        Box::new(self.clone())
    }

    fn find(&self, ident: &str) -> Result<Box<dyn Selection>, TreeError> {
        let not_found = || TreeError::NotFound {
            at: self.path(),
            ident: ident.to_string(),
        };
        if self.is_leaf() || self.is_list_node() {
            return Err(not_found());
        }
        let (name, key) = match ident.split_once('=') {
            Some((name, key)) => (name, Some(key)),
            None => (ident, None),
        };
        let schema = self.schema.child(name).ok_or_else(not_found)?;
        let Some(key) = key else {
            return Ok(self.child(schema, At::Node, Step::Field(name.to_string())));
        };

        let fields = schema
            .keys()
            .ok_or_else(|| TreeError::NotAList(format!("{}/{}", self.path(), name)))?;
        let values: Vec<String> = key.split(',').map(String::from).collect();
        if values.len() != fields.len() {
            return Err(TreeError::InvalidValue {
                at: format!("{}/{}", self.path(), name),
                reason: format!("expected {} key value(s), got {}", fields.len(), values.len()),
            });
        }
        let data = self.store.read();
        let exists = locate(&data, &self.steps)
            .and_then(|p| p.get(name))
            .and_then(Value::as_array)
            .is_some_and(|arr| arr.iter().any(|e| entry_matches(e, fields, &values)));
        if !exists {
            return Err(not_found());
        }
        Ok(self.child(
            schema,
            At::Entry,
            Step::Entry {
                list: name.to_string(),
                fields: fields.to_vec(),
                key: values,
            },
        ))
    }

    fn is_leaf(&self) -> bool {
        self.schema.leaf_type().is_some()
    }

    fn list_key_fields(&self) -> Option<Vec<String>> {
        self.schema.keys().map(<[String]>::to_vec)
    }

    fn read_scalar(&self) -> Result<String, TreeError> {
        if !self.is_leaf() {
            return Err(schema_err(&self.path(), "not a leaf"));
        }
        let data = self.store.read();
        let value = locate(&data, &self.steps).ok_or_else(|| TreeError::NoValue(self.path()))?;
        Ok(serde_json::to_string(value)?)
    }

    fn write_scalar(&self, text: &str) -> Result<(), TreeError> {
        let leaf_type = self
            .schema
            .leaf_type()
            .ok_or_else(|| schema_err(&self.path(), "not a leaf"))?;
        let parsed = match serde_json::from_str::<Value>(text) {
            Ok(v) => v,
            Err(_) if leaf_type.accepts_raw_text() => Value::String(text.to_string()),
            Err(e) => return Err(e.into()),
        };
        let value = leaf_type.coerce(&self.path(), &parsed)?;
        self.set_leaf(value)
    }

    fn to_json(&self) -> Result<String, TreeError> {
        if self.is_leaf() {
            return self.read_scalar();
        }
        let data = self.store.read();
        let value = match locate(&data, &self.steps) {
            Some(v) => v.clone(),
            None if self.at == At::Entry => return Err(TreeError::NoValue(self.path())),
            None if self.is_list_node() => Value::Array(Vec::new()),
            None => Value::Object(Map::new()),
        };
        Ok(serde_json::to_string(&value)?)
    }

    fn delete(&self) -> Result<(), TreeError> {
        self.store.edit(|data| {
            match self.steps.split_last() {
                None => *data = Value::Object(Map::new()),
                Some((Step::Field(name), parent)) => {
                    if let Some(obj) = locate_mut(data, parent, false).and_then(Value::as_object_mut) {
                        obj.remove(name);
                    }
                }
                Some((Step::Entry { list, fields, key }, parent)) => {
                    if let Some(arr) = locate_mut(data, parent, false)
                        .and_then(|p| p.get_mut(list))
                        .and_then(Value::as_array_mut)
                    {
                        arr.retain(|e| !entry_matches(e, fields, key));
                    }
                }
            }
            Ok(())
        })
    }

    fn merge(&self, doc: &Value) -> Result<(), TreeError> {
        let doc = self.unwrap_self_named(doc);
        let at = self.path();
        if let Some(leaf_type) = self.schema.leaf_type() {
            let value = leaf_type.coerce(&at, doc)?;
            return self.set_leaf(value);
        }
        let (schema, patch) = if self.is_list_node() {
            let patch = self.schema.normalize(&at, doc)?;
            (self.schema.as_ref(), patch)
        } else if self.at == At::Entry {
            (self.schema.as_ref(), self.normalize_entry_doc(doc, true)?)
        } else {
            let patch = normalize_object(self.schema.children(), &at, doc)?;
            (self.schema.as_ref(), Value::Object(patch))
        };

        self.store.edit(|data| {
            let target = if self.at == At::Entry {
                locate_mut(data, &self.steps, false).ok_or_else(|| TreeError::NoValue(at.clone()))?
            } else {
                let empty = if self.is_list_node() {
                    Value::Array(Vec::new())
                } else {
                    Value::Object(Map::new())
                };
                locate_or_insert(data, &self.steps, empty).ok_or_else(|| TreeError::NoValue(at.clone()))?
            };

            if self.is_list_node() {
                merge_entries(schema, target, patch);
            } else {
                merge_object(schema.children(), target, patch);
            }
            Ok(())
        })
    }

    fn replace(&self, doc: &Value) -> Result<(), TreeError> {
        let doc = self.unwrap_self_named(doc);
        let at = self.path();
        let value = if self.at == At::Entry {
            self.normalize_entry_doc(doc, false)?
        } else {
            self.schema.normalize(&at, doc)?
        };
        if self.is_leaf() {
            return self.set_leaf(value);
        }
        self.put(value)
    }
}

fn key_matches(have: &Value, want: &str) -> bool {
    match have {
        Value::String(s) => s == want,
        Value::Number(n) => n.to_string() == want,
        Value::Bool(b) => b.to_string() == want,
        _ => false,
    }
}

fn entry_matches(entry: &Value, fields: &[String], values: &[String]) -> bool {
    fields
        .iter()
        .zip(values)
        .all(|(f, v)| entry.get(f).is_some_and(|have| key_matches(have, v)))
}

fn same_entry(a: &Value, b: &Value, fields: &[String]) -> bool {
    fields.iter().all(|f| match (a.get(f), b.get(f)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    })
}

fn step_get<'a>(node: &'a Value, step: &Step) -> Option<&'a Value> {
    match step {
        Step::Field(name) => node.get(name),
        Step::Entry { list, fields, key } => node
            .get(list)?
            .as_array()?
            .iter()
            .find(|e| entry_matches(e, fields, key)),
    }
}

fn step_get_mut<'a>(node: &'a mut Value, step: &Step) -> Option<&'a mut Value> {
    match step {
        Step::Field(name) => node.get_mut(name),
        Step::Entry { list, fields, key } => node
            .get_mut(list)?
            .as_array_mut()?
            .iter_mut()
            .find(|e| entry_matches(e, fields, key)),
    }
}

fn locate<'a>(root: &'a Value, steps: &[Step]) -> Option<&'a Value> {
    steps.iter().try_fold(root, step_get)
}

/// Walk to `steps`, creating missing containers when `create` is set.
/// List entries are never created implicitly.
fn locate_mut<'a>(root: &'a mut Value, steps: &[Step], create: bool) -> Option<&'a mut Value> {
    let mut node = root;
    for step in steps {
        node = match step {
            Step::Field(name) => {
                let obj = node.as_object_mut()?;
                if create && !obj.contains_key(name) {
                    obj.insert(name.clone(), Value::Object(Map::new()));
                }
                obj.get_mut(name)?
            }
            Step::Entry { .. } => step_get_mut(node, step)?,
        };
    }
    Some(node)
}

/// Walk to `steps`, inserting `empty` as the final node when it is missing.
fn locate_or_insert<'a>(root: &'a mut Value, steps: &[Step], empty: Value) -> Option<&'a mut Value> {
    let Some((last, parent)) = steps.split_last() else {
        return Some(root);
    };
    let parent = locate_mut(root, parent, true)?;
    match last {
        Step::Field(name) => Some(parent.as_object_mut()?.entry(name.clone()).or_insert(empty)),
        Step::Entry { .. } => step_get_mut(parent, last),
    }
}

/// Upsert a validated object patch into `target`.
fn merge_object(children: &[Arc<SchemaNode>], target: &mut Value, patch: Value) {
    let Value::Object(patch) = patch else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Some(obj) = target.as_object_mut() else {
        return;
    };
    for (k, v) in patch {
        let Some(child) = children.iter().find(|c| c.name == k) else {
            continue;
        };
        match &child.kind {
            NodeKind::Leaf { .. } => {
                obj.insert(k, v);
            }
            NodeKind::Container { children } => {
                let slot = obj.entry(k).or_insert_with(|| Value::Object(Map::new()));
                merge_object(children, slot, v);
            }
            NodeKind::List { .. } => {
                let slot = obj.entry(k).or_insert_with(|| Value::Array(Vec::new()));
                merge_entries(child, slot, v);
            }
        }
    }
}

/// Merge list entries by key: existing entries are patched, new ones appended.
fn merge_entries(list: &SchemaNode, target: &mut Value, patch: Value) {
    let Value::Array(entries) = patch else {
        return;
    };
    if !target.is_array() {
        *target = Value::Array(Vec::new());
    }
    let Some(arr) = target.as_array_mut() else {
        return;
    };
    let keys = list.keys().unwrap_or_default();
    for entry in entries {
        match arr.iter_mut().find(|e| same_entry(e, &entry, keys)) {
            Some(existing) => merge_object(list.children(), existing, entry),
            None => arr.push(entry),
        }
    }
}
