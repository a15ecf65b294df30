//! Path resolution: wire [`Path`]s (plus prefix and model list) into cursors.

use gnmilite_core::protocol::{ModelData, Path, PathElem};
use gnmilite_core::tree::{Device, Selection, TreeError};

use crate::error::{GnmiError, Result};

/// Resolve the module root and, when the path has elements, advance into
/// them. `Ok(None)` means there is nothing to select: no model and no path.
pub fn select_path(
    device: &dyn Device,
    models: &[ModelData],
    path: Option<&Path>,
) -> Result<Option<Box<dyn Selection>>> {
    let module = match (models, path) {
        ([_, _, ..], _) => return Err(GnmiError::AmbiguousModel),
        ([model], _) => model.name.as_str(),
        ([], None) => return Ok(None),
        ([], Some(p)) if p.origin.is_empty() && !p.elem.is_empty() => {
            return Err(GnmiError::ModelOrOriginRequired)
        }
        ([], Some(p)) => p.origin.as_str(),
    };
    let root = device.browser(module).map_err(|e| match e {
        TreeError::NotFound { .. } => GnmiError::NoSuchModule(module.to_string()),
        other => GnmiError::Tree(other),
    })?;
    match path {
        Some(p) if !p.elem.is_empty() => advance_from(root, p).map(Some),
        _ => Ok(Some(root)),
    }
}

/// Advance from `prefix` through the elements of `path`. Without a prefix
/// the path is resolved on its own and must carry an origin.
pub fn advance_selection(
    device: &dyn Device,
    prefix: Option<&dyn Selection>,
    path: Option<&Path>,
) -> Result<Box<dyn Selection>> {
    match (prefix, path) {
        (None, None) => Err(GnmiError::NoSelection),
        (None, Some(p)) => {
            if p.origin.is_empty() {
                return Err(GnmiError::ModelOrOriginRequired);
            }
            select_path(device, &[], Some(p))?.ok_or(GnmiError::NoSelection)
        }
        (Some(anchor), None) => Ok(anchor.clone_box()),
        (Some(anchor), Some(p)) => advance_from(anchor.clone_box(), p),
    }
}

/// Resolve `prefix` (when present) and then `path` relative to it.
pub fn select_full_path(
    device: &dyn Device,
    prefix: Option<&Path>,
    path: Option<&Path>,
) -> Result<Box<dyn Selection>> {
    let anchor = match prefix {
        Some(p) => select_path(device, &[], Some(p))?,
        None => None,
    };
    match (anchor, path) {
        (Some(anchor), Some(p)) => advance_from(anchor, p),
        (Some(anchor), None) => Ok(anchor),
        (None, Some(p)) => select_path(device, &[], Some(p))?.ok_or(GnmiError::NoSelection),
        (None, None) => Err(GnmiError::NoSelection),
    }
}

fn advance_from(mut cursor: Box<dyn Selection>, path: &Path) -> Result<Box<dyn Selection>> {
    for elem in path.elem.iter().filter(|e| !e.name.is_empty()) {
        cursor = step(cursor.as_ref(), elem, path)?;
    }
    Ok(cursor)
}

fn step(cursor: &dyn Selection, elem: &PathElem, path: &Path) -> Result<Box<dyn Selection>> {
    let unresolved = |source: TreeError| GnmiError::UnresolvedPath {
        path: path.to_string(),
        source,
    };
    let child = cursor.find(&elem.name).map_err(unresolved)?;
    if elem.key.is_empty() {
        return Ok(child);
    }
    let fields = child
        .list_key_fields()
        .ok_or_else(|| GnmiError::KeysOnNonList(child.path()))?;
    cursor
        .find(&format!("{}={}", elem.name, encode_key(&fields, elem)))
        .map_err(unresolved)
}

/// Key values joined in the list's declared key order; a missing value
/// encodes as empty.
fn encode_key(fields: &[String], elem: &PathElem) -> String {
    fields
        .iter()
        .map(|f| elem.key.get(f).map(String::as_str).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(",")
}
