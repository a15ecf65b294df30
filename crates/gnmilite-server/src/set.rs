use gnmilite_core::protocol::{
    now_nanos, SetRequest, SetResponse, SetUpdate, TypedValue, UpdateOp, UpdateResult,
};
use gnmilite_core::tree::{Device, Selection};

use crate::error::{GnmiError, Result};
use crate::select::{advance_selection, select_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Merge,
    Replace,
}

/// Serve a Set. Deletes run first, then replaces, then updates, whatever
/// their order in the request. The first failure aborts the call; mutations
/// already applied stay applied.
pub fn set(device: &dyn Device, req: &SetRequest) -> Result<SetResponse> {
    let prefix = select_path(device, &[], req.prefix.as_ref())?;
    let prefix = prefix.as_deref();
    let mut response =
        Vec::with_capacity(req.delete.len() + req.replace.len() + req.update.len());

    for path in &req.delete {
        let sel = advance_selection(device, prefix, Some(path))?;
        tracing::debug!(path = %sel.path(), "delete request");
        sel.delete()?;
        response.push(UpdateResult {
            op: UpdateOp::Delete,
            path: path.clone(),
        });
    }
    for u in &req.replace {
        apply(device, prefix, u, Mode::Replace)?;
        response.push(UpdateResult {
            op: UpdateOp::Replace,
            path: u.path.clone(),
        });
    }
    for u in &req.update {
        apply(device, prefix, u, Mode::Merge)?;
        response.push(UpdateResult {
            op: UpdateOp::Update,
            path: u.path.clone(),
        });
    }

    Ok(SetResponse {
        timestamp: now_nanos(),
        response,
    })
}

fn apply(device: &dyn Device, prefix: Option<&dyn Selection>, u: &SetUpdate, mode: Mode) -> Result<()> {
    let sel = advance_selection(device, prefix, Some(&u.path))?;
    tracing::debug!(path = %sel.path(), ?mode, "edit request");
    let val = u
        .val
        .as_ref()
        .ok_or_else(|| GnmiError::EmptyValue(sel.path()))?;
    set_val(sel.as_ref(), mode, val)
}

fn set_val(sel: &dyn Selection, mode: Mode, val: &TypedValue) -> Result<()> {
    let text = decode_payload(val)?;
    if sel.is_leaf() {
        sel.write_scalar(text)?;
        return Ok(());
    }
    let doc: serde_json::Value = serde_json::from_str(text)?;
    match mode {
        Mode::Merge => sel.merge(&doc)?,
        Mode::Replace => sel.replace(&doc)?,
    }
    Ok(())
}

fn decode_payload(val: &TypedValue) -> Result<&str> {
    match val {
        TypedValue::JsonVal(text) | TypedValue::JsonIetfVal(text) => Ok(text),
        TypedValue::StringVal(_)
        | TypedValue::IntVal(_)
        | TypedValue::UintVal(_)
        | TypedValue::BoolVal(_)
        | TypedValue::BytesVal(_)
        | TypedValue::AsciiVal(_)
        | TypedValue::DecimalVal(_) => Err(GnmiError::UnsupportedEncoding(val.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnmilite_core::protocol::{Path, PathElem};
    use gnmilite_core::tree::testing::test_device;
    use serde_json::json;

    fn x(elems: &[&str]) -> Path {
        elems
            .iter()
            .fold(Path::origin("x"), |p, e| p.with_elem(PathElem::new(*e)))
    }

    #[test]
    fn test_update_car_speed() {
        let d = test_device();
        let req = SetRequest {
            update: vec![SetUpdate::new(Path::origin("car"), TypedValue::json(r#"{"speed":100}"#))],
            ..Default::default()
        };
        let resp = set(&d, &req).unwrap();
        assert_eq!(resp.response.len(), 1);
        assert_eq!(resp.response[0].op, UpdateOp::Update);
        assert_eq!(resp.response[0].path, Path::origin("car"));
        assert_eq!(d.snapshot("car").unwrap()["speed"], json!(100));
    }

    #[test]
    fn test_phase_order() {
        let d = test_device();
        // request lists update, replace, delete; results must not follow that order
        let req = SetRequest {
            update: vec![SetUpdate::new(
                x(&["users"]),
                TypedValue::json(r#"[{"name":"john","address":"garage"}]"#),
            )],
            replace: vec![SetUpdate::new(
                x(&["me"]),
                TypedValue::json_ietf(r#"{"name":"barb","skill":"welder"}"#),
            )],
            delete: vec![Path::origin("x").with_elem(PathElem::new("users").with_key("name", "mary"))],
            ..Default::default()
        };
        let resp = set(&d, &req).unwrap();
        let ops: Vec<_> = resp.response.iter().map(|r| r.op).collect();
        assert_eq!(ops, vec![UpdateOp::Delete, UpdateOp::Replace, UpdateOp::Update]);
        assert_eq!(resp.response[0].path, req.delete[0]);
        assert_eq!(resp.response[1].path, req.replace[0].path);
        assert_eq!(resp.response[2].path, req.update[0].path);

        let after = d.snapshot("x").unwrap();
        assert_eq!(after["me"], json!({"name": "barb", "skill": "welder"}));
        assert_eq!(
            after["users"],
            json!([{"name": "john", "skill": "mechanic", "address": "garage"}])
        );
    }

    #[test]
    fn test_update_basic() {
        let d = test_device();
        let req = SetRequest {
            update: vec![SetUpdate::new(Path::origin("x"), TypedValue::json(r#"{"me":{"name":"bob"}}"#))],
            ..Default::default()
        };
        set(&d, &req).unwrap();
        assert_eq!(
            d.snapshot("x").unwrap()["me"],
            json!({"name": "bob", "skill": "manager", "address": "123 mockingbird lane."})
        );
    }

    #[test]
    fn test_delete_container() {
        let d = test_device();
        let req = SetRequest {
            delete: vec![x(&["me"])],
            ..Default::default()
        };
        let resp = set(&d, &req).unwrap();
        assert_eq!(resp.response.len(), 1);
        let after = d.snapshot("x").unwrap();
        assert!(after.get("me").is_none());
        assert_eq!(after["users"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_replace_self_named_document() {
        let d = test_device();
        let req = SetRequest {
            replace: vec![SetUpdate::new(
                x(&["me"]),
                TypedValue::json(r#"{"me":{"name":"barb", "skill":"welder"}}"#),
            )],
            ..Default::default()
        };
        set(&d, &req).unwrap();
        assert_eq!(
            d.snapshot("x").unwrap()["me"],
            json!({"name": "barb", "skill": "welder"})
        );
    }

    #[test]
    fn test_leaf_write_takes_text() {
        let d = test_device();
        let req = SetRequest {
            prefix: Some(x(&["me"])),
            update: vec![
                SetUpdate::new(Path::elems(["name"]), TypedValue::json("sam")),
                SetUpdate::new(Path::elems(["skill"]), TypedValue::json("\"welder\"")),
            ],
            ..Default::default()
        };
        set(&d, &req).unwrap();
        let me = d.snapshot("x").unwrap()["me"].clone();
        assert_eq!(me["name"], json!("sam"));
        assert_eq!(me["skill"], json!("welder"));
    }

    #[test]
    fn test_missing_value() {
        let d = test_device();
        let req = SetRequest {
            update: vec![SetUpdate {
                path: x(&["me"]),
                val: None,
            }],
            ..Default::default()
        };
        assert!(matches!(set(&d, &req), Err(GnmiError::EmptyValue(_))));
    }

    #[test]
    fn test_non_json_encoding_rejected() {
        let d = test_device();
        let before = d.snapshot("car").unwrap();
        let req = SetRequest {
            update: vec![SetUpdate::new(
                Path::origin("car").with_elem(PathElem::new("speed")),
                TypedValue::IntVal(5),
            )],
            ..Default::default()
        };
        assert!(matches!(
            set(&d, &req),
            Err(GnmiError::UnsupportedEncoding("int_val"))
        ));
        assert_eq!(d.snapshot("car").unwrap(), before);
    }

    #[test]
    fn test_invalid_document() {
        let d = test_device();
        let req = SetRequest {
            update: vec![SetUpdate::new(x(&["me"]), TypedValue::json("{not json"))],
            ..Default::default()
        };
        let err = set(&d, &req).unwrap_err();
        assert!(matches!(err, GnmiError::InvalidDocument(_)));
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn test_no_rollback_after_failure() {
        let d = test_device();
        let req = SetRequest {
            delete: vec![x(&["me"])],
            update: vec![SetUpdate::new(x(&["me"]), TypedValue::json(r#"{"shoe":9}"#))],
            ..Default::default()
        };
        let err = set(&d, &req).unwrap_err();
        assert_eq!(err.code(), "failed_precondition");
        assert!(d.snapshot("x").unwrap().get("me").is_none());
    }
}
