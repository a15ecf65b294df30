use gnmilite_core::protocol::{now_nanos, GetRequest, GetResponse, Notification, TypedValue, Update};
use gnmilite_core::tree::{Device, Selection};

use crate::error::Result;
use crate::select::{advance_selection, select_path};

/// Serve a Get: one notification, one update per requested path, in order.
pub fn get(device: &dyn Device, req: &GetRequest) -> Result<GetResponse> {
    let timestamp = now_nanos();
    let prefix = select_path(device, &req.use_models, req.prefix.as_ref())?;

    let mut update = Vec::with_capacity(req.path.len());
    for path in &req.path {
        let sel = advance_selection(device, prefix.as_deref(), Some(path))?;
        tracing::debug!(path = %sel.path(), "get request");
        update.push(Update {
            path: path.clone(),
            val: get_val(sel.as_ref())?,
        });
    }

    Ok(GetResponse {
        notification: vec![Notification { timestamp, update }],
    })
}

/// Read the value at a cursor: the scalar for a leaf, the serialized subtree
/// otherwise.
pub fn get_val(sel: &dyn Selection) -> Result<TypedValue> {
    let text = if sel.is_leaf() {
        sel.read_scalar()?
    } else {
        sel.to_json()?
    };
    Ok(TypedValue::json(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GnmiError;
    use gnmilite_core::protocol::{ModelData, Path, PathElem};
    use gnmilite_core::tree::testing::test_device;
    use serde_json::{json, Value};

    fn parse(val: &TypedValue) -> Value {
        serde_json::from_str(val.json_text().unwrap()).unwrap()
    }

    #[test]
    fn test_get_module() {
        let d = test_device();
        let req = GetRequest {
            path: vec![Path::origin("car")],
            ..Default::default()
        };
        let resp = get(&d, &req).unwrap();
        assert_eq!(resp.notification.len(), 1);
        let n = &resp.notification[0];
        assert_eq!(n.update.len(), 1);
        assert_eq!(n.update[0].path, Path::origin("car"));
        let car = parse(&n.update[0].val);
        assert_eq!(car["speed"], json!(1000));
        assert_eq!(car["tire"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_get_with_prefix_keeps_order() {
        let d = test_device();
        let req = GetRequest {
            prefix: Some(Path::origin("x")),
            path: vec![
                Path::default().with_elem(PathElem::new("users").with_key("name", "john")),
                Path::elems(["me", "name"]),
            ],
            ..Default::default()
        };
        let resp = get(&d, &req).unwrap();
        let updates = &resp.notification[0].update;
        assert_eq!(updates.len(), 2);
        assert_eq!(parse(&updates[0].val), json!({"name": "john", "skill": "mechanic"}));
        assert_eq!(updates[1].val, TypedValue::json("\"joe\""));
    }

    #[test]
    fn test_get_with_use_models() {
        let d = test_device();
        let req = GetRequest {
            path: vec![Path::elems(["speed"])],
            use_models: vec![ModelData::named("car")],
            ..Default::default()
        };
        let resp = get(&d, &req).unwrap();
        assert_eq!(resp.notification[0].update[0].val, TypedValue::json("1000"));
    }

    #[test]
    fn test_get_aborts_on_first_failure() {
        let d = test_device();
        let req = GetRequest {
            path: vec![Path::origin("car"), Path::origin("boat")],
            ..Default::default()
        };
        assert!(matches!(get(&d, &req), Err(GnmiError::NoSuchModule(_))));
    }

    #[test]
    fn test_get_no_paths() {
        let d = test_device();
        let resp = get(&d, &GetRequest::default()).unwrap();
        assert_eq!(resp.notification.len(), 1);
        assert!(resp.notification[0].update.is_empty());
    }
}
