//! Sample modules shared by tests across the workspace.

use serde_json::json;

use super::{LeafType, MemoryDevice, ModuleDef, SchemaNode};

/// A car with four tires, speed in milliseconds per mile.
pub fn car_module() -> ModuleDef {
    let tire = SchemaNode::list(
        "tire",
        &["pos"],
        vec![
            SchemaNode::leaf("pos", LeafType::Int),
            SchemaNode::leaf("wear", LeafType::Decimal),
            SchemaNode::leaf("size", LeafType::String),
            SchemaNode::leaf("flat", LeafType::Bool),
            SchemaNode::leaf("worn", LeafType::Bool),
        ],
    );
    ModuleDef {
        name: "car".into(),
        organization: "freeconf".into(),
        revision: "2023-03-27".into(),
        children: vec![
            SchemaNode::leaf("speed", LeafType::Int),
            SchemaNode::leaf("miles", LeafType::Int),
            SchemaNode::leaf("running", LeafType::Bool),
            SchemaNode::leaf("lastRotation", LeafType::Int),
            tire,
        ],
        data: Some(json!({
            "speed": 1000,
            "miles": 0,
            "running": false,
            "lastRotation": 0,
            "tire": [
                {"pos": 0, "wear": 100},
                {"pos": 1, "wear": 100},
                {"pos": 2, "wear": 100},
                {"pos": 3, "wear": 100}
            ]
        })),
    }
}

fn user_fields() -> Vec<SchemaNode> {
    vec![
        SchemaNode::leaf("name", LeafType::String),
        SchemaNode::leaf(
            "skill",
            LeafType::Enumeration(vec!["mechanic".into(), "welder".into(), "manager".into()]),
        ),
        SchemaNode::leaf("address", LeafType::String),
    ]
}

/// Module `x`: a `me` container and a `users` list keyed by name.
pub fn x_module() -> ModuleDef {
    ModuleDef {
        name: "x".into(),
        organization: String::new(),
        revision: String::new(),
        children: vec![
            SchemaNode::container("me", user_fields()),
            SchemaNode::list("users", &["name"], user_fields()),
        ],
        data: Some(json!({
            "me": {
                "name": "joe",
                "skill": "manager",
                "address": "123 mockingbird lane."
            },
            "users": [
                {"name": "mary", "skill": "welder"},
                {"name": "john", "skill": "mechanic"}
            ]
        })),
    }
}

/// Device with both `car` and `x` loaded.
pub fn test_device() -> MemoryDevice {
    let mut device = MemoryDevice::new();
    for def in [car_module(), x_module()] {
        if let Err(e) = device.add_module(def) {
            panic!("sample module rejected: {}", e);
        }
    }
    device
}
