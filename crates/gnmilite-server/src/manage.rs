//! The server's own module, `gnmilite`: Get reads the server's options and
//! Set changes them on the running process.
//!
//! ```json
//! {"debug": false, "web": {"listen": "127.0.0.1:9339"}}
//! ```

use std::sync::{Arc, Mutex};

use gnmilite_core::tree::{EditObserver, LeafType, MemoryDevice, ModuleDef, SchemaNode, TreeError};
use serde_json::{json, Value};

pub const MANAGEMENT_MODULE: &str = "gnmilite";

/// Options of the running server that can be changed through the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub listen: String,
}

/// Hooks into the process hosting the server.
pub trait ServerControl: Send + Sync {
    fn set_debug(&self, on: bool) -> Result<(), String>;

    /// Start serving on `opts`. On error the previous options stay in effect.
    fn apply(&self, opts: &ServerOptions) -> Result<(), String>;
}

pub fn management_module(debug: bool, opts: &ServerOptions) -> ModuleDef {
    ModuleDef {
        name: MANAGEMENT_MODULE.to_string(),
        organization: "gnmilite".to_string(),
        revision: env!("CARGO_PKG_VERSION").to_string(),
        children: vec![
            SchemaNode::leaf("debug", LeafType::Bool),
            SchemaNode::container("web", vec![SchemaNode::leaf("listen", LeafType::String)]),
        ],
        data: Some(json!({
            "debug": debug,
            "web": {"listen": opts.listen},
        })),
    }
}

/// Add the management module to `device`. Edits of it are forwarded to
/// `control`; a change `control` refuses fails the Set.
pub fn add_management_module(
    device: &mut MemoryDevice,
    debug: bool,
    opts: ServerOptions,
    control: Arc<dyn ServerControl>,
) -> Result<(), TreeError> {
    let def = management_module(debug, &opts);
    let manager = Manager {
        control,
        current: Mutex::new((debug, opts)),
    };
    device.add_observed_module(def, Arc::new(manager))
}

struct Manager {
    control: Arc<dyn ServerControl>,
    current: Mutex<(bool, ServerOptions)>,
}

fn rejected(at: &str, reason: impl Into<String>) -> TreeError {
    TreeError::InvalidValue {
        at: format!("{}/{}", MANAGEMENT_MODULE, at),
        reason: reason.into(),
    }
}

impl EditObserver for Manager {
    fn apply(&self, doc: &Value) -> Result<(), TreeError> {
        let debug = doc.get("debug").and_then(Value::as_bool).unwrap_or(false);
        let listen = doc
            .pointer("/web/listen")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| rejected("web/listen", "a listen address is required"))?;
        let opts = ServerOptions {
            listen: listen.to_string(),
        };

        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if opts != current.1 {
            self.control
                .apply(&opts)
                .map_err(|e| rejected("web/listen", e))?;
            tracing::info!(listen = %opts.listen, "server options applied");
            current.1 = opts;
        }
        if debug != current.0 {
            self.control.set_debug(debug).map_err(|e| rejected("debug", e))?;
            current.0 = debug;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{get, set, GnmiError};
    use gnmilite_core::protocol::{GetRequest, Path, PathElem, SetRequest, SetUpdate, TypedValue};
    use gnmilite_core::tree::testing::test_device;

    #[derive(Default)]
    struct Recorder {
        debug: Mutex<Vec<bool>>,
        applied: Mutex<Vec<String>>,
    }

    impl ServerControl for Recorder {
        fn set_debug(&self, on: bool) -> Result<(), String> {
            self.debug.lock().unwrap().push(on);
            Ok(())
        }

        fn apply(&self, opts: &ServerOptions) -> Result<(), String> {
            if opts.listen.ends_with(":1") {
                return Err(format!("cannot listen on {}", opts.listen));
            }
            self.applied.lock().unwrap().push(opts.listen.clone());
            Ok(())
        }
    }

    fn managed() -> (MemoryDevice, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let mut device = test_device();
        let opts = ServerOptions {
            listen: "127.0.0.1:9339".into(),
        };
        add_management_module(&mut device, false, opts, recorder.clone()).unwrap();
        (device, recorder)
    }

    fn leaf(elems: &[&str]) -> Path {
        elems
            .iter()
            .fold(Path::origin(MANAGEMENT_MODULE), |p, e| p.with_elem(PathElem::new(*e)))
    }

    fn update(path: Path, json: &str) -> SetRequest {
        SetRequest {
            update: vec![SetUpdate::new(path, TypedValue::json(json))],
            ..Default::default()
        }
    }

    fn read(device: &MemoryDevice, path: Path) -> TypedValue {
        let req = GetRequest {
            path: vec![path],
            ..Default::default()
        };
        get(device, &req).unwrap().notification[0].update[0].val.clone()
    }

    #[test]
    fn test_get_reports_options() {
        let (device, _) = managed();
        assert_eq!(read(&device, leaf(&["debug"])), TypedValue::json("false"));
        assert_eq!(
            read(&device, leaf(&["web", "listen"])),
            TypedValue::json("\"127.0.0.1:9339\"")
        );
    }

    #[test]
    fn test_set_debug_switches_logging() {
        let (device, recorder) = managed();
        set(&device, &update(leaf(&["debug"]), "true")).unwrap();
        assert_eq!(*recorder.debug.lock().unwrap(), vec![true]);
        assert_eq!(read(&device, leaf(&["debug"])), TypedValue::json("true"));

        // unchanged options are not re-applied
        set(&device, &update(leaf(&["debug"]), "true")).unwrap();
        assert_eq!(recorder.debug.lock().unwrap().len(), 1);
        assert!(recorder.applied.lock().unwrap().is_empty());
    }

    #[test]
    fn test_set_listen_applies_options() {
        let (device, recorder) = managed();
        let doc = r#"{"web": {"listen": "127.0.0.1:9400"}}"#;
        set(&device, &update(Path::origin(MANAGEMENT_MODULE), doc)).unwrap();
        assert_eq!(*recorder.applied.lock().unwrap(), vec!["127.0.0.1:9400"]);
        assert_eq!(
            read(&device, leaf(&["web", "listen"])),
            TypedValue::json("\"127.0.0.1:9400\"")
        );
    }

    #[test]
    fn test_refused_options_leave_tree_unchanged() {
        let (device, recorder) = managed();
        let err = set(&device, &update(leaf(&["web", "listen"]), "\"127.0.0.1:1\"")).unwrap_err();
        assert!(matches!(err, GnmiError::Tree(TreeError::InvalidValue { .. })));
        assert_eq!(err.code(), "failed_precondition");
        assert_eq!(
            read(&device, leaf(&["web", "listen"])),
            TypedValue::json("\"127.0.0.1:9339\"")
        );
        assert!(recorder.applied.lock().unwrap().is_empty());

        let delete = SetRequest {
            delete: vec![leaf(&["web"])],
            ..Default::default()
        };
        assert!(set(&device, &delete).is_err());
        assert_eq!(
            read(&device, leaf(&["web", "listen"])),
            TypedValue::json("\"127.0.0.1:9339\"")
        );
    }
}
