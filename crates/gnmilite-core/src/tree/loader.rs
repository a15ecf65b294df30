//! Module definition files (`.json`, `.yaml`, `.yml`) into a [`MemoryDevice`].

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::{MemoryDevice, ModuleDef};

pub fn load_module_def(path: &Path) -> Result<ModuleDef> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read module definition: {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let def: ModuleDef = match ext.as_str() {
        "json" => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse module JSON: {}", path.display()))?,
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse module YAML: {}", path.display()))?,
        other => bail!(
            "Unsupported module definition extension '{}': {}",
            other,
            path.display()
        ),
    };
    Ok(def)
}

/// Build a device from module definition files, in order. A later file
/// with the same module name replaces an earlier one.
pub fn load_device<P: AsRef<Path>>(paths: &[P]) -> Result<MemoryDevice> {
    let mut device = MemoryDevice::new();
    for path in paths {
        let path = path.as_ref();
        let def = load_module_def(path)?;
        let name = def.name.clone();
        device
            .add_module(def)
            .with_context(|| format!("Invalid module '{}' in {}", name, path.display()))?;
        tracing::info!(module = %name, file = %path.display(), "module registered");
    }
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Device;

    const CAR_YAML: &str = r#"
name: car
organization: freeconf
revision: 2023-03-27
children:
  - { name: speed, kind: leaf, type: int }
data:
  speed: 1000
"#;

    #[test]
    fn test_load_yaml_and_json() {
        let tmp = tempfile::tempdir().unwrap();
        let yaml = tmp.path().join("car.yaml");
        fs::write(&yaml, CAR_YAML).unwrap();
        let json = tmp.path().join("x.json");
        fs::write(
            &json,
            r#"{"name":"x","children":[{"name":"me","kind":"container","children":[{"name":"name","kind":"leaf","type":"string"}]}]}"#,
        )
        .unwrap();

        let device = load_device(&[yaml, json]).unwrap();
        let names: Vec<_> = device.modules().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["car", "x"]);
        assert_eq!(device.snapshot("car").unwrap()["speed"], 1000);
    }

    #[test]
    fn test_unsupported_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("car.toml");
        fs::write(&path, "name = 'car'").unwrap();
        let err = load_module_def(&path).unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }

    #[test]
    fn test_invalid_initial_data_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("car.yml");
        fs::write(&path, CAR_YAML.replace("speed: 1000", "speed: fast")).unwrap();
        let err = load_device(&[path]).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid module 'car'"));
    }

    #[test]
    fn test_shipped_models_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models");
        let device = load_device(&[dir.join("car.yaml"), dir.join("x.json")]).unwrap();
        let car = device.snapshot("car").unwrap();
        assert_eq!(car["tire"].as_array().unwrap().len(), 4);
        assert_eq!(device.snapshot("x").unwrap()["me"]["skill"], "manager");
    }

    #[test]
    fn test_missing_file() {
        assert!(load_module_def(Path::new("/nonexistent/car.yaml")).is_err());
    }
}
