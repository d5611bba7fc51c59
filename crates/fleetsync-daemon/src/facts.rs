//! Loading collector fact documents from disk

use fleetsync_core::FactBundle;
use fleetsync_engine::DeviceReport;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Facts directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Bundles ready to sync, plus failed reports for documents that were not
#[derive(Debug, Default)]
pub struct LoadedFacts {
    pub bundles: Vec<FactBundle>,
    pub rejected: Vec<DeviceReport>,
}

/// Read every `*.json` document in `dir`, in file name order.
///
/// A document that cannot be parsed or validated does not stop the load; it
/// becomes a failed device report named after the file.
pub fn load_dir(dir: &Path) -> Result<LoadedFacts, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::MissingDirectory(dir.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut loaded = LoadedFacts::default();
    let mut seen = HashSet::new();
    for path in paths {
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| FactBundle::from_json(&content).map_err(|e| e.to_string()));

        match parsed {
            Ok(bundle) if !seen.insert(bundle.name.clone()) => {
                warn!(file = %label, device = %bundle.name, "Duplicate device facts ignored");
                loaded.rejected.push(DeviceReport::failed(
                    label,
                    format!("duplicate facts for device {}", bundle.name),
                ));
            }
            Ok(bundle) => {
                debug!(file = %label, device = %bundle.name, "Loaded facts");
                loaded.bundles.push(bundle);
            }
            Err(e) => {
                warn!(file = %label, error = %e, "Rejected facts document");
                loaded.rejected.push(DeviceReport::failed(label, e));
            }
        }
    }

    info!(
        path = %dir.display(),
        devices = loaded.bundles.len(),
        rejected = loaded.rejected.len(),
        "Loaded fact documents"
    );
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_engine::DeviceSyncStatus;

    const VALID: &str = r#"{
        "identity": "lab-switch2",
        "serial-number": "7A2B3C",
        "board-name": "CRS326-24G-2S+",
        "interfaces": [{"name": "ether1", "type": "ether", "default-name": "ether1"}]
    }"#;

    #[test]
    fn test_load_mixed_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b-valid.json"), VALID).unwrap();
        std::fs::write(dir.path().join("a-broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("c-missing.json"), r#"{"name": "x-y1"}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded.bundles.len(), 1);
        assert_eq!(loaded.bundles[0].name, "lab-switch2");
        assert_eq!(loaded.bundles[0].site, "lab");

        let rejected: Vec<_> = loaded.rejected.iter().map(|r| r.device.as_str()).collect();
        assert_eq!(rejected, vec!["a-broken.json", "c-missing.json"]);
        assert!(loaded
            .rejected
            .iter()
            .all(|r| r.status == DeviceSyncStatus::Failed));
        assert!(loaded.rejected[1]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("serial"));
    }

    #[test]
    fn test_duplicate_device_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.json"), VALID).unwrap();
        std::fs::write(dir.path().join("two.json"), VALID).unwrap();

        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded.bundles.len(), 1);
        assert_eq!(loaded.rejected.len(), 1);
        assert_eq!(loaded.rejected[0].device, "two.json");
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dir(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, LoadError::MissingDirectory(_)));
    }
}
