use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Load the manifest sidecar describing the current run
///
/// A missing, unreadable or non-object manifest yields an empty map.
pub fn load_manifest(path: &Path) -> Map<String, Value> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no manifest, attaching empty object");
            return Map::new();
        }
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!(path = %path.display(), "manifest is not a JSON object, ignoring it");
            Map::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "manifest is not valid JSON, ignoring it");
            Map::new()
        }
    }
}
