use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::config::LabConfig;
use crate::error::{LabError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<LabConfig> {
    let txt = fs::read_to_string(p)
        .map_err(|e| LabError::Config(format!("Failed to read config file: {e}")))?;
    load_from_str(&txt)
}

pub fn load_from_str(txt: &str) -> Result<LabConfig> {
    let cfg: LabConfig =
        toml::from_str(txt).map_err(|e| LabError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &LabConfig) -> Result<()> {
    if cfg.proxies.is_empty() {
        return Err(LabError::Config("at least one proxy is required".into()));
    }

    let mut seen = HashSet::new();
    for proxy in &cfg.proxies {
        if proxy.id.trim().is_empty() {
            return Err(LabError::Config("proxy id cannot be empty".into()));
        }
        if !seen.insert(proxy.id.as_str()) {
            return Err(LabError::Config(format!("duplicate proxy id: {}", proxy.id)));
        }
        if proxy.versions.is_empty() {
            return Err(LabError::Config(format!("proxy {} declares no versions", proxy.id)));
        }
        if proxy.versions.iter().any(|v| v.trim().is_empty()) {
            return Err(LabError::Config(format!("proxy {} has an empty version", proxy.id)));
        }
        if proxy.port == 0 {
            return Err(LabError::Config(format!("proxy {} port must be > 0", proxy.id)));
        }
    }

    if cfg.timeout.command_secs == 0 {
        return Err(LabError::Config("command_secs must be > 0".into()));
    }
    if cfg.timeout.health_interval_secs == 0 {
        return Err(LabError::Config("health_interval_secs must be > 0".into()));
    }
    if cfg.capture.interface.trim().is_empty() {
        return Err(LabError::Config("capture interface cannot be empty".into()));
    }

    Ok(())
}
