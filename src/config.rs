use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::hybrid::HybridSettings;
use crate::load::{FloodSettings, LoadSettings};
use crate::prober::ProbeSettings;
use crate::tools::ToolSettings;
use crate::types::{HybridTarget, Target};

/// Top-level configuration. Every section is optional in the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub results_dir: PathBuf,
    /// Online targets exercised per performance run.
    pub max_targets: usize,
    pub probe: ProbeSettings,
    pub load: LoadSettings,
    pub flood: FloodSettings,
    pub hybrid: HybridSettings,
    pub tools: ToolSettings,
    /// Replaces the built-in registry when non-empty.
    pub targets: Vec<Target>,
    pub hybrid_targets: Vec<HybridTarget>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            max_targets: 5,
            probe: ProbeSettings::default(),
            load: LoadSettings::default(),
            flood: FloodSettings::default(),
            hybrid: HybridSettings::default(),
            tools: ToolSettings::default(),
            targets: Vec::new(),
            hybrid_targets: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io("read config", path, e))?;
        debug!(path = %path.display(), "config loaded");
        Self::from_toml_str(&raw)
    }

    /// Defaults when no path is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        nonzero("load.total_requests", self.load.total_requests as u64)?;
        nonzero("load.concurrency", self.load.concurrency as u64)?;
        nonzero("load.request_timeout_ms", self.load.request_timeout_ms)?;
        nonzero("flood.concurrency", self.flood.concurrency as u64)?;
        nonzero("flood.rate_per_second", self.flood.rate_per_second as u64)?;
        nonzero("flood.request_timeout_ms", self.flood.request_timeout_ms)?;
        nonzero("probe.timeout_ms", self.probe.timeout_ms)?;
        nonzero("tools.timeout_secs", self.tools.timeout_secs)?;
        nonzero("tools.locust_users", u64::from(self.tools.locust_users))?;
        nonzero("tools.locust_spawn_rate", u64::from(self.tools.locust_spawn_rate))?;
        if self.tools.locust_run_time.trim().is_empty() {
            return Err(Error::config("tools.locust_run_time", "must not be empty"));
        }
        nonzero("max_targets", self.max_targets as u64)?;
        if self.hybrid.attack_kinds.is_empty() {
            return Err(Error::config(
                "hybrid.attack_kinds",
                "at least one attack kind is required",
            ));
        }
        for t in &self.hybrid_targets {
            crate::registry::validate_url(&t.url, &t.url)?;
            if t.parameter.trim().is_empty() {
                return Err(Error::config(
                    "hybrid_targets.parameter",
                    format!("empty for {}", t.url),
                ));
            }
        }
        Ok(())
    }

    pub fn hybrid_targets(&self) -> Vec<HybridTarget> {
        if self.hybrid_targets.is_empty() {
            crate::registry::builtin_hybrid_targets()
        } else {
            self.hybrid_targets.clone()
        }
    }
}

fn nonzero(field: &str, value: u64) -> Result<(), Error> {
    if value == 0 {
        Err(Error::config(field, "must be greater than zero"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolKind;

    #[test]
    fn empty_file_gives_defaults() {
        let c = Config::from_toml_str("").unwrap();
        assert_eq!(c, Config::default());
        assert_eq!(c.load.total_requests, 20);
        assert_eq!(c.load.concurrency, 5);
        assert_eq!(c.flood.concurrency, 50);
        assert_eq!(c.tools.enabled, vec![ToolKind::Locust, ToolKind::K6]);
        assert_eq!(c.hybrid_targets().len(), 2);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let c = Config::from_toml_str(
            r#"
            max_targets = 2
            [load]
            concurrency = 8
            [tools]
            enabled = ["k6", "jmeter"]
            "#,
        )
        .unwrap();
        assert_eq!(c.max_targets, 2);
        assert_eq!(c.load.concurrency, 8);
        assert_eq!(c.load.total_requests, 20);
        assert_eq!(c.tools.enabled, vec![ToolKind::K6, ToolKind::Jmeter]);
        assert_eq!(c.tools.timeout_secs, 60);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = Config::from_toml_str("[load]\nconcurrency = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config { ref field, .. } if field == "load.concurrency"));
    }

    #[test]
    fn zero_locust_users_rejected() {
        let mut c = Config::default();
        c.tools.override_locust(Some(0), None, None);
        let err = c.validate().unwrap_err();
        assert!(matches!(err, Error::Config { ref field, .. } if field == "tools.locust_users"));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(Config::from_toml_str("[load"), Err(Error::ConfigParse(_))));
    }
}
