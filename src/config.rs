use crate::{
    error::{RavenError, Result},
    vars::*,
};
use log::trace;
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, time::Duration};

/// runtime settings, read from a TOML file with every field optional
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// directory in which every run gets its own subdirectory
    pub workdir: PathBuf,
    pub raven_binary: PathBuf,
    pub ostrich_binary: PathBuf,
    pub wfs_url: String,
    pub wcs_url: String,
    pub dem_layer: String,
    pub hybas_layer: String,
    pub max_parallel_processes: usize,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from(WORKDIR),
            raven_binary: PathBuf::from(RAVEN_BINARY),
            ostrich_binary: PathBuf::from(OSTRICH_BINARY),
            wfs_url: WFS_URL.to_string(),
            wcs_url: WCS_URL.to_string(),
            dem_layer: DEM_LAYER.to_string(),
            hybas_layer: HYBAS_LAYER.to_string(),
            max_parallel_processes: MAX_PARALLEL_PROCESSES,
            http_timeout_secs: HTTP_TIMEOUT,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        trace!("loading configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RavenError::Config(e.to_string()))?;
        if config.max_parallel_processes == 0 {
            return Err(RavenError::Config(
                "max_parallel_processes must be at least 1".into(),
            ));
        }
        Ok(config)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn partial_override() {
        let config = Config::parse(
            r#"
            workdir = "/tmp/runs"
            max_parallel_processes = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.workdir, PathBuf::from("/tmp/runs"));
        assert_eq!(config.max_parallel_processes, 8);
        assert_eq!(config.wfs_url, WFS_URL);
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(matches!(
            Config::parse("colour = \"red\""),
            Err(RavenError::Config(_))
        ));
    }

    #[test]
    fn zero_processes_rejected() {
        assert!(Config::parse("max_parallel_processes = 0").is_err());
    }
}
