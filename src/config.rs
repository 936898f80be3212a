use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::app::RunOptions;
use crate::collector::{ApiOptions, DEFAULT_API_ROOT, DEFAULT_PAGE_TIMEOUT};
use crate::domain::SortMode;
use crate::download::{
    DEFAULT_BACKOFF, DEFAULT_CHUNK_SIZE, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_RETRIES, DownloadOptions,
};
use crate::error::GutenError;

pub const CONFIG_FILE_NAME: &str = "gutendex-fetch.json";
pub const DEFAULT_COUNT: usize = 10;
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// On-disk configuration; every key is optional.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub save_json: Option<bool>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub sort: Option<SortMode>,
    #[serde(default)]
    pub api_root: Option<String>,
    #[serde(default)]
    pub backoff_secs: Option<u64>,
    #[serde(default)]
    pub page_timeout_secs: Option<u64>,
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub count: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub save_json: Option<bool>,
    pub retries: Option<u32>,
    pub chunk_size: Option<usize>,
    pub sort: Option<SortMode>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub output_dir: Utf8PathBuf,
    pub api: ApiOptions,
    pub run: RunOptions,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or the first default location that exists.
    ///
    /// An explicit path must exist; without one a missing file means defaults.
    pub fn load(path: Option<&str>) -> Result<Config, GutenError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => match Self::default_locations().into_iter().find(|p| p.exists()) {
                Some(found) => found,
                None => return Ok(Config::default()),
            },
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GutenError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| GutenError::ConfigParse(err.to_string()))
    }

    pub fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dirs) = BaseDirs::new() {
            locations.push(dirs.config_dir().join("gutendex-fetch").join("config.json"));
        }
        locations
    }

    pub fn resolve(path: Option<&str>, overrides: Overrides) -> Result<ResolvedConfig, GutenError> {
        Self::resolve_config(Self::load(path)?, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: Overrides,
    ) -> Result<ResolvedConfig, GutenError> {
        let count = overrides.count.or(config.count).unwrap_or(DEFAULT_COUNT);
        if count == 0 {
            return Err(GutenError::InvalidSettings(
                "count must be at least 1".to_string(),
            ));
        }
        let retries = overrides.retries.or(config.retries).unwrap_or(DEFAULT_RETRIES);
        if retries == 0 {
            return Err(GutenError::InvalidSettings(
                "retries must be at least 1".to_string(),
            ));
        }
        let chunk_size = overrides
            .chunk_size
            .or(config.chunk_size)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(GutenError::InvalidSettings(
                "chunk size must be at least 1 byte".to_string(),
            ));
        }

        let api_root = config
            .api_root
            .unwrap_or_else(|| DEFAULT_API_ROOT.to_string());
        Url::parse(&api_root)
            .map_err(|err| GutenError::InvalidSettings(format!("api_root {api_root}: {err}")))?;

        let output_dir = match overrides.output_dir {
            Some(dir) => Utf8PathBuf::from_path_buf(dir).map_err(|dir| {
                GutenError::InvalidSettings(format!("non-utf8 output dir: {}", dir.display()))
            })?,
            None => Utf8PathBuf::from(
                config
                    .output_dir
                    .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            ),
        };

        let download = DownloadOptions {
            retries,
            chunk_size,
            backoff: config
                .backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_BACKOFF),
            timeout: config
                .download_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT),
        };

        Ok(ResolvedConfig {
            output_dir,
            api: ApiOptions {
                api_root,
                page_timeout: config
                    .page_timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_PAGE_TIMEOUT),
            },
            run: RunOptions {
                count,
                mode: overrides.sort.or(config.sort).unwrap_or_default(),
                save_json: overrides.save_json.or(config.save_json).unwrap_or(true),
                download,
            },
        })
    }
}
