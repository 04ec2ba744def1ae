//! CLI configuration.

use std::{env, path::PathBuf};

use anyhow::{Context, Result};

const DEFAULT_STATE_DIR: &str = "state";
const DEFAULT_MANIFEST_PATH: &str = "artifacts/manifest.json";

#[derive(Clone, Debug)]
pub struct ToolsConfig {
    /// Directory holding `verifier.json` and `mirror.json`.
    pub state_dir: PathBuf,
    /// Artifact manifest used when proving with the Halo2 backend.
    pub manifest_path: PathBuf,
    /// Circuit size for `gen-params` when `--k` is not given.
    pub default_k: u32,
}

impl ToolsConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let state_dir = env::var("ZKMSG_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_DIR));

        let manifest_path = env::var("ZKMSG_MANIFEST")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MANIFEST_PATH));

        let default_k = match env::var("ZKMSG_DEFAULT_K") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("ZKMSG_DEFAULT_K must be an integer, got {value:?}"))?,
            Err(_) => zkmsg_circuit::DEFAULT_K as u32,
        };

        Ok(Self {
            state_dir,
            manifest_path,
            default_k,
        })
    }
}
