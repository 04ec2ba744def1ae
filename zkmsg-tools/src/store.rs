//! JSON snapshots of the local verifier and mirror.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use zkmsg_state::{OffChainMirror, VerifierSnapshot};

const VERIFIER_FILE: &str = "verifier.json";
const MIRROR_FILE: &str = "mirror.json";

pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.join(VERIFIER_FILE).exists()
    }

    pub fn init(&self, verifier: &VerifierSnapshot, mirror: &OffChainMirror) -> Result<()> {
        ensure!(
            !self.exists(),
            "state already initialized at {}",
            self.dir.display()
        );
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        self.save(verifier, mirror)
    }

    pub fn load(&self) -> Result<(VerifierSnapshot, OffChainMirror)> {
        ensure!(
            self.exists(),
            "no state at {}; run `mirror init` first",
            self.dir.display()
        );
        Ok((read_json(&self.dir.join(VERIFIER_FILE))?, read_json(&self.dir.join(MIRROR_FILE))?))
    }

    pub fn save(&self, verifier: &VerifierSnapshot, mirror: &OffChainMirror) -> Result<()> {
        write_json(&self.dir.join(VERIFIER_FILE), verifier)?;
        write_json(&self.dir.join(MIRROR_FILE), mirror)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}
