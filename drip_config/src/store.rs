//! Configuration persistence.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::{fs, io::Write};

use crate::{Config, load_toml, to_toml_string};

/// Loads and writes back the whole configuration document.
pub trait ConfigStore {
    fn load(&mut self) -> eyre::Result<Config>;
    fn save(&mut self, cfg: &Config) -> eyre::Result<()>;
}

/// Replace `path` with `bytes` via a synced temp file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

/// TOML file on disk. A missing file loads as the defaults.
#[derive(Debug, Clone)]
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for TomlFileStore {
    fn load(&mut self) -> eyre::Result<Config> {
        if !self.path.exists() {
            tracing::warn!(path = %self.path.display(), "config file not found, using defaults");
            return Ok(Config::default());
        }
        let text = fs::read_to_string(&self.path)
            .map_err(|e| eyre::eyre!("read config {:?}: {}", self.path, e))?;
        let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", self.path, e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn save(&mut self, cfg: &Config) -> eyre::Result<()> {
        let text = to_toml_string(cfg)?;
        write_atomic(&self.path, text.as_bytes())
            .map_err(|e| eyre::eyre!("write config {:?}: {}", self.path, e))?;
        tracing::debug!(path = %self.path.display(), "config saved");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    current: Config,
    saves: usize,
    fail_saves: bool,
}

/// In-memory store. Clones share state, so a test can keep a handle
/// while the controller owns another and inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new(cfg: Config) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                current: cfg,
                ..MemoryInner::default()
            })),
        }
    }

    /// Number of successful `save` calls so far.
    pub fn saves(&self) -> usize {
        self.inner.lock().map(|g| g.saves).unwrap_or(0)
    }

    /// Last saved (or initial) document.
    pub fn current(&self) -> Config {
        self.inner
            .lock()
            .map(|g| g.current.clone())
            .unwrap_or_default()
    }

    /// Make subsequent saves fail, to exercise error paths.
    pub fn set_fail_saves(&self, fail: bool) {
        if let Ok(mut g) = self.inner.lock() {
            g.fail_saves = fail;
        }
    }
}

impl ConfigStore for MemoryStore {
    fn load(&mut self) -> eyre::Result<Config> {
        let g = self
            .inner
            .lock()
            .map_err(|_| eyre::eyre!("memory store poisoned"))?;
        Ok(g.current.clone())
    }

    fn save(&mut self, cfg: &Config) -> eyre::Result<()> {
        let mut g = self
            .inner
            .lock()
            .map_err(|_| eyre::eyre!("memory store poisoned"))?;
        if g.fail_saves {
            eyre::bail!("memory store rejected save");
        }
        g.current = cfg.clone();
        g.saves += 1;
        Ok(())
    }
}
