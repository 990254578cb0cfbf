//! Work components and their profiles.
//!
//! A work component performs one workflow step on one item and reports an
//! outcome. Components defined by profile TOML files run an external
//! command; library users can implement [`WorkComponent`] directly.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{Item, TriggerQuery};

/// The processing logic behind one workflow step.
#[async_trait]
pub trait WorkComponent: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Event id recorded for every run.
    fn event_id(&self) -> &str;

    /// Do the work. An `Err` (or a panic) is recorded as a failure event.
    async fn run(&self, item: &Item) -> anyhow::Result<WorkResult>;

    /// Agent string stored on recorded events.
    fn agent(&self) -> String {
        format!("{}-{}", self.name(), self.version())
    }
}

/// What a component reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkResult {
    pub success: bool,
    /// Free-text report stored as the event's details.
    pub detail: String,
    /// When false, the run is not recorded in the item's log.
    pub preservable: bool,
}

impl WorkResult {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
            preservable: true,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
            preservable: true,
        }
    }

    /// Keep this result out of the item's log.
    pub fn not_preservable(mut self) -> Self {
        self.preservable = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ProfileFile {
    component: ComponentProfile,
}

/// A command-backed component and the items it reacts to.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentProfile {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub event_id: String,
    /// Executable run once per item.
    pub command: PathBuf,
    #[serde(default)]
    pub trigger: TriggerQuery,
    /// Upper bound on concurrent runs; the dispatcher default applies when
    /// unset.
    pub max_concurrent: Option<usize>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl ComponentProfile {
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ProfileFile =
            toml::from_str(content).map_err(|e| Error::Config(format!("bad component profile: {e}")))?;
        Ok(file.component)
    }
}

/// Profiles loaded from a directory, indexed by name.
pub struct ComponentRegistry {
    profiles: HashMap<String, ComponentProfile>,
}

impl ComponentRegistry {
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
        }
    }

    /// Load every `.toml` file in `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut profiles = HashMap::new();

        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Config(format!("cannot read component dir {}: {e}", dir.display()))
        })?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                let content = std::fs::read_to_string(&path)?;
                let profile = ComponentProfile::from_toml(&content).map_err(|e| {
                    Error::Config(format!("{}: {e}", path.display()))
                })?;
                if profiles.contains_key(&profile.name) {
                    return Err(Error::Config(format!(
                        "duplicate component name '{}' in {}",
                        profile.name,
                        path.display()
                    )));
                }
                profiles.insert(profile.name.clone(), profile);
            }
        }

        Ok(Self { profiles })
    }

    pub fn get(&self, name: &str) -> Option<&ComponentProfile> {
        self.profiles.get(name)
    }

    /// Component names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
