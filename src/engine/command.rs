//! Work components backed by an external executable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::component::{ComponentProfile, WorkComponent, WorkResult};
use crate::model::Item;

/// Runs the profile's command once per item.
///
/// The item is described through `ITEMFLOW_*` environment variables. Exit
/// status zero is success; stdout becomes the event details, or stderr on
/// failure.
#[derive(Debug, Clone)]
pub struct CommandComponent {
    profile: ComponentProfile,
}

impl CommandComponent {
    pub fn new(profile: ComponentProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &ComponentProfile {
        &self.profile
    }

    fn resolve(command: &Path) -> std::io::Result<PathBuf> {
        // Relative paths are relative to the process CWD.
        if command.is_relative() {
            Ok(std::env::current_dir()?.join(command))
        } else {
            Ok(command.to_path_buf())
        }
    }
}

#[async_trait]
impl WorkComponent for CommandComponent {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn version(&self) -> &str {
        &self.profile.version
    }

    fn event_id(&self) -> &str {
        &self.profile.event_id
    }

    async fn run(&self, item: &Item) -> anyhow::Result<WorkResult> {
        let command = Self::resolve(&self.profile.command)?;
        debug!(
            component = %self.profile.name,
            item = %item.key,
            command = %command.display(),
            "running command"
        );

        let output = Command::new(&command)
            .env("ITEMFLOW_ITEM_KEY", item.key.as_str())
            .env("ITEMFLOW_EXTERNAL_ID", item.external_id.as_deref().unwrap_or(""))
            .env("ITEMFLOW_ITEM_TYPE", item.item_type.as_deref().unwrap_or(""))
            .env("ITEMFLOW_EVENT_ID", &self.profile.event_id)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("cannot run {}: {e}", command.display()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            return Ok(WorkResult::success(stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = output.status.code().unwrap_or(-1);
        let detail = if stderr.is_empty() {
            format!("exited with status {code}")
        } else {
            format!("exited with status {code}: {stderr}")
        };
        Ok(WorkResult::failure(detail))
    }
}
