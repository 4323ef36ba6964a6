//! Fleet lifecycle control

use crate::config::ClusterCommands;
use crate::error::HarnessError;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

/// Brings the server fleet up before a run and down after it
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterControl: Send + Sync {
    /// Start the fleet
    async fn start(&self) -> Result<(), HarnessError>;

    /// Tear the fleet down; called even when the run failed
    async fn teardown(&self) -> Result<(), HarnessError>;
}

/// Fleet managed outside the harness
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalCluster;

#[async_trait]
impl ClusterControl for ExternalCluster {
    async fn start(&self) -> Result<(), HarnessError> {
        debug!("using externally managed cluster");
        Ok(())
    }

    async fn teardown(&self) -> Result<(), HarnessError> {
        Ok(())
    }
}

/// Fleet controlled by shell commands, e.g. a compose file
#[derive(Debug, Clone, Default)]
pub struct CommandCluster {
    start: Option<String>,
    teardown: Option<String>,
}

impl CommandCluster {
    /// From configured commands
    #[must_use]
    pub fn new(commands: &ClusterCommands) -> Self {
        Self {
            start: commands.start.clone(),
            teardown: commands.teardown.clone(),
        }
    }

    async fn run(stage: &str, command: Option<&str>) -> Result<(), HarnessError> {
        let Some(command) = command else {
            return Ok(());
        };
        info!(stage, command, "running cluster command");
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| HarnessError::Cluster(format!("{stage} `{command}`: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(HarnessError::Cluster(format!("{stage} `{command}` exited with {status}")))
        }
    }
}

#[async_trait]
impl ClusterControl for CommandCluster {
    async fn start(&self) -> Result<(), HarnessError> {
        Self::run("start", self.start.as_deref()).await
    }

    async fn teardown(&self) -> Result<(), HarnessError> {
        Self::run("teardown", self.teardown.as_deref()).await
    }
}

/// Control matching the configuration: commands if any, otherwise external
#[must_use]
pub(crate) fn from_commands(commands: &ClusterCommands) -> Box<dyn ClusterControl> {
    if commands.start.is_some() || commands.teardown.is_some() {
        Box::new(CommandCluster::new(commands))
    } else {
        Box::new(ExternalCluster)
    }
}
