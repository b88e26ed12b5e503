use std::process::Stdio;

use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, process::Command};

#[cfg(test)]
use mockall::automock;

use crate::error::EgressError;

/// Execution boundary towards the kernel packet filter.
///
/// Takes a complete nft program and returns the tool's raw output.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NftRunner: Send + Sync + 'static {
    async fn run(&self, script: &str) -> Result<String, EgressError>;
}

/// Production runner piping the program into `nft -f -`
pub struct NftCommand {
    program: String,
}

impl NftCommand {
    pub fn new() -> Self {
        Self {
            program: "nft".to_string(),
        }
    }

    /// Use another binary, e.g. a wrapper script or an absolute path
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NftCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NftRunner for NftCommand {
    async fn run(&self, script: &str) -> Result<String, EgressError> {
        let mut child = Command::new(&self.program)
            .args(["-f", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // the future is dropped on timeout or cancellation
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EgressError::NftSpawn { source })?;

        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok::<(), std::io::Error>(());
            };
            stdin.write_all(script.as_bytes()).await?;
            // closing stdin lets nft see EOF
            stdin.shutdown().await
        };
        // nft may exit before reading the whole program; its output still explains why
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|source| EgressError::NftSpawn { source })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(EgressError::NftFailed {
                status: output.status.to_string(),
                output: combined.trim().to_string(),
            });
        }
        fed.map_err(|source| EgressError::NftSpawn { source })?;

        Ok(combined)
    }
}
