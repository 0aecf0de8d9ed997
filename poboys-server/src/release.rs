//! Release Publisher.
//!
//! Publishes one package file to anaconda.org with the `anaconda` client:
//! log in, upload, log out. The combined console output of those steps is
//! returned as an opaque status text for the user; it is informational only
//! and does not say whether the release succeeded.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::ReleaseConfig;
use crate::platform::Platform;
use crate::process::{run_bounded, ToolOutcome};

/// Pushes a single package to an external package host.
#[async_trait]
pub trait ReleasePublisher: Send + Sync {
    /// Release `filename` from `platform_dir`, returning the tool output.
    async fn release(&self, platform: Platform, platform_dir: &Path, filename: &str) -> Vec<u8>;
}

/// Credentials for the package host.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub organization: Option<String>,
}

impl Credentials {
    /// Account that receives the upload.
    pub fn owner(&self) -> &str {
        self.organization.as_deref().unwrap_or(&self.username)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("organization", &self.organization)
            .finish()
    }
}

/// Drives the `anaconda` command line client.
#[derive(Debug, Clone)]
pub struct AnacondaPublisher {
    program: String,
    credentials: Credentials,
    timeout: Duration,
}

impl AnacondaPublisher {
    /// Build a publisher, or `None` when credentials are incomplete.
    pub fn from_config(config: &ReleaseConfig) -> Option<Self> {
        let credentials = Credentials {
            username: config.username.clone()?,
            password: config.password.clone()?,
            organization: config.organization.clone(),
        };
        Some(Self {
            program: config.program.clone(),
            credentials,
            timeout: config.timeout(),
        })
    }

    /// Argument lists for each step, in order.
    fn steps(&self, filename: &str) -> [Vec<String>; 3] {
        let creds = &self.credentials;
        [
            vec![
                "login".into(),
                "--username".into(),
                creds.username.clone(),
                "--password".into(),
                creds.password.clone(),
            ],
            vec![
                "upload".into(),
                "--no-progress".into(),
                "-u".into(),
                creds.owner().to_string(),
                filename.to_string(),
            ],
            vec!["logout".into()],
        ]
    }
}

#[async_trait]
impl ReleasePublisher for AnacondaPublisher {
    async fn release(&self, platform: Platform, platform_dir: &Path, filename: &str) -> Vec<u8> {
        info!(platform = %platform, filename = %filename, owner = %self.credentials.owner(), "Releasing package");
        let mut transcript = Vec::new();

        for args in self.steps(filename) {
            let step = args[0].clone();
            let mut cmd = Command::new(&self.program);
            cmd.args(&args).current_dir(platform_dir);

            match run_bounded(cmd, self.timeout).await {
                Ok(ToolOutcome::Finished(output)) => {
                    transcript.extend_from_slice(&output.stdout);
                    transcript.extend_from_slice(&output.stderr);
                    if !output.status.success() {
                        warn!(step = %step, status = %output.status, "Release step failed");
                        break;
                    }
                }
                Ok(ToolOutcome::TimedOut) => {
                    let note = format!(
                        "{} {step} timed out after {}s\n",
                        self.program,
                        self.timeout.as_secs()
                    );
                    transcript.extend_from_slice(note.as_bytes());
                    break;
                }
                Err(e) => {
                    warn!(step = %step, error = %e, "Could not start release tool");
                    let note = format!("{}: {e}\n", self.program);
                    transcript.extend_from_slice(note.as_bytes());
                    break;
                }
            }
        }

        transcript
    }
}
