//! nrfjprog command-line backend implementation

use std::path::{Path, PathBuf};

use tokio::{process::Command, sync::Mutex};
use tracing::debug;

use crate::{
    backend::DebugProbe,
    core::error::{ProbeError, ProbeResult},
};

/// Debug probe driven through Nordic's `nrfjprog` tool
///
/// `connect` resolves which J-Link probe to talk to; every later command is
/// pinned to that probe's serial number until `close`.
#[derive(Debug)]
pub struct NrfjprogProbe {
    tool: PathBuf,
    requested_snr: Option<String>,
    session_snr: Mutex<Option<String>>,
}

impl NrfjprogProbe {
    /// Create a backend using `tool` as the nrfjprog executable
    ///
    /// With `snr` unset the first enumerated probe is used.
    pub fn new(tool: impl Into<PathBuf>, snr: Option<String>) -> Self {
        Self {
            tool: tool.into(),
            requested_snr: snr,
            session_snr: Mutex::new(None),
        }
    }

    /// Parse the serial numbers printed by `nrfjprog --ids`
    fn parse_probe_ids(output: &str) -> Vec<String> {
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && line.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .collect()
    }

    async fn exec(&self, operation: &str, args: &[&str]) -> ProbeResult<String> {
        debug!("nrfjprog {}", args.join(" "));

        let output = Command::new(&self.tool).args(args).output().await?;
        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                operation: operation.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a command against the probe latched by `connect`
    async fn exec_on_session(&self, operation: &str, args: &[&str]) -> ProbeResult<()> {
        let snr = self
            .session_snr
            .lock()
            .await
            .clone()
            .ok_or(ProbeError::NotConnected)?;

        let mut full_args = args.to_vec();
        full_args.extend(["--snr", snr.as_str()]);
        self.exec(operation, &full_args).await.map(|_| ())
    }
}

impl DebugProbe for NrfjprogProbe {
    async fn connect(&self) -> ProbeResult<()> {
        let ids = Self::parse_probe_ids(&self.exec("connect", &["--ids"]).await?);

        let snr = match &self.requested_snr {
            Some(wanted) if ids.contains(wanted) => wanted.clone(),
            Some(_) => return Err(ProbeError::NoProbeFound),
            None => ids.into_iter().next().ok_or(ProbeError::NoProbeFound)?,
        };

        debug!("Using debug probe {}", snr);
        *self.session_snr.lock().await = Some(snr);
        Ok(())
    }

    async fn recover(&self) -> ProbeResult<()> {
        self.exec_on_session("recover", &["--recover"]).await
    }

    async fn erase_all(&self) -> ProbeResult<()> {
        self.exec_on_session("erase_all", &["--eraseall"]).await
    }

    async fn program_file(&self, image: &Path) -> ProbeResult<()> {
        let image = image.to_string_lossy();
        self.exec_on_session("program_file", &["--program", image.as_ref(), "--verify"])
            .await
    }

    async fn system_reset(&self) -> ProbeResult<()> {
        self.exec_on_session("system_reset", &["--reset"]).await
    }

    async fn hard_reset(&self) -> ProbeResult<()> {
        self.exec_on_session("hard_reset", &["--pinreset"]).await
    }

    async fn run(&self) -> ProbeResult<()> {
        self.exec_on_session("run", &["--run"]).await
    }

    async fn close(&self) -> ProbeResult<()> {
        *self.session_snr.lock().await = None;
        Ok(())
    }
}
