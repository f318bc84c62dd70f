//! Development board control: flashing, reset and console access

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    backend::DebugProbe,
    board::{ConsolePort, LineMatch, SerialMonitor},
    core::error::{ConsoleError, ConsoleResult, HarnessResult, ProbeError, ProbeResult},
};

/// Lifecycle of a board under test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardState {
    Unprogrammed,
    /// Firmware in place and console open
    Ready,
    Closed,
}

/// Owns the debug probe and serial console of one board
pub struct BoardController<P: DebugProbe, C: ConsolePort> {
    probe: P,
    firmware: Option<PathBuf>,
    monitor: Option<SerialMonitor<C>>,
    state: BoardState,
}

impl<P: DebugProbe, C: ConsolePort> BoardController<P, C> {
    /// Program `firmware` (if given), then open the console
    ///
    /// Without an image the board is assumed to be flashed already.
    pub async fn bring_up<F>(probe: P, firmware: Option<PathBuf>, open_console: F) -> HarnessResult<Self>
    where
        F: FnOnce() -> ConsoleResult<C>,
    {
        let mut board = Self {
            probe,
            firmware,
            monitor: None,
            state: BoardState::Unprogrammed,
        };

        match board.firmware.clone() {
            Some(image) => board.program(&image).await?,
            None => info!("No firmware image given, skipping programming"),
        }

        let monitor = SerialMonitor::new(open_console()?);
        info!("Serial console opened on {}", monitor.port_name());
        board.monitor = Some(monitor);
        board.state = BoardState::Ready;

        Ok(board)
    }

    pub fn state(&self) -> BoardState {
        self.state
    }

    pub fn firmware(&self) -> Option<&Path> {
        self.firmware.as_deref()
    }

    /// Recover, erase, write `image`, reset and start the core
    ///
    /// Each call opens its own probe session and always releases it.
    pub async fn program(&self, image: &Path) -> ProbeResult<()> {
        self.ensure_open()?;
        info!("Programming firmware {}", image.display());
        self.probe.connect().await?;

        let result = async {
            self.probe.recover().await?;
            self.probe.erase_all().await?;
            self.probe.program_file(image).await?;
            self.probe.system_reset().await?;
            self.probe.run().await?;
            Ok::<_, ProbeError>(())
        }
        .await;

        self.release_probe().await;
        if result.is_ok() {
            info!("Firmware programmed");
        }
        result
    }

    /// Pin reset the board and let it run, without reprogramming
    pub async fn hard_reset(&self) -> ProbeResult<()> {
        self.ensure_open()?;
        debug!("Hard resetting board");
        self.probe.connect().await?;

        let result = async {
            self.probe.hard_reset().await?;
            self.probe.run().await?;
            Ok::<_, ProbeError>(())
        }
        .await;

        self.release_probe().await;
        result
    }

    fn ensure_open(&self) -> ProbeResult<()> {
        match self.state {
            BoardState::Closed => Err(ProbeError::BoardClosed),
            _ => Ok(()),
        }
    }

    async fn release_probe(&self) {
        if let Err(e) = self.probe.close().await {
            warn!("Failed to release debug probe: {}", e);
        }
    }

    /// Wait for a console line matching `pattern`
    ///
    /// The blocking read runs off the async executor.
    pub async fn wait_for_line(
        &mut self,
        pattern: &Regex,
        timeout: Duration,
        log_lines: bool,
    ) -> ConsoleResult<LineMatch> {
        let mut monitor = self.monitor.take().ok_or(ConsoleError::Closed)?;
        let pattern = pattern.clone();

        let (monitor, result) = tokio::task::spawn_blocking(move || {
            let result = monitor.wait_for_line(&pattern, timeout, log_lines);
            (monitor, result)
        })
        .await
        .map_err(|e| ConsoleError::Io(std::io::Error::other(e)))?;

        self.monitor = Some(monitor);
        result
    }

    /// Release the serial console; later calls are no-ops
    pub fn close(&mut self) {
        match self.monitor.take() {
            Some(monitor) => {
                info!("Closing serial console {}", monitor.port_name());
                drop(monitor.into_inner());
            }
            None => debug!("Serial console already closed"),
        }
        self.state = BoardState::Closed;
    }
}
