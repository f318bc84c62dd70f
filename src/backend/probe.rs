//! Debug probe trait definition

use std::path::Path;

use trait_variant::make;

use crate::core::error::ProbeResult;

/// Abstraction over the debug probe used to flash and reset the board
///
/// Operations other than `connect` require an open probe session. Callers
/// are expected to `close` the session on every path once `connect`
/// succeeded.
#[make(Send)]
pub trait DebugProbe: Sync + 'static {
    /// Open an exclusive session with the first attached probe
    async fn connect(&self) -> ProbeResult<()>;

    /// Clear lock and read-back protection state
    async fn recover(&self) -> ProbeResult<()>;

    /// Erase all user flash
    async fn erase_all(&self) -> ProbeResult<()>;

    /// Write a firmware image (hex file) to flash
    async fn program_file(&self, image: &Path) -> ProbeResult<()>;

    /// Soft reset of the target system
    async fn system_reset(&self) -> ProbeResult<()>;

    /// Hardware reset through the reset pin
    async fn hard_reset(&self) -> ProbeResult<()>;

    /// Resume core execution
    async fn run(&self) -> ProbeResult<()>;

    /// Release the probe session
    async fn close(&self) -> ProbeResult<()>;
}
