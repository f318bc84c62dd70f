//! BLE Sensor System Test - Main Entry Point

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ble_sensor_systemtest::{
    backend::{BluerTransport, NrfjprogProbe},
    board::{BoardController, SerialPortConsole},
    config::{CliArgs, Settings},
    core::scenario::SensorScenario,
    transport::ble::BleSession,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ble_sensor_systemtest=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();
    info!(?args, "Starting BLE sensor system test");

    let settings = Settings::try_from(args).inspect_err(|e| error!("{}", e))?;

    // Program the board and open its console
    let probe = NrfjprogProbe::new(settings.probe_tool.clone(), settings.probe_serial.clone());
    let port = settings.port.clone();
    let baud = settings.baud;
    let mut board = BoardController::bring_up(probe, settings.fw_image.clone(), move || {
        SerialPortConsole::open(&port, baud)
    })
    .await
    .inspect_err(|e| error!("Board setup failed: {}", e))?;
    info!("Board ready on {} at {} baud", settings.port, settings.baud);

    let mut session = BleSession::new(
        BluerTransport::new(settings.transport.clone()),
        settings.identity.clone(),
    );

    let mut scenario = SensorScenario::new(settings.scenario.clone());
    let result = scenario.run(&mut board, &mut session).await;

    if let Some(path) = &settings.report {
        match scenario.report(&result).write(path).await {
            Ok(()) => info!("Report written to {}", path.display()),
            Err(e) => error!("Failed to write report: {}", e),
        }
    }

    result.map_err(Into::into)
}
