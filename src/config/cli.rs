//! Command-line argument parsing

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "ble-sensor-systemtest", version, author)]
#[clap(about = "Hardware-in-the-loop system test for the BLE environmental sensor firmware")]
pub struct CliArgs {
    /// Serial port of the board console (e.g. /dev/ttyACM0)
    #[clap(short, long)]
    pub port: String,

    /// Console baud rate
    #[clap(short, long, default_value = "115200")]
    pub baud: u32,

    /// Firmware image to program (Intel HEX)
    #[clap(short = 'f', long)]
    pub fw_image: Option<PathBuf>,

    /// BLE transport: "default" or a controller name such as hci0
    #[clap(short, long, default_value = "default")]
    pub transport: String,

    /// Debug probe command-line tool
    #[clap(long, default_value = "nrfjprog")]
    pub probe_tool: PathBuf,

    /// Serial number of the debug probe to use
    #[clap(long)]
    pub probe_serial: Option<String>,

    /// Advertised name of the device under test
    #[clap(long, default_value = "TBZ_SHAM_SENSOR")]
    pub device_name: String,

    /// Name of the local BLE central
    #[clap(long, default_value = "systemtest")]
    pub local_name: String,

    /// Address of the local BLE central
    #[clap(long, default_value = "F0:F1:F2:F3:F4:F5")]
    pub local_address: String,

    /// Skip programming and test the firmware already on the board
    #[clap(long)]
    pub no_program: bool,

    /// Do not echo console lines while waiting for the marker
    #[clap(long)]
    pub no_console_echo: bool,

    /// Fail when the controller does not report the connection interval
    #[clap(long)]
    pub strict_connection_interval: bool,

    /// Company identifier required in the manufacturer data (e.g. 0x0059)
    #[clap(long)]
    pub expect_company_id: Option<String>,

    /// Hex manufacturer data expected after the company identifier (e.g. 0000)
    #[clap(long, requires = "expect_company_id")]
    pub expect_manufacturer_data: Option<String>,

    /// URI the device must advertise (e.g. https://github.com/TAREQ-TBZ)
    #[clap(long)]
    pub expect_uri: Option<String>,

    /// Length of the notification observation window in seconds
    #[clap(long, default_value = "40")]
    pub observation_secs: u64,

    /// Write a JSON report of the run to this path
    #[clap(long)]
    pub report: Option<PathBuf>,
}
