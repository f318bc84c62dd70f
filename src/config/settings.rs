//! Runtime settings

use std::{path::PathBuf, time::Duration};

use crate::{
    config::CliArgs,
    core::{
        error::HarnessError,
        scenario::ScenarioConfig,
        types::{BdAddr, LocalIdentity},
    },
};

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: String,
    pub baud: u32,
    /// Image to program, `None` when programming is skipped
    pub fw_image: Option<PathBuf>,
    pub transport: String,
    pub probe_tool: PathBuf,
    pub probe_serial: Option<String>,
    pub identity: LocalIdentity,
    pub report: Option<PathBuf>,
    pub scenario: ScenarioConfig,
}

/// Parse a company identifier given in hex (`0x0059`) or decimal (`89`)
fn parse_company_id(value: &str) -> Result<u16, HarnessError> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| HarnessError::Config(format!("invalid company identifier: {value}")))
}

impl TryFrom<CliArgs> for Settings {
    type Error = HarnessError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let fw_image = match (args.no_program, args.fw_image) {
            (true, _) => None,
            (false, Some(image)) => Some(image),
            (false, None) => {
                return Err(HarnessError::Config(
                    "--fw-image is required unless --no-program is given".into(),
                ));
            }
        };

        if args.observation_secs == 0 {
            return Err(HarnessError::Config(
                "observation window must be at least one second".into(),
            ));
        }

        let expected_company_id = args
            .expect_company_id
            .as_deref()
            .map(parse_company_id)
            .transpose()?;

        let expected_manufacturer_data = match (args.expect_manufacturer_data, expected_company_id) {
            (None, _) => None,
            (Some(_), None) => {
                return Err(HarnessError::Config(
                    "--expect-manufacturer-data requires --expect-company-id".into(),
                ));
            }
            (Some(data), Some(_)) => Some(hex::decode(&data).map_err(|e| {
                HarnessError::Config(format!("invalid manufacturer data {data}: {e}"))
            })?),
        };

        let identity = LocalIdentity {
            name: args.local_name,
            address: args.local_address.parse::<BdAddr>()?,
        };

        let scenario = ScenarioConfig {
            device_name: args.device_name,
            echo_console: !args.no_console_echo,
            strict_connection_interval: args.strict_connection_interval,
            expected_company_id,
            expected_manufacturer_data,
            expected_uri: args.expect_uri,
            observation_window: Duration::from_secs(args.observation_secs),
            ..Default::default()
        };

        Ok(Settings {
            port: args.port,
            baud: args.baud,
            fw_image,
            transport: args.transport,
            probe_tool: args.probe_tool,
            probe_serial: args.probe_serial,
            identity,
            report: args.report,
            scenario,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Result<Settings, HarnessError> {
        let args = CliArgs::try_parse_from(
            std::iter::once("ble-sensor-systemtest").chain(args.iter().copied()),
        )
        .unwrap();
        Settings::try_from(args)
    }

    #[test]
    fn test_defaults() {
        let settings = parse(&["--port", "/dev/ttyACM0", "--fw-image", "zephyr.hex"]).unwrap();

        assert_eq!(settings.baud, 115200);
        assert_eq!(settings.transport, "default");
        assert_eq!(settings.probe_tool, PathBuf::from("nrfjprog"));
        assert_eq!(settings.fw_image, Some(PathBuf::from("zephyr.hex")));
        assert_eq!(settings.identity.name, "systemtest");
        assert_eq!(settings.identity.address.to_string(), "F0:F1:F2:F3:F4:F5");
        assert_eq!(settings.scenario, ScenarioConfig::default());
    }

    #[test]
    fn test_image_required_unless_skipped() {
        assert!(matches!(
            parse(&["--port", "/dev/ttyACM0"]),
            Err(HarnessError::Config(_))
        ));

        let settings = parse(&["--port", "/dev/ttyACM0", "--no-program"]).unwrap();
        assert_eq!(settings.fw_image, None);
    }

    #[test]
    fn test_scenario_options() {
        let settings = parse(&[
            "--port",
            "COM3",
            "--no-program",
            "--no-console-echo",
            "--strict-connection-interval",
            "--expect-company-id",
            "0x0059",
            "--observation-secs",
            "70",
            "--device-name",
            "BENCH_SENSOR",
        ])
        .unwrap();

        assert!(!settings.scenario.echo_console);
        assert!(settings.scenario.strict_connection_interval);
        assert_eq!(settings.scenario.expected_company_id, Some(0x0059));
        assert_eq!(settings.scenario.observation_window, Duration::from_secs(70));
        assert_eq!(settings.scenario.device_name, "BENCH_SENSOR");
    }

    #[test]
    fn test_advertisement_expectations() {
        let settings = parse(&[
            "--port",
            "/dev/ttyACM0",
            "--no-program",
            "--expect-company-id",
            "0x0059",
            "--expect-manufacturer-data",
            "0000",
            "--expect-uri",
            "https://github.com/TAREQ-TBZ",
        ])
        .unwrap();
        assert_eq!(settings.scenario.expected_manufacturer_data, Some(vec![0x00, 0x00]));
        assert_eq!(
            settings.scenario.expected_uri.as_deref(),
            Some("https://github.com/TAREQ-TBZ")
        );

        let bad_hex = parse(&[
            "--port",
            "/dev/ttyACM0",
            "--no-program",
            "--expect-company-id",
            "0x0059",
            "--expect-manufacturer-data",
            "zz",
        ]);
        assert!(matches!(bad_hex, Err(HarnessError::Config(_))));

        let without_company = CliArgs::try_parse_from([
            "ble-sensor-systemtest",
            "--port",
            "/dev/ttyACM0",
            "--expect-manufacturer-data",
            "0000",
        ]);
        assert!(without_company.is_err());
    }

    #[test]
    fn test_company_id_formats() {
        assert_eq!(parse_company_id("0x004C").unwrap(), 0x004C);
        assert_eq!(parse_company_id("89").unwrap(), 0x0059);
        assert!(parse_company_id("nordic").is_err());
        assert!(parse_company_id("0x10000").is_err());
    }

    #[test]
    fn test_invalid_local_address() {
        let result = parse(&[
            "--port",
            "/dev/ttyACM0",
            "--no-program",
            "--local-address",
            "F0:F1:F2",
        ]);
        assert!(matches!(result, Err(HarnessError::Config(_))));
    }
}
