//! Domain types for the sensor system test

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::error::{HarnessError, HarnessResult};

/// Bluetooth device address, most significant byte first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for BdAddr {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HarnessError::Config(format!("Invalid Bluetooth address: {s}"));

        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(bytes))
    }
}

impl Serialize for BdAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Identity the local central presents on the air
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub name: String,
    pub address: BdAddr,
}

/// One advertisement report delivered while scanning
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdvertisementRecord {
    /// Advertiser address
    pub address: BdAddr,
    /// Complete local name, if advertised
    pub local_name: Option<String>,
    /// Signal strength in dBm
    pub rssi: Option<i16>,
    /// Manufacturer specific data keyed by company identifier
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    /// Advertised service UUIDs
    pub service_uuids: Vec<Uuid>,
    /// URI from the advertising or scan response data
    pub uri: Option<String>,
}

/// AD type carrying a URI with a compressed scheme prefix
pub const AD_TYPE_URI: u8 = 0x24;

impl AdvertisementRecord {
    /// Expand a URI AD structure into its text form
    ///
    /// The first byte selects the scheme from the Bluetooth assigned numbers,
    /// `0x01` meaning none. Returns `None` for unknown schemes or invalid UTF-8.
    pub fn decode_uri(raw: &[u8]) -> Option<String> {
        let (&scheme, rest) = raw.split_first()?;
        let prefix = match scheme {
            0x01 => "",
            0x16 => "http:",
            0x17 => "https:",
            _ => return None,
        };
        let rest = std::str::from_utf8(rest).ok()?;
        Some(format!("{prefix}{rest}"))
    }
}

/// Link-layer parameters of an established connection
///
/// Fields are `None` when the BLE collaborator does not report them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ConnectionParameters {
    /// Connection interval in milliseconds
    pub connection_interval: Option<f64>,
    /// Peripheral latency in connection events
    pub peripheral_latency: Option<u16>,
    /// Supervision timeout in milliseconds
    pub supervision_timeout: Option<u16>,
}

impl fmt::Display for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field<T: fmt::Display>(value: Option<T>) -> String {
            value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
        }

        write!(
            f,
            "interval={} ms, latency={}, supervision_timeout={} ms",
            field(self.connection_interval),
            field(self.peripheral_latency),
            field(self.supervision_timeout)
        )
    }
}

/// Characteristic property flags relevant to a GATT client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl fmt::Display for CharacteristicProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.read, "READ"),
            (self.write, "WRITE"),
            (self.write_without_response, "WRITE_WITHOUT_RESPONSE"),
            (self.notify, "NOTIFY"),
            (self.indicate, "INDICATE"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
        write!(f, "{}", names.join("|"))
    }
}

/// A discovered descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorInfo {
    /// Collaborator specific handle
    pub id: u16,
    pub uuid: Uuid,
}

/// A discovered characteristic and its descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    /// Handle of the owning service
    pub service_id: u16,
    /// Collaborator specific handle
    pub id: u16,
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub descriptors: Vec<DescriptorInfo>,
}

/// A discovered service and its characteristics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Collaborator specific handle
    pub id: u16,
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<CharacteristicInfo>,
}

/// Event kinds a listener can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BleEventKind {
    Advertisement,
    Connection,
    Disconnection,
}

/// Events emitted by the BLE central collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum BleEvent {
    Advertisement(AdvertisementRecord),
    Connection(BdAddr),
    Disconnection(BdAddr),
}

impl BleEvent {
    pub fn kind(&self) -> BleEventKind {
        match self {
            BleEvent::Advertisement(_) => BleEventKind::Advertisement,
            BleEvent::Connection(_) => BleEventKind::Connection,
            BleEvent::Disconnection(_) => BleEventKind::Disconnection,
        }
    }
}

/// Sensor quantities exposed by the Environmental Sensing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Humidity,
}

impl SensorKind {
    /// Characteristic payload width in bytes
    pub const PAYLOAD_LEN: usize = 2;

    pub fn name(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
        }
    }

    /// Decode a little-endian fixed-point payload in 1/100 units
    ///
    /// Temperature is signed, humidity is unsigned.
    pub fn decode(&self, payload: &[u8]) -> HarnessResult<f64> {
        let raw: [u8; Self::PAYLOAD_LEN] =
            payload.try_into().map_err(|_| HarnessError::Decode {
                characteristic: self.name(),
                expected: Self::PAYLOAD_LEN,
                actual: payload.len(),
            })?;

        let hundredths = match self {
            SensorKind::Temperature => f64::from(i16::from_le_bytes(raw)),
            SensorKind::Humidity => f64::from(u16::from_le_bytes(raw)),
        };
        Ok(hundredths / 100.0)
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trip() {
        let addr: BdAddr = "F0:F1:F2:F3:F4:F5".parse().unwrap();
        assert_eq!(addr, BdAddr::new([0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5]));
        assert_eq!(addr.to_string(), "F0:F1:F2:F3:F4:F5");

        let lower: BdAddr = "c0:ff:ee:00:00:01".parse().unwrap();
        assert_eq!(lower.to_string(), "C0:FF:EE:00:00:01");
    }

    #[test]
    fn test_address_rejects_malformed() {
        assert!("F0:F1:F2:F3:F4".parse::<BdAddr>().is_err());
        assert!("F0:F1:F2:F3:F4:F5:F6".parse::<BdAddr>().is_err());
        assert!("F0:F1:F2:F3:F4:G5".parse::<BdAddr>().is_err());
        assert!("F0F1:F2:F3:F4:F5".parse::<BdAddr>().is_err());
    }

    #[test]
    fn test_decode_uri() {
        let mut raw = vec![0x17];
        raw.extend_from_slice(b"//github.com/TAREQ-TBZ");
        assert_eq!(
            AdvertisementRecord::decode_uri(&raw).as_deref(),
            Some("https://github.com/TAREQ-TBZ")
        );
        assert_eq!(
            AdvertisementRecord::decode_uri(&[0x01, b'x']).as_deref(),
            Some("x")
        );
        assert_eq!(AdvertisementRecord::decode_uri(&[]), None);
        assert_eq!(AdvertisementRecord::decode_uri(&[0x02, b'x']), None);
        assert_eq!(AdvertisementRecord::decode_uri(&[0x17, 0xFF]), None);
    }

    #[test]
    fn test_decode_temperature() {
        // 21.37 degrees
        assert_eq!(SensorKind::Temperature.decode(&[0x59, 0x08]).unwrap(), 21.37);
        // -5.00 degrees
        let raw = (-500i16).to_le_bytes();
        assert_eq!(SensorKind::Temperature.decode(&raw).unwrap(), -5.0);
    }

    #[test]
    fn test_decode_humidity_unsigned() {
        assert_eq!(SensorKind::Humidity.decode(&[0x88, 0x13]).unwrap(), 50.0);
        assert_eq!(SensorKind::Humidity.decode(&[0xFF, 0xFF]).unwrap(), 655.35);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = SensorKind::Humidity.decode(&[0x01]).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Decode {
                expected: 2,
                actual: 1,
                ..
            }
        ));
        assert!(SensorKind::Temperature.decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_properties_display() {
        let props = CharacteristicProperties {
            read: true,
            notify: true,
            ..Default::default()
        };
        assert_eq!(props.to_string(), "READ|NOTIFY");
    }

    #[test]
    fn test_connection_parameters_display_unknown() {
        let params = ConnectionParameters {
            connection_interval: Some(22.5),
            ..Default::default()
        };
        assert_eq!(
            params.to_string(),
            "interval=22.5 ms, latency=unknown, supervision_timeout=unknown ms"
        );
    }
}
