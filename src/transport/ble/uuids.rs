//! Bluetooth SIG assigned numbers used by the sensor firmware

use uuid::Uuid;

/// Bluetooth Base UUID, 0000xxxx-0000-1000-8000-00805f9b34fb
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expand a 16-bit SIG assigned UUID onto the Bluetooth Base UUID
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// The 16-bit alias of `uuid`, if it lies on the Bluetooth Base UUID
pub fn short_uuid(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let mask = !(0xFFFF_u128 << 96);
    (value & mask == BLUETOOTH_BASE_UUID).then_some((value >> 96) as u16)
}

/// Environmental Sensing service (0x181A)
pub const ENVIRONMENTAL_SENSING_SERVICE_UUID: Uuid = uuid_from_u16(0x181A);

/// Temperature characteristic (0x2A6E), sint16 in 0.01 degrees Celsius
pub const TEMPERATURE_CHAR_UUID: Uuid = uuid_from_u16(0x2A6E);

/// Humidity characteristic (0x2A6F), uint16 in 0.01 percent
pub const HUMIDITY_CHAR_UUID: Uuid = uuid_from_u16(0x2A6F);

/// Client Characteristic Configuration descriptor (0x2902)
pub const CLIENT_CHARACTERISTIC_CONFIGURATION_UUID: Uuid = uuid_from_u16(0x2902);

/// Nordic Semiconductor ASA company identifier
pub const NORDIC_COMPANY_ID: u16 = 0x0059;

/// Readable name for well known UUIDs
pub fn uuid_name(uuid: &Uuid) -> Option<&'static str> {
    let name = match short_uuid(uuid)? {
        0x1800 => "Generic Access",
        0x1801 => "Generic Attribute",
        0x180A => "Device Information",
        0x181A => "Environmental Sensing",
        0x2A00 => "Device Name",
        0x2A01 => "Appearance",
        0x2A04 => "Peripheral Preferred Connection Parameters",
        0x2A05 => "Service Changed",
        0x2A6E => "Temperature",
        0x2A6F => "Humidity",
        0x2900 => "Characteristic Extended Properties",
        0x2901 => "Characteristic User Description",
        0x2902 => "Client Characteristic Configuration",
        0x290C => "Environmental Sensing Measurement",
        _ => return None,
    };
    Some(name)
}
