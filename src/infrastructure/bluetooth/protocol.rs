//! OpenBCI BLE Protocol
//!
//! This module contains the identifiers and commands used when talking to
//! the OpenBCI Ganglion and Cyton boards, plus a small table of standard
//! GATT attributes so that generic peripherals get readable names too.

use uuid::Uuid;

/// Tail shared by every UUID derived from the Bluetooth base UUID
pub const BLUETOOTH_BASE_SUFFIX: &str = "0000-1000-8000-00805f9b34fb";

// Standard services that may be used to see if other BLE devices are visible
pub const GENERIC_ACCESS_SERVICE: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
pub const DEVICE_NAME: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);
pub const APPEARANCE: Uuid = Uuid::from_u128(0x00002a01_0000_1000_8000_00805f9b34fb);

pub const DEVICE_INFORMATION_SERVICE: Uuid =
    Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const MANUFACTURER_NAME: Uuid = Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);
pub const MODEL_NUMBER: Uuid = Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb);

pub const HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
pub const HEART_RATE_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

pub const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
/// Battery Level notifies on most peripherals, so clicks on it subscribe
pub const BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Ganglion service (Simblee chip defaults)
pub const GANGLION_SERVICE: Uuid = Uuid::from_u128(0x0000fe84_0000_1000_8000_00805f9b34fb);
pub const GANGLION_RECEIVE: Uuid = Uuid::from_u128(0x2d30c082_f39f_4ce6_923f_3484ea480596);
pub const GANGLION_SEND: Uuid = Uuid::from_u128(0x2d30c083_f39f_4ce6_923f_3484ea480596);
pub const GANGLION_DISCONNECT: Uuid = Uuid::from_u128(0x2d30c084_f39f_4ce6_923f_3484ea480596);

/// Cyton service (RFduino chip defaults)
pub const CYTON_SERVICE: Uuid = Uuid::from_u128(0x00002220_0000_1000_8000_00805f9b34fb);
pub const CYTON_RECEIVE: Uuid = Uuid::from_u128(0x00002221_0000_1000_8000_00805f9b34fb);
pub const CYTON_SEND: Uuid = Uuid::from_u128(0x00002222_0000_1000_8000_00805f9b34fb);
pub const CYTON_DISCONNECT: Uuid = Uuid::from_u128(0x00002223_0000_1000_8000_00805f9b34fb);

/// Device name fragments, matched against the upper-cased advertised name
pub const DEVICE_NAME_GANGLION: &str = "GANGLION";
pub const DEVICE_NAME_CYTON: &str = "CYTON";

pub const UNKNOWN_SERVICE: &str = "Unknown service";
pub const UNKNOWN_CHARACTERISTIC: &str = "Unknown characteristic";

/// Known attributes and their display names
const ATTRIBUTES: &[(Uuid, &str)] = &[
    (GANGLION_SERVICE, "Ganglion Service (via SIMBLEE)"),
    (GANGLION_RECEIVE, "Ganglion Receive"),
    (GANGLION_SEND, "Ganglion Send"),
    (GANGLION_DISCONNECT, "Ganglion Disconnect"),
    (CYTON_SERVICE, "Cyton Service (via RFDuino)"),
    (CYTON_RECEIVE, "Cyton Receive"),
    (CYTON_SEND, "Cyton Send"),
    (CYTON_DISCONNECT, "Cyton Disconnect"),
    (HEART_RATE_SERVICE, "Heart Rate Service"),
    (HEART_RATE_MEASUREMENT, "Heart Rate Measurement"),
    (BATTERY_SERVICE, "Battery State Service"),
    (BATTERY_LEVEL, "Battery Level"),
    (GENERIC_ACCESS_SERVICE, "Generic Access Service"),
    (DEVICE_NAME, "Device Name"),
    (APPEARANCE, "Appearance"),
    (DEVICE_INFORMATION_SERVICE, "Device Information Service"),
    (MANUFACTURER_NAME, "Manufacturer Name"),
    (MODEL_NUMBER, "Model Number"),
];

/// Commands understood on the board's send characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCommand {
    /// Begin streaming samples
    Begin,
    /// Stop streaming samples
    Stop,
}

impl StreamCommand {
    /// Toggle order used by the send characteristic
    pub const SEQUENCE: [StreamCommand; 2] = [StreamCommand::Begin, StreamCommand::Stop];

    /// Get the raw byte for this command
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Begin => b'b',
            Self::Stop => b's',
        }
    }

    pub fn as_char(&self) -> char {
        self.as_byte() as char
    }
}

/// Look up a display name by canonical UUID string.
///
/// Matching is exact: the key must already be in lowercase hyphenated form.
pub fn lookup<'a>(uuid: &str, default: &'a str) -> &'a str {
    let mut buf = Uuid::encode_buffer();
    ATTRIBUTES
        .iter()
        .find(|(id, _)| &*id.hyphenated().encode_lower(&mut buf) == uuid)
        .map(|(_, name)| *name)
        .unwrap_or(default)
}

/// Look up a display name for a parsed UUID, normalizing it for [`lookup`]
pub fn resolve_name<'a>(uuid: &Uuid, default: &'a str) -> &'a str {
    let mut buf = Uuid::encode_buffer();
    lookup(uuid.hyphenated().encode_lower(&mut buf), default)
}

/// Short label for a characteristic that has no catalogued name.
///
/// Base-UUID derived identifiers are fully described by their first seven
/// characters; anything else gets an ellipsis to show the tail was cut.
pub fn short_form(uuid: &Uuid) -> String {
    let canonical = uuid.hyphenated().to_string();
    let head = &canonical[..7];
    if canonical.ends_with(BLUETOOTH_BASE_SUFFIX) {
        head.to_string()
    } else {
        format!("{}...", head)
    }
}
