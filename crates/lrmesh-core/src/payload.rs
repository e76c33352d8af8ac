//! Payload types and their byte-level encodings
//!
//! Each packet carries an opaque payload tagged with a one-byte type
//! discriminator. Known kinds get typed codecs here; unrecognized
//! discriminants are preserved as [`PayloadType::Opaque`] and passed
//! through untouched, so future payload kinds relay cleanly through
//! nodes that predate them.

use serde::{Deserialize, Serialize};

/// Payload type discriminator.
///
/// The numeric values follow the upstream port numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadType {
    /// UTF-8 text message
    Text,
    /// Position report (lat/lon/alt)
    Position,
    /// Node announcement (names)
    NodeAnnounce,
    /// Routing control (acknowledgments)
    Routing,
    /// Telemetry data
    Telemetry,
    /// Unrecognized type, carried opaquely
    Opaque(u8),
}

impl PayloadType {
    /// Wire discriminant
    pub fn to_byte(self) -> u8 {
        match self {
            PayloadType::Text => 1,
            PayloadType::Position => 3,
            PayloadType::NodeAnnounce => 4,
            PayloadType::Routing => 5,
            PayloadType::Telemetry => 38,
            PayloadType::Opaque(raw) => raw,
        }
    }

    /// Create from wire discriminant; never fails
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => PayloadType::Text,
            3 => PayloadType::Position,
            4 => PayloadType::NodeAnnounce,
            5 => PayloadType::Routing,
            38 => PayloadType::Telemetry,
            raw => PayloadType::Opaque(raw),
        }
    }
}

/// Position report payload: 20 bytes, little-endian
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Altitude in meters
    pub altitude: f32,
}

impl Position {
    /// Encoded size in bytes
    pub const SIZE: usize = 20;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(&self.latitude.to_le_bytes());
        bytes.extend_from_slice(&self.longitude.to_le_bytes());
        bytes.extend_from_slice(&self.altitude.to_le_bytes());
        bytes
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            latitude: f64::from_le_bytes(data[0..8].try_into().ok()?),
            longitude: f64::from_le_bytes(data[8..16].try_into().ok()?),
            altitude: f32::from_le_bytes(data[16..20].try_into().ok()?),
        })
    }
}

/// Node announcement payload: length-prefixed short and long names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAnnounce {
    /// Short name (up to 4 characters)
    pub short_name: String,
    /// Long name/description (up to 40 characters)
    pub long_name: String,
}

impl NodeAnnounce {
    pub fn new(short_name: &str, long_name: &str) -> Self {
        Self {
            short_name: short_name.chars().take(4).collect(),
            long_name: long_name.chars().take(40).collect(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let short = self.short_name.as_bytes();
        let long = self.long_name.as_bytes();
        let mut bytes = Vec::with_capacity(2 + short.len() + long.len());
        bytes.push(short.len() as u8);
        bytes.extend_from_slice(short);
        bytes.push(long.len() as u8);
        bytes.extend_from_slice(long);
        bytes
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let short_len = *data.first()? as usize;
        let short_end = 1 + short_len;
        let short = data.get(1..short_end)?;
        let long_len = *data.get(short_end)? as usize;
        let long = data.get(short_end + 1..short_end + 1 + long_len)?;
        Some(Self {
            short_name: String::from_utf8_lossy(short).into_owned(),
            long_name: String::from_utf8_lossy(long).into_owned(),
        })
    }
}

/// Routing-control ack payload: the acked packet id
pub fn encode_ack(acked_id: u32) -> Vec<u8> {
    acked_id.to_le_bytes().to_vec()
}

/// Parse a routing-control ack payload
pub fn decode_ack(data: &[u8]) -> Option<u32> {
    Some(u32::from_le_bytes(data.get(0..4)?.try_into().ok()?))
}

/// Device metrics telemetry
///
/// Battery and radio health, sent periodically by nodes. Absent fields
/// encode as 0xFF (battery) or NaN (floats).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceMetrics {
    /// Battery level (0-100%), None when externally powered
    pub battery_level: Option<u8>,
    /// Supply voltage in volts
    pub voltage: Option<f32>,
    /// Fraction of time the channel was busy (0.0-1.0)
    pub channel_utilization: Option<f32>,
    /// Uptime in seconds since boot
    pub uptime_seconds: Option<u32>,
}

/// Environment sensor telemetry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentMetrics {
    /// Temperature in Celsius
    pub temperature: Option<f32>,
    /// Relative humidity (0-100%)
    pub relative_humidity: Option<f32>,
    /// Barometric pressure in hPa
    pub barometric_pressure: Option<f32>,
}

/// Telemetry payload: one-byte variant tag, u32 timestamp, variant data
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Device(DeviceMetrics),
    Environment(EnvironmentMetrics),
}

fn push_opt_f32(bytes: &mut Vec<u8>, value: Option<f32>) {
    bytes.extend_from_slice(&value.unwrap_or(f32::NAN).to_le_bytes());
}

fn read_opt_f32(data: &[u8], offset: usize) -> Option<Option<f32>> {
    let v = f32::from_le_bytes(data.get(offset..offset + 4)?.try_into().ok()?);
    Some(if v.is_nan() { None } else { Some(v) })
}

impl Telemetry {
    /// Serialize with the given timestamp (seconds since epoch)
    pub fn to_bytes(&self, time: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        match self {
            Telemetry::Device(m) => {
                bytes.push(0);
                bytes.extend_from_slice(&time.to_le_bytes());
                bytes.push(m.battery_level.unwrap_or(0xFF));
                push_opt_f32(&mut bytes, m.voltage);
                push_opt_f32(&mut bytes, m.channel_utilization);
                bytes.extend_from_slice(&m.uptime_seconds.unwrap_or(0).to_le_bytes());
            }
            Telemetry::Environment(m) => {
                bytes.push(1);
                bytes.extend_from_slice(&time.to_le_bytes());
                push_opt_f32(&mut bytes, m.temperature);
                push_opt_f32(&mut bytes, m.relative_humidity);
                push_opt_f32(&mut bytes, m.barometric_pressure);
            }
        }
        bytes
    }

    /// Parse telemetry, returning the payload and its timestamp
    pub fn from_bytes(data: &[u8]) -> Option<(Self, u32)> {
        if data.len() < 5 {
            return None;
        }
        let time = u32::from_le_bytes(data[1..5].try_into().ok()?);
        let telemetry = match data[0] {
            0 => {
                if data.len() < 18 {
                    return None;
                }
                let battery = if data[5] == 0xFF { None } else { Some(data[5]) };
                let uptime = u32::from_le_bytes(data[14..18].try_into().ok()?);
                Telemetry::Device(DeviceMetrics {
                    battery_level: battery,
                    voltage: read_opt_f32(data, 6)?,
                    channel_utilization: read_opt_f32(data, 10)?,
                    uptime_seconds: if uptime == 0 { None } else { Some(uptime) },
                })
            }
            1 => {
                if data.len() < 17 {
                    return None;
                }
                Telemetry::Environment(EnvironmentMetrics {
                    temperature: read_opt_f32(data, 5)?,
                    relative_humidity: read_opt_f32(data, 9)?,
                    barometric_pressure: read_opt_f32(data, 13)?,
                })
            }
            _ => return None,
        };
        Some((telemetry, time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_type_roundtrip() {
        for pt in [
            PayloadType::Text,
            PayloadType::Position,
            PayloadType::NodeAnnounce,
            PayloadType::Routing,
            PayloadType::Telemetry,
        ] {
            assert_eq!(PayloadType::from_byte(pt.to_byte()), pt);
        }
        // Unknown discriminants survive
        assert_eq!(PayloadType::from_byte(200), PayloadType::Opaque(200));
        assert_eq!(PayloadType::Opaque(200).to_byte(), 200);
    }

    #[test]
    fn test_position_roundtrip() {
        let pos = Position {
            latitude: 52.5200,
            longitude: 13.4050,
            altitude: 34.5,
        };
        let recovered = Position::from_bytes(&pos.to_bytes()).unwrap();
        assert_eq!(recovered, pos);
        assert!(Position::from_bytes(&[0u8; 10]).is_none());
    }

    #[test]
    fn test_node_announce() {
        let ann = NodeAnnounce::new("BASE", "Field station north");
        let recovered = NodeAnnounce::from_bytes(&ann.to_bytes()).unwrap();
        assert_eq!(recovered.short_name, "BASE");
        assert_eq!(recovered.long_name, "Field station north");

        // Names are capped
        let capped = NodeAnnounce::new("TOOLONG", "x");
        assert_eq!(capped.short_name, "TOOL");

        // Truncated input
        assert!(NodeAnnounce::from_bytes(&[4, b'a']).is_none());
    }

    #[test]
    fn test_ack_roundtrip() {
        assert_eq!(decode_ack(&encode_ack(0xCAFE_F00D)), Some(0xCAFE_F00D));
        assert_eq!(decode_ack(&[1, 2]), None);
    }

    #[test]
    fn test_telemetry_device_roundtrip() {
        let metrics = DeviceMetrics {
            battery_level: Some(85),
            voltage: Some(4.1),
            channel_utilization: None,
            uptime_seconds: Some(3600),
        };
        let bytes = Telemetry::Device(metrics.clone()).to_bytes(12345);
        let (recovered, time) = Telemetry::from_bytes(&bytes).unwrap();
        assert_eq!(time, 12345);
        assert_eq!(recovered, Telemetry::Device(metrics));
    }

    #[test]
    fn test_telemetry_environment_roundtrip() {
        let metrics = EnvironmentMetrics {
            temperature: Some(21.5),
            relative_humidity: Some(40.0),
            barometric_pressure: None,
        };
        let bytes = Telemetry::Environment(metrics.clone()).to_bytes(777);
        let (recovered, time) = Telemetry::from_bytes(&bytes).unwrap();
        assert_eq!(time, 777);
        assert_eq!(recovered, Telemetry::Environment(metrics));
    }

    #[test]
    fn test_telemetry_rejects_short_and_unknown() {
        assert!(Telemetry::from_bytes(&[0, 1, 2]).is_none());
        assert!(Telemetry::from_bytes(&[9, 0, 0, 0, 0, 0]).is_none());
    }
}
