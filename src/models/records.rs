//! Wire records exchanged between the monitor and its dashboard.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reported state of one monitored service on a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub name: String,
    pub bin: String,
    pub statuscode: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

/// One network device and its known service statuses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub hostname: String,
    pub id: String,
    #[serde(rename = "internet-connectivity")]
    pub internet_connectivity: bool,
    pub ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: Vec<Status>,
}

/// Outcome of pinging one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DevicePingResult {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    pub error: String,
    pub packets_received: u32,
    pub packets_sent: u32,
    /// Percentage of echoes lost, 0 to 100.
    #[serde(serialize_with = "whole_as_integer")]
    pub packet_loss: f64,
    pub ip: String,
    pub address: String,
    pub average_round_trip: String,
}

impl DevicePingResult {
    /// A device counts as reachable when nothing failed and at least one echo came back.
    pub fn is_success(&self) -> bool {
        self.error.is_empty() && self.packets_received > 0
    }
}

/// Ping outcomes partitioned by success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub successful: Vec<DevicePingResult>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unsuccessful: Vec<DevicePingResult>,
}

impl PingResult {
    /// Route a device result into the matching partition.
    pub fn push(&mut self, result: DevicePingResult) {
        if result.is_success() {
            self.successful.push(result);
        } else {
            self.unsuccessful.push(result);
        }
    }

    pub fn total(&self) -> usize {
        self.successful.len() + self.unsuccessful.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl FromIterator<DevicePingResult> for PingResult {
    fn from_iter<I: IntoIterator<Item = DevicePingResult>>(iter: I) -> Self {
        let mut result = PingResult::default();
        for r in iter {
            result.push(r);
        }
        result
    }
}

/// Write whole numbers without a fraction (`100`, not `100.0`), as producers do.
fn whole_as_integer<S: serde::Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// Treat an explicit `null` the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
