//! Wire records for device and ping reporting.
//!
//! Every payload is checked against its schema table before serde builds the
//! record, so a missing required field is always a hard error.

mod records;
mod schema;

pub use records::*;
pub use schema::*;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Decode a record from JSON text.
pub fn decode<T: Schema + DeserializeOwned>(json: &str) -> Result<T, DecodeError> {
    let value: Value = serde_json::from_str(json)?;
    decode_value(value)
}

/// Decode a record from an already-parsed JSON value.
pub fn decode_value<T: Schema + DeserializeOwned>(value: Value) -> Result<T, DecodeError> {
    validate(T::NAME, T::FIELDS, &value)?;
    Ok(serde_json::from_value(value)?)
}

/// Encode a record using its wire keys.
pub fn encode<T: Serialize>(record: &T) -> Result<String, DecodeError> {
    Ok(serde_json::to_string(record)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_info_without_status() {
        let info: DeviceInfo = decode(
            r#"{"hostname":"h1","id":"d1","internet-connectivity":true,"ip":"10.0.0.1"}"#,
        )
        .unwrap();
        assert_eq!(info.hostname, "h1");
        assert_eq!(info.id, "d1");
        assert!(info.internet_connectivity);
        assert_eq!(info.ip, "10.0.0.1");
        assert!(info.status.is_empty());
    }

    #[test]
    fn test_device_info_with_status() {
        let info: DeviceInfo = decode(
            r#"{"hostname":"h1","id":"d1","internet-connectivity":false,"ip":"10.0.0.1",
                "status":[{"name":"nginx","bin":"/usr/sbin/nginx","statuscode":"0","version":"1.2"}]}"#,
        )
        .unwrap();
        assert_eq!(info.status.len(), 1);
        let s = &info.status[0];
        assert_eq!(s.name, "nginx");
        assert_eq!(s.bin, "/usr/sbin/nginx");
        assert_eq!(s.statuscode, "0");
        assert_eq!(s.version, "1.2");
        assert_eq!(s.info, None);
    }

    #[test]
    fn test_ping_result_unsuccessful() {
        let pr: PingResult = decode(
            r#"{"successful":[],"unsuccessful":[{"deviceID":"d1","error":"timeout",
                "packets-received":0,"packets-sent":4,"packet-loss":100,"ip":"10.0.0.1",
                "address":"10.0.0.1","average-round-trip":"0ms"}]}"#,
        )
        .unwrap();
        assert!(pr.successful.is_empty());
        assert_eq!(pr.unsuccessful.len(), 1);
        let r = &pr.unsuccessful[0];
        assert_eq!(r.packet_loss, 100.0);
        assert_eq!(r.packets_sent, 4);
        assert_eq!(r.packets_received, 0);
        assert_eq!(r.error, "timeout");
        assert_eq!(r.average_round_trip, "0ms");
    }

    #[test]
    fn test_ping_result_empty_object() {
        let pr: PingResult = decode("{}").unwrap();
        assert!(pr.is_empty());
    }

    #[test]
    fn test_status_info_kept_verbatim() {
        let s: Status = decode(
            r#"{"name":"av-api","bin":"/usr/bin/av-api","statuscode":"200","version":"","info":{"uptime":12,"ok":true}}"#,
        )
        .unwrap();
        assert_eq!(s.info, Some(json!({"uptime": 12, "ok": true})));
    }

    #[test]
    fn test_missing_required_field_is_error() {
        let err = decode::<DeviceInfo>(r#"{"hostname":"h1","internet-connectivity":true,"ip":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { ref path } if path == "DeviceInfo.id"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(decode::<PingResult>("{"), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_round_trip_preserves_present_fields() {
        let input = json!({
            "hostname": "ITB-1101-CP1",
            "id": "ITB-1101-CP1",
            "internet-connectivity": true,
            "ip": "10.5.34.12",
            "status": [
                {"name": "av-api", "bin": "/usr/bin/av-api", "statuscode": "200", "version": "3.1", "info": ["a", 1]},
                {"name": "ui", "bin": "/usr/bin/ui", "statuscode": "unreachable", "version": ""}
            ]
        });
        let info: DeviceInfo = decode_value(input.clone()).unwrap();
        let output: Value = serde_json::from_str(&encode(&info).unwrap()).unwrap();
        assert_eq!(input, output);
    }

    #[test]
    fn test_ping_result_round_trip() {
        let input = json!({
            "successful": [{
                "deviceID": "d2", "error": "", "packets-received": 3, "packets-sent": 4,
                "packet-loss": 25, "ip": "10.0.0.2", "address": "d2.local",
                "average-round-trip": "1.234ms"
            }, {
                "deviceID": "d3", "error": "", "packets-received": 2, "packets-sent": 3,
                "packet-loss": 33.33, "ip": "10.0.0.3", "address": "10.0.0.3",
                "average-round-trip": "850µs"
            }],
            "unsuccessful": [{
                "deviceID": "d1", "error": "timeout", "packets-received": 0, "packets-sent": 4,
                "packet-loss": 100, "ip": "10.0.0.1", "address": "10.0.0.1",
                "average-round-trip": "0ms"
            }]
        });
        let pr: PingResult = decode_value(input.clone()).unwrap();
        let output: Value = serde_json::from_str(&encode(&pr).unwrap()).unwrap();
        assert_eq!(input, output);
    }

    #[test]
    fn test_null_info_encodes_as_absent() {
        let s: Status =
            decode(r#"{"name":"a","bin":"b","statuscode":"0","version":"1","info":null}"#).unwrap();
        assert_eq!(s.info, None);
        let output: Value = serde_json::from_str(&encode(&s).unwrap()).unwrap();
        assert_eq!(output, json!({"name": "a", "bin": "b", "statuscode": "0", "version": "1"}));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let s: Status = decode(
            r#"{"name":"a","bin":"b","statuscode":"0","version":"1","extra":42}"#,
        )
        .unwrap();
        assert_eq!(s.name, "a");
    }
}
