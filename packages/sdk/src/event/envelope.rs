// packages/sdk/src/event/envelope.rs
//! Common event envelope
//!
//! Every captured record carries the same header: identifiers, capture
//! time, and the page/device context it was captured in.

use serde::{Deserialize, Serialize};

/// Device and viewport context, populated from whatever the host exposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport_width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport_height: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Connection type, when the host exposes one (e.g. "4g", "wifi")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

/// Header fields shared by every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique per event within a session
    pub event_id: String,

    /// Tenant identifier supplied at init
    pub app_id: String,

    /// Stable for the life of one browsing session
    pub session_id: String,

    /// Set via the identity API; changing it does not rotate the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Wall-clock milliseconds at capture
    pub timestamp: u64,

    pub page_url: String,

    pub user_agent: String,

    pub device_info: DeviceInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope {
            event_id: "evt_1".to_string(),
            app_id: "app".to_string(),
            session_id: "1700000000000-deadbeef".to_string(),
            user_id: None,
            timestamp: 1_700_000_000_123,
            page_url: "https://shop.example/checkout".to_string(),
            user_agent: "TestAgent/1.0".to_string(),
            device_info: DeviceInfo::default(),
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["eventId"], "evt_1");
        assert_eq!(json["appId"], "app");
        assert_eq!(json["pageUrl"], "https://shop.example/checkout");
        // Absent userId is omitted entirely, not serialized as null
        assert!(json.get("userId").is_none());
    }

    #[test]
    fn test_device_info_sparse() {
        let device = DeviceInfo {
            viewport_width: Some(1280),
            viewport_height: Some(720),
            language: Some("en-US".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["viewportWidth"], 1280);
        assert!(json.get("screenWidth").is_none());
    }
}
