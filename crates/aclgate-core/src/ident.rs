//! Remote application identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Byte length of a remote application id.
pub const APP_ID_LEN: usize = 16;

const APP_NAME_SUFFIX: &str = "_APP_NAME";
const DEVICE_NAME_SUFFIX: &str = "_DEVICE_NAME";

/// Identifies one application on one remote device.
///
/// `app_id` is always stored as lowercase hex of [`APP_ID_LEN`] bytes, so two
/// identifiers compare equal regardless of how the id was spelled on input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawIdentifier", into = "RawIdentifier")]
pub struct AppIdentifier {
    app_id: String,
    device_id: String,
}

#[derive(Serialize, Deserialize)]
struct RawIdentifier {
    app_id: String,
    device_id: String,
}

impl TryFrom<RawIdentifier> for AppIdentifier {
    type Error = GatewayError;

    fn try_from(raw: RawIdentifier) -> Result<Self> {
        AppIdentifier::new(&raw.app_id, raw.device_id)
    }
}

impl From<AppIdentifier> for RawIdentifier {
    fn from(id: AppIdentifier) -> Self {
        RawIdentifier {
            app_id: id.app_id,
            device_id: id.device_id,
        }
    }
}

impl AppIdentifier {
    /// Parse a hex app id and pair it with a device id.
    pub fn new(app_id_hex: &str, device_id: impl Into<String>) -> Result<Self> {
        let bytes = hex::decode(app_id_hex.trim())
            .map_err(|e| GatewayError::BadRequest(format!("invalid app id {app_id_hex:?}: {e}")))?;
        Self::from_bytes(&bytes, device_id)
    }

    /// Build from the raw id bytes carried in an announcement.
    pub fn from_bytes(app_id: &[u8], device_id: impl Into<String>) -> Result<Self> {
        if app_id.len() != APP_ID_LEN {
            return Err(GatewayError::BadRequest(format!(
                "app id must be {APP_ID_LEN} bytes, got {}",
                app_id.len()
            )));
        }
        let device_id = device_id.into();
        if device_id.is_empty() {
            return Err(GatewayError::BadRequest("device id must not be empty".into()));
        }
        Ok(Self {
            app_id: hex::encode(app_id),
            device_id,
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Composite metadata key for the remote application's friendly name.
    pub fn app_name_key(&self) -> String {
        format!("{}_{}{APP_NAME_SUFFIX}", self.device_id, self.app_id)
    }

    /// Composite metadata key for the remote device's friendly name.
    pub fn device_name_key(&self) -> String {
        format!("{}_{}{DEVICE_NAME_SUFFIX}", self.device_id, self.app_id)
    }
}

impl fmt::Display for AppIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.app_id)
    }
}

/// Which friendly name a composite metadata key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    AppName,
    DeviceName,
}

/// Split `"<deviceId>_<appId>_APP_NAME"` / `"..._DEVICE_NAME"` into its parts.
///
/// Device ids may themselves contain underscores; the app id never does.
pub fn parse_metadata_key(key: &str) -> Result<(AppIdentifier, MetadataField)> {
    let (head, field) = if let Some(head) = key.strip_suffix(DEVICE_NAME_SUFFIX) {
        (head, MetadataField::DeviceName)
    } else if let Some(head) = key.strip_suffix(APP_NAME_SUFFIX) {
        (head, MetadataField::AppName)
    } else {
        return Err(GatewayError::Metadata(format!("unknown metadata key type: {key}")));
    };

    let (device_id, app_id) = head
        .rsplit_once('_')
        .ok_or_else(|| GatewayError::Metadata(format!("malformed metadata key: {key}")))?;

    let id = AppIdentifier::new(app_id, device_id)
        .map_err(|e| GatewayError::Metadata(format!("malformed metadata key {key}: {e}")))?;
    Ok((id, field))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const APP: &str = "00112233445566778899AABBCCDDEEFF";

    #[test]
    fn normalizes_app_id_case() {
        let a = AppIdentifier::new(APP, "dev").unwrap();
        let b = AppIdentifier::new(&APP.to_lowercase(), "dev").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.app_id(), "00112233445566778899aabbccddeeff");
    }

    #[test]
    fn rejects_short_app_id() {
        let err = AppIdentifier::new("0011", "dev").unwrap_err();
        assert_eq!(err.response_code().as_str(), "INVALID");
    }

    #[test]
    fn metadata_keys_parse_back() {
        let id = AppIdentifier::new(APP, "living_room_hub").unwrap();

        let (parsed, field) = parse_metadata_key(&id.app_name_key()).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(field, MetadataField::AppName);

        let (parsed, field) = parse_metadata_key(&id.device_name_key()).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(field, MetadataField::DeviceName);
    }

    #[test]
    fn metadata_key_with_unknown_type_fails() {
        let err = parse_metadata_key("dev_00112233445566778899aabbccddeeff_COLOR").unwrap_err();
        assert_eq!(err.response_code().as_str(), "METADATA_ERROR");
    }
}
