//! Decode-once codec for the admin socket: one JSON document per line.

use aclgate_core::{
    error::{GatewayError, Result},
    protocol::admin::{AdminRequest, AdminResponse},
};

/// Longest accepted request line.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

pub fn decode(line: &str) -> Result<AdminRequest> {
    let line = line.trim();
    if line.len() > MAX_LINE_BYTES {
        return Err(GatewayError::BadRequest("request too large".into()));
    }
    serde_json::from_str(line)
        .map_err(|e| GatewayError::BadRequest(format!("invalid request json: {e}")))
}

/// Encode a response as one line (no trailing newline).
pub fn encode(resp: &AdminResponse) -> String {
    match serde_json::to_string(resp) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "response encode failed");
            // static fallback keeps the line protocol intact
            r#"{"kind":"error","code":"INTERNAL","message":"response encode failed"}"#.to_string()
        }
    }
}

pub fn error_response(err: &GatewayError) -> AdminResponse {
    AdminResponse::Error {
        code: err.response_code(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tagged_request() {
        let req = decode(r#"{"op":"get_app_status","app_id":"lights"}"#).unwrap();
        assert_eq!(
            req,
            AdminRequest::GetAppStatus {
                app_id: "lights".into()
            }
        );
    }

    #[test]
    fn garbage_is_bad_request() {
        let err = decode("{nope").unwrap_err();
        assert_eq!(err.response_code().as_str(), "INVALID");
    }

    #[test]
    fn error_response_carries_code() {
        let line = encode(&error_response(&GatewayError::AclNotFound("x".into())));
        assert!(line.contains(r#""code":"ACL_NOT_FOUND""#));
        assert!(line.contains(r#""kind":"error""#));
    }
}
