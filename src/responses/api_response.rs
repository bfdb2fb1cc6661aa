use serde::Serialize;
use worker::{Response, Result};

/// JSON envelope returned by the install/uninstall endpoints.
#[derive(Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Serializes an envelope with an explicit HTTP status code.
pub fn json_status(body: &StatusResponse, status: u16) -> Result<Response> {
    Ok(Response::from_json(body)?.with_status(status))
}
