// src/responses/mod.rs

pub mod api_response;

pub use api_response::{json_status, StatusResponse};
