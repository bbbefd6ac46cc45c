use axum::{
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;

pub const NO_STORE: &str = "no-store, max-age=0";

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub users: Vec<String>,
    pub timestamp: u64,
}

impl IntoResponse for StatusResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Screenshot bytes exactly as uploaded.
#[derive(Debug)]
pub struct ImageResponse(pub Bytes);

impl IntoResponse for ImageResponse {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, NO_STORE),
            ],
            self.0,
        )
            .into_response()
    }
}
