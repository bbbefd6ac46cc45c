use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart,
    },
    http::StatusCode,
};
use bytes::Bytes;

use crate::error::RelayError;

pub const USER_ID_FIELD: &str = "user_id";
pub const IMAGE_FIELD: &str = "image";

/// A user id has to survive as a single `/get_image/{id}` path segment, so
/// no `/` and no dot segments a browser would normalise away.
pub fn check_user_id(user_id: &str) -> Result<(), String> {
    if user_id.trim().is_empty() {
        Err("empty user_id".into())
    } else if user_id.contains('/') {
        Err(format!("user_id {:?} must not contain '/'", user_id))
    } else if user_id == "." || user_id == ".." {
        Err(format!("user_id {:?} is not a valid path segment", user_id))
    } else {
        Ok(())
    }
}

#[derive(Debug)]
pub struct UploadRequest {
    pub user_id: String,
    pub image: Bytes,
}

impl UploadRequest {
    pub fn from_fields(user_id: Option<String>, image: Option<Bytes>) -> Result<Self, RelayError> {
        let user_id = match user_id {
            Some(s) => {
                check_user_id(&s).map_err(RelayError::MalformedRequest)?;
                s
            }
            None => return Err(RelayError::MalformedRequest("missing user_id field".into())),
        };
        let image = match image {
            Some(b) if b.is_empty() => {
                return Err(RelayError::MalformedRequest("empty image".into()))
            }
            Some(b) => b,
            None => return Err(RelayError::MalformedRequest("missing image field".into())),
        };
        Ok(UploadRequest { user_id, image })
    }

    /// Read the whole form. The first occurrence of each field wins, anything
    /// else is skipped.
    pub async fn from_multipart(
        multipart: Result<Multipart, MultipartRejection>,
    ) -> Result<Self, RelayError> {
        let mut multipart =
            multipart.map_err(|e| RelayError::MalformedRequest(e.body_text()))?;

        let mut user_id = None;
        let mut image = None;
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some(USER_ID_FIELD) if user_id.is_none() => {
                    user_id = Some(field.text().await.map_err(multipart_error)?);
                }
                Some(IMAGE_FIELD) if image.is_none() => {
                    image = Some(field.bytes().await.map_err(multipart_error)?);
                }
                _ => {}
            }
        }
        UploadRequest::from_fields(user_id, image)
    }
}

fn multipart_error(e: MultipartError) -> RelayError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RelayError::PayloadTooLarge
    } else {
        RelayError::MalformedRequest(e.body_text())
    }
}
