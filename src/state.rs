use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    config::ServerConfig,
    error::RelayError,
    request::UploadRequest,
    response::{ImageResponse, StatusResponse},
    store::Store,
};

pub struct State {
    store: Store,
}

impl State {
    pub fn new(config: &ServerConfig) -> Self {
        State {
            store: Store::new(config.max_users, config.ttl),
        }
    }

    pub fn handle_upload(&mut self, request: UploadRequest) {
        let size = request.image.len();
        if let Some(evicted) = self.store.put(&request.user_id, request.image) {
            tracing::debug!(user_id = %evicted, "evicted to make room");
        }
        tracing::debug!(
            user_id = %request.user_id,
            size,
            users = self.store.len(),
            "stored screenshot"
        );
    }

    pub fn handle_status(&mut self) -> anyhow::Result<StatusResponse> {
        self.handle_status_at(SystemTime::now())
    }

    pub fn handle_status_at(&mut self, now: SystemTime) -> anyhow::Result<StatusResponse> {
        let users = self.store.list_live(now);
        let timestamp = now.duration_since(UNIX_EPOCH)?.as_secs();
        Ok(StatusResponse { users, timestamp })
    }

    pub fn handle_image(&self, user_id: &str) -> Result<ImageResponse, RelayError> {
        self.store
            .get(user_id)
            .map(ImageResponse)
            .ok_or(RelayError::NotFound)
    }
}
