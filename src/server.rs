use axum::{
    extract::{self, multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path},
    routing::{get, post},
    Router,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;

use crate::{
    config::ServerConfig,
    error::RelayError,
    pages,
    request::UploadRequest,
    response::{ImageResponse, StatusResponse},
    state::State,
};

pub type SharedState = Arc<Mutex<State>>;

pub fn router(state: SharedState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(pages::index))
        .route("/about", get(pages::about))
        .route("/upload", post(upload))
        .route("/get_status", get(status))
        .route("/get_image/:user_id", get(image))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = Arc::new(Mutex::new(State::new(&config)));
    let app = router(state, config.max_upload_bytes);

    let listener = TcpListener::bind(config.address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        max_users = config.max_users,
        ttl_secs = config.ttl.as_secs(),
        "relay listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

fn lock(state: &SharedState) -> Result<MutexGuard<'_, State>, RelayError> {
    state
        .lock()
        .map_err(|_| RelayError::Internal("state lock poisoned".into()))
}

async fn upload(
    extract::State(state): extract::State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<&'static str, RelayError> {
    let request = UploadRequest::from_multipart(multipart)
        .await
        .map_err(|e| {
            tracing::warn!("rejected upload: {}", e);
            e
        })?;
    lock(&state)?.handle_upload(request);
    Ok("OK")
}

async fn status(
    extract::State(state): extract::State<SharedState>,
) -> Result<StatusResponse, RelayError> {
    let mut state = lock(&state)?;
    state
        .handle_status()
        .map_err(|e| RelayError::Internal(e.to_string()))
}

async fn image(
    extract::State(state): extract::State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<ImageResponse, RelayError> {
    let state = lock(&state)?;
    state.handle_image(&user_id)
}
