use anyhow::Context;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use reqwest::multipart::{Form, Part};
use std::sync::{Arc, Mutex};
use tokio::time::MissedTickBehavior;

use crate::{
    capture::ScreenSource,
    config::ClientConfig,
    request::{IMAGE_FIELD, USER_ID_FIELD},
};

/// Resize to exactly `width`x`height`, drop alpha and encode as JPEG.
pub fn compress(
    image: &DynamicImage,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, image::ImageError> {
    let resized = image.resize_exact(width, height, FilterType::CatmullRom).to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(&resized)?;
    Ok(jpeg)
}

type SharedSource = Arc<Mutex<Box<dyn ScreenSource + Send>>>;

pub struct Uploader {
    config: ClientConfig,
    http: reqwest::Client,
    source: SharedSource,
}

impl Uploader {
    /// Requests time out after one interval, so a relay that accepts but
    /// never answers only costs a single tick.
    pub fn new(config: ClientConfig, source: Box<dyn ScreenSource + Send>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.interval)
            .build()
            .context("failed to build http client")?;
        Ok(Uploader {
            config,
            http,
            source: Arc::new(Mutex::new(source)),
        })
    }

    /// Upload every interval until interrupted. A failed iteration is
    /// logged and the next tick simply tries again.
    pub async fn run(self) -> anyhow::Result<()> {
        if self.config.once {
            return self.tick().await;
        }

        tracing::info!(
            server = %self.config.server,
            user_id = %self.config.user_id,
            interval_secs = self.config.interval.as_secs(),
            "uploading screenshots"
        );
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        loop {
            let iteration = async {
                interval.tick().await;
                if let Err(e) = self.tick().await {
                    tracing::warn!("upload failed: {:#}", e);
                }
            };
            tokio::select! {
                _ = iteration => {}
                _ = &mut shutdown => {
                    tracing::info!("client stopped");
                    return Ok(());
                }
            }
        }
    }

    pub async fn tick(&self) -> anyhow::Result<()> {
        let source = self.source.clone();
        let (width, height, quality) = (self.config.width, self.config.height, self.config.quality);
        let jpeg =
            tokio::task::spawn_blocking(move || capture_jpeg(&source, width, height, quality))
                .await??;
        let size = jpeg.len();
        self.upload(jpeg).await?;
        tracing::debug!(size, "uploaded screenshot");
        Ok(())
    }

    async fn upload(&self, jpeg: Vec<u8>) -> anyhow::Result<()> {
        let image = Part::bytes(jpeg)
            .file_name("screen.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .text(USER_ID_FIELD, self.config.user_id.clone())
            .part(IMAGE_FIELD, image);

        self.http
            .post(self.config.upload_url())
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn capture_jpeg(
    source: &Mutex<Box<dyn ScreenSource + Send>>,
    width: u32,
    height: u32,
    quality: u8,
) -> anyhow::Result<Vec<u8>> {
    let image = source
        .lock()
        .map_err(|_| anyhow::format_err!("capture source lock poisoned"))?
        .capture()?;
    let jpeg = compress(&image, width, height, quality).context("failed to encode screenshot")?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::{
        path::PathBuf,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };
    use tokio::net::TcpListener;

    use super::{compress, Uploader};
    use crate::{
        capture::{CaptureError, ScreenSource},
        config::{ClientConfig, ServerConfig},
        server::{router, SharedState},
        state::State,
    };

    struct Solid;

    impl ScreenSource for Solid {
        fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                1920,
                1080,
                Rgba([200, 40, 40, 128]),
            )))
        }
    }

    /// Fails the first capture, then behaves like `Solid`.
    struct FailsFirst {
        attempts: Arc<AtomicUsize>,
    }

    impl ScreenSource for FailsFirst {
        fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(CaptureError::File {
                    path: PathBuf::from("screen.png"),
                    source: image::ImageError::IoError(std::io::ErrorKind::NotFound.into()),
                });
            }
            Solid.capture()
        }
    }

    fn client_config(server: String) -> ClientConfig {
        ClientConfig {
            server,
            user_id: "tester".to_string(),
            interval: Duration::from_secs(3),
            width: 630,
            height: 390,
            quality: 20,
            image: None,
            once: true,
        }
    }

    async fn spawn_relay() -> (SharedState, String) {
        let state = Arc::new(Mutex::new(State::new(&ServerConfig::default())));
        let app = router(state.clone(), ServerConfig::default().max_upload_bytes);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (state, format!("http://{address}"))
    }

    #[test]
    fn compress_resizes_to_jpeg() {
        let jpeg = compress(&Solid.capture().unwrap(), 630, 390, 20).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (630, 390));
        assert!(!decoded.color().has_alpha());
    }

    // Default current-thread runtime: capture must not rely on block_in_place
    #[tokio::test]
    async fn uploads_to_relay() {
        let (state, server) = spawn_relay().await;

        let uploader = Uploader::new(client_config(server), Box::new(Solid)).unwrap();
        uploader.tick().await.unwrap();

        let mut state = state.lock().unwrap();
        assert_eq!(state.handle_status().unwrap().users, vec!["tester"]);
        let image = state.handle_image("tester").unwrap().0;
        assert_eq!(image::guess_format(&image).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_server_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let uploader =
            Uploader::new(client_config(format!("http://{address}")), Box::new(Solid)).unwrap();
        assert!(uploader.run().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                open.push(stream);
            }
        });

        let config = ClientConfig {
            interval: Duration::from_secs(1),
            ..client_config(format!("http://{address}"))
        };
        let uploader = Uploader::new(config, Box::new(Solid)).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(10), uploader.tick())
            .await
            .expect("upload should give up after the interval");
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn loop_continues_after_failed_tick() {
        let (state, server) = spawn_relay().await;
        let attempts = Arc::new(AtomicUsize::new(0));
        let config = ClientConfig {
            interval: Duration::from_millis(500),
            once: false,
            ..client_config(server)
        };
        let source = FailsFirst {
            attempts: attempts.clone(),
        };
        let uploader = Uploader::new(config, Box::new(source)).unwrap();

        let uploaded = async {
            loop {
                if state.lock().unwrap().handle_image("tester").is_ok() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::select! {
            result = uploader.run() => panic!("upload loop exited: {:?}", result),
            waited = tokio::time::timeout(Duration::from_secs(10), uploaded) => {
                waited.expect("no upload after the failed tick");
            }
        }
        assert!(attempts.load(Ordering::SeqCst) >= 2);
    }
}
