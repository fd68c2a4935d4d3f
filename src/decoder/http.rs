use std::io::Cursor;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use image::ImageReader;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use super::{DecodedImage, Decoder, RemoteImage};
use crate::error::GateError;

/// Decoder backed by the `image` crate, fetching remote images over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpDecoder {
    http: Client,
}

impl HttpDecoder {
    pub fn new(fetch_timeout: Duration) -> Result<Self, GateError> {
        let http = Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| GateError::SourceLoad(format!("http client: {e}")))?;
        Ok(Self { http })
    }

    async fn fetch(&self, raw: &str) -> Result<RemoteImage, GateError> {
        let url = parse_remote_url(raw)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| GateError::SourceLoad(format!("http error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GateError::SourceLoad(format!("unexpected status {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|e| GateError::SourceLoad(format!("body read failed: {e}")))?;

        off_executor(move || classify_remote_body(content_type.as_deref(), &body)).await?
    }
}

impl Decoder for HttpDecoder {
    fn decode<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, Result<DecodedImage, GateError>> {
        let owned = bytes.to_vec();
        async move { off_executor(move || decode_bytes(&owned)).await?.map_err(GateError::SourceLoad) }.boxed()
    }

    fn load_url<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RemoteImage, GateError>> {
        self.fetch(url).boxed()
    }
}

fn parse_remote_url(raw: &str) -> Result<Url, GateError> {
    let url = Url::parse(raw.trim()).map_err(|e| GateError::SourceLoad(format!("invalid url: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(GateError::SourceLoad(format!("unsupported scheme: {other}"))),
    }
}

/// Runs CPU-bound image work on the blocking pool.
async fn off_executor<T, F>(work: F) -> Result<T, GateError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| GateError::SourceLoad(format!("decode task failed: {e}")))
}

/// Decodes the first frame of any format the `image` crate recognises.
fn decode_bytes(bytes: &[u8]) -> Result<DecodedImage, String> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        rgba: rgba.into_raw(),
        width,
        height,
    })
}

/// A body we can decode is readable. An `image/*` body we cannot decode still
/// loaded, so it is opaque rather than broken. Anything else did not load.
fn classify_remote_body(content_type: Option<&str>, body: &[u8]) -> Result<RemoteImage, GateError> {
    match decode_bytes(body) {
        Ok(image) => Ok(RemoteImage::Readable(image)),
        Err(err) => {
            let is_image = content_type
                .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
                .unwrap_or(false);
            if is_image {
                Ok(RemoteImage::Opaque(format!("undecodable image body: {err}")))
            } else {
                Err(GateError::SourceLoad(format!("not an image: {err}")))
            }
        }
    }
}
