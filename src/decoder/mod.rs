use futures::future::BoxFuture;

use crate::error::GateError;

/// Decoded, pixel-addressable image surface
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Outcome of loading a remote image that did arrive.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteImage {
    /// Pixels are readable and can be classified.
    Readable(DecodedImage),
    /// The resource is an image but its pixels cannot be read for classification.
    Opaque(String),
}

/// Pluggable image decoding capability
pub trait Decoder: Send + Sync {
    /// Decode a local blob. Failure is always [`GateError::SourceLoad`].
    fn decode<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, Result<DecodedImage, GateError>>;

    /// Fetch and decode a remote image. Failure to fetch is [`GateError::SourceLoad`].
    fn load_url<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RemoteImage, GateError>>;
}

mod http;

pub use http::HttpDecoder;
