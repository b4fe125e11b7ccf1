use std::{io, path::Path};

use derive_more::Debug;
use futures::TryStreamExt;
use humansize::{DECIMAL, format_size};
use tokio::io::{AsyncRead, BufReader};
use tokio_util::io::StreamReader;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Returns true for `http://` and `https://` locations.
pub fn is_http_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// A package byte stream, read once from start to end.
#[derive(Debug)]
pub struct PackageSource {
    location: String,
    /// Unknown for HTTP responses that carry no content length.
    length: Option<u64>,
    #[debug(skip)]
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl PackageSource {
    pub fn new(
        location: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
        length: Option<u64>,
    ) -> Self {
        Self { location: location.into(), length, reader: Box::new(reader) }
    }

    /// Opens a local file or starts an HTTP(S) download.
    #[instrument(level = "debug", skip(client), err)]
    pub async fn open(location: &str, client: &reqwest::Client) -> Result<Self> {
        if is_http_url(location) {
            Self::open_http(location, client).await
        } else {
            Self::open_file(Path::new(location)).await
        }
    }

    async fn open_file(path: &Path) -> Result<Self> {
        let location = path.display().to_string();
        let file = fs_err::tokio::File::open(path)
            .await
            .map_err(|e| Error::source_fetch(&location, e))?;
        let length = file.metadata().await.map_err(|e| Error::source_fetch(&location, e))?.len();
        debug!(%location, size = %format_size(length, DECIMAL), "Opened local package");
        Ok(Self::new(location, BufReader::new(file), Some(length)))
    }

    async fn open_http(url: &str, client: &reqwest::Client) -> Result<Self> {
        let response = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::source_fetch(url, e))?;
        let length = response.content_length();
        debug!(url, ?length, status = %response.status(), "Streaming package over HTTP");
        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(Self::new(url, StreamReader::new(Box::pin(stream)), length))
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub fn into_reader(self) -> Box<dyn AsyncRead + Send + Unpin> {
        self.reader
    }
}
