//! Single-entry extraction from ZIP containers (APKs), local or served over HTTP.

use std::{
    io::{self, BufReader, Cursor, Read, Seek, SeekFrom},
    path::Path,
};

use reqwest::{
    StatusCode,
    blocking::Client,
    header::{CONTENT_RANGE, RANGE},
};
use tracing::{debug, instrument, trace, warn};
use zip::{ZipArchive, result::ZipError};

use crate::{
    error::{Error, Result},
    source::is_http_url,
};

pub const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

/// Upper bound for preallocating an entry buffer from the size the archive claims.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// Returns the decompressed bytes of the entry called exactly `name`.
pub fn read_entry<R: Read + Seek>(reader: R, name: &str) -> Result<Vec<u8>> {
    let mut zip = ZipArchive::new(reader).map_err(Error::MalformedArchive)?;
    let mut file = match zip.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Err(Error::EntryNotFound(name.to_string())),
        Err(e) => {
            return Err(Error::ReadFailure { name: name.to_string(), source: io::Error::from(e) });
        }
    };
    let mut buf = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
    file.read_to_end(&mut buf)
        .map_err(|source| Error::ReadFailure { name: name.to_string(), source })?;
    trace!(name, len = buf.len(), "Extracted archive entry");
    Ok(buf)
}

/// Extracts `AndroidManifest.xml` from a local APK or an `http(s)://` URL.
///
/// Runs on the blocking pool; remote archives are read through range requests where the
/// server supports them, so only the central directory and the manifest entry are fetched.
#[instrument(level = "debug", err)]
pub async fn read_manifest(location: &str) -> Result<Vec<u8>> {
    let location = location.to_string();
    let task_location = location.clone();
    tokio::task::spawn_blocking(move || {
        let reader = open_archive(&task_location)?;
        read_entry(reader, MANIFEST_ENTRY)
    })
    .await
    .map_err(|e| Error::source_fetch(location, e))?
}

fn open_archive(location: &str) -> Result<Box<dyn ReadSeek>> {
    if is_http_url(location) {
        let client = Client::new();
        open_http(&client, location)
    } else {
        let path = Path::new(location);
        let file = fs_err::File::open(path).map_err(|e| Error::source_fetch(location, e))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Checks the server with a one-byte range request. A `206` with a total length gives a
/// seekable reader; any other success status means ranges are unsupported and the body that
/// came back is the whole archive.
fn open_http(client: &Client, url: &str) -> Result<Box<dyn ReadSeek>> {
    let response = client
        .get(url)
        .header(RANGE, "bytes=0-0")
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::source_fetch(url, e))?;

    if response.status() == StatusCode::PARTIAL_CONTENT
        && let Some(len) = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(total_from_content_range)
    {
        debug!(url, len, "Server supports range requests");
        return Ok(Box::new(HttpRangeReader::new(client.clone(), url, len)));
    }

    warn!(url, status = %response.status(), "Server ignored range request, downloading whole archive");
    let body = response.bytes().map_err(|e| Error::source_fetch(url, e))?;
    Ok(Box::new(Cursor::new(body.to_vec())))
}

/// Parses the total from `bytes 0-0/12345`.
fn total_from_content_range(value: &str) -> Option<u64> {
    value.strip_prefix("bytes ")?.rsplit_once('/')?.1.trim().parse().ok()
}

/// `Read + Seek` over an HTTP resource, fetching fixed-size blocks on demand.
struct HttpRangeReader {
    client: Client,
    url: String,
    len: u64,
    pos: u64,
    block: Vec<u8>,
    block_start: u64,
}

impl HttpRangeReader {
    const BLOCK_SIZE: u64 = 64 * 1024;

    fn new(client: Client, url: &str, len: u64) -> Self {
        Self { client, url: url.to_string(), len, pos: 0, block: Vec::new(), block_start: 0 }
    }

    fn block_contains(&self, pos: u64) -> bool {
        pos >= self.block_start && pos < self.block_start + self.block.len() as u64
    }

    fn fetch_block(&mut self, start: u64) -> io::Result<()> {
        let end = (start + Self::BLOCK_SIZE).min(self.len) - 1;
        trace!(url = %self.url, start, end, "Fetching range");
        let response = self
            .client
            .get(&self.url)
            .header(RANGE, format!("bytes={start}-{end}"))
            .send()
            .map_err(io::Error::other)?;
        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(io::Error::other(format!(
                "range request for bytes {start}-{end} answered with {}",
                response.status()
            )));
        }
        let bytes = response.bytes().map_err(io::Error::other)?;
        if bytes.is_empty() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty range response"));
        }
        self.block = bytes.to_vec();
        self.block_start = start;
        Ok(())
    }
}

impl Read for HttpRangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        if !self.block_contains(self.pos) {
            self.fetch_block(self.pos)?;
        }
        let offset = (self.pos - self.block_start) as usize;
        let n = buf.len().min(self.block.len() - offset);
        buf[..n].copy_from_slice(&self.block[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for HttpRangeReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(off) => self.len.checked_add_signed(off),
            SeekFrom::Current(off) => self.pos.checked_add_signed(off),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of resource")
        })?;
        self.pos = target;
        Ok(target)
    }
}
