//! Byte-range sources for trace input.
//!
//! Traces can be gigabytes, so they are always consumed in spans of
//! `[offset, offset + len - 1]`. A source may be a local file, a remote file
//! served over HTTP with `Range` support, or an in-memory buffer.

use crate::utils::config::DEFAULT_HTTP_TIMEOUT;
use crate::utils::error::SourceError;
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Bytes returned by one range read
#[derive(Debug, Clone, Default)]
pub struct RangeRead {
    /// Bytes of the requested span (shorter than requested at end of input)
    pub bytes: Vec<u8>,

    /// Total size of the underlying trace in bytes
    pub total_size: u64,
}

/// Anything that can serve byte ranges of a trace
pub trait TraceSource {
    /// Read up to `len` bytes starting at `offset`
    fn read_range(&mut self, offset: u64, len: u64) -> Result<RangeRead, SourceError>;

    /// Human readable locator for logs
    fn describe(&self) -> String;
}

impl<T: TraceSource + ?Sized> TraceSource for Box<T> {
    fn read_range(&mut self, offset: u64, len: u64) -> Result<RangeRead, SourceError> {
        (**self).read_range(offset, len)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Open a source from a locator: `http(s)://` URLs become HTTP sources, anything else a file
pub fn open_source(locator: &str) -> Result<Box<dyn TraceSource>, SourceError> {
    if locator.starts_with("http://") || locator.starts_with("https://") {
        Ok(Box::new(HttpSource::new(locator)?))
    } else {
        Ok(Box::new(FileSource::open(locator)?))
    }
}

/// Local trace file
pub struct FileSource {
    path: PathBuf,
    file: File,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening trace file: {}", path.display());
        let file = File::open(&path)?;
        Ok(Self { path, file })
    }
}

impl TraceSource for FileSource {
    fn read_range(&mut self, offset: u64, len: u64) -> Result<RangeRead, SourceError> {
        let total_size = self.file.metadata()?.len();

        let mut bytes = Vec::new();
        if offset < total_size {
            self.file.seek(SeekFrom::Start(offset))?;
            (&mut self.file).take(len).read_to_end(&mut bytes)?;
        }

        Ok(RangeRead { bytes, total_size })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Remote trace fetched with HTTP range requests
pub struct HttpSource {
    client: Client,
    url: String,

    /// Whole body, kept once the server turned out to ignore `Range`
    full_body: Option<Vec<u8>>,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(SourceError::RequestFailed)?;

        Ok(Self {
            client,
            url: url.into(),
            full_body: None,
        })
    }
}

impl TraceSource for HttpSource {
    fn read_range(&mut self, offset: u64, len: u64) -> Result<RangeRead, SourceError> {
        if let Some(body) = &self.full_body {
            return Ok(slice_range(body, offset, len));
        }

        let end = offset + len.saturating_sub(1);
        debug!("Fetching bytes {}-{} of {}", offset, end, self.url);

        let response = self
            .client
            .get(&self.url)
            .header(RANGE, format!("bytes={}-{}", offset, end))
            .send()
            .map_err(SourceError::RequestFailed)?;

        let status = response.status();
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match status {
            StatusCode::PARTIAL_CONTENT => {
                let total_size = content_range
                    .as_deref()
                    .and_then(parse_content_range_total)
                    .ok_or_else(|| {
                        SourceError::InvalidResponse(format!(
                            "missing or invalid Content-Range: {:?}",
                            content_range
                        ))
                    })?;
                let bytes = response.bytes().map_err(SourceError::RequestFailed)?.to_vec();
                Ok(RangeRead { bytes, total_size })
            }
            // Range past the end of the file
            StatusCode::RANGE_NOT_SATISFIABLE => {
                let total_size = content_range
                    .as_deref()
                    .and_then(parse_content_range_total)
                    .unwrap_or(offset);
                Ok(RangeRead {
                    bytes: Vec::new(),
                    total_size,
                })
            }
            // Server ignored the Range header and sent the whole body
            StatusCode::OK => {
                warn!(
                    "{} ignores range requests; keeping the whole body in memory",
                    self.url
                );
                let body = response.bytes().map_err(SourceError::RequestFailed)?.to_vec();
                let read = slice_range(&body, offset, len);
                self.full_body = Some(body);
                Ok(read)
            }
            _ => Err(SourceError::InvalidResponse(format!(
                "HTTP {}: {}",
                status,
                response.text().unwrap_or_default()
            ))),
        }
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Extract the total length from `bytes a-b/total` (or `bytes */total`)
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Span of an in-memory buffer, clamped to its end
fn slice_range(data: &[u8], offset: u64, len: u64) -> RangeRead {
    let total_size = data.len() as u64;
    let start = offset.min(total_size) as usize;
    let stop = offset.saturating_add(len).min(total_size) as usize;

    RangeRead {
        bytes: data[start..stop].to_vec(),
        total_size,
    }
}

/// In-memory trace, mostly useful for tests and piping
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl TraceSource for MemorySource {
    fn read_range(&mut self, offset: u64, len: u64) -> Result<RangeRead, SourceError> {
        Ok(slice_range(&self.data, offset, len))
    }

    fn describe(&self) -> String {
        format!("<memory: {} bytes>", self.data.len())
    }
}
