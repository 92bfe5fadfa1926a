use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;

/// Byte progress callback: `(bytes_written, total_if_known)`.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Sync);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// HTTP seam used by every remote component.
pub trait Transport: Send + Sync {
    fn get_text(&self, url: &str) -> Result<HttpResponse>;

    /// Streams `url` into `out_path`, returning the number of bytes written.
    /// A non-success status is an error and leaves nothing at `out_path`.
    fn download(&self, url: &str, out_path: &Path, progress: ProgressFn<'_>) -> Result<u64>;
}

pub struct ReqwestTransport {
    text_client: Client,
    download_client: Client,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration, download_timeout: Option<Duration>) -> Result<Self> {
        let text_client = Client::builder()
            .user_agent(user_agent())
            .timeout(request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        let download_client = Client::builder()
            .user_agent(user_agent())
            .connect_timeout(request_timeout)
            .timeout(download_timeout)
            .build()
            .context("failed to build HTTP download client")?;
        Ok(Self {
            text_client,
            download_client,
        })
    }
}

impl Transport for ReqwestTransport {
    fn get_text(&self, url: &str) -> Result<HttpResponse> {
        let response = self
            .text_client
            .get(url)
            .send()
            .with_context(|| format!("request failed: {url}"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .with_context(|| format!("failed to read response body: {url}"))?;
        Ok(HttpResponse { status, body })
    }

    fn download(&self, url: &str, out_path: &Path, progress: ProgressFn<'_>) -> Result<u64> {
        let mut response = self
            .download_client
            .get(url)
            .send()
            .with_context(|| format!("download request failed: {url}"))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "download failed with HTTP status {}: {url}",
                response.status().as_u16()
            ));
        }
        let total = response.content_length();

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create download dir: {}", parent.display()))?;
        }
        let part_path = part_path_for(out_path);
        let written = match stream_to_file(&mut response, &part_path, total, progress) {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&part_path);
                return Err(err.context(format!("download interrupted: {url}")));
            }
        };
        finalize_part_file(&part_path, out_path)?;
        Ok(written)
    }
}

pub fn part_path_for(out_path: &Path) -> PathBuf {
    out_path.with_file_name(format!(
        "{}.part",
        out_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("download")
    ))
}

/// Moves a completed `.part` file over `out_path`, replacing any previous file.
pub fn finalize_part_file(part_path: &Path, out_path: &Path) -> Result<()> {
    if out_path.exists() {
        fs::remove_file(out_path)
            .with_context(|| format!("failed to replace file: {}", out_path.display()))?;
    }
    fs::rename(part_path, out_path).with_context(|| {
        format!(
            "failed to move downloaded file into place: {}",
            out_path.display()
        )
    })
}

fn stream_to_file(
    reader: &mut impl Read,
    part_path: &Path,
    total: Option<u64>,
    progress: ProgressFn<'_>,
) -> Result<u64> {
    let file = File::create(part_path)
        .with_context(|| format!("failed to create {}", part_path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut buffer = vec![0_u8; 64 * 1024];
    let mut written = 0_u64;
    loop {
        let read = reader.read(&mut buffer).context("failed reading response body")?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .with_context(|| format!("failed writing {}", part_path.display()))?;
        written += read as u64;
        progress(written, total);
    }
    writer
        .flush()
        .with_context(|| format!("failed flushing {}", part_path.display()))?;
    Ok(written)
}

fn user_agent() -> String {
    format!("clistrap/{}", env!("CARGO_PKG_VERSION"))
}
