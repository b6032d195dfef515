//! HTTP upload-session client.
//!
//! ```text
//! POST {server}/api/folders/{folder_id}/uploads    {"name":…,"size":…} → {"upload_id":…}
//! PUT  {server}/api/uploads/{upload_id}/parts/{n}  Content-Range: bytes a-b/total
//! POST {server}/api/uploads/{upload_id}/complete
//! ```
//!
//! Credentials travel as `X-User-Id` / `X-User-Key` headers on every request.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use watchfolder_sync::{UploadError, UploadRequest, Uploader};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct HttpUploader {
    agent: ureq::Agent,
    server: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    upload_id: String,
}

impl HttpUploader {
    pub fn new(server: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build();
        Self {
            agent,
            server: server.trim_end_matches('/').to_string(),
        }
    }

    fn authed(&self, method: &str, url: &str, request: &UploadRequest<'_>) -> ureq::Request {
        self.agent
            .request(method, url)
            .set("X-User-Id", request.user_id)
            .set("X-User-Key", request.user_key)
    }

    fn create_session(
        &self,
        request: &UploadRequest<'_>,
        size: u64,
    ) -> Result<String, UploadError> {
        let url = format!("{}/api/folders/{}/uploads", self.server, request.folder_id);
        let response = self
            .authed("POST", &url, request)
            .send_json(json!({ "name": request.display_name, "size": size }))
            .map_err(into_upload_error)?;
        let session: SessionResponse = response
            .into_json()
            .map_err(|e| UploadError::Protocol(format!("bad session response: {e}")))?;
        Ok(session.upload_id)
    }

    fn send_parts(
        &self,
        request: &UploadRequest<'_>,
        upload_id: &str,
        size: u64,
    ) -> Result<(), UploadError> {
        let mut file = File::open(request.local_path).map_err(|e| io_error(request.local_path, e))?;
        let mut buf = Vec::new();

        for (index, (start, end)) in part_ranges(size, request.part_size_bytes)
            .into_iter()
            .enumerate()
        {
            buf.resize((end - start + 1) as usize, 0);
            file.read_exact(&mut buf)
                .map_err(|e| io_error(request.local_path, e))?;

            let url = format!("{}/api/uploads/{upload_id}/parts/{index}", self.server);
            self.authed("PUT", &url, request)
                .set("Content-Type", "application/octet-stream")
                .set("Content-Range", &format!("bytes {start}-{end}/{size}"))
                .send_bytes(&buf)
                .map_err(into_upload_error)?;
        }
        Ok(())
    }

    fn complete(&self, request: &UploadRequest<'_>, upload_id: &str) -> Result<(), UploadError> {
        let url = format!("{}/api/uploads/{upload_id}/complete", self.server);
        self.authed("POST", &url, request)
            .call()
            .map_err(into_upload_error)?;
        Ok(())
    }
}

impl Uploader for HttpUploader {
    fn upload(&self, request: &UploadRequest<'_>) -> Result<(), UploadError> {
        let size = std::fs::metadata(request.local_path)
            .map_err(|e| io_error(request.local_path, e))?
            .len();
        let upload_id = self.create_session(request, size)?;
        self.send_parts(request, &upload_id, size)?;
        self.complete(request, &upload_id)
    }
}

/// Inclusive byte ranges covering `size` bytes in `part_size` chunks.
fn part_ranges(size: u64, part_size: u64) -> Vec<(u64, u64)> {
    let part_size = part_size.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < size {
        let end = (start + part_size).min(size) - 1;
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

fn io_error(path: &Path, source: std::io::Error) -> UploadError {
    UploadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn into_upload_error(err: ureq::Error) -> UploadError {
    match err {
        ureq::Error::Status(status, response) => UploadError::Rejected {
            status,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => UploadError::Transport {
            message: transport.to_string(),
        },
    }
}
