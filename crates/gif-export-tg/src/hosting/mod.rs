//! Anonymous file hosting for outputs that can't be sent via Telegram
//! directly. Uses the catbox.moe API.

use crate::http::{self, HttpClientError};
use crate::prelude::*;
use crate::util::retry::retry_http;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Catbox accepts files up to this size
pub(crate) const MAX_UPLOAD_SIZE: u64 = 200 * crate::util::units::MB;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Config {
    #[serde(default = "default_url")]
    url: Url,

    /// Uploads are attributed to this account if set, otherwise they are
    /// anonymous
    userhash: Option<String>,
}

fn default_url() -> Url {
    Url::parse("https://catbox.moe/user/api.php")
        .unwrap_or_else(|err| panic!("BUG: the default catbox URL is invalid: {err}"))
}

#[derive(Debug, Error)]
pub(crate) enum HostingError {
    #[error("Failed to read the file to upload")]
    ReadFile { source: std::io::Error },

    #[error("The file is too big to upload ({size} bytes)")]
    TooBig { size: u64 },

    #[error("Failed to upload the file to catbox")]
    Upload { source: HttpClientError },

    #[error("Catbox responded with something that isn't a file URL: {body}")]
    BadResponse { body: String },
}

pub(crate) struct Catbox {
    http: http::Client,
    cfg: Config,
}

impl Catbox {
    pub(crate) fn new(cfg: Config, http: http::Client) -> Self {
        Self { http, cfg }
    }

    /// Uploads the file and returns its public URL
    #[instrument(skip_all, fields(path = %path.display()))]
    pub(crate) async fn upload(&self, path: &Path) -> Result<Url, HostingError> {
        let bytes = fs_err::tokio::read(path)
            .await
            .map_err(|source| HostingError::ReadFile { source })?;

        let size = bytes.len() as u64;
        if size > MAX_UPLOAD_SIZE {
            return Err(HostingError::TooBig { size });
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "animation.gif".to_owned());

        // Multipart bodies are consumed by sending, so the form is rebuilt
        // on every attempt
        let body = retry_http(
            || {
                self.http
                    .post(self.cfg.url.clone())
                    .multipart(self.form(bytes.clone(), file_name.clone()))
                    .read_text()
            },
            HttpClientError::is_retryable,
        )
        .with_duration_log("Uploaded the file to catbox")
        .await
        .map_err(|source| HostingError::Upload { source })?;

        parse_upload_response(&body)
    }

    fn form(&self, bytes: Vec<u8>, file_name: String) -> Form {
        let form = Form::new().text("reqtype", "fileupload");

        let form = match &self.cfg.userhash {
            Some(userhash) => form.text("userhash", userhash.clone()),
            None => form,
        };

        form.part("fileToUpload", Part::bytes(bytes).file_name(file_name))
    }
}

fn parse_upload_response(body: &str) -> Result<Url, HostingError> {
    let bad_response = || HostingError::BadResponse {
        body: body.to_owned(),
    };

    let url = Url::parse(body.trim()).map_err(|_| bad_response())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(bad_response());
    }

    Ok(url)
}
