mod basic_ext;

use reqwest::StatusCode;
use thiserror::Error;

pub(crate) mod prelude {
    pub(crate) use super::basic_ext::RequestBuilderBasicExt as _;
}

pub(crate) type Client = reqwest::Client;

#[derive(Debug, Error)]
pub(crate) enum HttpClientError {
    #[error("HTTP request failed")]
    Request { source: reqwest::Error },

    #[error("HTTP request failed with status code {status}:\n{body}")]
    BadResponseStatusCode { status: StatusCode, body: String },

    #[error("Failed to read HTTP response payload")]
    ReadPayload { source: reqwest::Error },
}

impl HttpClientError {
    /// Network failures and server-side errors may go away if the request
    /// is sent again. Client errors won't.
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            Self::Request { source } | Self::ReadPayload { source } => {
                source.is_connect() || source.is_timeout() || source.is_request()
            }
            Self::BadResponseStatusCode { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
        }
    }
}

pub(crate) fn create_client() -> Client {
    teloxide::net::default_reqwest_settings()
        .user_agent(concat!(
            "GifExportTelegramBot/",
            env!("CARGO_PKG_VERSION"),
        ))
        .build()
        .unwrap_or_else(|err| panic!("BUG: failed to build the HTTP client: {err:#?}"))
}
