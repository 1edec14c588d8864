use std::fmt::Display;
use std::str::FromStr;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use storage_gax::retry::RetryError;

use crate::http::transport::TransportResponse;
use crate::sign::SignedURLError;

pub mod batch;
pub mod buckets;
pub mod copy_writer;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod multipart;
pub mod objects;
pub mod page;
pub mod read_channel;
pub mod resumable_upload_client;
pub mod storage_client;
pub mod transport;
pub mod write_channel;

pub(crate) const BASE_PATH: &str = "/storage/v1";
pub(crate) const UPLOAD_PATH: &str = "/upload/storage/v1";
pub(crate) const BATCH_PATH: &str = "/batch/storage/v1";

/// The failure categories a caller can act on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    TransientTransport,
    NotFound,
    PermissionDenied,
    FailedPrecondition,
    AlreadyExists,
    ProtocolInternal,
    SigningFailure,
    RetryExhausted,
    ChannelClosed,
    Other,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The caller supplied something the request cannot be built from.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An error returned from the storage service.
    #[error(transparent)]
    Response(#[from] error::ErrorResponse),

    /// An error from the underlying HTTP client.
    #[error(transparent)]
    HttpClient(#[from] reqwest::Error),

    /// An error from one of the middleware used.
    #[error(transparent)]
    HttpMiddleware(anyhow::Error),

    /// An error from a token source.
    #[error("token source failed: {0}")]
    TokenSource(Box<dyn std::error::Error + Send + Sync>),

    /// A response body that is not what the endpoint documents.
    #[error("unexpected response body: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// A retryable error kept failing until the retry setting gave up.
    #[error("retry exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    /// The batch response could not be matched with the submitted items.
    #[error("batch protocol error: {0}")]
    ProtocolInternal(String),

    #[error(transparent)]
    SignedURL(#[from] SignedURLError),

    #[error("channel is closed")]
    ChannelClosed,
}

impl From<reqwest_middleware::Error> for Error {
    fn from(error: reqwest_middleware::Error) -> Self {
        match error {
            reqwest_middleware::Error::Middleware(err) => Error::HttpMiddleware(err),
            reqwest_middleware::Error::Reqwest(err) => Error::HttpClient(err),
        }
    }
}

impl From<RetryError<Error>> for Error {
    fn from(error: RetryError<Error>) -> Self {
        match error {
            RetryError::Terminal(e) => e,
            RetryError::Exhausted { attempts, last } => Error::RetryExhausted {
                attempts,
                source: Box::new(last),
            },
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Response(e) => e.kind(),
            Error::HttpClient(_) | Error::HttpMiddleware(_) => ErrorKind::TransientTransport,
            Error::TokenSource(_) => ErrorKind::PermissionDenied,
            Error::Deserialize(_) => ErrorKind::Other,
            Error::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Error::ProtocolInternal(_) => ErrorKind::ProtocolInternal,
            Error::SignedURL(e) => e.kind(),
            Error::ChannelClosed => ErrorKind::ChannelClosed,
        }
    }

    /// Returns the HTTP status of a service error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Response(e) => Some(e.code),
            _ => None,
        }
    }

    pub(crate) fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// The classifier shared by every call of the client.
pub(crate) fn is_retryable(error: &Error) -> bool {
    error.kind() == ErrorKind::TransientTransport
}

/// Checks whether a response is successful and returns it, or returns an error.
pub(crate) fn check_response_status(response: TransportResponse) -> Result<TransportResponse, Error> {
    if response.is_success() {
        return Ok(response);
    }
    Err(Error::Response(error::ErrorResponse::from_body(response.status, &response.body)))
}

pub(crate) fn parse_json<T: for<'de> Deserialize<'de>>(response: &TransportResponse) -> Result<T, Error> {
    Ok(serde_json::from_slice(&response.body)?)
}

pub(crate) trait Escape {
    fn escape(&self) -> String;
}

impl Escape for String {
    fn escape(&self) -> String {
        self.as_str().escape()
    }
}

impl Escape for str {
    fn escape(&self) -> String {
        utf8_percent_encode(self, ENCODE_SET).to_string()
    }
}

const ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'*').remove(b'-').remove(b'.').remove(b'_');

pub(crate) fn from_str_option<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: FromStr,
    T::Err: Display,
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => T::from_str(&s).map_err(de::Error::custom).map(Some),
        Some(Value::Number(num)) => T::from_str(&num.to_string()).map_err(de::Error::custom).map(Some),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(de::Error::custom("Incorrect type")),
    }
}
