use std::error::Error;
use std::fmt;

use crate::http::ErrorKind;

/// An error response returned from the storage service.
///
/// See the [`HTTP status and error codes for JSON`][1] documentation for more details.
///
/// [1]: https://cloud.google.com/storage/docs/json_api/v1/status-codes
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// An HTTP status value, without the textual description.
    ///
    /// Example values include: `400` (Bad Request), `401` (Unauthorized), and `404` (Not Found).
    pub code: u16,

    /// A container for the error details.
    #[serde(default)]
    pub errors: Vec<ErrorResponseItem>,

    /// Description of the error. Same as `errors.message`.
    #[serde(default)]
    pub message: String,
}

impl ErrorResponse {
    /// Builds the error from a response body, keeping the raw text when it is not the JSON error envelope.
    pub fn from_body(code: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorWrapper>(body) {
            Ok(wrapper) => wrapper.error,
            Err(_) => Self {
                code,
                errors: vec![],
                message: String::from_utf8_lossy(body).to_string(),
            },
        }
    }

    /// Returns `true` if the error is retriable according to the [GCS documentation][1].
    ///
    /// [1]: https://cloud.google.com/storage/docs/retry-strategy#retryable
    pub fn is_retriable(&self) -> bool {
        matches!(self.code, 408 | 429 | 500..=599)
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_retriable() {
            return ErrorKind::TransientTransport;
        }
        match self.code {
            400 => ErrorKind::InvalidArgument,
            401 | 403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::AlreadyExists,
            304 | 412 => ErrorKind::FailedPrecondition,
            _ => ErrorKind::Other,
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error for ErrorResponse {}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponseItem {
    /// The scope of the error. Example values include: `global` and `push`.
    #[serde(default)]
    pub domain: String,

    /// The specific item within the `locationType` that caused the error. For example, if you
    /// specify an invalid value for a parameter, the `location` will be the name of the parameter.
    pub location: Option<String>,

    /// The location or part of the request that caused the error.
    pub location_type: Option<String>,

    /// Description of the error.
    #[serde(default)]
    pub message: String,

    /// Example values include `invalid`, `invalidParameter`, and `required`.
    #[serde(default)]
    pub reason: String,
}

impl fmt::Display for ErrorResponseItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.message.fmt(f)
    }
}

/// The error response JSON format contains an extra object level that is inconvenient to include in our
/// error.
#[derive(serde::Deserialize, serde::Serialize)]
pub(crate) struct ErrorWrapper {
    pub(crate) error: ErrorResponse,
}
