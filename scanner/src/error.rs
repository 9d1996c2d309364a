use derive_more::derive::Display;
use http::StatusCode;

/// Failure to open a scan window on the platform radio
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum RadioError {
    #[display("radio unavailable: {_0}")]
    Unavailable(String),
    #[display("a scan window is already open on the radio")]
    AlreadyScanning,
}

impl std::error::Error for RadioError {}

/// Failure of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum DeliveryError {
    #[display("transport failure: {_0}")]
    Transport(String),
    #[display("request timed out")]
    Timeout,
    #[display("collector rejected request with status {_0}")]
    Rejected(StatusCode),
}

impl std::error::Error for DeliveryError {}

impl DeliveryError {
    /// Whether another attempt can possibly succeed.
    ///
    /// 4xx rejections are final only when `abandon_on_client_error` is set;
    /// 408 and 429 stay retryable either way.
    pub fn is_retryable(&self, abandon_on_client_error: bool) -> bool {
        match self {
            DeliveryError::Transport(_) | DeliveryError::Timeout => true,
            DeliveryError::Rejected(status) => {
                if !abandon_on_client_error || !status.is_client_error() {
                    return true;
                }
                matches!(
                    *status,
                    StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
                )
            }
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(error: reqwest::Error) -> Self {
        tracing::debug!("Reqwest error: {:?}", error);
        if error.is_timeout() {
            return DeliveryError::Timeout;
        }
        match error.status() {
            Some(status) => DeliveryError::Rejected(status),
            None => DeliveryError::Transport(error.to_string()),
        }
    }
}
