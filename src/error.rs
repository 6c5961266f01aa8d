// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Amount is unparseable, non-finite, negative or out of range.
    #[error("invalid numeric input: {0}")]
    InvalidNumericInput(String),

    /// Scaled price or size is not strictly positive.
    #[error("invalid order parameters: {0}")]
    InvalidOrderParameters(String),

    /// The wallet owner declined the signature prompt.
    #[error("signature request rejected by user")]
    UserRejected,

    /// Venue answered `status: "err"`; message is the venue's text, untouched.
    #[error("{0}")]
    VenueRejected(String),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("lending protocol error: {0}")]
    Lending(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("automation blocked: {0}")]
    Automation(String),
}

impl Error {
    /// Rejections are expected user behaviour; callers skip noisy logging/retries for them.
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Error::UserRejected)
    }

    /// Label used for metrics and the event journal.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidNumericInput(_) => "invalid_numeric_input",
            Error::InvalidOrderParameters(_) => "invalid_order_parameters",
            Error::UserRejected => "user_rejected",
            Error::VenueRejected(_) => "venue_rejected",
            Error::NetworkFailure(_) => "network_failure",
            Error::Signing(_) => "signing",
            Error::Decode(_) => "decode",
            Error::AssetNotFound(_) => "asset_not_found",
            Error::Lending(_) => "lending",
            Error::Config(_) => "config",
            Error::Automation(_) => "automation",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::NetworkFailure(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}
