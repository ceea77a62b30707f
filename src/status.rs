use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub enum Status {
    #[default]
    Ok,

    Internal(String),
    InvalidArgument(String),
    NotFound(String),
    NotConfigured(String),
    AuthExpired(String),
    RateLimited(String),
    Network(String),
    Parse(String),
    Cancelled,
}

impl Status {
    pub fn new(msg: &str, err: impl Error) -> Self {
        Status::Internal(format!("{msg}: '{err}'"))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Status::Internal(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Status::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Status::NotFound(msg.into())
    }

    pub fn not_configured(msg: impl Into<String>) -> Self {
        Status::NotConfigured(msg.into())
    }

    pub fn auth_expired(msg: impl Into<String>) -> Self {
        Status::AuthExpired(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Status::RateLimited(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Status::Network(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Status::Parse(msg.into())
    }

    /// Whether the job layer may retry the failed call.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Status::RateLimited(_) | Status::Network(_))
    }
}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Self {
        Self::new("IO error", err)
    }
}

impl From<serde_json::Error> for Status {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(format!("serde error: '{err}'"))
    }
}

impl From<reqwest::Error> for Status {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::Network(format!("reqwest error: '{err}'"));
        }
        match err.status() {
            Some(code) if code.as_u16() == 429 => Self::RateLimited(format!("'{err}'")),
            Some(code) if code.is_server_error() => Self::Network(format!("'{err}'")),
            Some(code) if code.as_u16() == 401 => Self::AuthExpired(format!("'{err}'")),
            _ => Self::new("reqwest error", err),
        }
    }
}

impl From<sqlx::Error> for Status {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("row was not found"),
            err => Self::new("sqlx error", err),
        }
    }
}

impl Error for Status {}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "Ok"),
            Status::Internal(msg) => write!(f, "Internal error: {msg}"),
            Status::InvalidArgument(msg) => write!(f, "Invalid argument error: {msg}"),
            Status::NotFound(msg) => write!(f, "Not found error: {msg}"),
            Status::NotConfigured(msg) => write!(f, "Not configured: {msg}"),
            Status::AuthExpired(msg) => write!(f, "Auth expired: {msg}"),
            Status::RateLimited(msg) => write!(f, "Rate limited: {msg}"),
            Status::Network(msg) => write!(f, "Network error: {msg}"),
            Status::Parse(msg) => write!(f, "Parse error: {msg}"),
            Status::Cancelled => write!(f, "Cancelled by user"),
        }
    }
}
