use std::time::Duration;

/// Failure of a vendor call, classified by what the caller may do about it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// Credentials were rejected. Needs an operator.
    #[error("vendor rejected credentials: {message}")]
    Auth { message: String },

    #[error("vendor rate limit exceeded{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Timeouts, connection failures, and 5xx responses.
    #[error("transient vendor failure: {message}")]
    Transient { message: String },

    #[error("vendor error (HTTP {status}): {message}")]
    Vendor { status: u16, message: String },

    /// No credential or adapter for the requested (team, channel) pair, or
    /// the credential is missing a required setting.
    #[error("channel not configured: {message}")]
    NotConfigured { message: String },

    #[error("unexpected vendor response: {message}")]
    InvalidResponse { message: String },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl AdapterError {
    /// Rate limits and transient failures clear up on their own; everything
    /// else is fatal for the operation that hit it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AdapterError::RateLimited { .. } | AdapterError::Transient { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AdapterError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Stable snake_case label used in audit details and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::Auth { .. } => "auth",
            AdapterError::RateLimited { .. } => "rate_limited",
            AdapterError::Transient { .. } => "transient",
            AdapterError::Vendor { .. } => "vendor",
            AdapterError::NotConfigured { .. } => "not_configured",
            AdapterError::InvalidResponse { .. } => "invalid_response",
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        AdapterError::InvalidResponse {
            message: message.into(),
        }
    }

    pub(crate) fn not_configured(message: impl Into<String>) -> Self {
        AdapterError::NotConfigured {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limit_and_transient_are_recoverable() {
        assert!(AdapterError::RateLimited { retry_after: None }.is_recoverable());
        assert!(AdapterError::Transient {
            message: "timeout".into()
        }
        .is_recoverable());
        assert!(!AdapterError::Auth {
            message: "expired".into()
        }
        .is_recoverable());
        assert!(!AdapterError::Vendor {
            status: 400,
            message: "bad".into()
        }
        .is_recoverable());
        assert!(!AdapterError::not_configured("x").is_recoverable());
        assert!(!AdapterError::invalid("x").is_recoverable());
    }

    #[test]
    fn rate_limit_message_carries_retry_after() {
        let err = AdapterError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.to_string(), "vendor rate limit exceeded (retry after 30s)");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(
            AdapterError::RateLimited { retry_after: None }.to_string(),
            "vendor rate limit exceeded"
        );
    }
}
