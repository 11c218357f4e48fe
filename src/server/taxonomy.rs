//! Failure taxonomy of the serving layer.

use axum::http::StatusCode;
use std::fmt;

const INTEGRATION_PREFIX: &str = "ExternalIntegrationError:";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    RateLimit,
    DataStoreConnection,
    Timeout,
    Configuration,
    Sync,
    DocumentUpload,
    EmailDelivery,
    PaymentProcessing,
    ExternalIntegration(String),
    Performance,
    Unknown,
}

impl ErrorKind {
    /// Canonical error-type tag used as the healing signature's type.
    pub fn tag(&self) -> String {
        let tag = match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Authentication => "AuthenticationError",
            ErrorKind::Authorization => "AuthorizationError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::RateLimit => "RateLimitError",
            ErrorKind::DataStoreConnection => "DataStoreConnectionError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Sync => "SyncError",
            ErrorKind::DocumentUpload => "DocumentUploadError",
            ErrorKind::EmailDelivery => "EmailDeliveryError",
            ErrorKind::PaymentProcessing => "PaymentProcessingError",
            ErrorKind::ExternalIntegration(name) => return format!("{}{}", INTEGRATION_PREFIX, name),
            ErrorKind::Performance => "PerformanceError",
            ErrorKind::Unknown => "UnknownError",
        };
        tag.to_string()
    }

    pub fn from_tag(tag: &str) -> Self {
        if let Some(name) = tag.strip_prefix(INTEGRATION_PREFIX) {
            return ErrorKind::ExternalIntegration(name.to_string());
        }
        match tag {
            "ValidationError" => ErrorKind::Validation,
            "AuthenticationError" => ErrorKind::Authentication,
            "AuthorizationError" => ErrorKind::Authorization,
            "NotFoundError" => ErrorKind::NotFound,
            "RateLimitError" => ErrorKind::RateLimit,
            "DataStoreConnectionError" => ErrorKind::DataStoreConnection,
            "TimeoutError" => ErrorKind::Timeout,
            "ConfigurationError" => ErrorKind::Configuration,
            "SyncError" => ErrorKind::Sync,
            "DocumentUploadError" => ErrorKind::DocumentUpload,
            "EmailDeliveryError" => ErrorKind::EmailDelivery,
            "PaymentProcessingError" => ErrorKind::PaymentProcessing,
            "PerformanceError" => ErrorKind::Performance,
            _ => ErrorKind::Unknown,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::DataStoreConnection => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the end user in place of the internal error text.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "The request contains invalid data. Please check your input and try again.",
            ErrorKind::Authentication => "Your session has expired or is invalid. Please sign in again.",
            ErrorKind::Authorization => "You do not have permission to perform this action.",
            ErrorKind::NotFound => "The requested resource was not found.",
            ErrorKind::RateLimit => "Too many requests. Please wait a moment and try again.",
            ErrorKind::DataStoreConnection => {
                "We are having trouble reaching our data services. Please try again shortly."
            }
            ErrorKind::Timeout => "The request took too long to complete. Please try again.",
            ErrorKind::Configuration => {
                "This feature is not configured correctly for your account. Our team has been notified."
            }
            ErrorKind::Sync => "Data synchronization failed. Our team has been notified.",
            ErrorKind::DocumentUpload => "The document could not be uploaded. Please try again.",
            ErrorKind::EmailDelivery => "A notification could not be delivered. We will retry automatically.",
            ErrorKind::PaymentProcessing => {
                "The payment could not be processed. Please verify your payment details."
            }
            ErrorKind::ExternalIntegration(_) => {
                "An external service is not responding. Please try again later."
            }
            ErrorKind::Performance => "The request is taking longer than expected.",
            ErrorKind::Unknown => "An unexpected error occurred. Our team has been notified.",
        }
    }

    /// Whether failures of this kind are handed to the healing pipeline.
    pub fn routes_to_healing(&self) -> bool {
        !matches!(
            self,
            ErrorKind::NotFound | ErrorKind::Authorization | ErrorKind::Performance
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(ErrorKind::Validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Authentication.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Authorization.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::RateLimit.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorKind::DataStoreConnection.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorKind::Timeout.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ErrorKind::ExternalIntegration("dat".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_tags_parse_back() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::DataStoreConnection,
            ErrorKind::EmailDelivery,
            ErrorKind::ExternalIntegration("samsara".into()),
            ErrorKind::Performance,
        ];
        for kind in kinds {
            assert_eq!(ErrorKind::from_tag(&kind.tag()), kind);
        }
        assert_eq!(ErrorKind::from_tag("SomethingElse"), ErrorKind::Unknown);
    }

    #[test]
    fn test_healing_routing() {
        assert!(ErrorKind::DataStoreConnection.routes_to_healing());
        assert!(ErrorKind::Unknown.routes_to_healing());
        assert!(!ErrorKind::NotFound.routes_to_healing());
        assert!(!ErrorKind::Authorization.routes_to_healing());
        assert!(!ErrorKind::Performance.routes_to_healing());
    }
}
