use std::time::Duration;

use portunus::{BackendKind, GatewayError, Result};

fn unreachable() -> GatewayError {
    GatewayError::ProviderUnreachable {
        backend: BackendKind::Local,
        detail: "connection refused".into(),
    }
}

fn timeout() -> GatewayError {
    GatewayError::ProviderTimeout {
        backend: BackendKind::Local,
        timeout: Duration::from_secs(30),
    }
}

fn overloaded() -> GatewayError {
    GatewayError::ProviderOverloaded {
        backend: BackendKind::Local,
        detail: "out of memory".into(),
    }
}

#[test]
fn test_error_display() {
    let err = GatewayError::ModelNotFound("llama3".to_string());
    assert!(err.to_string().contains("llama3"));
    assert!(timeout().to_string().contains("local"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(GatewayError::Unauthenticated)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Retry classification
// ============================================================================

#[test]
fn retryable_errors() {
    assert!(unreachable().is_retryable());
    assert!(timeout().is_retryable());
    assert!(overloaded().is_retryable());
    assert!(GatewayError::UpstreamRateLimited { retry_after: None }.is_retryable());
}

#[test]
fn terminal_errors() {
    assert!(!GatewayError::Unauthenticated.is_retryable());
    assert!(!GatewayError::InvalidInput("empty".into()).is_retryable());
    assert!(
        !GatewayError::RateLimited {
            retry_after: Duration::from_secs(5)
        }
        .is_retryable()
    );
    assert!(!GatewayError::ModelNotFound("m".into()).is_retryable());
    assert!(!GatewayError::UpstreamAuthFailure.is_retryable());
    assert!(!GatewayError::Configuration("c".into()).is_retryable());
    assert!(!GatewayError::Unknown("u".into()).is_retryable());
}

// ============================================================================
// Fallback classification
// ============================================================================

#[test]
fn availability_failures_allow_fallback() {
    assert!(unreachable().is_fallback_eligible());
    assert!(timeout().is_fallback_eligible());
    assert!(overloaded().is_fallback_eligible());
}

#[test]
fn request_level_failures_never_fall_back() {
    assert!(!GatewayError::InvalidInput("empty".into()).is_fallback_eligible());
    assert!(!GatewayError::ModelNotFound("m".into()).is_fallback_eligible());
    assert!(!GatewayError::UpstreamAuthFailure.is_fallback_eligible());
    assert!(!GatewayError::UpstreamRateLimited { retry_after: None }.is_fallback_eligible());
    assert!(!GatewayError::Unknown("u".into()).is_fallback_eligible());
}

#[test]
fn retry_after_hints() {
    let hint = Duration::from_secs(9);
    assert_eq!(
        GatewayError::UpstreamRateLimited {
            retry_after: Some(hint)
        }
        .retry_after(),
        Some(hint)
    );
    assert_eq!(
        GatewayError::RateLimited { retry_after: hint }.retry_after(),
        Some(hint)
    );
    assert_eq!(unreachable().retry_after(), None);
}

#[test]
fn backend_attribution() {
    assert_eq!(overloaded().backend(), Some(BackendKind::Local));
    assert_eq!(
        GatewayError::UpstreamRateLimited { retry_after: None }.backend(),
        Some(BackendKind::Cloud)
    );
    assert_eq!(GatewayError::InvalidInput("x".into()).backend(), None);
}

#[test]
fn codes_are_snake_case() {
    assert_eq!(timeout().code(), "provider_timeout");
    assert_eq!(GatewayError::UpstreamAuthFailure.code(), "upstream_auth_failure");
    assert_eq!(
        GatewayError::RateLimited {
            retry_after: Duration::ZERO
        }
        .code(),
        "rate_limited"
    );
}
