//! Mapping of AWS SDK failures onto the core error taxonomy

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use laptop_backup_core::Error;
use std::fmt::Display;

/// Service error code of a failed call, if the service returned one
pub(crate) fn error_code<E, R>(err: &SdkError<E, R>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    err.as_service_error().and_then(|e| e.code())
}

/// True when the call failed with any of `codes`
pub(crate) fn has_code<E, R>(err: &SdkError<E, R>, codes: &[&str]) -> bool
where
    E: ProvideErrorMetadata,
{
    error_code(err).is_some_and(|code| codes.contains(&code))
}

/// Any SDK failure is a provisioning error; nothing is retried here.
pub(crate) fn sdk_error<E, R>(resource: impl Into<String>, operation: &str, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let detail = match err.as_service_error() {
        Some(service) => match (service.code(), service.message()) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code.to_string(),
            _ => DisplayErrorContext(&err).to_string(),
        },
        None => DisplayErrorContext(&err).to_string(),
    };
    Error::provisioning(resource, format!("{} failed: {}", operation, detail))
}

/// A request could not be assembled from our own values
pub(crate) fn build_error(resource: impl Into<String>, err: impl Display) -> Error {
    Error::provisioning(resource, format!("invalid request: {}", err))
}

pub(crate) fn to_chrono(
    value: &aws_sdk_s3::primitives::DateTime,
) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::primitives::DateTime;

    #[test]
    fn test_to_chrono() {
        let converted = to_chrono(&DateTime::from_secs(1_767_225_600)).unwrap();
        assert_eq!(converted.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_build_error_is_provisioning() {
        let err = build_error("bucket acme", "missing field `status`");
        assert!(err.is_provisioning());
        assert!(err.to_string().contains("missing field"));
    }
}
