#[cfg(test)]
mod tests {
    use crate::error::{validation, AppError, OptionExt};

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(AppError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(AppError::InvalidInput("x".into()).code(), "INVALID_INPUT");
        assert_eq!(AppError::UncommittedChanges("/p".into()).code(), "UNCOMMITTED_CHANGES");
        assert_eq!(AppError::Cancelled("x".into()).code(), "CANCELLED");
        assert_eq!(AppError::Internal(anyhow::anyhow!("boom")).code(), "INTERNAL_ERROR");
        assert_eq!(
            AppError::ValidationError { field: "f".into(), message: "m".into() }.code(),
            "INVALID_INPUT"
        );
    }

    #[test]
    fn internal_errors_are_not_leaked_verbatim() {
        let body = AppError::Internal(anyhow::anyhow!("secret database string")).to_rpc_body();
        assert_eq!(body.code, "INTERNAL_ERROR");
        assert!(!body.message.contains("secret"));
        assert!(body.details.unwrap().get("errorId").is_some());
    }

    #[test]
    fn validation_errors_carry_field_details() {
        let body =
            AppError::ValidationError { field: "path".into(), message: "empty".into() }.to_rpc_body();
        assert_eq!(body.code, "INVALID_INPUT");
        let details = body.details.unwrap();
        assert_eq!(details["field"], "path");
    }

    #[test]
    fn option_ext_maps_none_to_not_found() {
        let present: Option<u8> = Some(1);
        assert_eq!(present.ok_or_not_found("thing").unwrap(), 1);
        let absent: Option<u8> = None;
        let err = absent.ok_or_not_found("thing").unwrap_err();
        assert!(matches!(err, AppError::NotFound(m) if m.contains("thing")));
    }

    #[test]
    fn io_errors_convert_with_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: AppError = io.into();
        assert!(matches!(err, AppError::Io(m) if m.contains("permission denied")));
    }

    #[test]
    fn validation_helpers_enforce_ranges() {
        assert!(validation::validate_path("/ok").is_ok());
        assert!(validation::validate_path("  ").is_err());
        assert!(validation::validate_path("bad\0path").is_err());

        assert!(validation::validate_importance(5).is_ok());
        assert!(validation::validate_importance(6).is_err());

        assert!(validation::validate_concurrency(None).is_ok());
        assert!(validation::validate_concurrency(Some(8)).is_ok());
        assert!(validation::validate_concurrency(Some(0)).is_err());
        assert!(validation::validate_concurrency(Some(1000)).is_err());
    }
}
