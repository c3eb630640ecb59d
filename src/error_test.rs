use super::*;

#[test]
fn auth_errors_map_to_their_own_codes() {
    assert_eq!(AuthError::MissingRefreshToken.error_code(), "E_MISSING_REFRESH_TOKEN");
    assert_eq!(AuthError::RefreshRejected { status: 403 }.error_code(), "E_REFRESH_REJECTED");
    assert_eq!(ApiError::Auth(AuthError::RefreshAborted).error_code(), "E_REFRESH_ABORTED");
}

#[test]
fn unauthorized_status_has_dedicated_code() {
    let err = ApiError::Status { status: 401, body: String::new() };
    assert_eq!(err.error_code(), "E_UNAUTHORIZED");
    assert!(err.is_auth_failure());
}

#[test]
fn server_errors_are_retryable() {
    assert!(ApiError::Status { status: 503, body: String::new() }.retryable());
    assert!(ApiError::Status { status: 429, body: String::new() }.retryable());
    assert!(ApiError::Request("connection reset".into()).retryable());
    assert!(!ApiError::Status { status: 404, body: String::new() }.retryable());
}

#[test]
fn auth_failures_are_never_retryable() {
    let err = ApiError::from(AuthError::RefreshFailed("boom".into()));
    assert!(!err.retryable());
    assert!(err.is_auth_failure());
    assert_eq!(err.to_string(), "authentication failed: refresh exchange failed: boom");
}

#[test]
fn non_auth_failures_do_not_log_out() {
    assert!(!ApiError::Request("timeout".into()).is_auth_failure());
    assert!(!ApiError::Status { status: 500, body: String::new() }.is_auth_failure());
}
