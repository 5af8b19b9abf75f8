use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::auth("invalid_credentials", "no").http_status(), 401);
    assert_eq!(AppError::from(SessionError::Unavailable("down".into())).http_status(), 503);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn session_error_maps_to_unavailable() {
    let err: AppError = SessionError::Unavailable("backend offline".into()).into();
    assert_eq!(err.code_str(), "session_store_error");
    assert_eq!(err.http_status(), 503);
    assert!(err.message().contains("backend offline"));
}

#[test]
fn id_generation_failure_is_a_store_error() {
    let err = AppError::from(SessionError::IdGeneration("no entropy".into()));
    assert_eq!(err.code_str(), "session_store_error");
    assert_eq!(err.http_status(), 503);
}

#[test]
fn into_response_uses_status() {
    let resp = AppError::internal("missing_request_context", "resolver layer not installed").into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn serde_tagging_is_snake_case() {
    let v = serde_json::to_value(AppError::auth("a", "b")).unwrap();
    assert_eq!(v["type"], "auth");
    assert_eq!(v["code"], "a");
}
