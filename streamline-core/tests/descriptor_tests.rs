//! Integration tests for descriptors and configuration.

use streamline_core::{
    ApiError, HttpMethod, Language, QueryKey, RequestDescriptor, ServiceConfiguration,
};

#[derive(serde::Serialize)]
struct NewPost {
    title: String,
}

#[test]
fn test_get_never_carries_body() {
    let payload = NewPost {
        title: "hello".into(),
    };
    let descriptor = RequestDescriptor::get("posts").with_body(&payload).unwrap();
    assert_eq!(descriptor.method(), HttpMethod::Get);
    assert!(descriptor.body().is_none());

    let descriptor = RequestDescriptor::post("posts").with_body(&payload).unwrap();
    assert_eq!(descriptor.body().unwrap()["title"], "hello");
}

#[test]
fn test_descriptor_is_replayable() {
    let descriptor = RequestDescriptor::get("/posts/")
        .with_query(QueryKey::Page, 2)
        .with_query(QueryKey::Limit, 20)
        .with_path_param(7);
    let replay = descriptor.clone();
    assert_eq!(descriptor, replay);
    assert_eq!(replay.full_path(), "posts/7");
    assert_eq!(replay.query().get(&QueryKey::Page).map(String::as_str), Some("2"));
}

#[test]
fn test_configuration_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"baseUrl": "https://api.example.com", "port": 8443, "language": "pt-BR"}"#,
    )
    .unwrap();

    let config = ServiceConfiguration::from_json_file(&path).unwrap();
    assert_eq!(config.port, Some(8443));
    assert_eq!(config.language, Language::PtBr);
    assert!(config.api_key.is_none());
}

#[test]
fn test_error_surface_is_localized() {
    let err = ApiError::NoInternetConnection;
    assert_ne!(err.message(Language::PtBr), err.message(Language::EnUs));
}
