use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use secrecy::SecretString;
use serde_json::json;

use category_feed::{AppConfig, AppError, GeoResult, GeocodingClient};

fn client(server: &Server) -> GeocodingClient {
    let config = AppConfig {
        google_api_key: Some(SecretString::from("test-key".to_string())),
        google_geocode_endpoint: server.url("/maps/api/geocode/json").to_string(),
        ..AppConfig::default()
    };
    GeocodingClient::maybe_new(&config)
        .expect("client creation")
        .expect("api key configured")
}

#[tokio::test]
async fn resolves_first_result() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/maps/api/geocode/json"),
            request::query(url_decoded(contains(("latlng", "40,-75")))),
            request::query(url_decoded(contains(("key", "test-key")))),
        ])
        .respond_with(json_encoded(json!({
            "status": "OK",
            "results": [
                {
                    "geometry": {"location": {"lat": 40.01, "lng": -75.01}},
                    "formatted_address": "123 Main St"
                },
                {
                    "geometry": {"location": {"lat": 41.0, "lng": -76.0}},
                    "formatted_address": "Somewhere else"
                }
            ]
        }))),
    );

    let result = client(&server)
        .reverse_geocode(40.0, -75.0)
        .await
        .expect("lookup");
    assert_eq!(
        result,
        Some(GeoResult {
            latitude: 40.01,
            longitude: -75.01,
            formatted_address: "123 Main St".into(),
        })
    );
}

#[tokio::test]
async fn zero_results_resolve_to_none() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/maps/api/geocode/json"))
            .times(2)
            .respond_with(json_encoded(json!({"status": "ZERO_RESULTS", "results": []}))),
    );

    let client = client(&server);
    assert_eq!(client.reverse_geocode(0.0, 0.0).await.unwrap(), None);
    assert_eq!(client.reverse_geocode(0.5, 0.5).await.unwrap(), None);
}

#[tokio::test]
async fn api_error_status_is_surfaced() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/maps/api/geocode/json"))
            .respond_with(json_encoded(json!({
                "status": "REQUEST_DENIED",
                "error_message": "The provided API key is invalid.",
                "results": []
            }))),
    );

    let err = client(&server)
        .reverse_geocode(1.0, 2.0)
        .await
        .expect_err("denied");
    match err {
        AppError::Geocoding { status, message } => {
            assert_eq!(status, "REQUEST_DENIED");
            assert!(message.contains("invalid"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn http_failure_does_not_leak_key() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/maps/api/geocode/json"))
            .respond_with(status_code(500)),
    );

    let err = client(&server)
        .reverse_geocode(1.0, 2.0)
        .await
        .expect_err("server error");
    assert!(matches!(err, AppError::Http(_)));
    assert!(!err.to_string().contains("test-key"));
}
