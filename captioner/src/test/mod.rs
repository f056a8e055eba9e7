//! End-to-end tests: the full application against mocked vision and chat services.

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use serde_json::json;
use std::io::{Cursor, Read};
use url::Url;
use wiremock::matchers::{body_bytes, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::ZipArchive;

use crate::Application;
use crate::config::{Config, CorsOrigin};
use crate::test_utils::{create_test_config, jpeg_bytes, png_bytes};

fn config_for(vision: &MockServer, chat: &MockServer) -> Config {
    let mut config = create_test_config();
    config.vision.endpoint = Some(Url::parse(&vision.uri()).unwrap());
    config.chat.endpoint = Some(Url::parse(&chat.uri()).unwrap());
    config
}

fn dense_captions(text: &str) -> serde_json::Value {
    json!({
        "modelVersion": "2023-10-01",
        "denseCaptionsResult": {"values": [{"text": text, "confidence": 0.87}]},
        "tagsResult": {"values": [{"name": "outdoor", "confidence": 0.93}]},
        "readResult": {"blocks": []}
    })
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-35-turbo",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

fn archive_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            (file.name().to_string(), content)
        })
        .collect()
}

fn jpeg_part(bytes: Vec<u8>, file_name: &str) -> Part {
    Part::bytes(bytes).file_name(file_name).mime_type("image/jpeg")
}

async fn mount_vision(server: &MockServer, image: &[u8], caption: &str) {
    Mock::given(method("POST"))
        .and(path("/computervision/imageanalysis:analyze"))
        .and(header("Ocp-Apim-Subscription-Key", "vision-key"))
        .and(body_bytes(image.to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(dense_captions(caption)))
        .mount(server)
        .await;
}

async fn mount_chat(server: &MockServer, prompt_fragment: &str, caption: &str) {
    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-35-turbo-alttext-service/chat/completions"))
        .and(header("api-key", "chat-key"))
        .and(body_string_contains(prompt_fragment))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(caption)))
        .mount(server)
        .await;
}

#[test_log::test(tokio::test)]
async fn test_e2e_two_images_are_captioned_and_archived() {
    let vision = MockServer::start().await;
    let chat = MockServer::start().await;

    let bicycle = jpeg_bytes([220, 30, 30]);
    let dogs = jpeg_bytes([120, 90, 40]);
    mount_vision(&vision, &bicycle, "a red bicycle against a wall").await;
    mount_vision(&vision, &dogs, "two dogs running on grass").await;
    mount_chat(&chat, "1. a red bicycle against a wall", "A red bicycle.").await;
    mount_chat(&chat, "1. two dogs running on grass", "Two dogs playing.").await;

    let server = Application::new(config_for(&vision, &chat)).unwrap().into_test_server();

    let form = MultipartForm::new()
        .add_part("images", jpeg_part(bicycle, "IMG_0001.jpg"))
        .add_part("images", jpeg_part(dogs, "IMG_0002.jpg"));
    let response = server.post("/api/images/process").multipart(form).await;

    response.assert_status_ok();
    assert_eq!(response.header("content-disposition"), "attachment; filename=\"processed_images.zip\"");

    let entries = archive_entries(response.as_bytes());
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["A red bicycle.png", "Two dogs playing.png"]);
    for (_, content) in &entries {
        assert_eq!(image::guess_format(content).unwrap(), image::ImageFormat::Png);
        image::load_from_memory(content).unwrap();
    }

    assert_eq!(vision.received_requests().await.unwrap().len(), 2);
    assert_eq!(chat.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_e2e_service_failures_only_affect_their_image() {
    let vision = MockServer::start().await;
    let chat = MockServer::start().await;

    let good = jpeg_bytes([10, 200, 10]);
    let rejected = png_bytes([200, 10, 200]);
    mount_vision(&vision, &good, "a green field").await;
    Mock::given(method("POST"))
        .and(body_bytes(rejected.clone()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": {"code": "InvalidImageFormat"}})))
        .mount(&vision)
        .await;
    mount_chat(&chat, "1. a green field", "\"A wide green field.\"").await;

    let server = Application::new(config_for(&vision, &chat)).unwrap().into_test_server();

    let form = MultipartForm::new()
        .add_part("images", jpeg_part(good, "field.jpg"))
        .add_part("images", Part::bytes(rejected).file_name("odd.png").mime_type("image/png"));
    let response = server.post("/api/images/process").multipart(form).await;

    response.assert_status_ok();
    let names: Vec<String> = archive_entries(response.as_bytes()).into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["A wide green field.png", "image.png"]);
    assert_eq!(chat.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_e2e_chat_outage_still_returns_archive() {
    let vision = MockServer::start().await;
    let chat = MockServer::start().await;

    let image = jpeg_bytes([50, 50, 50]);
    mount_vision(&vision, &image, "a grey square").await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&chat)
        .await;

    let server = Application::new(config_for(&vision, &chat)).unwrap().into_test_server();

    let form = MultipartForm::new().add_part("images", jpeg_part(image, "grey.jpg"));
    let response = server.post("/api/images/process").multipart(form).await;

    response.assert_status_ok();
    let names: Vec<String> = archive_entries(response.as_bytes()).into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["image.png"]);
}

#[tokio::test]
async fn test_healthz() {
    let server = Application::new(create_test_config()).unwrap().into_test_server();

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "OK");
}

#[tokio::test]
async fn test_openapi_json_describes_process_endpoint() {
    let server = Application::new(create_test_config()).unwrap().into_test_server();

    let response = server.get("/api-docs/openapi.json").await;
    response.assert_status_ok();
    let content = response.text();
    assert!(content.contains("\"openapi\""));
    assert!(content.contains("/images/process"));

    server.get("/docs").await.assert_status_ok();
}

#[tokio::test]
async fn test_cors_allows_any_origin_by_default() {
    let server = Application::new(create_test_config()).unwrap().into_test_server();

    let response = server.get("/healthz").add_header("origin", "https://somewhere.example.com").await;
    assert_eq!(response.header("access-control-allow-origin"), "*");
}

#[tokio::test]
async fn test_cors_restricted_origins() {
    let mut config = create_test_config();
    config.cors.allowed_origins = vec![CorsOrigin::Url(Url::parse("https://app.example.com").unwrap())];
    let server = Application::new(config).unwrap().into_test_server();

    let allowed = server.get("/healthz").add_header("origin", "https://app.example.com").await;
    assert_eq!(allowed.header("access-control-allow-origin"), "https://app.example.com");

    let denied = server.get("/healthz").add_header("origin", "https://evil.example.com").await;
    assert!(denied.maybe_header("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_wrong_method_is_rejected() {
    let server = Application::new(create_test_config()).unwrap().into_test_server();

    let response = server.get("/api/images/process").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
}
