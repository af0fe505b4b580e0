//! Integration tests for folio-server API endpoints
//!
//! Each test builds the full router over an in-memory database with fake
//! identity, image, speech and conversion services.

mod common;

use axum::http::{header, StatusCode};
use common::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::io::{Cursor, Read};
use tower::ServiceExt;

const BOOK: &str = "### Chapter One\n\nFirst paragraph.\n\nSecond paragraph.\n\n### Chapter Two\n\n#### Scene\n\nThird paragraph.";

async fn create_manuscript(app: &TestApp, token: &str, title: &str, markdown: &str) -> Value {
    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "POST",
            "/api/manuscripts",
            token,
            json!({ "title": title, "markdown": markdown }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    extract_json(response.into_body()).await
}

async fn chunk_page(app: &TestApp, manuscript: &str) -> Value {
    let response = app
        .router
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/manuscripts/{}/chunks?page_size=100", manuscript),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    extract_json(response.into_body()).await
}

async fn chunk_texts(app: &TestApp, manuscript: &str) -> Vec<String> {
    chunk_page(app, manuscript).await["chunks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["text"].as_str().unwrap().to_string())
        .collect()
}

async fn chunk_ids(app: &TestApp, manuscript: &str) -> Vec<String> {
    chunk_page(app, manuscript).await["chunks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["guid"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Health and authentication
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app().await;

    let response = app.router.clone().oneshot(request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "folio-server");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = setup_app().await;

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/manuscripts"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = extract_json(response.into_body()).await;
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");

    let response = app
        .router
        .clone()
        .oneshot(authed("GET", "/api/manuscripts", "forged-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_other_author_is_forbidden() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "Alice's Book", BOOK).await;
    let id = created["guid"].as_str().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "PUT",
            &format!("/api/manuscripts/{}", id),
            BOB,
            json!({ "title": "Stolen" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .router
        .clone()
        .oneshot(authed("DELETE", &format!("/api/manuscripts/{}", id), BOB))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Reading stays public
    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/manuscripts/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Manuscripts
// ============================================================================

#[tokio::test]
async fn test_manuscript_lifecycle() {
    let app = setup_app().await;

    let created = create_manuscript(&app, ALICE, "My Novel", BOOK).await;
    assert_eq!(created["title"], "My Novel");
    assert_eq!(created["author_id"], "alice");
    assert_eq!(created["chunk_count"], 3);
    let id = created["guid"].as_str().unwrap().to_string();

    // Listing is per author
    let response = app
        .router
        .clone()
        .oneshot(authed("GET", "/api/manuscripts", ALICE))
        .await
        .unwrap();
    let listing = extract_json(response.into_body()).await;
    assert_eq!(listing.as_array().unwrap().len(), 1);
    assert_eq!(listing[0]["chunk_count"], 3);

    let response = app
        .router
        .clone()
        .oneshot(authed("GET", "/api/manuscripts", BOB))
        .await
        .unwrap();
    let listing = extract_json(response.into_body()).await;
    assert!(listing.as_array().unwrap().is_empty());

    // Rename
    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "PUT",
            &format!("/api/manuscripts/{}", id),
            ALICE,
            json!({ "title": "Renamed", "image_settings": { "style": "Watercolour", "size": "512x512" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = extract_json(response.into_body()).await;
    assert_eq!(updated["title"], "Renamed");
    assert_eq!(updated["image_settings"]["style"], "Watercolour");

    // Generate an image so the asset folder exists, then delete
    let first = chunk_ids(&app, &id).await[0].clone();
    let response = app
        .router
        .clone()
        .oneshot(authed("POST", &format!("/api/chunks/{}/image", first), ALICE))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(app.state.store.image_dir(&id).exists());

    let response = app
        .router
        .clone()
        .oneshot(authed("DELETE", &format!("/api/manuscripts/{}", id), ALICE))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!app.state.store.image_dir(&id).exists());

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/manuscripts/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/chunks/{}", first)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_rejects_empty_markdown() {
    let app = setup_app().await;

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "POST",
            "/api/manuscripts",
            ALICE,
            json!({ "title": "Empty", "markdown": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = extract_json(response.into_body()).await;
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_validate_markdown() {
    let app = setup_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/markdown/validate")
                .body(axum::body::Body::from("### Heading\n\nBody."))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await["valid"], true);

    let response = app
        .router
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/markdown/validate")
                .body(axum::body::Body::from(vec![0xff, 0xfe, 0x00, 0x41]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(extract_json(response.into_body()).await["valid"], false);
}

// ============================================================================
// Reader paging
// ============================================================================

#[tokio::test]
async fn test_chunk_paging() {
    let app = setup_app().await;
    let markdown: String = (1..=5)
        .map(|n| format!("Paragraph {}.\n\n", n))
        .collect();
    let created = create_manuscript(&app, ALICE, "Paged", &markdown).await;
    let id = created["guid"].as_str().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/manuscripts/{}/chunks?page=2&page_size=2", id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response.into_body()).await;
    assert_eq!(json["manuscript_id"], id);
    assert_eq!(json["page"], 2);
    assert_eq!(json["page_size"], 2);
    assert_eq!(json["total_chunks"], 5);
    assert_eq!(json["total_pages"], 3);

    let chunks = json["chunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0]["text"], "Paragraph 3.");
    assert_eq!(chunks[0]["order"], 2);
    assert!(chunks[0]["image_guid"].is_null());

    // Out of range pages clamp to the last page
    let response = app
        .router
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/manuscripts/{}/chunks?page=99&page_size=2", id),
        ))
        .await
        .unwrap();
    let json = extract_json(response.into_body()).await;
    assert_eq!(json["page"], 3);
    assert_eq!(json["chunks"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_chunks_of_unknown_manuscript() {
    let app = setup_app().await;

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/manuscripts/no-such-id/chunks"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Chunk editing
// ============================================================================

#[tokio::test]
async fn test_merge_and_split() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "Edits", "Hello\n\nworld\n\nTail.").await;
    let id = created["guid"].as_str().unwrap().to_string();
    let ids = chunk_ids(&app, &id).await;

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "POST",
            "/api/chunks/merge",
            ALICE,
            json!({ "first_chunk_id": ids[0], "second_chunk_id": ids[1] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let merged = extract_json(response.into_body()).await;
    assert_eq!(merged["text"], "Hello\n\nworld");
    assert_eq!(chunk_texts(&app, &id).await, vec!["Hello\n\nworld", "Tail."]);

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "POST",
            "/api/chunks/split",
            ALICE,
            json!({ "chunk_id": ids[0], "split_point": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let split = extract_json(response.into_body()).await;
    assert_eq!(split["head"]["text"], "Hello");
    assert_eq!(split["tail"]["text"], "world");
    assert_eq!(split["tail"]["order"], 1);

    let page = chunk_page(&app, &id).await;
    let orders: Vec<i64> = page["chunks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["order"].as_i64().unwrap())
        .collect();
    assert_eq!(orders, vec![0, 1, 2]);
    assert_eq!(chunk_texts(&app, &id).await, vec!["Hello", "world", "Tail."]);
}

#[tokio::test]
async fn test_merge_rejects_non_adjacent() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "Edits", "A.\n\nB.\n\nC.").await;
    let id = created["guid"].as_str().unwrap().to_string();
    let ids = chunk_ids(&app, &id).await;

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "POST",
            "/api/chunks/merge",
            ALICE,
            json!({ "first_chunk_id": ids[0], "second_chunk_id": ids[2] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(chunk_texts(&app, &id).await, vec!["A.", "B.", "C."]);
}

#[tokio::test]
async fn test_split_rejects_bad_offset() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "Edits", "Short.").await;
    let id = created["guid"].as_str().unwrap().to_string();
    let ids = chunk_ids(&app, &id).await;

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "POST",
            "/api/chunks/split",
            ALICE,
            json!({ "chunk_id": ids[0], "split_point": 60 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reorder_insert_update_delete() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "Edits", "A.\n\nB.\n\nC.").await;
    let id = created["guid"].as_str().unwrap().to_string();
    let ids = chunk_ids(&app, &id).await;

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/api/chunks/{}/reorder", ids[0]),
            ALICE,
            json!({ "direction": "down" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await["order"], 1);
    assert_eq!(chunk_texts(&app, &id).await, vec!["B.", "A.", "C."]);

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/api/chunks/{}/reorder", ids[0]),
            ALICE,
            json!({ "direction": "sideways" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/api/manuscripts/{}/chunks", id),
            ALICE,
            json!({ "position": 0, "text": "Preface.", "heading_level1": "Preface" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let inserted = extract_json(response.into_body()).await;
    assert_eq!(inserted["order"], 0);
    assert_eq!(chunk_texts(&app, &id).await, vec!["Preface.", "B.", "A.", "C."]);

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "PUT",
            &format!("/api/chunks/{}", ids[2]),
            ALICE,
            json!({ "text": "C, revised." }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await["text"], "C, revised.");

    let response = app
        .router
        .clone()
        .oneshot(authed("DELETE", &format!("/api/chunks/{}", ids[1]), ALICE))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(chunk_texts(&app, &id).await, vec!["Preface.", "A.", "C, revised."]);

    // Another author cannot edit
    let response = app
        .router
        .clone()
        .oneshot(authed("DELETE", &format!("/api/chunks/{}", ids[0]), BOB))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ============================================================================
// Images
// ============================================================================

#[tokio::test]
async fn test_generate_serve_and_delete_image() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "Pictures", BOOK).await;
    let id = created["guid"].as_str().unwrap().to_string();
    let first = chunk_ids(&app, &id).await[0].clone();

    let response = app
        .router
        .clone()
        .oneshot(authed("POST", &format!("/api/chunks/{}/image", first), ALICE))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let image = extract_json(response.into_body()).await;
    assert_eq!(image["chunk_guid"], first.as_str());
    assert!(image["prompt"].as_str().unwrap().contains("First paragraph."));
    let image_id = image["guid"].as_str().unwrap().to_string();

    let page = chunk_page(&app, &id).await;
    assert_eq!(page["chunks"][0]["image_guid"], image_id.as_str());

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/images/{}", image_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(extract_bytes(response.into_body()).await, FAKE_PNG);

    let file = app
        .state
        .store
        .image_path(&id, image["file_name"].as_str().unwrap());
    assert!(file.exists());

    let response = app
        .router
        .clone()
        .oneshot(authed("DELETE", &format!("/api/images/{}", image_id), ALICE))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!file.exists());

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/images/{}", image_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_image_generation_failure_is_bad_gateway() {
    let app = setup_app().await;
    let markdown = format!("Please {} now.", FAIL_MARKER);
    let created = create_manuscript(&app, ALICE, "Broken", &markdown).await;
    let id = created["guid"].as_str().unwrap().to_string();
    let first = chunk_ids(&app, &id).await[0].clone();

    let response = app
        .router
        .clone()
        .oneshot(authed("POST", &format!("/api/chunks/{}/image", first), ALICE))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = extract_json(response.into_body()).await;
    assert_eq!(json["error"]["code"], "UPSTREAM_ERROR");
}

#[tokio::test]
async fn test_batch_generation_collects_failures() {
    let app = setup_app().await;
    let markdown = format!("One.\n\nTwo {}.\n\nThree.", FAIL_MARKER);
    let created = create_manuscript(&app, ALICE, "Batch", &markdown).await;
    let id = created["guid"].as_str().unwrap().to_string();
    let ids = chunk_ids(&app, &id).await;

    let response = app
        .router
        .clone()
        .oneshot(authed("POST", &format!("/api/manuscripts/{}/images/generate", id), ALICE))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = extract_json(response.into_body()).await;
    assert_eq!(report["generated"], 2);
    assert_eq!(report["skipped"], 0);
    assert_eq!(report["failed"].as_array().unwrap().len(), 1);
    assert_eq!(report["failed"][0]["chunk_id"], ids[1].as_str());

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/api/manuscripts/{}/images/generate", id),
            ALICE,
            json!({ "skip_existing": true }),
        ))
        .await
        .unwrap();
    let report = extract_json(response.into_body()).await;
    assert_eq!(report["generated"], 0);
    assert_eq!(report["skipped"], 2);
    assert_eq!(report["failed"].as_array().unwrap().len(), 1);
}

// ============================================================================
// Export
// ============================================================================

#[tokio::test]
async fn test_export_markdown_with_image() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "My Novel", BOOK).await;
    let id = created["guid"].as_str().unwrap().to_string();
    let first = chunk_ids(&app, &id).await[0].clone();

    let response = app
        .router
        .clone()
        .oneshot(authed("POST", &format!("/api/chunks/{}/image", first), ALICE))
        .await
        .unwrap();
    let image = extract_json(response.into_body()).await;
    let image_id = image["guid"].as_str().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/manuscripts/{}/export", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/markdown"));
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains(".md"));

    let markdown = String::from_utf8(extract_bytes(response.into_body()).await).unwrap();
    assert!(markdown.starts_with("# My Novel"));
    assert_eq!(markdown.matches("### Chapter One").count(), 1);
    assert!(markdown.contains("#### Scene"));
    assert!(markdown.contains(&format!("http://folio.test/api/images/{}", image_id)));

    let image_at = markdown.find("http://folio.test/api/images/").unwrap();
    let text_at = markdown.find("First paragraph.").unwrap();
    assert!(image_at < text_at);
}

#[tokio::test]
async fn test_export_docx_goes_through_converter() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "My Novel", BOOK).await;
    let id = created["guid"].as_str().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/manuscripts/{}/export?format=docx", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );

    let body = String::from_utf8(extract_bytes(response.into_body()).await).unwrap();
    assert!(body.starts_with("DOCX\n# My Novel"));
    assert!(body.contains("Third paragraph."));
}

#[tokio::test]
async fn test_export_epub_package() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "My Novel", BOOK).await;
    let id = created["guid"].as_str().unwrap().to_string();
    let first = chunk_ids(&app, &id).await[0].clone();

    let response = app
        .router
        .clone()
        .oneshot(authed("POST", &format!("/api/chunks/{}/image", first), ALICE))
        .await
        .unwrap();
    let image = extract_json(response.into_body()).await;
    let file_name = image["file_name"].as_str().unwrap().to_string();

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/manuscripts/{}/export?format=EPUB", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/epub+zip");

    let bytes = extract_bytes(response.into_body()).await;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

    let mut mimetype = String::new();
    archive.by_name("mimetype").unwrap().read_to_string(&mut mimetype).unwrap();
    assert_eq!(mimetype, "application/epub+zip");
    assert!(archive.by_name(&format!("OEBPS/images/{}", file_name)).is_ok());

    let mut content = String::new();
    archive
        .by_name("OEBPS/content.xhtml")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert!(content.contains("Chapter One"));
    assert!(content.contains(&format!("images/{}", file_name)));
}

async fn export_body(app: &TestApp, manuscript: &str, format: &str) -> Vec<u8> {
    let response = app
        .router
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/manuscripts/{}/export?format={}", manuscript, format),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK, "export as {} failed", format);
    extract_bytes(response.into_body()).await
}

async fn generate_first_image(app: &TestApp, manuscript: &str) -> Value {
    let first = chunk_ids(app, manuscript).await[0].clone();
    let response = app
        .router
        .clone()
        .oneshot(authed("POST", &format!("/api/chunks/{}/image", first), ALICE))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    extract_json(response.into_body()).await
}

#[tokio::test]
async fn test_export_skips_images_missing_on_disk() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "My Novel", BOOK).await;
    let id = created["guid"].as_str().unwrap().to_string();

    let image = generate_first_image(&app, &id).await;
    let image_id = image["guid"].as_str().unwrap();
    let file_name = image["file_name"].as_str().unwrap();
    std::fs::remove_file(app.state.store.image_path(&id, file_name)).unwrap();

    let markdown = String::from_utf8(export_body(&app, &id, "markdown").await).unwrap();
    assert!(markdown.contains("First paragraph."));
    assert!(!markdown.contains("!["));
    assert!(!markdown.contains(image_id));

    let docx = String::from_utf8(export_body(&app, &id, "docx").await).unwrap();
    assert!(docx.contains("Third paragraph."));
    assert!(!docx.contains(file_name));

    let epub = export_body(&app, &id, "epub").await;
    let mut archive = zip::ZipArchive::new(Cursor::new(epub)).unwrap();
    assert!(archive.by_name(&format!("OEBPS/images/{}", file_name)).is_err());
    let mut content = String::new();
    archive
        .by_name("OEBPS/content.xhtml")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert!(content.contains("First paragraph."));
    assert!(!content.contains("<img"));
}

#[tokio::test]
async fn test_epub_skips_unreadable_image() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "My Novel", BOOK).await;
    let id = created["guid"].as_str().unwrap().to_string();

    // A directory in place of the file exists on disk but cannot be read
    let image = generate_first_image(&app, &id).await;
    let path = app.state.store.image_path(&id, image["file_name"].as_str().unwrap());
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let epub = export_body(&app, &id, "epub").await;
    let mut archive = zip::ZipArchive::new(Cursor::new(epub)).unwrap();
    let mut content = String::new();
    archive
        .by_name("OEBPS/content.xhtml")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert!(content.contains("Chapter One"));
    assert!(!content.contains("<img"));

    let mut opf = String::new();
    archive
        .by_name("OEBPS/content.opf")
        .unwrap()
        .read_to_string(&mut opf)
        .unwrap();
    assert!(!opf.contains("image/png"));
}

#[tokio::test]
async fn test_export_rejects_unknown_format() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "My Novel", BOOK).await;
    let id = created["guid"].as_str().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/manuscripts/{}/export?format=pdf", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/manuscripts/missing/export"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_images_in_parts() {
    let app = setup_app_with_archive_size(2).await;
    let created = create_manuscript(&app, ALICE, "Gallery", "One.\n\nTwo.\n\nThree.").await;
    let id = created["guid"].as_str().unwrap().to_string();

    let response = app
        .router
        .clone()
        .oneshot(authed("POST", &format!("/api/manuscripts/{}/images/generate", id), ALICE))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/manuscripts/{}/download-images", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert_eq!(response.headers()["x-total-chunks"], "3");
    assert_eq!(response.headers()["x-next-chunk"], "2");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("0000-"));
    assert!(names[1].starts_with("0001-"));

    // Last part carries no continuation headers
    let response = app
        .router
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/manuscripts/{}/download-images?chunk=2", id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-next-chunk").is_none());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 1);

    let response = app
        .router
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/manuscripts/{}/download-images?chunk=99", id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Narration
// ============================================================================

#[tokio::test]
async fn test_narration_create_and_stream() {
    let app = setup_app().await;
    let created = create_manuscript(&app, ALICE, "Spoken", "Read me aloud.").await;
    let id = created["guid"].as_str().unwrap().to_string();
    let chunk = chunk_ids(&app, &id).await[0].clone();

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/chunks/{}/narration", chunk)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .clone()
        .oneshot(authed("POST", &format!("/api/chunks/{}/narration", chunk), ALICE))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let narration = extract_json(response.into_body()).await;
    assert_eq!(narration["voice"], "alloy");

    let response = app
        .router
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/api/chunks/{}/narration", chunk),
            ALICE,
            json!({ "voice": "nova" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/chunks/{}/narration", chunk)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    let audio = String::from_utf8(extract_bytes(response.into_body()).await).unwrap();
    assert_eq!(audio, "MP3[nova]:Read me aloud.");

    let page = chunk_page(&app, &id).await;
    assert!(page["chunks"][0]["narration_guid"].is_string());
}
