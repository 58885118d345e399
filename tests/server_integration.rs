//! HTTP API tests: a real server on a free port, backed by in-memory services.

mod common;

use common::*;
use docent::server;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};

const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Serve `h.assistant` in the background and return its base URL.
async fn spawn_server(h: &Harness) -> String {
    let port = find_free_port();
    let app = server::router(h.assistant.clone(), MAX_UPLOAD_BYTES);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

fn file_part(name: &str, text: &str) -> Part {
    Part::bytes(text.as_bytes().to_vec())
        .file_name(name.to_string())
        .mime_str("application/pdf")
        .unwrap()
}

// ─── Liveness ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_home_and_health() {
    let h = harness(document_reader);
    let base = spawn_server(&h).await;
    let client = reqwest::Client::new();

    let home = client.get(&base).send().await.unwrap();
    assert_eq!(home.status(), 200);
    assert_eq!(home.text().await.unwrap(), "Docent chatbot API is running!");

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
}

// ─── /chat ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_returns_response() {
    let h = harness(no_matching_documents);
    let base = spawn_server(&h).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "Summarize the Contoso proposal" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["response"],
        "The requested information is not found in the retrieved data."
    );
}

#[tokio::test]
async fn test_chat_upstream_failure_is_still_200() {
    let h = harness(quota_exceeded);
    let base = spawn_server(&h).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "What is the budget?" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let text = body["response"].as_str().unwrap();
    assert!(text.starts_with("Error retrieving insights:"), "got {}", text);
}

#[tokio::test]
async fn test_chat_malformed_body_is_still_200() {
    let h = harness(document_reader);
    let base = spawn_server(&h).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/chat", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["response"]
        .as_str()
        .unwrap()
        .starts_with("Error retrieving insights:"));
    assert_eq!(h.completion.request_count(), 0);
}

// ─── /upload_and_ask ────────────────────────────────────────────────

#[tokio::test]
async fn test_upload_and_ask_answers_from_document() {
    let h = harness(document_reader);
    let base = spawn_server(&h).await;

    let form = Form::new()
        .part(
            "file",
            file_part("proposal.pdf", "Budget: $500k. No compliance info."),
        )
        .text("question", "What is the budget?");
    let resp = reqwest::Client::new()
        .post(format!("{}/upload_and_ask", base))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["answer"].as_str().unwrap().contains("$500k"));
}

#[tokio::test]
async fn test_upload_and_ask_missing_question_is_400() {
    let h = harness(document_reader);
    let base = spawn_server(&h).await;

    let form = Form::new().part("file", file_part("a.pdf", "Budget: $1."));
    let resp = reqwest::Client::new()
        .post(format!("{}/upload_and_ask", base))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "bad_request");
    assert!(h.store.keys().is_empty());
}

#[tokio::test]
async fn test_upload_and_ask_missing_file_is_400() {
    let h = harness(document_reader);
    let base = spawn_server(&h).await;

    let form = Form::new().text("question", "What is the budget?");
    let resp = reqwest::Client::new()
        .post(format!("{}/upload_and_ask", base))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_upload_and_ask_empty_document_is_422() {
    let h = harness(document_reader);
    let base = spawn_server(&h).await;

    let form = Form::new()
        .part("file", file_part("scan.pdf", "\n\n"))
        .text("question", "What is the budget?");
    let resp = reqwest::Client::new()
        .post(format!("{}/upload_and_ask", base))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "empty_document");
    assert_eq!(h.completion.request_count(), 0);
}

#[tokio::test]
async fn test_upload_and_ask_upstream_failure_is_500_with_body() {
    let h = harness(quota_exceeded);
    let base = spawn_server(&h).await;

    let form = Form::new()
        .part("file", file_part("a.pdf", "Budget: $1."))
        .text("question", "What is the budget?");
    let resp = reqwest::Client::new()
        .post(format!("{}/upload_and_ask", base))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "completion_error");
    assert!(body["error"].as_str().unwrap().contains("429"));
}

// ─── /extract_text ──────────────────────────────────────────────────

#[tokio::test]
async fn test_extract_text_returns_text() {
    let h = harness(document_reader);
    let base = spawn_server(&h).await;

    let form = Form::new().part("file", file_part("notes.pdf", "Alpha.\n\nBeta."));
    let resp = reqwest::Client::new()
        .post(format!("{}/extract_text", base))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["text"], "Alpha. Beta.");
}

#[tokio::test]
async fn test_extract_text_empty_document_is_400() {
    let h = harness(document_reader);
    let base = spawn_server(&h).await;

    let form = Form::new().part("file", file_part("scan.pdf", "\n\n"));
    let resp = reqwest::Client::new()
        .post(format!("{}/extract_text", base))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No text extracted from document");
}

// ─── /followup_chat ─────────────────────────────────────────────────

#[tokio::test]
async fn test_followup_chat_answers_with_history() {
    let h = harness(document_reader);
    let base = spawn_server(&h).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/followup_chat", base))
        .json(&json!({
            "doc": "Customer: Contoso. Budget: $500k.",
            "history": [
                { "role": "user", "content": "Who is the customer?" },
                { "role": "assistant", "content": "Contoso." },
                { "role": "user", "content": "What is the budget?" }
            ]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], "The budget is $500k");
    assert_eq!(h.completion.last_request().turns.len(), 5);
}

#[tokio::test]
async fn test_followup_chat_rejects_unknown_role() {
    let h = harness(document_reader);
    let base = spawn_server(&h).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/followup_chat", base))
        .json(&json!({
            "doc": "Budget: $500k.",
            "history": [{ "role": "narrator", "content": "Once upon a time" }]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "bad_request");
}
