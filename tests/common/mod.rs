//! Fixtures shared by the integration tests: a mock document site, a mock
//! chat completions API, a PDF builder and a deterministic embedder
#![allow(dead_code)]

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pdf_rag::config::Config;
use pdf_rag::embedding::EmbeddingProvider;
use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const AGE_COOKIE: &str = "age_verified=1";

/// Build a PDF with one line of Courier text per page
pub fn make_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Page text served for each mock document
pub fn document_text(name: &str) -> &'static str {
    match name {
        "EFTA00001.pdf" => "Flight logs list every passenger on the island route.",
        "EFTA00002.pdf" => "Bank records show a wire transfer between two accounts.",
        "EFTA00003.pdf" => "Deposition transcript of the property manager.",
        _ => "Unlisted document.",
    }
}

#[derive(Clone, Default)]
pub struct SiteState {
    /// Requests that reached `/files/*`
    pub downloads: Arc<AtomicUsize>,
    /// Remaining 503 responses for `/flaky.pdf`
    pub flaky_failures: Arc<AtomicUsize>,
}

async fn listing(Path(n): Path<u32>) -> Response {
    let body = match n {
        1 => r#"<html><body>
            <a href="/files/EFTA00001.pdf">EFTA00001.pdf</a>
            <a href="/files/EFTA00002.pdf">EFTA00002.pdf</a>
            <a href="/files/EFTA00002.pdf">duplicate</a>
            <a href="/about">About</a>
        </body></html>"#,
        2 => r#"<html><body>
            <a href="/files/EFTA00003.pdf">EFTA00003.pdf</a>
        </body></html>"#,
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    Html(body).into_response()
}

async fn file(
    State(state): State<SiteState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.downloads.fetch_add(1, Ordering::SeqCst);

    let cookie = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if !cookie.contains(AGE_COOKIE) {
        return Html("<html>Are you 18 or older?</html>").into_response();
    }

    let pdf = make_pdf(&[document_text(&name)]);
    ([(header::CONTENT_TYPE, "application/pdf")], pdf).into_response()
}

async fn flaky(State(state): State<SiteState>) -> Response {
    let remaining = state.flaky_failures.load(Ordering::SeqCst);
    if remaining > 0 {
        state.flaky_failures.store(remaining - 1, Ordering::SeqCst);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let pdf = make_pdf(&["Recovered after a retry."]);
    ([(header::CONTENT_TYPE, "application/pdf")], pdf).into_response()
}

async fn html_page() -> Html<&'static str> {
    Html("<html>Not a PDF</html>")
}

async fn empty_pdf() -> Response {
    ([(header::CONTENT_TYPE, "application/pdf")], Vec::<u8>::new()).into_response()
}

async fn chat_completions(body: String) -> Response {
    let request: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
    let prompt = request["messages"][0]["content"].as_str().unwrap_or("");
    let answer = if prompt.contains("Flight logs") {
        "EFTA00001 contains the flight logs."
    } else {
        "I don't know."
    };
    axum::Json(serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": answer } }]
    }))
    .into_response()
}

/// Start the mock site on an ephemeral port
pub async fn start_site() -> (SocketAddr, SiteState) {
    let state = SiteState::default();
    let router = Router::new()
        .route("/datasets/:n", get(listing))
        .route("/files/:name", get(file))
        .route("/flaky.pdf", get(flaky))
        .route("/page.pdf", get(html_page))
        .route("/empty.pdf", get(empty_pdf))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

/// Config pointing every remote at the mock site, with no pauses
pub fn site_config(addr: SocketAddr, data_dir: &FsPath) -> Config {
    let mut config = Config::default();
    config.data.dir = data_dir.to_path_buf();

    config.fetch.base_url = format!("http://{}", addr);
    config.fetch.dataset_page_template = format!("http://{}/datasets/{{n}}", addr);
    config.fetch.first_dataset = 1;
    config.fetch.last_dataset = 2;
    config.fetch.age_verification_cookie = AGE_COOKIE.to_string();
    config.fetch.delay_ms = 0;
    config.fetch.scrape_delay_ms = 0;
    config.fetch.retry_backoff_ms = 1;
    config.fetch.min_existing_size = 10;

    config.chunking.chunk_size = 200;
    config.chunking.chunk_overlap = 20;

    config.llm.provider = "openai".to_string();
    config.llm.base_url = format!("http://{}/v1", addr);
    config.llm.api_key = Some("test-key".to_string());
    config.llm.max_retries = 0;
    config
}

/// Deterministic bag-of-words embedder so tests need no model download
pub struct HashEmbedder;

impl HashEmbedder {
    pub const DIM: usize = 32;
}

impl EmbeddingProvider for HashEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        use std::hash::{Hash, Hasher};

        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; Self::DIM];
                for word in text.split_whitespace() {
                    let word = word
                        .trim_matches(|c: char| !c.is_alphanumeric())
                        .to_lowercase();
                    let mut hasher = std::collections::hash_map::DefaultHasher::new();
                    word.hash(&mut hasher);
                    vector[(hasher.finish() % Self::DIM as u64) as usize] += 1.0;
                }
                let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-6);
                vector.iter().map(|v| v / norm).collect()
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        Self::DIM
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }
}
