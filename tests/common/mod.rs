//! In-process fakes shared by the integration tests: a GitHub REST API
//! served by axum on an ephemeral port, plus deterministic embedding and
//! chat models.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use repo_chat::config::Config;
use repo_chat::embedding::EmbeddingProvider;
use repo_chat::fetch::GitHubFetcher;
use repo_chat::llm::{ChatModel, PromptMessage};
use repo_chat::session::{Credentials, Services};

pub const TOKEN: &str = "ghp_test";
pub const COMMIT: &str = "c0ffee";

/// Files of the fake `acme/widgets` repository: (path, blob sha, bytes).
pub fn widget_files() -> Vec<(&'static str, &'static str, Vec<u8>)> {
    vec![
        ("src/lib.rs", "b-lib", b"pub fn widget() -> u32 { 42 }".to_vec()),
        (
            "src/main.rs",
            "b-main",
            b"fn main() { println!(\"{}\", widgets::widget()); }".to_vec(),
        ),
        ("src/README.md", "b-readme", b"# Widgets\n\nNotes.".to_vec()),
        ("src/logo.bin", "b-logo", vec![0xff, 0xfe, 0x00, 0x80]),
        ("docs/guide.md", "b-guide", b"How to use widgets.".to_vec()),
        ("build.rs", "b-build", b"fn main() {}".to_vec()),
    ]
}

/// How the fake answers tree listings.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub enum TreeMode {
    #[default]
    Complete,
    /// The recursive listing is truncated; per-directory listings are complete.
    RecursiveTruncated,
    /// Every listing is truncated.
    AllTruncated,
}

#[derive(Default)]
pub struct FakeGitHub {
    /// Every request path, in arrival order.
    pub requests: Mutex<Vec<String>>,
    /// Blob SHAs that were downloaded.
    pub blobs_requested: Mutex<Vec<String>>,
    blobs: HashMap<String, Vec<u8>>,
    /// Flat recursive listing of the root tree.
    tree: Vec<Value>,
    /// Non-recursive listing of each tree, by sha.
    subtrees: HashMap<String, Vec<Value>>,
    tree_mode: TreeMode,
}

impl FakeGitHub {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requested(&self, path_suffix: &str) -> bool {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.ends_with(path_suffix))
    }

    pub fn blobs_requested(&self) -> Vec<String> {
        let mut shas = self.blobs_requested.lock().unwrap().clone();
        shas.sort();
        shas
    }

    fn record(&self, path: String) {
        self.requests.lock().unwrap().push(path);
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", TOKEN))
        .unwrap_or(false)
}

async fn branch(
    State(gh): State<Arc<FakeGitHub>>,
    headers: HeaderMap,
    Path((owner, repo, branch)): Path<(String, String, String)>,
) -> Result<Json<Value>, StatusCode> {
    gh.record(format!("/repos/{}/{}/branches/{}", owner, repo, branch));
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if owner != "acme" || repo != "widgets" || branch != "main" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "name": "main",
        "commit": {
            "sha": COMMIT,
            "commit": {
                "tree": { "sha": "t-root" },
                "author": { "name": "Ada Lovelace" }
            }
        }
    })))
}

async fn tree(
    State(gh): State<Arc<FakeGitHub>>,
    headers: HeaderMap,
    Path((owner, repo, sha)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    gh.record(format!("/repos/{}/{}/git/trees/{}", owner, repo, sha));
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if query.contains_key("recursive") {
        let truncated = gh.tree_mode != TreeMode::Complete;
        return Ok(Json(json!({ "sha": sha, "tree": gh.tree, "truncated": truncated })));
    }
    let entries = gh.subtrees.get(&sha).ok_or(StatusCode::NOT_FOUND)?;
    let truncated = gh.tree_mode == TreeMode::AllTruncated;
    Ok(Json(json!({ "sha": sha, "tree": entries, "truncated": truncated })))
}

async fn blob(
    State(gh): State<Arc<FakeGitHub>>,
    headers: HeaderMap,
    Path((owner, repo, sha)): Path<(String, String, String)>,
) -> Result<Json<Value>, StatusCode> {
    gh.record(format!("/repos/{}/{}/git/blobs/{}", owner, repo, sha));
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    gh.blobs_requested.lock().unwrap().push(sha.clone());
    let bytes = gh.blobs.get(&sha).ok_or(StatusCode::NOT_FOUND)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    // GitHub wraps base64 content at 60 columns.
    let wrapped: Vec<String> = encoded
        .as_bytes()
        .chunks(60)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect();
    Ok(Json(json!({
        "sha": sha,
        "size": bytes.len(),
        "encoding": "base64",
        "content": wrapped.join("\n")
    })))
}

async fn commits(
    State(gh): State<Arc<FakeGitHub>>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    gh.record(format!("/repos/{}/{}/commits", owner, repo));
    match query.get("path").map(String::as_str) {
        Some("src/lib.rs") => Json(json!([{
            "sha": COMMIT,
            "commit": {
                "tree": { "sha": "t-root" },
                "author": { "name": "Ada Lovelace" }
            }
        }])),
        _ => Json(json!([])),
    }
}

/// Serve the fake API and return its base URL.
pub async fn spawn_fake_github() -> (String, Arc<FakeGitHub>) {
    spawn_fake_github_with(TreeMode::Complete).await
}

pub async fn spawn_fake_github_with(tree_mode: TreeMode) -> (String, Arc<FakeGitHub>) {
    let files = widget_files();
    let blob_entry = |path: &str, sha: &str, size: usize| {
        json!({ "path": path, "mode": "100644", "type": "blob", "sha": sha, "size": size })
    };
    let dir_entry =
        |path: &str, sha: &str| json!({ "path": path, "mode": "040000", "type": "tree", "sha": sha });

    let listing = files
        .iter()
        .map(|(path, sha, bytes)| blob_entry(path, sha, bytes.len()))
        .chain([dir_entry("src", "t-src"), dir_entry("docs", "t-docs")])
        .collect();

    let mut subtrees: HashMap<String, Vec<Value>> = HashMap::new();
    subtrees.insert(
        "t-root".to_string(),
        vec![dir_entry("src", "t-src"), dir_entry("docs", "t-docs")],
    );
    for (path, sha, bytes) in &files {
        let (parent, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (format!("t-{}", dir), name),
            None => ("t-root".to_string(), *path),
        };
        subtrees
            .entry(parent)
            .or_default()
            .push(blob_entry(name, sha, bytes.len()));
    }

    let gh = Arc::new(FakeGitHub {
        blobs: files
            .into_iter()
            .map(|(_, sha, bytes)| (sha.to_string(), bytes))
            .collect(),
        tree: listing,
        subtrees,
        tree_mode,
        ..Default::default()
    });

    let app = Router::new()
        .route("/repos/{owner}/{repo}/branches/{branch}", get(branch))
        .route("/repos/{owner}/{repo}/git/trees/{sha}", get(tree))
        .route("/repos/{owner}/{repo}/git/blobs/{sha}", get(blob))
        .route("/repos/{owner}/{repo}/commits", get(commits))
        .with_state(gh.clone());

    (serve(app).await, gh)
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Embeds text by two keyword features. Can be switched to fail outright
/// or to return malformed batches.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    /// Return one vector fewer than requested.
    pub short: AtomicBool,
    /// Give the last vector of each batch an extra dimension.
    pub ragged: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding service unavailable");
        }
        let mut vectors: Vec<Vec<f32>> = texts
            .iter()
            .map(|t| {
                vec![
                    if t.contains("fn") { 1.1 } else { 0.1 },
                    if t.contains("widget") { 1.1 } else { 0.1 },
                ]
            })
            .collect();
        if self.short.load(Ordering::SeqCst) {
            vectors.pop();
        }
        if self.ragged.load(Ordering::SeqCst) {
            if let Some(last) = vectors.last_mut() {
                last.push(0.5);
            }
        }
        Ok(vectors)
    }
}

/// Answers with a fixed string and records the prompts it saw.
#[derive(Default)]
pub struct ScriptedModel {
    pub prompts: Mutex<Vec<Vec<PromptMessage>>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("model overloaded");
        }
        Ok("widget() is defined in src/lib.rs".to_string())
    }
}

pub fn credentials() -> Credentials {
    Credentials::new(Some("sk-test".to_string()), Some(TOKEN.to_string()))
}

pub fn config_for(base: &str) -> Config {
    let mut config = Config::default();
    config.github.api_base = base.to_string();
    config.github.web_base = base.to_string();
    config.github.concurrency = 2;
    config
}

pub fn services(
    config: &Config,
    creds: &Credentials,
    embedder: Arc<KeywordEmbedder>,
    model: Arc<ScriptedModel>,
) -> Result<Services> {
    let token = creds.github_token.as_deref().unwrap_or_default();
    Ok(Services {
        source: Arc::new(GitHubFetcher::new(&config.github, token)?),
        embedder,
        model,
    })
}
