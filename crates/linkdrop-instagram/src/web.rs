//! `InstagramApi` over the public web endpoints (GraphQL shortcode query + AJAX login).

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use reqwest::{
    cookie::{CookieStore, Jar},
    StatusCode,
};
use serde::Deserialize;
use url::Url;

use linkdrop_core::{download::DEFAULT_USER_AGENT, errors::Error, formatting::truncate_chars};

use crate::api::{ApiError, InstagramApi, Post, PostNode};

const BASE_URL: &str = "https://www.instagram.com";
const GRAPHQL_URL: &str = "https://www.instagram.com/graphql/query/";
const LOGIN_URL: &str = "https://www.instagram.com/api/v1/web/accounts/login/ajax/";
const IG_APP_ID: &str = "936619743392459";
const POST_QUERY_HASH: &str = "2b0673e0dc4580674a88d426fe00ea90";

pub struct WebClient {
    http: reqwest::Client,
    jar: Arc<Jar>,
    logged_in: AtomicBool,
}

impl WebClient {
    pub fn new() -> linkdrop_core::Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .cookie_provider(jar.clone())
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::External(format!("instagram client build failed: {e}")))?;

        Ok(Self {
            http,
            jar,
            logged_in: AtomicBool::new(false),
        })
    }

    fn csrf_token(&self) -> Option<String> {
        let base = Url::parse(BASE_URL).ok()?;
        let header = self.jar.cookies(&base)?;
        let raw = header.to_str().ok()?;
        cookie_value(raw, "csrftoken")
    }

    async fn ensure_csrf(&self) -> Result<String, ApiError> {
        if let Some(token) = self.csrf_token() {
            return Ok(token);
        }
        let resp = self
            .http
            .get(format!("{BASE_URL}/accounts/login/"))
            .send()
            .await
            .map_err(map_transport)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }
        self.csrf_token()
            .ok_or_else(|| ApiError::LoginFailed("no csrf token issued".to_string()))
    }
}

#[async_trait]
impl InstagramApi for WebClient {
    async fn resolve_post(&self, shortcode: &str) -> Result<Post, ApiError> {
        let variables = serde_json::json!({ "shortcode": shortcode }).to_string();
        let resp = self
            .http
            .get(GRAPHQL_URL)
            .query(&[("query_hash", POST_QUERY_HASH), ("variables", variables.as_str())])
            .header("X-IG-App-ID", IG_APP_ID)
            .header("Referer", format!("{BASE_URL}/p/{shortcode}/"))
            .send()
            .await
            .map_err(map_transport)?;

        if resp.url().path().starts_with("/accounts/login") {
            return Err(ApiError::LoginRequired);
        }

        let status = resp.status();
        let body = resp.text().await.map_err(map_transport)?;
        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            ApiError::Unexpected(format!("invalid json ({e}): {}", truncate_chars(&body, 100)))
        })?;
        parse_post(shortcode, &value)
    }

    async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let csrf = self.ensure_csrf().await?;
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let enc_password = format!("#PWD_INSTAGRAM_BROWSER:0:{ts}:{password}");

        let resp = self
            .http
            .post(LOGIN_URL)
            .header("X-CSRFToken", csrf)
            .header("X-IG-App-ID", IG_APP_ID)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Referer", format!("{BASE_URL}/accounts/login/"))
            .form(&[
                ("username", username),
                ("enc_password", enc_password.as_str()),
                ("queryParams", "{}"),
                ("optIntoOneTap", "false"),
            ])
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(map_transport)?;
        interpret_login(status, &body)?;

        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(rename = "__typename", default)]
    typename: String,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    display_url: String,
    video_url: Option<String>,
    video_duration: Option<f64>,
    edge_sidecar_to_children: Option<RawEdges>,
}

#[derive(Deserialize)]
struct RawEdges {
    #[serde(default)]
    edges: Vec<RawEdge>,
}

#[derive(Deserialize)]
struct RawEdge {
    node: RawNode,
}

impl RawNode {
    fn to_node(&self) -> PostNode {
        PostNode {
            is_video: self.is_video,
            display_url: self.display_url.clone(),
            video_url: self.video_url.clone(),
            video_duration: self.video_duration,
        }
    }
}

fn parse_post(shortcode: &str, value: &serde_json::Value) -> Result<Post, ApiError> {
    let media = value
        .pointer("/data/shortcode_media")
        .or_else(|| value.pointer("/data/xdt_shortcode_media"))
        .filter(|m| !m.is_null());

    let Some(media) = media else {
        if value.get("status").and_then(|s| s.as_str()) == Some("fail") {
            return Err(classify_failure(StatusCode::OK, &value.to_string()));
        }
        return Err(ApiError::NotFound);
    };

    let raw: RawNode = serde_json::from_value(media.clone())
        .map_err(|e| ApiError::Unexpected(format!("unrecognized post shape: {e}")))?;

    let children = raw
        .edge_sidecar_to_children
        .as_ref()
        .map(|edges| edges.edges.iter().map(|e| e.node.to_node()).collect())
        .unwrap_or_default();

    Ok(Post {
        shortcode: shortcode.to_string(),
        typename: raw.typename.clone(),
        root: raw.to_node(),
        children,
    })
}

/// Map a non-success response to an error. Instagram often answers rate limits and
/// login walls with a 400 plus a JSON hint, so the body wins over the status code.
fn classify_failure(status: StatusCode, body: &str) -> ApiError {
    let json: Option<serde_json::Value> = serde_json::from_str(body).ok();
    if let Some(v) = &json {
        if v.get("require_login").and_then(|b| b.as_bool()) == Some(true) {
            return ApiError::LoginRequired;
        }
        let message = v
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("")
            .to_lowercase();
        if message.contains("wait a few minutes") || message.contains("rate limit") {
            return ApiError::RateLimited;
        }
        if message.contains("login_required") {
            return ApiError::LoginRequired;
        }
    }

    match status.as_u16() {
        401 => ApiError::Unauthorized,
        403 => ApiError::Forbidden,
        404 => ApiError::NotFound,
        429 => ApiError::RateLimited,
        500..=599 => ApiError::Unavailable(status.to_string()),
        _ => ApiError::Unexpected(format!("{status}: {}", truncate_chars(body, 100))),
    }
}

fn interpret_login(status: StatusCode, body: &str) -> Result<(), ApiError> {
    let json: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let Some(v) = json else {
        return Err(classify_login_status(status, body));
    };

    if v.get("authenticated").and_then(|b| b.as_bool()) == Some(true) {
        return Ok(());
    }
    if v.get("two_factor_required").and_then(|b| b.as_bool()) == Some(true) {
        return Err(ApiError::LoginFailed(
            "two-factor authentication required".to_string(),
        ));
    }
    let message = v.get("message").and_then(|m| m.as_str()).unwrap_or("");
    if message.to_lowercase().contains("wait a few minutes") || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ApiError::RateLimited);
    }
    if message == "checkpoint_required" {
        return Err(ApiError::LoginFailed("checkpoint required".to_string()));
    }
    if v.get("user").and_then(|b| b.as_bool()) == Some(false) {
        return Err(ApiError::LoginFailed("unknown user".to_string()));
    }
    if !status.is_success() {
        return Err(classify_login_status(status, body));
    }
    Err(ApiError::LoginFailed("bad credentials".to_string()))
}

fn classify_login_status(status: StatusCode, body: &str) -> ApiError {
    match classify_failure(status, body) {
        e @ (ApiError::RateLimited | ApiError::Unavailable(_)) => e,
        other => ApiError::LoginFailed(other.to_string()),
    }
}

fn map_transport(e: reqwest::Error) -> ApiError {
    if e.is_redirect() {
        // Redirect loops here are the login wall bouncing us around.
        return ApiError::LoginRequired;
    }
    if let Some(status) = e.status() {
        return classify_failure(status, "");
    }
    ApiError::Connection(e.to_string())
}

fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}
