//! Client for the application's REST surface
//!
//! [`ApiClient`] issues raw requests and hands back an [`ApiResponse`]
//! carrying the response contract checks; [`Resource`] adds typed CRUD
//! helpers for `/api/users` and `/api/articles`.

use appcheck_common::{
    ApiUser, Article, ArticlePatch, HarnessConfig, NewArticle, NewUser, SessionToken, UserPatch,
};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// HTTP client bound to the application's base URL
///
/// Clones share one disposal flag; [`with_token`](Self::with_token) starts
/// a new context with its own.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<SessionToken>,
    request_timeout: Duration,
    disposed: Arc<AtomicBool>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> E2eResult<Self> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            request_timeout,
            disposed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn from_config(config: &HarnessConfig) -> E2eResult<Self> {
        Self::new(config.base_url.clone(), config.timeouts.request())
    }

    /// New context sending `Authorization: Bearer <token>`
    pub fn with_token(&self, token: impl Into<SessionToken>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: Some(token.into()),
            request_timeout: self.request_timeout,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Authenticated context for a token obtained from a successful login
    pub fn authenticated(&self, token: impl Into<SessionToken>) -> AuthContext {
        let token = token.into();
        AuthContext {
            client: self.with_token(token.clone()),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Refuse every later request made through this context
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!("Disposed API context for {}", self.base_url);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub async fn get(&self, path: &str) -> E2eResult<ApiResponse> {
        self.send(Method::GET, path, None::<&()>).await
    }

    pub async fn head(&self, path: &str) -> E2eResult<ApiResponse> {
        self.send(Method::HEAD, path, None::<&()>).await
    }

    pub async fn delete(&self, path: &str) -> E2eResult<ApiResponse> {
        self.send(Method::DELETE, path, None::<&()>).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> E2eResult<ApiResponse> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> E2eResult<ApiResponse> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> E2eResult<ApiResponse> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub fn users(&self) -> Users<'_> {
        Resource::new(self, "/api/users")
    }

    pub fn articles(&self) -> Articles<'_> {
        Resource::new(self, "/api/articles")
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> E2eResult<ApiResponse> {
        if self.is_disposed() {
            return Err(E2eError::Disposed(format!("{} {}", method, path)));
        }

        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!("{} {}", method, url);
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                E2eError::timeout(format!("{} {}", method, path), self.request_timeout)
            } else {
                E2eError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        debug!("{} {} -> {} ({} bytes)", method, path, status, body.len());

        Ok(ApiResponse {
            method,
            path: path.to_string(),
            status,
            content_type,
            body,
        })
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Bearer-token client bound to one user's session
#[derive(Clone, Debug)]
pub struct AuthContext {
    client: ApiClient,
    token: SessionToken,
}

impl AuthContext {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

impl Deref for AuthContext {
    type Target = ApiClient;

    fn deref(&self) -> &ApiClient {
        &self.client
    }
}

/// Fully read HTTP response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub method: Method,
    pub path: String,
    pub status: u16,
    pub content_type: Option<String>,
    body: Bytes,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_empty_body(&self) -> bool {
        self.body.is_empty()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> E2eResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| self.unexpected(format!("body is not the expected JSON: {}", e)))
    }

    pub fn expect_status(&self, expected: u16) -> E2eResult<&Self> {
        if self.status != expected {
            return Err(self.unexpected(format!("expected status {}", expected)));
        }
        Ok(self)
    }

    /// Status check plus `content-type: application/json`
    pub fn expect_json(&self, expected: u16) -> E2eResult<&Self> {
        self.expect_status(expected)?;
        if !self.is_json() {
            return Err(self.unexpected(format!(
                "expected application/json, got {}",
                self.content_type.as_deref().unwrap_or("no content-type")
            )));
        }
        Ok(self)
    }

    pub fn expect_json_body<T: DeserializeOwned>(&self, expected: u16) -> E2eResult<T> {
        self.expect_json(expected)?.json()
    }

    fn unexpected(&self, reason: String) -> E2eError {
        let mut reason = reason;
        if !self.body.is_empty() {
            let text = self.text();
            let snippet: String = text.chars().take(200).collect();
            reason = format!("{}; body: {}", reason, snippet);
        }
        E2eError::UnexpectedResponse {
            method: self.method.to_string(),
            path: self.path.clone(),
            status: self.status,
            reason,
        }
    }
}

/// Typed helpers over one REST collection
pub struct Resource<'a, R, N, P> {
    client: &'a ApiClient,
    collection: &'static str,
    _types: PhantomData<fn() -> (R, N, P)>,
}

pub type Users<'a> = Resource<'a, ApiUser, NewUser, UserPatch>;
pub type Articles<'a> = Resource<'a, Article, NewArticle, ArticlePatch>;

impl<'a, R, N, P> Resource<'a, R, N, P>
where
    R: DeserializeOwned,
    N: Serialize,
    P: Serialize,
{
    fn new(client: &'a ApiClient, collection: &'static str) -> Self {
        Self {
            client,
            collection,
            _types: PhantomData,
        }
    }

    pub fn path(&self) -> &'static str {
        self.collection
    }

    pub fn item_path(&self, id: u64) -> String {
        format!("{}/{}", self.collection, id)
    }

    pub async fn list(&self) -> E2eResult<Vec<R>> {
        self.client.get(self.collection).await?.expect_json_body(200)
    }

    pub async fn get(&self, id: u64) -> E2eResult<R> {
        self.client.get(&self.item_path(id)).await?.expect_json_body(200)
    }

    /// `POST`, expecting `201 Created`
    pub async fn create(&self, body: &N) -> E2eResult<R> {
        self.client.post(self.collection, body).await?.expect_json_body(201)
    }

    /// `PUT` with every field
    pub async fn replace(&self, id: u64, body: &N) -> E2eResult<R> {
        self.client.put(&self.item_path(id), body).await?.expect_json_body(200)
    }

    pub async fn patch(&self, id: u64, body: &P) -> E2eResult<R> {
        self.client.patch(&self.item_path(id), body).await?.expect_json_body(200)
    }

    pub async fn delete(&self, id: u64) -> E2eResult<()> {
        self.client.delete(&self.item_path(id)).await?.expect_json(200)?;
        Ok(())
    }

    /// Raw `HEAD` response, for header and empty-body checks
    pub async fn head(&self, id: u64) -> E2eResult<ApiResponse> {
        self.client.head(&self.item_path(id)).await
    }
}

impl Users<'_> {
    pub async fn find_by_email(&self, email: &str) -> E2eResult<Option<ApiUser>> {
        Ok(self.list().await?.into_iter().find(|u| u.email == email))
    }
}
