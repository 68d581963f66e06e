//! REST surface of the fake application

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::task::JoinHandle;

use appcheck_common::{
    ArticleId, ArticlePatch, Credentials, LoginResponse, NewArticle, NewUser, UserId, UserPatch,
};

use super::{visible_to, LoginFault, Refusal, SharedStore};

pub struct FakeApp {
    pub base_url: String,
    pub store: SharedStore,
    server: JoinHandle<()>,
}

impl FakeApp {
    /// Serve on an ephemeral localhost port
    pub async fn start() -> Self {
        let store = SharedStore::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = router(store.clone());
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            store,
            server,
        }
    }

    pub fn user_exists(&self, id: UserId) -> bool {
        self.store.lock().user(id).is_some()
    }

    pub fn email_exists(&self, email: &str) -> bool {
        self.store.lock().find_by_email(email).is_some()
    }

    pub fn user_count(&self) -> usize {
        self.store.lock().user_count()
    }

    /// Answer the next API login with 401 whatever the credentials
    pub fn refuse_next_login(&self) {
        self.store.lock().push_login_fault(LoginFault::Refuse);
    }

    /// Hold the next API login for `delay` before answering it
    pub fn stall_next_login(&self, delay: std::time::Duration) {
        self.store.lock().push_login_fault(LoginFault::Stall(delay));
    }

    /// Register directly in the store, bypassing HTTP
    pub fn seed_user(&self, user: NewUser) -> UserId {
        self.store.lock().create_user(user).unwrap().id
    }
}

impl Drop for FakeApp {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/api/login", post(login))
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/:id",
            get(get_user)
                .put(replace_user)
                .patch(patch_user)
                .delete(delete_user),
        )
        .route("/api/articles", get(list_articles).post(create_article))
        .route(
            "/api/articles/:id",
            get(get_article)
                .put(replace_article)
                .patch(patch_article)
                .delete(delete_article),
        )
        .with_state(store)
}

fn caller(store: &SharedStore, headers: &HeaderMap) -> Option<UserId> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;
    store.lock().caller(token)
}

fn refused(refusal: Refusal) -> Response {
    let (status, message) = match refusal {
        Refusal::Invalid(reason) => (StatusCode::BAD_REQUEST, reason),
        Refusal::Duplicate => (StatusCode::CONFLICT, "Email not unique".to_string()),
        Refusal::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        Refusal::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
        Refusal::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, Refusal>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(refusal) => refused(refusal),
    }
}

async fn home() -> Html<&'static str> {
    Html("<html><body>appcheck fake</body></html>")
}

async fn login(State(store): State<SharedStore>, Json(credentials): Json<Credentials>) -> Response {
    let fault = store.lock().take_login_fault();
    match fault {
        Some(LoginFault::Refuse) => return refused(Refusal::Unauthorized),
        Some(LoginFault::Stall(delay)) => tokio::time::sleep(delay).await,
        None => {}
    }

    match store.lock().login(&credentials.email, &credentials.password) {
        Some(access_token) => Json(LoginResponse { access_token }).into_response(),
        None => refused(Refusal::Unauthorized),
    }
}

async fn list_users(State(store): State<SharedStore>, headers: HeaderMap) -> Response {
    let caller = caller(&store, &headers);
    let users: Vec<_> = store.lock().users().map(|u| visible_to(u, caller)).collect();
    Json(users).into_response()
}

async fn create_user(State(store): State<SharedStore>, Json(user): Json<NewUser>) -> Response {
    respond(StatusCode::CREATED, store.lock().create_user(user))
}

async fn get_user(
    State(store): State<SharedStore>,
    headers: HeaderMap,
    Path(id): Path<UserId>,
) -> Response {
    let caller = caller(&store, &headers);
    let user = store.lock().user(id).map(|u| visible_to(u, caller));
    respond(StatusCode::OK, user.ok_or(Refusal::NotFound))
}

async fn replace_user(
    State(store): State<SharedStore>,
    headers: HeaderMap,
    Path(id): Path<UserId>,
    Json(user): Json<NewUser>,
) -> Response {
    let caller = caller(&store, &headers);
    respond(StatusCode::OK, store.lock().replace_user(caller, id, user))
}

async fn patch_user(
    State(store): State<SharedStore>,
    headers: HeaderMap,
    Path(id): Path<UserId>,
    Json(patch): Json<UserPatch>,
) -> Response {
    let caller = caller(&store, &headers);
    respond(StatusCode::OK, store.lock().patch_user(caller, id, patch))
}

async fn delete_user(
    State(store): State<SharedStore>,
    headers: HeaderMap,
    Path(id): Path<UserId>,
) -> Response {
    let caller = caller(&store, &headers);
    let result = store
        .lock()
        .delete_user(caller, id)
        .map(|()| json!({ "message": "User deleted" }));
    respond(StatusCode::OK, result)
}

async fn list_articles(State(store): State<SharedStore>) -> Response {
    Json(store.lock().articles()).into_response()
}

async fn create_article(
    State(store): State<SharedStore>,
    headers: HeaderMap,
    Json(article): Json<NewArticle>,
) -> Response {
    let caller = caller(&store, &headers);
    respond(StatusCode::CREATED, store.lock().create_article(caller, article))
}

async fn get_article(State(store): State<SharedStore>, Path(id): Path<ArticleId>) -> Response {
    let article = store.lock().article(id).cloned();
    respond(StatusCode::OK, article.ok_or(Refusal::NotFound))
}

async fn replace_article(
    State(store): State<SharedStore>,
    headers: HeaderMap,
    Path(id): Path<ArticleId>,
    Json(article): Json<NewArticle>,
) -> Response {
    let caller = caller(&store, &headers);
    respond(StatusCode::OK, store.lock().replace_article(caller, id, article))
}

async fn patch_article(
    State(store): State<SharedStore>,
    headers: HeaderMap,
    Path(id): Path<ArticleId>,
    Json(patch): Json<ArticlePatch>,
) -> Response {
    let caller = caller(&store, &headers);
    respond(StatusCode::OK, store.lock().patch_article(caller, id, patch))
}

async fn delete_article(
    State(store): State<SharedStore>,
    headers: HeaderMap,
    Path(id): Path<ArticleId>,
) -> Response {
    let caller = caller(&store, &headers);
    let result = store
        .lock()
        .delete_article(caller, id)
        .map(|()| json!({ "message": "Article deleted" }));
    respond(StatusCode::OK, result)
}
