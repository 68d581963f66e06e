//! In-process stand-ins for the application under test
//!
//! `FakeApp` serves the REST surface over an in-memory [`Store`];
//! `FakeBrowser` renders the UI screens from the same store.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use appcheck_common::{
    ApiUser, Article, ArticleId, ArticlePatch, HarnessConfig, NewArticle, NewUser, Timeouts,
    UserId, UserPatch,
};
use appcheck_e2e::fixture::{FixtureGraph, Worker};
use appcheck_e2e::{BrowserEngine, Catalog};

pub mod app;
pub mod site;

pub use app::FakeApp;
pub use site::{BrowserStats, FakeBrowser};

pub const MASK: &str = "****";

pub type SharedStore = Arc<Mutex<Store>>;

/// Why the store refused a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    Invalid(String),
    Duplicate,
    Unauthorized,
    Forbidden,
    NotFound,
}

/// Misbehavior injected into the next `POST /api/login`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFault {
    Refuse,
    Stall(Duration),
}

#[derive(Default)]
pub struct Store {
    users: BTreeMap<UserId, ApiUser>,
    articles: BTreeMap<ArticleId, Article>,
    tokens: HashMap<String, UserId>,
    login_faults: VecDeque<LoginFault>,
    next_user: UserId,
    next_article: ArticleId,
}

impl Store {
    pub fn push_login_fault(&mut self, fault: LoginFault) {
        self.login_faults.push_back(fault);
    }

    pub fn take_login_fault(&mut self) -> Option<LoginFault> {
        self.login_faults.pop_front()
    }

    pub fn create_user(&mut self, user: NewUser) -> Result<ApiUser, Refusal> {
        if !user.email.contains('@') || user.password.is_empty() {
            return Err(Refusal::Invalid("email and password are required".into()));
        }
        if self.find_by_email(&user.email).is_some() {
            return Err(Refusal::Duplicate);
        }
        self.next_user += 1;
        let created = ApiUser {
            id: self.next_user,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password: user.password,
            avatar: user.avatar,
        };
        self.users.insert(created.id, created.clone());
        Ok(created)
    }

    pub fn login(&mut self, email: &str, password: &str) -> Option<String> {
        let id = self.check_credentials(email, password)?.id;
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), id);
        Some(token)
    }

    pub fn check_credentials(&self, email: &str, password: &str) -> Option<&ApiUser> {
        self.find_by_email(email).filter(|u| u.password == password)
    }

    pub fn caller(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).copied()
    }

    pub fn user(&self, id: UserId) -> Option<&ApiUser> {
        self.users.get(&id)
    }

    pub fn users(&self) -> impl Iterator<Item = &ApiUser> {
        self.users.values()
    }

    pub fn find_by_email(&self, email: &str) -> Option<&ApiUser> {
        self.users.values().find(|u| u.email == email)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn replace_user(
        &mut self,
        caller: Option<UserId>,
        id: UserId,
        user: NewUser,
    ) -> Result<ApiUser, Refusal> {
        self.owned_user(caller, id)?;
        if self.users.values().any(|u| u.id != id && u.email == user.email) {
            return Err(Refusal::Duplicate);
        }
        let replaced = ApiUser {
            id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password: user.password,
            avatar: user.avatar,
        };
        self.users.insert(id, replaced.clone());
        Ok(replaced)
    }

    pub fn patch_user(
        &mut self,
        caller: Option<UserId>,
        id: UserId,
        patch: UserPatch,
    ) -> Result<ApiUser, Refusal> {
        let user = self.owned_user(caller, id)?;
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(first_name) = patch.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            user.last_name = last_name;
        }
        if let Some(password) = patch.password {
            user.password = password;
        }
        if patch.avatar.is_some() {
            user.avatar = patch.avatar;
        }
        Ok(user.clone())
    }

    /// Removes the user and every session it holds
    pub fn delete_user(&mut self, caller: Option<UserId>, id: UserId) -> Result<(), Refusal> {
        self.owned_user(caller, id)?;
        self.users.remove(&id);
        self.tokens.retain(|_, owner| *owner != id);
        Ok(())
    }

    /// Account deletion from the dashboard, already authenticated by session
    pub fn delete_account(&mut self, email: &str) {
        if let Some(id) = self.find_by_email(email).map(|u| u.id) {
            let _ = self.delete_user(Some(id), id);
        }
    }

    fn owned_user(&mut self, caller: Option<UserId>, id: UserId) -> Result<&mut ApiUser, Refusal> {
        let user = self.users.get_mut(&id).ok_or(Refusal::NotFound)?;
        match caller {
            None => Err(Refusal::Unauthorized),
            Some(caller) if caller != id => Err(Refusal::Forbidden),
            Some(_) => Ok(user),
        }
    }

    pub fn create_article(
        &mut self,
        caller: Option<UserId>,
        article: NewArticle,
    ) -> Result<Article, Refusal> {
        let user_id = caller.ok_or(Refusal::Unauthorized)?;
        self.next_article += 1;
        let stored = article.stored_as(self.next_article, user_id);
        self.articles.insert(stored.id, stored.clone());
        Ok(stored)
    }

    pub fn article(&self, id: ArticleId) -> Option<&Article> {
        self.articles.get(&id)
    }

    pub fn articles(&self) -> Vec<Article> {
        self.articles.values().cloned().collect()
    }

    pub fn replace_article(
        &mut self,
        caller: Option<UserId>,
        id: ArticleId,
        article: NewArticle,
    ) -> Result<Article, Refusal> {
        let existing = self.owned_article(caller, id)?;
        *existing = article.stored_as(id, existing.user_id);
        Ok(existing.clone())
    }

    pub fn patch_article(
        &mut self,
        caller: Option<UserId>,
        id: ArticleId,
        patch: ArticlePatch,
    ) -> Result<Article, Refusal> {
        let existing = self.owned_article(caller, id)?;
        *existing = existing.merged(&patch);
        Ok(existing.clone())
    }

    pub fn delete_article(&mut self, caller: Option<UserId>, id: ArticleId) -> Result<(), Refusal> {
        self.owned_article(caller, id)?;
        self.articles.remove(&id);
        Ok(())
    }

    fn owned_article(
        &mut self,
        caller: Option<UserId>,
        id: ArticleId,
    ) -> Result<&mut Article, Refusal> {
        let article = self.articles.get_mut(&id).ok_or(Refusal::NotFound)?;
        match caller {
            None => Err(Refusal::Unauthorized),
            Some(caller) if caller != article.user_id => Err(Refusal::Forbidden),
            Some(_) => Ok(article),
        }
    }
}

/// What a caller is allowed to see of `user`
pub fn visible_to(user: &ApiUser, caller: Option<UserId>) -> ApiUser {
    if caller == Some(user.id) {
        return user.clone();
    }
    ApiUser {
        email: MASK.to_string(),
        last_name: MASK.to_string(),
        password: MASK.to_string(),
        ..user.clone()
    }
}

/// Configuration pointing at a fake app, with short timeouts
pub fn harness_config(base_url: &str, auth_dir: &Path) -> HarnessConfig {
    HarnessConfig {
        base_url: base_url.to_string(),
        auth_dir: auth_dir.to_path_buf(),
        timeouts: Timeouts {
            action_ms: 2_000,
            expect_ms: 2_000,
            navigation_ms: 3_000,
            request_ms: 5_000,
            fixture_setup_ms: 10_000,
            teardown_ms: 5_000,
        },
        ..Default::default()
    }
}

/// Fake app, fake browser and a worker over the standard catalog
pub struct Harness {
    pub app: FakeApp,
    pub browser: Arc<FakeBrowser>,
    pub config: HarnessConfig,
    pub worker: Worker,
    _auth_dir: TempDir,
}

impl Harness {
    pub async fn start() -> Self {
        appcheck_e2e::logging::init_for_tests();

        let app = FakeApp::start().await;
        let auth_dir = tempfile::tempdir().unwrap();
        let config = harness_config(&app.base_url, auth_dir.path());
        let browser = Arc::new(FakeBrowser::new(&app));
        let worker = Worker::new(Arc::new(catalog(&config, browser.clone()).build().unwrap()));

        Self {
            app,
            browser,
            config,
            worker,
            _auth_dir: auth_dir,
        }
    }

    pub fn graph(&self) -> &FixtureGraph {
        self.worker.graph()
    }
}

/// Standard catalog with the fake browser behind the `browser` fixture
pub fn catalog(config: &HarnessConfig, browser: Arc<FakeBrowser>) -> Catalog {
    Catalog::new(config.clone()).with_engine(move |_| {
        let engine: Arc<dyn BrowserEngine> = browser.clone();
        async move { Ok(engine) }
    })
}
