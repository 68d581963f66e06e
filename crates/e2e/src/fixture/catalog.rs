//! Standard fixtures of the harness
//!
//! | fixture | scope | depends on | teardown |
//! |---|---|---|---|
//! | `config` | worker | | |
//! | `request` | test | config | dispose |
//! | `auth_cache` | worker | config | |
//! | `auth_request` | test | request, auth_cache | dispose |
//! | `api_user` | test | request | login + delete (deferred) |
//! | `temp_auth_user` | test | request | dispose context, then login + delete (deferred) |
//! | `browser` | worker | config | engine shutdown |
//! | `page` | test | browser | close |
//! | `authenticated_page` | test | browser, auth_cache | close |
//! | `login_page` | test | page | |
//! | `register_page` | test | page, config | |
//! | `user_profile_page` | test | authenticated_page | |
//! | `valid_user` | test | request, register_page | login + delete (deferred) |
//!
//! Deferred teardowns are registered before the user is created, so they
//! also run when the setup fails or times out after the remote create.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use appcheck_common::{Credentials, HarnessConfig, UserId, UserRecord};

use super::{Fixture, FixtureDef, FixtureGraph, FixtureGraphBuilder, FixtureKey, Fixtures};
use crate::api::{ApiClient, AuthContext};
use crate::auth_cache::AuthCache;
use crate::browser::{BrowserEngine, BrowserPage, PageOptions};
use crate::error::{E2eError, E2eResult};
use crate::lifecycle::{Channel, Deletion, UserLifecycle};
use crate::pages::{LoginPage, RegisterPage, UserProfilePage};
use crate::playwright::PlaywrightEngine;

pub const CONFIG: FixtureKey<HarnessConfig> = FixtureKey::new("config");
pub const REQUEST: FixtureKey<ApiClient> = FixtureKey::new("request");
pub const AUTH_CACHE: FixtureKey<AuthCache> = FixtureKey::new("auth_cache");
pub const AUTH_REQUEST: FixtureKey<AuthContext> = FixtureKey::new("auth_request");
pub const API_USER: FixtureKey<UserRecord> = FixtureKey::new("api_user");
pub const TEMP_AUTH_USER: FixtureKey<TempAuthUser> = FixtureKey::new("temp_auth_user");
pub const BROWSER: FixtureKey<Arc<dyn BrowserEngine>> = FixtureKey::new("browser");
pub const PAGE: FixtureKey<Arc<dyn BrowserPage>> = FixtureKey::new("page");
pub const AUTHENTICATED_PAGE: FixtureKey<Arc<dyn BrowserPage>> =
    FixtureKey::new("authenticated_page");
pub const LOGIN_PAGE: FixtureKey<LoginPage> = FixtureKey::new("login_page");
pub const REGISTER_PAGE: FixtureKey<RegisterPage> = FixtureKey::new("register_page");
pub const USER_PROFILE_PAGE: FixtureKey<UserProfilePage> = FixtureKey::new("user_profile_page");
pub const VALID_USER: FixtureKey<UserRecord> = FixtureKey::new("valid_user");

/// Ephemeral API user together with its own authenticated context
#[derive(Debug, Clone)]
pub struct TempAuthUser {
    pub user: UserRecord,
    pub context: AuthContext,
}

/// Starts the browser engine behind the `browser` fixture
pub type EngineLauncher =
    Arc<dyn Fn(HarnessConfig) -> BoxFuture<'static, E2eResult<Arc<dyn BrowserEngine>>> + Send + Sync>;

/// Registers the standard fixtures for one configuration
pub struct Catalog {
    config: HarnessConfig,
    launcher: EngineLauncher,
}

impl Catalog {
    /// Catalog launching Playwright for the `browser` fixture
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            launcher: Arc::new(|config| {
                Box::pin(async move {
                    let engine: Arc<dyn BrowserEngine> =
                        Arc::new(PlaywrightEngine::launch(&config).await?);
                    Ok(engine)
                })
            }),
        }
    }

    /// Substitute the engine behind the `browser` fixture
    pub fn with_engine<F, Fut>(mut self, launch: F) -> Self
    where
        F: Fn(HarnessConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = E2eResult<Arc<dyn BrowserEngine>>> + Send + 'static,
    {
        self.launcher = Arc::new(move |config| Box::pin(launch(config)));
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Builder pre-loaded with every standard fixture and the configured
    /// timeouts; more fixtures may be registered before building
    pub fn builder(&self) -> FixtureGraphBuilder {
        self.definitions().into_iter().fold(
            FixtureGraph::builder()
                .setup_timeout(self.config.timeouts.fixture_setup())
                .teardown_timeout(self.config.timeouts.teardown()),
            FixtureGraphBuilder::register,
        )
    }

    pub fn build(&self) -> E2eResult<FixtureGraph> {
        self.builder().build()
    }

    pub fn definitions(&self) -> Vec<FixtureDef> {
        vec![
            config_fixture(self.config.clone()),
            request_fixture(),
            auth_cache_fixture(),
            auth_request_fixture(),
            api_user_fixture(),
            temp_auth_user_fixture(),
            browser_fixture(self.launcher.clone()),
            page_fixture(),
            authenticated_page_fixture(),
            login_page_fixture(),
            register_page_fixture(),
            user_profile_page_fixture(),
            valid_user_fixture(),
        ]
    }
}

fn config_fixture(config: HarnessConfig) -> FixtureDef {
    FixtureDef::new(CONFIG, move |_| {
        let config = config.clone();
        async move { Ok(Fixture::new(config)) }
    })
    .worker_scoped()
}

fn request_fixture() -> FixtureDef {
    FixtureDef::new(REQUEST, |fx| async move {
        let client = ApiClient::from_config(&*fx.get(CONFIG)?)?;
        let handle = client.clone();
        Ok(Fixture::new(client).with_teardown(move || async move {
            handle.dispose();
            Ok(())
        }))
    })
    .depends_on(CONFIG)
}

fn auth_cache_fixture() -> FixtureDef {
    FixtureDef::new(AUTH_CACHE, |fx| async move {
        Ok(Fixture::new(AuthCache::from_config(&*fx.get(CONFIG)?)))
    })
    .depends_on(CONFIG)
    .worker_scoped()
}

fn auth_request_fixture() -> FixtureDef {
    FixtureDef::new(AUTH_REQUEST, |fx| async move {
        let state = fx.get(AUTH_CACHE)?.read_api_state()?;
        let context = fx.get(REQUEST)?.authenticated(state.access_token);
        let handle = context.clone();
        Ok(Fixture::new(context).with_teardown(move || async move {
            handle.dispose();
            Ok(())
        }))
    })
    .depends_on(REQUEST)
    .depends_on(AUTH_CACHE)
}

fn api_user_fixture() -> FixtureDef {
    FixtureDef::new(API_USER, |fx| async move {
        let lifecycle = UserLifecycle::new((*fx.get(REQUEST)?).clone());
        let new_user = UserLifecycle::fresh_user();
        let slot = defer_retirement(&fx, &lifecycle, new_user.credentials())?;

        let user = lifecycle.register(&new_user, Channel::Api).await?;
        *slot.lock() = user.id;
        Ok(Fixture::new(user))
    })
    .depends_on(REQUEST)
}

fn temp_auth_user_fixture() -> FixtureDef {
    FixtureDef::new(TEMP_AUTH_USER, |fx| async move {
        let lifecycle = UserLifecycle::new((*fx.get(REQUEST)?).clone());
        let new_user = UserLifecycle::fresh_user();
        let slot = defer_retirement(&fx, &lifecycle, new_user.credentials())?;

        let user = lifecycle.register(&new_user, Channel::Api).await?;
        *slot.lock() = user.id;
        if user.id.is_none() {
            return Err(E2eError::Registration(format!("no id assigned to {}", user.email)));
        }

        // Disposed before the deferred retirement runs
        let context = lifecycle.open_session(&user.credentials()).await?;
        let handle = context.clone();
        Ok(Fixture::new(TempAuthUser { user, context }).with_teardown(move || async move {
            handle.dispose();
            Ok(())
        }))
    })
    .depends_on(REQUEST)
}

fn browser_fixture(launcher: EngineLauncher) -> FixtureDef {
    FixtureDef::new(BROWSER, move |fx| {
        let launcher = launcher.clone();
        async move {
            let config = (*fx.get(CONFIG)?).clone();
            let engine = launcher(config).await?;
            let handle = engine.clone();
            Ok(Fixture::new(engine).with_teardown(move || async move { handle.shutdown().await }))
        }
    })
    .depends_on(CONFIG)
    .worker_scoped()
}

async fn open_page(
    engine: &dyn BrowserEngine,
    options: PageOptions,
) -> E2eResult<Fixture<Arc<dyn BrowserPage>>> {
    let page = engine.new_page(options).await?;
    let handle = page.clone();
    Ok(Fixture::new(page).with_teardown(move || async move { handle.close().await }))
}

fn page_fixture() -> FixtureDef {
    FixtureDef::new(PAGE, |fx| async move {
        let engine = fx.get(BROWSER)?;
        open_page(&**engine, PageOptions::default()).await
    })
    .depends_on(BROWSER)
}

fn authenticated_page_fixture() -> FixtureDef {
    FixtureDef::new(AUTHENTICATED_PAGE, |fx| async move {
        let state = fx.get(AUTH_CACHE)?.read_storage_state()?;
        let engine = fx.get(BROWSER)?;
        open_page(&**engine, PageOptions::with_storage_state(state)).await
    })
    .depends_on(BROWSER)
    .depends_on(AUTH_CACHE)
}

fn login_page_fixture() -> FixtureDef {
    FixtureDef::new(LOGIN_PAGE, |fx| async move {
        Ok(Fixture::new(LoginPage::new((*fx.get(PAGE)?).clone())))
    })
    .depends_on(PAGE)
}

fn register_page_fixture() -> FixtureDef {
    FixtureDef::new(REGISTER_PAGE, |fx| async move {
        let page = (*fx.get(PAGE)?).clone();
        let timeouts = fx.get(CONFIG)?.timeouts.clone();
        Ok(Fixture::new(RegisterPage::new(page, timeouts)))
    })
    .depends_on(PAGE)
    .depends_on(CONFIG)
}

fn user_profile_page_fixture() -> FixtureDef {
    FixtureDef::new(USER_PROFILE_PAGE, |fx| async move {
        Ok(Fixture::new(UserProfilePage::new(
            (*fx.get(AUTHENTICATED_PAGE)?).clone(),
        )))
    })
    .depends_on(AUTHENTICATED_PAGE)
}

fn valid_user_fixture() -> FixtureDef {
    FixtureDef::new(VALID_USER, |fx| async move {
        let lifecycle = UserLifecycle::new((*fx.get(REQUEST)?).clone());
        let register_page = fx.get(REGISTER_PAGE)?;
        let new_user = UserLifecycle::fresh_user();
        let slot = defer_retirement(&fx, &lifecycle, new_user.credentials())?;

        let user = lifecycle
            .register(&new_user, Channel::Ui(&*register_page))
            .await?;
        *slot.lock() = Some(lifecycle.lookup_id(&user.credentials()).await?);
        Ok(Fixture::new(user))
    })
    .depends_on(REQUEST)
    .depends_on(REGISTER_PAGE)
}

/// Retire the user behind `credentials` when the fixture is torn down
///
/// Registered before the user is created. The returned slot takes the id
/// once it is known, so a user whose credentials no longer work can still
/// be told apart from one that is gone.
fn defer_retirement(
    fx: &Fixtures,
    lifecycle: &UserLifecycle,
    credentials: Credentials,
) -> E2eResult<Arc<Mutex<Option<UserId>>>> {
    let slot: Arc<Mutex<Option<UserId>>> = Arc::default();
    let id = slot.clone();
    let lifecycle = lifecycle.clone();
    fx.defer_teardown(move || async move {
        let id = *id.lock();
        report_retirement(&credentials.email, lifecycle.retire_user(&credentials, id).await)
    })?;
    Ok(slot)
}

fn report_retirement(email: &str, outcome: E2eResult<Deletion>) -> E2eResult<()> {
    match outcome {
        Ok(Deletion::Deleted) => {
            debug!("Removed ephemeral user {}", email);
            Ok(())
        }
        Ok(Deletion::AlreadyGone) => {
            debug!("Ephemeral user {} was already gone", email);
            Ok(())
        }
        Err(e) => {
            warn!("Could not remove ephemeral user {}: {}", email, e);
            match e {
                E2eError::Teardown { .. } => Err(e),
                other => Err(E2eError::Teardown {
                    fixture: email.to_string(),
                    reason: other.to_string(),
                }),
            }
        }
    }
}
