//! One-off authentication setup routines
//!
//! Each routine registers a dedicated user, logs it in and persists the
//! session in the [`AuthCache`] so that `auth_request` and
//! `authenticated_page` can start from an authenticated state.

use tracing::{info, warn};

use appcheck_common::{HarnessConfig, UserRecord};

use crate::api::ApiClient;
use crate::auth_cache::{ApiAuthState, AuthCache};
use crate::browser::{BrowserEngine, BrowserPage, PageOptions};
use crate::error::{E2eError, E2eResult};
use crate::expect::expect;
use crate::lifecycle::{Channel, Deletion, UserLifecycle};
use crate::pages::{LoginPage, LoginScreen, RegisterPage};
use crate::probe::wait_until_reachable;

/// Register a user via the API, log it in and cache its token
pub async fn api_auth(config: &HarnessConfig) -> E2eResult<ApiAuthState> {
    wait_until_reachable(&config.base_url, config.timeouts.navigation()).await?;

    let lifecycle = UserLifecycle::new(ApiClient::from_config(config)?);
    let user = lifecycle.register_user(Channel::Api).await?;
    let access_token = lifecycle.login(&user.credentials()).await?;

    let state = ApiAuthState {
        access_token,
        user_email: user.email,
        user_password: user.password,
        user_id: user.id,
    };
    AuthCache::from_config(config).write_api_state(&state)?;
    Ok(state)
}

/// Register a user through the UI, log in through the login form and cache
/// the resulting browser storage state
pub async fn ui_auth(config: &HarnessConfig, engine: &dyn BrowserEngine) -> E2eResult<UserRecord> {
    wait_until_reachable(&config.base_url, config.timeouts.navigation()).await?;

    let page = engine.new_page(PageOptions::default()).await?;
    let outcome = ui_auth_on(config, page.clone()).await;
    if let Err(e) = page.close().await {
        warn!("Failed to close setup page: {}", e);
    }
    outcome
}

async fn ui_auth_on(config: &HarnessConfig, page: std::sync::Arc<dyn BrowserPage>) -> E2eResult<UserRecord> {
    let lifecycle = UserLifecycle::new(ApiClient::from_config(config)?);
    let register_page = RegisterPage::new(page.clone(), config.timeouts.clone());
    let login_page = LoginPage::new(page.clone());

    let user = lifecycle.register_user(Channel::Ui(&register_page)).await?;

    expect(&login_page.login_button())
        .with_timeout(config.timeouts.expect())
        .to_be_visible()
        .await?;
    lifecycle
        .login_ui(&login_page, &*page, &user.credentials(), config.timeouts.navigation())
        .await?;

    AuthCache::from_config(config).write_storage_state(&page.storage_state().await?)?;
    Ok(user)
}

/// Remove the cached API user and every cache file
///
/// A cache without an API user (or one whose user is already gone) is not an
/// error.
pub async fn clean(config: &HarnessConfig) -> E2eResult<()> {
    let cache = AuthCache::from_config(config);

    match cache.read_api_state() {
        Ok(state) => {
            let lifecycle = UserLifecycle::new(ApiClient::from_config(config)?);
            match lifecycle.retire_user(&state.credentials(), state.user_id).await? {
                Deletion::Deleted => info!("Deleted cached API user {}", state.user_email),
                Deletion::AlreadyGone => info!("Cached API user {} already gone", state.user_email),
            }
        }
        Err(E2eError::AuthCacheMissing(path)) => {
            info!("No API auth state at {}", path.display());
        }
        Err(e) => return Err(e),
    }

    for path in cache.clear()? {
        info!("Removed {}", path.display());
    }
    Ok(())
}
