//! Registration, login and deletion of ephemeral users

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use appcheck_common::{
    passwords, Credentials, LoginResponse, NewUser, RandomData, SessionToken, UserId, UserRecord,
};

use crate::api::{ApiClient, AuthContext};
use crate::browser::{url_path, BrowserPage};
use crate::error::{E2eError, E2eResult};
use crate::pages::{LoginScreen, RegisterScreen, RegistrationForm, RegistrationOutcome};

/// Landing page after a successful UI login
pub const WELCOME_PATH: &str = "/welcome";

const UI_LOGIN_POLL: Duration = Duration::from_millis(100);

/// How a user gets registered
#[derive(Clone, Copy)]
pub enum Channel<'a> {
    Api,
    /// Drive the registration form of an open page
    Ui(&'a dyn RegisterScreen),
}

/// Result of a tolerant delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    /// Nothing to delete: the user was already removed or never existed
    AlreadyGone,
}

/// Auth/user lifecycle over an unauthenticated API client
#[derive(Clone, Debug)]
pub struct UserLifecycle {
    client: ApiClient,
}

impl UserLifecycle {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Freshly generated user with the standard valid password
    pub fn fresh_user() -> NewUser {
        RandomData::new().user().with_password(passwords::VALID)
    }

    /// Register a freshly generated user with the standard valid password
    pub async fn register_user(&self, channel: Channel<'_>) -> E2eResult<UserRecord> {
        self.register(&Self::fresh_user(), channel).await
    }

    /// Register `user` through `channel`; never retried
    pub async fn register(&self, user: &NewUser, channel: Channel<'_>) -> E2eResult<UserRecord> {
        match channel {
            Channel::Api => self.register_api(user).await,
            Channel::Ui(screen) => self.register_ui(screen, user).await,
        }
    }

    async fn register_api(&self, user: &NewUser) -> E2eResult<UserRecord> {
        let response = self.client.post("/api/users", user).await?;
        if !response.is_success() || !response.is_json() {
            return Err(E2eError::Registration(format!(
                "POST /api/users for {} answered {}: {}",
                user.email,
                response.status,
                response.text()
            )));
        }

        let created: appcheck_common::ApiUser = response
            .json()
            .map_err(|e| E2eError::Registration(e.to_string()))?;
        info!("Registered user {} (id {}) via API", created.email, created.id);
        Ok(UserRecord::registered(user, &created))
    }

    async fn register_ui(&self, screen: &dyn RegisterScreen, user: &NewUser) -> E2eResult<UserRecord> {
        screen.open().await?;
        screen
            .fill_registration_form(&RegistrationForm::from(user))
            .await?;

        match screen.submit().await? {
            RegistrationOutcome::Success { .. } => {
                info!("Registered user {} via UI", user.email);
                Ok(UserRecord::unregistered(user))
            }
            RegistrationOutcome::ValidationError { indicators } => Err(E2eError::Registration(
                format!("form validation failed ({} indicator(s))", indicators),
            )),
            RegistrationOutcome::DuplicateError { message } => {
                Err(E2eError::Registration(message))
            }
        }
    }

    /// Exchange credentials for a bearer token
    pub async fn login(&self, credentials: &Credentials) -> E2eResult<SessionToken> {
        let response = self.client.post("/api/login", credentials).await?;
        if !response.is_success() {
            return Err(E2eError::Authentication(format!(
                "login of {} rejected with status {}",
                credentials.email, response.status
            )));
        }

        let LoginResponse { access_token } = response.expect_json_body(response.status)?;
        if access_token.is_empty() {
            return Err(E2eError::Authentication(format!(
                "login of {} returned an empty token",
                credentials.email
            )));
        }
        debug!("Logged in {}", credentials.email);
        Ok(access_token)
    }

    /// Login plus a fresh authenticated context for the token
    pub async fn open_session(&self, credentials: &Credentials) -> E2eResult<AuthContext> {
        let token = self.login(credentials).await?;
        Ok(self.client.authenticated(token))
    }

    /// Log in through the login form and wait for the welcome page
    pub async fn login_ui(
        &self,
        screen: &dyn LoginScreen,
        page: &dyn BrowserPage,
        credentials: &Credentials,
        limit: Duration,
    ) -> E2eResult<()> {
        screen.log_in(credentials).await?;

        let deadline = Instant::now() + limit;
        let banner = screen.form_login_error();
        loop {
            if url_path(&page.current_url().await?) == WELCOME_PATH {
                debug!("Logged in {} via UI", credentials.email);
                return Ok(());
            }
            if banner.is_visible().await? {
                return Err(E2eError::Authentication(format!(
                    "login form rejected {}: {}",
                    credentials.email,
                    banner.text().await.unwrap_or_default().trim()
                )));
            }
            if Instant::now() >= deadline {
                return Err(E2eError::timeout("UI login", limit));
            }
            sleep(UI_LOGIN_POLL).await;
        }
    }

    /// Delete a user through an authorized context, tolerating not-found
    pub async fn delete_user(&self, context: &ApiClient, id: UserId) -> E2eResult<Deletion> {
        let response = context.delete(&format!("/api/users/{}", id)).await?;
        match response.status {
            404 => {
                debug!("User {} already gone", id);
                Ok(Deletion::AlreadyGone)
            }
            _ => {
                response.expect_json(200)?;
                info!("Deleted user {}", id);
                Ok(Deletion::Deleted)
            }
        }
    }

    /// Id of a registered user, looked up through its own session
    pub async fn lookup_id(&self, credentials: &Credentials) -> E2eResult<UserId> {
        let context = self.open_session(credentials).await?;
        let found = context.users().find_by_email(&credentials.email).await;
        context.dispose();
        found?.map(|user| user.id).ok_or_else(|| {
            E2eError::Registration(format!("{} is not listed after login", credentials.email))
        })
    }

    /// Remove a user known only by its credentials
    ///
    /// Logs in with its own credentials, finds the id by email when it is
    /// not known, deletes, and disposes the session. A user that can no
    /// longer log in counts as already gone only once the application
    /// confirms it is no longer registered.
    pub async fn retire_user(
        &self,
        credentials: &Credentials,
        id: Option<UserId>,
    ) -> E2eResult<Deletion> {
        let context = match self.open_session(credentials).await {
            Ok(context) => context,
            Err(E2eError::Authentication(reason)) => {
                return self.confirm_gone(credentials, id, &reason).await;
            }
            Err(e) => return Err(e),
        };

        let outcome = self.retire_with(&context, credentials, id).await;
        context.dispose();
        outcome
    }

    async fn confirm_gone(
        &self,
        credentials: &Credentials,
        id: Option<UserId>,
        reason: &str,
    ) -> E2eResult<Deletion> {
        let registered = match id {
            Some(id) => {
                let response = self.client.get(&format!("/api/users/{}", id)).await?;
                if response.status == 404 {
                    false
                } else {
                    response.expect_json(200)?;
                    true
                }
            }
            // Only finds users whose email the application lists publicly
            None => self
                .client
                .users()
                .find_by_email(&credentials.email)
                .await?
                .is_some(),
        };

        if registered {
            return Err(E2eError::Teardown {
                fixture: credentials.email.clone(),
                reason: format!("still registered but its credentials are rejected: {}", reason),
            });
        }
        warn!("Cannot log in as {} to retire it: {}", credentials.email, reason);
        Ok(Deletion::AlreadyGone)
    }

    async fn retire_with(
        &self,
        context: &AuthContext,
        credentials: &Credentials,
        id: Option<UserId>,
    ) -> E2eResult<Deletion> {
        let id = match id {
            Some(id) => id,
            None => match context.users().find_by_email(&credentials.email).await? {
                Some(user) => user.id,
                None => return Ok(Deletion::AlreadyGone),
            },
        };
        self.delete_user(context, id).await
    }
}
