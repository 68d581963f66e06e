//! Login screen and header session controls

use async_trait::async_trait;
use std::sync::Arc;

use appcheck_common::Credentials;

use super::{fill_if_present, hover_user_menu, locate};
use crate::browser::{BrowserPage, Locator, Selector};
use crate::error::E2eResult;

const PAGE_LOGIN_BUTTON: &str = "#loginBtn";
const PAGE_LOGOUT_BUTTON: &str = "#logoutBtn";
const HEADER_REGISTER_BUTTON: &str = "#registerLink";
const USER_EMAIL_INPUT: &str = "input[id=\"username\"]";
const USER_PASSWORD_INPUT: &str = "#password";
const KEEP_SIGNED_IN_CHECKBOX: &str = "#keepSignIn";
const FORM_LOGIN_BUTTON: &str = "#loginButton";
const FORM_LOGIN_ERROR: &str = "login-error";
const WELCOME_USER: &str = "hello";

/// Login form input; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: Option<String>,
    pub password: Option<String>,
    pub keep_signed_in: bool,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into()),
            keep_signed_in: false,
        }
    }

    pub fn keep_signed_in(mut self) -> Self {
        self.keep_signed_in = true;
        self
    }
}

impl From<&Credentials> for LoginForm {
    fn from(credentials: &Credentials) -> Self {
        LoginForm::new(credentials.email.clone(), credentials.password.clone())
    }
}

#[async_trait]
pub trait LoginScreen: Send + Sync {
    async fn open_user_menu(&self) -> E2eResult<()>;

    async fn click_page_login_button(&self) -> E2eResult<()>;

    async fn click_page_logout_button(&self) -> E2eResult<()>;

    async fn click_header_register_button(&self) -> E2eResult<()>;

    async fn fill_login_form(&self, form: &LoginForm) -> E2eResult<()>;

    async fn click_form_login_button(&self) -> E2eResult<()>;

    fn form_login_error(&self) -> Locator;

    fn welcome_message(&self) -> Locator;

    /// Submit button of the login form
    fn login_button(&self) -> Locator;

    fn logout_button(&self) -> Locator;

    /// Fill the form with `credentials` and submit it
    async fn log_in(&self, credentials: &Credentials) -> E2eResult<()> {
        self.fill_login_form(&LoginForm::from(credentials)).await?;
        self.click_form_login_button().await
    }
}

pub struct LoginPage {
    page: Arc<dyn BrowserPage>,
}

impl LoginPage {
    pub fn new(page: Arc<dyn BrowserPage>) -> Self {
        Self { page }
    }

    fn css(&self, css: &str) -> Locator {
        locate(&self.page, Selector::css(css))
    }
}

#[async_trait]
impl LoginScreen for LoginPage {
    async fn open_user_menu(&self) -> E2eResult<()> {
        hover_user_menu(&self.page).await
    }

    async fn click_page_login_button(&self) -> E2eResult<()> {
        self.css(PAGE_LOGIN_BUTTON).click().await
    }

    async fn click_page_logout_button(&self) -> E2eResult<()> {
        self.css(PAGE_LOGOUT_BUTTON).click().await
    }

    async fn click_header_register_button(&self) -> E2eResult<()> {
        self.css(HEADER_REGISTER_BUTTON).click().await
    }

    async fn fill_login_form(&self, form: &LoginForm) -> E2eResult<()> {
        fill_if_present(&self.page, Selector::css(USER_EMAIL_INPUT), form.email.as_deref()).await?;
        fill_if_present(
            &self.page,
            Selector::css(USER_PASSWORD_INPUT),
            form.password.as_deref(),
        )
        .await?;
        if form.keep_signed_in {
            self.css(KEEP_SIGNED_IN_CHECKBOX).check().await?;
        }
        Ok(())
    }

    async fn click_form_login_button(&self) -> E2eResult<()> {
        self.css(FORM_LOGIN_BUTTON).click().await
    }

    fn form_login_error(&self) -> Locator {
        locate(&self.page, Selector::test_id(FORM_LOGIN_ERROR))
    }

    fn welcome_message(&self) -> Locator {
        locate(&self.page, Selector::test_id(WELCOME_USER))
    }

    fn login_button(&self) -> Locator {
        self.css(FORM_LOGIN_BUTTON)
    }

    fn logout_button(&self) -> Locator {
        self.css(PAGE_LOGOUT_BUTTON)
    }
}
