//! Registration screen
//!
//! ```text
//! Closed -> MenuOpen -> FormVisible -> Submitting -> Success
//!                                                 -> ValidationError
//!                                                 -> DuplicateError
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use appcheck_common::{NewUser, Timeouts};

use super::{fill_if_present, hover_user_menu, locate};
use crate::browser::{url_path, BrowserPage, Locator, Selector};
use crate::error::{E2eError, E2eResult};
use crate::expect::{expect, expect_url};

const PAGE_REGISTER_BUTTON: &str = "#registerBtn";
const FIRSTNAME_INPUT: &str = "firstname-input";
const LASTNAME_INPUT: &str = "lastname-input";
const EMAIL_INPUT: &str = "email-input";
const BIRTH_DATE_INPUT: &str = "birthdate-input";
const PASSWORD_INPUT: &str = "password-input";
const DATEPICKER_DONE_BUTTON: &str = ".ui-datepicker-close";
const AVATAR_DISPLAY: &str = "#userPicture";
const AVATAR_LIST: &str = "select[id=\"avatar\"]";
const REGISTER_BUTTON: &str = "register-button";
const ALERT_POPUP: &str = "alert-popup";
const VALIDATION_ERRORS: &str = "[id*=\"octavalidate_\"]";
const FIRSTNAME_INPUT_ERROR: &str = "#octavalidate_firstname";
const LASTNAME_INPUT_ERROR: &str = "#octavalidate_lastname";

pub const REGISTER_PATH: &str = "/register.html";
/// Where a successful registration lands
pub const LOGIN_PATH: &str = "/login/";

const FAILURE_MARKER: &str = "not created";
const OUTCOME_POLL: Duration = Duration::from_millis(100);
const OUTCOME_SETTLE: Duration = Duration::from_millis(300);

/// Registration form input; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<String>,
    pub password: Option<String>,
    /// Option value of the avatar list
    pub avatar: Option<String>,
}

impl RegistrationForm {
    pub fn with_birth_date(mut self, birth_date: impl Into<String>) -> Self {
        self.birth_date = Some(birth_date.into());
        self
    }
}

impl From<&NewUser> for RegistrationForm {
    /// Identity fields only; the avatar keeps the form's default
    fn from(user: &NewUser) -> Self {
        Self {
            first_name: Some(user.first_name.clone()),
            last_name: Some(user.last_name.clone()),
            email: Some(user.email.clone()),
            birth_date: None,
            password: Some(user.password.clone()),
            avatar: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Closed,
    MenuOpen,
    FormVisible,
    Submitting,
    Success,
    ValidationError,
    DuplicateError,
}

/// Terminal state reached by a submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Account created; `message` is the alert text when one was caught
    Success { message: String },
    /// Client-side validation stopped the submit
    ValidationError { indicators: usize },
    /// The application refused the account, typically for a taken email
    DuplicateError { message: String },
}

impl RegistrationOutcome {
    pub fn state(&self) -> RegistrationState {
        match self {
            RegistrationOutcome::Success { .. } => RegistrationState::Success,
            RegistrationOutcome::ValidationError { .. } => RegistrationState::ValidationError,
            RegistrationOutcome::DuplicateError { .. } => RegistrationState::DuplicateError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RegistrationOutcome::Success { .. })
    }
}

#[async_trait]
pub trait RegisterScreen: Send + Sync {
    async fn open_user_menu(&self) -> E2eResult<()>;

    async fn click_page_register_button(&self) -> E2eResult<()>;

    /// From any page to a visible registration form
    async fn open(&self) -> E2eResult<RegistrationState>;

    async fn fill_registration_form(&self, form: &RegistrationForm) -> E2eResult<()>;

    async fn click_datepicker_done_button(&self) -> E2eResult<()>;

    /// Select `avatar`, or the first option when `None`
    async fn select_avatar(&self, avatar: Option<&str>) -> E2eResult<()>;

    async fn current_avatar_src(&self) -> E2eResult<Option<String>>;

    async fn click_register_button(&self) -> E2eResult<()>;

    async fn validation_error_count(&self) -> E2eResult<usize>;

    /// Click register and wait for the terminal state
    async fn submit(&self) -> E2eResult<RegistrationOutcome>;

    fn avatar_list(&self) -> Locator;

    fn avatar_display(&self) -> Locator;

    fn alert_popup(&self) -> Locator;

    fn register_button(&self) -> Locator;

    fn first_name_error(&self) -> Locator;

    fn last_name_error(&self) -> Locator;
}

pub struct RegisterPage {
    page: Arc<dyn BrowserPage>,
    timeouts: Timeouts,
}

impl RegisterPage {
    pub fn new(page: Arc<dyn BrowserPage>, timeouts: Timeouts) -> Self {
        Self { page, timeouts }
    }

    fn css(&self, css: &str) -> Locator {
        locate(&self.page, Selector::css(css))
    }

    fn test_id(&self, id: &str) -> Locator {
        locate(&self.page, Selector::test_id(id))
    }

    async fn classify(&self) -> E2eResult<Option<RegistrationOutcome>> {
        let alert = self.alert_popup();
        if alert.is_visible().await? {
            let message = alert.text().await?.trim().to_string();
            let outcome = if message.contains(FAILURE_MARKER) {
                RegistrationOutcome::DuplicateError { message }
            } else {
                RegistrationOutcome::Success { message }
            };
            return Ok(Some(outcome));
        }

        if url_path(&self.page.current_url().await?) == LOGIN_PATH {
            return Ok(Some(RegistrationOutcome::Success {
                message: String::new(),
            }));
        }

        let indicators = self.validation_error_count().await?;
        if indicators > 0 {
            return Ok(Some(RegistrationOutcome::ValidationError { indicators }));
        }
        Ok(None)
    }

    /// Poll until a terminal state shows up
    ///
    /// `stale` is what the page showed before the click. Seeing it again
    /// only counts once the click has completed and the page had
    /// `OUTCOME_SETTLE` to replace it.
    async fn await_outcome(
        &self,
        stale: Option<&RegistrationOutcome>,
        clicked: &AtomicBool,
    ) -> E2eResult<RegistrationOutcome> {
        let limit = self.timeouts.navigation();
        let deadline = Instant::now() + limit;
        let mut clicked_at = None;
        loop {
            if clicked_at.is_none() && clicked.load(Ordering::SeqCst) {
                clicked_at = Some(Instant::now());
            }
            if let Some(outcome) = self.classify().await? {
                let settled = clicked_at.map_or(false, |at| at.elapsed() >= OUTCOME_SETTLE);
                if stale != Some(&outcome) || settled {
                    debug!("Registration reached {:?}", outcome.state());
                    return Ok(outcome);
                }
            }
            if Instant::now() >= deadline {
                return Err(E2eError::timeout("registration outcome", limit));
            }
            sleep(OUTCOME_POLL).await;
        }
    }
}

#[async_trait]
impl RegisterScreen for RegisterPage {
    async fn open_user_menu(&self) -> E2eResult<()> {
        hover_user_menu(&self.page).await
    }

    async fn click_page_register_button(&self) -> E2eResult<()> {
        self.css(PAGE_REGISTER_BUTTON).click().await
    }

    async fn open(&self) -> E2eResult<RegistrationState> {
        self.page.goto("/").await?;
        self.open_user_menu().await?;
        debug!("Registration at {:?}", RegistrationState::MenuOpen);

        let register_button = self.register_button();
        let form_visible = expect(&register_button).with_timeout(self.timeouts.navigation());
        tokio::try_join!(self.click_page_register_button(), form_visible.to_be_visible())?;
        expect_url(&*self.page, REGISTER_PATH, self.timeouts.expect()).await?;

        Ok(RegistrationState::FormVisible)
    }

    async fn fill_registration_form(&self, form: &RegistrationForm) -> E2eResult<()> {
        let fields = [
            (FIRSTNAME_INPUT, form.first_name.as_deref()),
            (LASTNAME_INPUT, form.last_name.as_deref()),
            (EMAIL_INPUT, form.email.as_deref()),
            (BIRTH_DATE_INPUT, form.birth_date.as_deref()),
            (PASSWORD_INPUT, form.password.as_deref()),
        ];
        for (test_id, value) in fields {
            fill_if_present(&self.page, Selector::test_id(test_id), value).await?;
        }
        if let Some(avatar) = form.avatar.as_deref() {
            self.select_avatar(Some(avatar)).await?;
        }
        Ok(())
    }

    async fn click_datepicker_done_button(&self) -> E2eResult<()> {
        self.css(DATEPICKER_DONE_BUTTON).click().await
    }

    async fn select_avatar(&self, avatar: Option<&str>) -> E2eResult<()> {
        let list = self.avatar_list();
        match avatar {
            Some(value) => list.select_option(value).await,
            None => {
                let first = list.locator(Selector::css("option")).first();
                match first.attribute("value").await? {
                    Some(value) => list.select_option(&value).await,
                    None => Ok(()),
                }
            }
        }
    }

    async fn current_avatar_src(&self) -> E2eResult<Option<String>> {
        self.avatar_display().attribute("src").await
    }

    async fn click_register_button(&self) -> E2eResult<()> {
        self.register_button().click().await
    }

    async fn validation_error_count(&self) -> E2eResult<usize> {
        self.css(VALIDATION_ERRORS).count().await
    }

    async fn submit(&self) -> E2eResult<RegistrationOutcome> {
        let stale = self.classify().await?;
        debug!("Registration at {:?}", RegistrationState::Submitting);

        let clicked = AtomicBool::new(false);
        let click = async {
            self.click_register_button().await?;
            clicked.store(true, Ordering::SeqCst);
            Ok::<_, E2eError>(())
        };
        let (_, outcome) = tokio::try_join!(click, self.await_outcome(stale.as_ref(), &clicked))?;
        Ok(outcome)
    }

    fn avatar_list(&self) -> Locator {
        self.css(AVATAR_LIST)
    }

    fn avatar_display(&self) -> Locator {
        self.css(AVATAR_DISPLAY)
    }

    fn alert_popup(&self) -> Locator {
        self.test_id(ALERT_POPUP)
    }

    fn register_button(&self) -> Locator {
        self.test_id(REGISTER_BUTTON)
    }

    fn first_name_error(&self) -> Locator {
        self.css(FIRSTNAME_INPUT_ERROR)
    }

    fn last_name_error(&self) -> Locator {
        self.css(LASTNAME_INPUT_ERROR)
    }
}
