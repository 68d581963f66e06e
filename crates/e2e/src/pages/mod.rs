//! Page objects
//!
//! One capability trait per screen, implemented over a live
//! [`BrowserPage`](crate::browser::BrowserPage). Consumers get named
//! operations and [`Locator`]s; selectors stay private to this module.

use std::sync::Arc;

use crate::browser::{BrowserPage, Locator, Selector};
use crate::error::E2eResult;

pub mod login;
pub mod profile;
pub mod register;

pub use login::{LoginForm, LoginPage, LoginScreen};
pub use profile::{DashboardButton, MenuLink, UserProfilePage, UserProfileScreen};
pub use register::{
    RegisterPage, RegisterScreen, RegistrationForm, RegistrationOutcome, RegistrationState,
};

/// Hover target that reveals the user menu on every screen
pub(crate) const USER_MENU_TEST_ID: &str = "btn-dropdown";

pub(crate) fn locate(page: &Arc<dyn BrowserPage>, selector: Selector) -> Locator {
    Locator::new(page.clone(), selector)
}

pub(crate) async fn hover_user_menu(page: &Arc<dyn BrowserPage>) -> E2eResult<()> {
    locate(page, Selector::test_id(USER_MENU_TEST_ID)).hover().await
}

/// Fill `selector` only when a value was given
pub(crate) async fn fill_if_present(
    page: &Arc<dyn BrowserPage>,
    selector: Selector,
    value: Option<&str>,
) -> E2eResult<()> {
    match value {
        Some(value) => locate(page, selector).fill(value).await,
        None => Ok(()),
    }
}
