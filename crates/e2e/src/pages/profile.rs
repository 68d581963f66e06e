//! Signed-in user dashboard and user menu

use async_trait::async_trait;
use std::sync::Arc;

use super::{hover_user_menu, locate};
use crate::browser::{BrowserPage, Locator, Selector, TextMatch};
use crate::error::E2eResult;

const EDIT_DASHBOARD: &str = "Edit this Dashboard";
const EDIT_OR_SAVE_DASHBOARD: &str = "Edit this Dashboard|Save this Dashboard";
const DARKMODE_SWITCH: &str = "darkmode switch";
const SESSION_TIMER: &str = "countDown";
const USER_AVATAR: &str = "#myAvatar";

/// Entries of the user menu dropdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuLink {
    MyAccount,
    MessageCenter,
    Logout,
}

impl MenuLink {
    pub fn label(&self) -> &'static str {
        match self {
            MenuLink::MyAccount => "My Account",
            MenuLink::MessageCenter => "Message center",
            MenuLink::Logout => "Logout",
        }
    }
}

/// Navigation buttons on the welcome dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardButton {
    MyProfile,
    MyArticles,
    MyComments,
    Surveys,
    Games,
    Messenger,
    DeleteAccount,
}

impl DashboardButton {
    pub const ALL: [DashboardButton; 7] = [
        DashboardButton::MyProfile,
        DashboardButton::MyArticles,
        DashboardButton::MyComments,
        DashboardButton::Surveys,
        DashboardButton::Games,
        DashboardButton::Messenger,
        DashboardButton::DeleteAccount,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DashboardButton::MyProfile => "My profile",
            DashboardButton::MyArticles => "My articles",
            DashboardButton::MyComments => "My comments",
            DashboardButton::Surveys => "Surveys",
            DashboardButton::Games => "Games",
            DashboardButton::Messenger => "Messenger",
            DashboardButton::DeleteAccount => "Delete Account",
        }
    }
}

#[async_trait]
pub trait UserProfileScreen: Send + Sync {
    async fn open_user_menu(&self) -> E2eResult<()>;

    /// Menu must already be open
    async fn click_menu_link(&self, link: MenuLink) -> E2eResult<()>;

    async fn click_dashboard_button(&self, button: DashboardButton) -> E2eResult<()>;

    async fn click_edit_dashboard(&self) -> E2eResult<()>;

    async fn toggle_dark_mode(&self) -> E2eResult<()>;

    fn user_avatar(&self) -> Locator;

    fn session_timer(&self) -> Locator;

    fn page_body(&self) -> Locator;

    /// Edit/save toggle, whichever label it currently shows
    fn edit_dashboard_button(&self) -> Locator;
}

pub struct UserProfilePage {
    page: Arc<dyn BrowserPage>,
}

impl UserProfilePage {
    pub fn new(page: Arc<dyn BrowserPage>) -> Self {
        Self { page }
    }

    fn role(&self, role: &str, name: TextMatch) -> Locator {
        locate(&self.page, Selector::role(role, name))
    }
}

#[async_trait]
impl UserProfileScreen for UserProfilePage {
    async fn open_user_menu(&self) -> E2eResult<()> {
        hover_user_menu(&self.page).await
    }

    async fn click_menu_link(&self, link: MenuLink) -> E2eResult<()> {
        self.role("link", TextMatch::exact(link.label())).click().await
    }

    async fn click_dashboard_button(&self, button: DashboardButton) -> E2eResult<()> {
        self.role("button", TextMatch::exact(button.label())).click().await
    }

    async fn click_edit_dashboard(&self) -> E2eResult<()> {
        self.role("button", TextMatch::exact(EDIT_DASHBOARD)).click().await
    }

    async fn toggle_dark_mode(&self) -> E2eResult<()> {
        locate(&self.page, Selector::title(DARKMODE_SWITCH)).click().await
    }

    fn user_avatar(&self) -> Locator {
        locate(&self.page, Selector::css(USER_AVATAR))
    }

    fn session_timer(&self) -> Locator {
        locate(&self.page, Selector::test_id(SESSION_TIMER))
    }

    fn page_body(&self) -> Locator {
        locate(&self.page, Selector::css("body"))
    }

    fn edit_dashboard_button(&self) -> Locator {
        self.role("button", TextMatch::pattern(EDIT_OR_SAVE_DASHBOARD))
    }
}
