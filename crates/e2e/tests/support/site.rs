//! Scripted browser rendering the application's screens from the store

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use appcheck_common::NewUser;
use appcheck_e2e::browser::{Action, Query};
use appcheck_e2e::{BrowserEngine, BrowserPage, E2eError, E2eResult, PageOptions, Selector};

use super::{FakeApp, Refusal, SharedStore};

pub const AVATARS: [&str; 3] = [
    ".\\data\\users\\face_1.png",
    ".\\data\\users\\face_2.png",
    ".\\data\\users\\face_3.png",
];
pub const LOGIN_ERROR: &str = "Invalid username or password";
pub const USER_CREATED: &str = "User created";
pub const USER_NOT_CREATED: &str = "User not created! Email not unique";
const SESSION_COOKIE: &str = "session";

const DASHBOARD: [(&str, &str, &str); 7] = [
    ("dashboard.profile", "My profile", "/user.html"),
    ("dashboard.articles", "My articles", "/articles.html"),
    ("dashboard.comments", "My comments", "/comments.html"),
    ("dashboard.surveys", "Surveys", "/surveys.html"),
    ("dashboard.games", "Games", "/games/games.html"),
    ("dashboard.messenger", "Messenger", "/messenger.html"),
    ("dashboard.delete", "Delete Account", "/"),
];

const REQUIRED_FIELDS: [(&str, &str); 4] = [
    ("register.firstname", "firstname"),
    ("register.lastname", "lastname"),
    ("register.email", "email"),
    ("register.password", "password"),
];

#[derive(Default)]
pub struct BrowserStats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub shutdowns: AtomicUsize,
    /// Delay before a click takes effect, in milliseconds
    pub click_latency_ms: AtomicU64,
}

impl BrowserStats {
    pub fn open_pages(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }

    pub fn set_click_latency(&self, latency: Duration) {
        self.click_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }
}

pub struct FakeBrowser {
    store: SharedStore,
    base_url: String,
    pub stats: Arc<BrowserStats>,
}

impl FakeBrowser {
    pub fn new(app: &FakeApp) -> Self {
        Self {
            store: app.store.clone(),
            base_url: app.base_url.clone(),
            stats: Arc::default(),
        }
    }
}

#[async_trait]
impl BrowserEngine for FakeBrowser {
    async fn new_page(&self, options: PageOptions) -> E2eResult<Arc<dyn BrowserPage>> {
        let session = options
            .storage_state
            .as_ref()
            .and_then(session_cookie)
            .filter(|email| self.store.lock().find_by_email(email).is_some());

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakePage {
            base_url: self.base_url.clone(),
            store: self.store.clone(),
            stats: self.stats.clone(),
            state: Mutex::new(PageState::new(session)),
        }))
    }

    async fn shutdown(&self) -> E2eResult<()> {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn session_cookie(state: &Value) -> Option<String> {
    state["cookies"]
        .as_array()?
        .iter()
        .find(|c| c["name"] == SESSION_COOKIE)
        .and_then(|c| c["value"].as_str())
        .map(str::to_string)
}

struct PageState {
    path: String,
    session: Option<String>,
    menu_open: bool,
    fields: HashMap<&'static str, String>,
    keep_signed_in: bool,
    avatar: &'static str,
    show_validation: bool,
    alert: Option<&'static str>,
    login_error: bool,
    dark_mode: bool,
    editing: bool,
    closed: bool,
}

impl PageState {
    fn new(session: Option<String>) -> Self {
        Self {
            path: "about:blank".to_string(),
            session,
            menu_open: false,
            fields: HashMap::new(),
            keep_signed_in: false,
            avatar: AVATARS[0],
            show_validation: false,
            alert: None,
            login_error: false,
            dark_mode: false,
            editing: false,
            closed: false,
        }
    }

    fn navigate(&mut self, path: &str) {
        let path = if path == "/welcome" && self.session.is_none() {
            "/login/"
        } else {
            path
        };
        self.path = path.to_string();
        self.menu_open = false;
        self.fields.clear();
        self.keep_signed_in = false;
        self.avatar = AVATARS[0];
        self.show_validation = false;
        self.alert = None;
        self.login_error = false;
        self.editing = false;
    }

    fn field(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or("")
    }
}

pub struct FakePage {
    base_url: String,
    store: SharedStore,
    stats: Arc<BrowserStats>,
    state: Mutex<PageState>,
}

impl FakePage {
    fn open_state(&self) -> E2eResult<parking_lot::MutexGuard<'_, PageState>> {
        let state = self.state.lock();
        if state.closed {
            return Err(E2eError::Browser("page has been closed".into()));
        }
        Ok(state)
    }

    fn render(&self, state: &PageState) -> Vec<Element> {
        let store = self.store.lock();
        let user = state
            .session
            .as_deref()
            .and_then(|email| store.find_by_email(email));

        let mut dom = vec![Element::new("body", "body")
            .classes(if state.dark_mode { vec!["darkmode"] } else { vec![] })
            .css(
                "background-color",
                if state.dark_mode { "rgb(0, 0, 0)" } else { "rgb(255, 255, 255)" },
            )];

        dom.push(Element::new("header.menu", "div").test_id("btn-dropdown"));
        if state.menu_open {
            if user.is_some() {
                dom.push(Element::new("menu.account", "a").role("link", "My Account"));
                dom.push(Element::new("menu.messages", "a").role("link", "Message center"));
                dom.push(Element::new("menu.logout", "a").role("link", "Logout"));
            } else {
                dom.push(Element::new("menu.login", "a").id("loginBtn").role("link", "Login"));
                dom.push(Element::new("menu.register", "a").id("registerBtn").role("link", "Register"));
            }
        }
        if let Some(user) = user {
            dom.push(Element::new("header.logout", "button").id("logoutBtn").role("button", "Logout"));
            dom.push(Element::new("header.hello", "span").text(format!("Hello {}", user.first_name)));
        }
        if let Some(alert) = state.alert {
            dom.push(Element::new("alert", "div").test_id("alert-popup").text(alert));
        }

        match state.path.as_str() {
            "/login/" => {
                dom.push(Element::new("header.register", "a").id("registerLink").role("link", "Register"));
                dom.push(Element::input("login.email", state.field("login.email")).id("username"));
                dom.push(Element::input("login.password", state.field("login.password")).id("password"));
                dom.push(
                    Element::input("login.keep", if state.keep_signed_in { "on" } else { "" })
                        .id("keepSignIn"),
                );
                dom.push(Element::new("login.submit", "button").id("loginButton").role("button", "Login"));
                if state.login_error {
                    dom.push(Element::new("login.error", "div").test_id("login-error").text(LOGIN_ERROR));
                }
            }
            "/register.html" => {
                for (key, test_id) in [
                    ("register.firstname", "firstname-input"),
                    ("register.lastname", "lastname-input"),
                    ("register.email", "email-input"),
                    ("register.birthdate", "birthdate-input"),
                    ("register.password", "password-input"),
                ] {
                    dom.push(Element::input(key, state.field(key)).test_id(test_id));
                }
                if !state.field("register.birthdate").is_empty() {
                    dom.push(Element::new("register.datepicker_done", "button").class("ui-datepicker-close"));
                }
                let options = AVATARS
                    .iter()
                    .enumerate()
                    .map(|(i, value)| {
                        Element::new("register.avatar_option", "option")
                            .attr("value", value)
                            .text(format!("Face {}", i + 1))
                    })
                    .collect();
                dom.push(
                    Element::new("register.avatar", "select")
                        .id("avatar")
                        .value(state.avatar)
                        .children(options),
                );
                dom.push(
                    Element::new("register.picture", "img")
                        .id("userPicture")
                        .attr("src", &format!("{}/{}", self.base_url, state.avatar)),
                );
                dom.push(Element::new("register.submit", "button").test_id("register-button"));
                if state.show_validation {
                    for (key, name) in REQUIRED_FIELDS {
                        if state.field(key).is_empty() {
                            dom.push(
                                Element::new("register.error", "span")
                                    .id(&format!("octavalidate_{}", name))
                                    .text("This field is required"),
                            );
                        }
                    }
                }
            }
            "/welcome" => {
                if let Some(user) = user {
                    dom.push(Element::new("welcome.hello", "h2").test_id("hello").text(format!("Hi {}", user.email)));
                    dom.push(
                        Element::new("welcome.avatar", "img")
                            .id("myAvatar")
                            .attr("src", user.avatar.as_deref().unwrap_or(AVATARS[0])),
                    );
                    dom.push(Element::new("welcome.timer", "span").test_id("countDown").text("10:00"));
                }
                for (key, label, _) in DASHBOARD {
                    dom.push(Element::new(key, "button").role("button", label));
                }
                let edit = if state.editing {
                    "Save this Dashboard"
                } else {
                    "Edit this Dashboard"
                };
                dom.push(Element::new("dashboard.edit", "button").role("button", edit));
                dom.push(Element::new("dashboard.darkmode", "div").title("darkmode switch"));
            }
            _ => {}
        }
        dom
    }

    fn click(&self, state: &mut PageState, key: &'static str) -> E2eResult<()> {
        match key {
            "menu.login" => state.navigate("/login/"),
            "menu.register" | "header.register" => state.navigate("/register.html"),
            "menu.account" => state.navigate("/welcome"),
            "menu.messages" => state.navigate("/messenger.html"),
            "menu.logout" | "header.logout" => {
                state.session = None;
                state.navigate("/login/");
            }
            "login.submit" => {
                let email = state.field("login.email").to_string();
                let known = self
                    .store
                    .lock()
                    .check_credentials(&email, state.field("login.password"))
                    .is_some();
                if known {
                    state.session = Some(email);
                    state.navigate("/welcome");
                } else {
                    state.login_error = true;
                }
            }
            "register.submit" => self.submit_registration(state),
            "register.datepicker_done" => {}
            "dashboard.edit" => state.editing = !state.editing,
            "dashboard.darkmode" => state.dark_mode = !state.dark_mode,
            "dashboard.delete" => {
                if let Some(email) = state.session.take() {
                    self.store.lock().delete_account(&email);
                }
                state.navigate("/");
            }
            other => {
                if let Some((_, _, path)) = DASHBOARD.iter().find(|(k, _, _)| *k == other) {
                    state.navigate(path);
                }
            }
        }
        Ok(())
    }

    fn submit_registration(&self, state: &mut PageState) {
        if REQUIRED_FIELDS.iter().any(|(key, _)| state.field(key).is_empty()) {
            state.show_validation = true;
            return;
        }
        let user = NewUser {
            email: state.field("register.email").to_string(),
            first_name: state.field("register.firstname").to_string(),
            last_name: state.field("register.lastname").to_string(),
            password: state.field("register.password").to_string(),
            avatar: Some(state.avatar.to_string()),
        };
        match self.store.lock().create_user(user) {
            Ok(_) => {
                state.navigate("/login/");
                state.alert = Some(USER_CREATED);
            }
            Err(Refusal::Duplicate) => state.alert = Some(USER_NOT_CREATED),
            Err(_) => state.show_validation = true,
        }
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, path: &str) -> E2eResult<()> {
        self.open_state()?.navigate(path);
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        let state = self.open_state()?;
        Ok(format!("{}{}", self.base_url, state.path))
    }

    async fn perform(&self, selector: &Selector, action: &Action) -> E2eResult<()> {
        let latency = self.stats.click_latency_ms.load(Ordering::SeqCst);
        if matches!(action, Action::Click) && latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        let mut state = self.open_state()?;
        let dom = self.render(&state);
        let target = resolve(selector, &dom)
            .into_iter()
            .next()
            .ok_or_else(|| E2eError::Browser(format!("no element matches {}", selector)))?;

        match action {
            Action::Click => self.click(&mut state, target.key),
            Action::Hover => {
                if target.key == "header.menu" {
                    state.menu_open = true;
                }
                Ok(())
            }
            Action::Fill { value } if target.tag == "input" => {
                state.fields.insert(target.key, value.clone());
                Ok(())
            }
            Action::Check | Action::Uncheck if target.key == "login.keep" => {
                state.keep_signed_in = matches!(action, Action::Check);
                Ok(())
            }
            Action::SelectOption { value } if target.key == "register.avatar" => {
                match AVATARS.iter().find(|a| **a == value.as_str()) {
                    Some(avatar) => {
                        state.avatar = *avatar;
                        Ok(())
                    }
                    None => Err(E2eError::Browser(format!("no option {}", value))),
                }
            }
            Action::Press { .. } => Ok(()),
            other => Err(E2eError::Browser(format!("cannot {:?} {}", other, selector))),
        }
    }

    async fn query(&self, selector: &Selector, query: &Query) -> E2eResult<Value> {
        let state = self.open_state()?;
        let dom = self.render(&state);
        let matched = resolve(selector, &dom);
        let first = matched.first();
        let missing = || E2eError::Browser(format!("no element matches {}", selector));

        Ok(match query {
            Query::Visible => json!(first.is_some()),
            Query::Count => json!(matched.len()),
            Query::Text => json!(first.ok_or_else(missing)?.text),
            Query::AllTexts => json!(matched.iter().map(|e| e.text.clone()).collect::<Vec<_>>()),
            Query::InputValue => json!(first.ok_or_else(missing)?.value),
            Query::Attribute { name } => {
                let element = first.ok_or_else(missing)?;
                json!(element.attrs.get(name.as_str()))
            }
            Query::ClassList => json!(first.ok_or_else(missing)?.classes),
            Query::CssValue { property } => {
                let element = first.ok_or_else(missing)?;
                json!(element.css.get(property.as_str()).copied().unwrap_or(""))
            }
        })
    }

    async fn storage_state(&self) -> E2eResult<Value> {
        let state = self.open_state()?;
        let cookies: Vec<Value> = state
            .session
            .iter()
            .map(|email| json!({ "name": SESSION_COOKIE, "value": email, "path": "/" }))
            .collect();
        Ok(json!({ "cookies": cookies, "origins": [] }))
    }

    async fn close(&self) -> E2eResult<()> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Rendered element; only what is rendered is visible
#[derive(Debug, Clone, Default)]
struct Element {
    key: &'static str,
    tag: &'static str,
    id: Option<String>,
    test_id: Option<&'static str>,
    role: Option<(&'static str, String)>,
    title: Option<&'static str>,
    text: String,
    value: String,
    attrs: HashMap<&'static str, String>,
    classes: Vec<&'static str>,
    css: HashMap<&'static str, &'static str>,
    children: Vec<Element>,
}

impl Element {
    fn new(key: &'static str, tag: &'static str) -> Self {
        Self {
            key,
            tag,
            ..Default::default()
        }
    }

    fn input(key: &'static str, value: &str) -> Self {
        Self::new(key, "input").value(value)
    }

    fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    fn test_id(mut self, id: &'static str) -> Self {
        self.test_id = Some(id);
        self
    }

    fn role(mut self, role: &'static str, name: &str) -> Self {
        self.role = Some((role, name.to_string()));
        self.text = name.to_string();
        self
    }

    fn title(mut self, title: &'static str) -> Self {
        self.title = Some(title);
        self
    }

    fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    fn attr(mut self, name: &'static str, value: &str) -> Self {
        self.attrs.insert(name, value.to_string());
        self
    }

    fn class(mut self, class: &'static str) -> Self {
        self.classes.push(class);
        self
    }

    fn classes(mut self, classes: Vec<&'static str>) -> Self {
        self.classes = classes;
        self
    }

    fn css(mut self, property: &'static str, value: &'static str) -> Self {
        self.css.insert(property, value);
        self
    }

    fn children(mut self, children: Vec<Element>) -> Self {
        self.children = children;
        self
    }
}

fn resolve(selector: &Selector, scope: &[Element]) -> Vec<Element> {
    match selector {
        Selector::Within { parent, child } => resolve(parent, scope)
            .iter()
            .flat_map(|p| resolve(child, &p.children))
            .collect(),
        Selector::Nth { inner, index } => resolve(inner, scope).into_iter().nth(*index).into_iter().collect(),
        simple => {
            let mut found = Vec::new();
            collect(simple, scope, &mut found);
            found
        }
    }
}

fn collect(selector: &Selector, scope: &[Element], found: &mut Vec<Element>) {
    for element in scope {
        if matches(selector, element) {
            found.push(element.clone());
        }
        collect(selector, &element.children, found);
    }
}

fn matches(selector: &Selector, element: &Element) -> bool {
    match selector {
        Selector::Css { css } => matches_css(css, element),
        Selector::TestId { id } => element.test_id == Some(id.as_str()),
        Selector::Role { role, name } => match &element.role {
            Some((r, accessible)) => {
                *r == role.as_str() && name.as_ref().map_or(true, |n| n.matches(accessible))
            }
            None => false,
        },
        Selector::Title { title } => element.title == Some(title.as_str()),
        Selector::Text { text } => !element.text.is_empty() && text.matches(&element.text),
        Selector::Within { .. } | Selector::Nth { .. } => false,
    }
}

/// `#id`, `.class`, `[id*="part"]`, `tag[id="id"]` and bare tags
fn matches_css(css: &str, element: &Element) -> bool {
    let id = element.id.as_deref().unwrap_or("");
    if let Some(wanted) = css.strip_prefix('#') {
        return id == wanted;
    }
    if let Some(class) = css.strip_prefix('.') {
        return element.classes.iter().any(|c| *c == class);
    }
    if let Some(part) = css.strip_prefix("[id*=\"").and_then(|s| s.strip_suffix("\"]")) {
        return id.contains(part);
    }
    if let Some((tag, rest)) = css.split_once("[id=\"") {
        let wanted = rest.trim_end_matches("\"]");
        return element.tag == tag && id == wanted;
    }
    element.tag == css
}
