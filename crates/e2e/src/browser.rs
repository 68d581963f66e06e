//! Browser automation contract
//!
//! Page objects and UI fixtures only talk to a [`BrowserEngine`] and the
//! [`BrowserPage`]s it opens. The Playwright driver implements both; the
//! selectors, actions and queries below are what crosses that boundary.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{E2eError, E2eResult};

/// How element text or an accessible name is matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", content = "value", rename_all = "snake_case")]
pub enum TextMatch {
    Exact(String),
    Contains(String),
    /// Regular expression source
    Pattern(String),
}

impl TextMatch {
    pub fn exact(text: impl Into<String>) -> Self {
        TextMatch::Exact(text.into())
    }

    pub fn contains(text: impl Into<String>) -> Self {
        TextMatch::Contains(text.into())
    }

    pub fn pattern(source: impl Into<String>) -> Self {
        TextMatch::Pattern(source.into())
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            TextMatch::Exact(expected) => text.trim() == expected,
            TextMatch::Contains(part) => text.contains(part.as_str()),
            TextMatch::Pattern(source) => regex::Regex::new(source)
                .map(|re| re.is_match(text))
                .unwrap_or(false),
        }
    }
}

/// Element selector, resolved lazily by the engine on every use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selector {
    Css {
        css: String,
    },
    /// `data-testid` attribute
    TestId {
        id: String,
    },
    /// ARIA role, optionally narrowed by accessible name
    Role {
        role: String,
        name: Option<TextMatch>,
    },
    Title {
        title: String,
    },
    Text {
        text: TextMatch,
    },
    Within {
        parent: Box<Selector>,
        child: Box<Selector>,
    },
    Nth {
        inner: Box<Selector>,
        index: usize,
    },
}

impl Selector {
    pub fn css(css: impl Into<String>) -> Self {
        Selector::Css { css: css.into() }
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Selector::TestId { id: id.into() }
    }

    pub fn role(role: impl Into<String>, name: TextMatch) -> Self {
        Selector::Role {
            role: role.into(),
            name: Some(name),
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Selector::Title {
            title: title.into(),
        }
    }

    pub fn text(text: TextMatch) -> Self {
        Selector::Text { text }
    }

    /// `child` searched inside the elements matched by `self`
    pub fn child(self, child: Selector) -> Self {
        Selector::Within {
            parent: Box::new(self),
            child: Box::new(child),
        }
    }

    pub fn nth(self, index: usize) -> Self {
        Selector::Nth {
            inner: Box::new(self),
            index,
        }
    }

    pub fn first(self) -> Self {
        self.nth(0)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css { css } => write!(f, "{}", css),
            Selector::TestId { id } => write!(f, "[data-testid=\"{}\"]", id),
            Selector::Role { role, name: None } => write!(f, "role={}", role),
            Selector::Role {
                role,
                name: Some(name),
            } => write!(f, "role={}[name={:?}]", role, name),
            Selector::Title { title } => write!(f, "[title=\"{}\"]", title),
            Selector::Text { text } => write!(f, "text={:?}", text),
            Selector::Within { parent, child } => write!(f, "{} >> {}", parent, child),
            Selector::Nth { inner, index } => write!(f, "{} >> nth={}", inner, index),
        }
    }
}

/// DOM action, awaited to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Click,
    Hover,
    Fill { value: String },
    Check,
    Uncheck,
    SelectOption { value: String },
    Press { key: String },
}

/// Observation of the elements a selector currently matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum Query {
    /// `bool`: first match exists and is visible
    Visible,
    /// number of matches
    Count,
    /// text content of the first match
    Text,
    /// text content of every match
    AllTexts,
    InputValue,
    /// attribute of the first match, `null` when absent
    Attribute { name: String },
    ClassList,
    /// computed style property of the first match
    CssValue { property: String },
}

/// Options for a new page (and its browser context)
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    /// Cookies and local storage to start from
    pub storage_state: Option<Value>,
}

impl PageOptions {
    pub fn with_storage_state(state: Value) -> Self {
        Self {
            storage_state: Some(state),
        }
    }
}

/// One live page in its own browser context
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate to a path relative to the base URL and wait for the load
    async fn goto(&self, path: &str) -> E2eResult<()>;

    /// Absolute URL currently displayed
    async fn current_url(&self) -> E2eResult<String>;

    async fn perform(&self, selector: &Selector, action: &Action) -> E2eResult<()>;

    async fn query(&self, selector: &Selector, query: &Query) -> E2eResult<Value>;

    /// Cookies and origins, as Playwright's `storageState()`
    async fn storage_state(&self) -> E2eResult<Value>;

    async fn close(&self) -> E2eResult<()>;
}

/// Launched browser able to open isolated pages
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn new_page(&self, options: PageOptions) -> E2eResult<Arc<dyn BrowserPage>>;

    async fn shutdown(&self) -> E2eResult<()>;
}

/// Deferred handle to whatever `selector` matches on `page`
///
/// Nothing is looked up until an action or query is issued.
#[derive(Clone)]
pub struct Locator {
    page: Arc<dyn BrowserPage>,
    selector: Selector,
}

impl Locator {
    pub fn new(page: Arc<dyn BrowserPage>, selector: Selector) -> Self {
        Self { page, selector }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn page(&self) -> &Arc<dyn BrowserPage> {
        &self.page
    }

    pub fn locator(&self, child: Selector) -> Locator {
        Locator::new(self.page.clone(), self.selector.clone().child(child))
    }

    pub fn nth(&self, index: usize) -> Locator {
        Locator::new(self.page.clone(), self.selector.clone().nth(index))
    }

    pub fn first(&self) -> Locator {
        self.nth(0)
    }

    pub async fn click(&self) -> E2eResult<()> {
        self.page.perform(&self.selector, &Action::Click).await
    }

    pub async fn hover(&self) -> E2eResult<()> {
        self.page.perform(&self.selector, &Action::Hover).await
    }

    pub async fn fill(&self, value: &str) -> E2eResult<()> {
        let action = Action::Fill {
            value: value.to_string(),
        };
        self.page.perform(&self.selector, &action).await
    }

    pub async fn check(&self) -> E2eResult<()> {
        self.page.perform(&self.selector, &Action::Check).await
    }

    pub async fn uncheck(&self) -> E2eResult<()> {
        self.page.perform(&self.selector, &Action::Uncheck).await
    }

    pub async fn select_option(&self, value: &str) -> E2eResult<()> {
        let action = Action::SelectOption {
            value: value.to_string(),
        };
        self.page.perform(&self.selector, &action).await
    }

    pub async fn press(&self, key: &str) -> E2eResult<()> {
        let action = Action::Press {
            key: key.to_string(),
        };
        self.page.perform(&self.selector, &action).await
    }

    pub async fn is_visible(&self) -> E2eResult<bool> {
        self.observe(Query::Visible).await
    }

    pub async fn count(&self) -> E2eResult<usize> {
        self.observe(Query::Count).await
    }

    pub async fn text(&self) -> E2eResult<String> {
        self.observe(Query::Text).await
    }

    pub async fn all_texts(&self) -> E2eResult<Vec<String>> {
        self.observe(Query::AllTexts).await
    }

    pub async fn input_value(&self) -> E2eResult<String> {
        self.observe(Query::InputValue).await
    }

    pub async fn attribute(&self, name: &str) -> E2eResult<Option<String>> {
        self.observe(Query::Attribute {
            name: name.to_string(),
        })
        .await
    }

    pub async fn class_list(&self) -> E2eResult<Vec<String>> {
        self.observe(Query::ClassList).await
    }

    pub async fn css_value(&self, property: &str) -> E2eResult<String> {
        self.observe(Query::CssValue {
            property: property.to_string(),
        })
        .await
    }

    async fn observe<T: DeserializeOwned>(&self, query: Query) -> E2eResult<T> {
        let value = self.page.query(&self.selector, &query).await?;
        serde_json::from_value(value).map_err(|e| {
            E2eError::Browser(format!("bad {:?} result for {}: {}", query, self.selector, e))
        })
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Locator").field(&self.selector).finish()
    }
}

/// Path, query and fragment of an absolute URL
pub fn url_path(url: &str) -> &str {
    let after_scheme = match url.find("://") {
        Some(i) => &url[i + 3..],
        None => return url,
    };
    match after_scheme.find('/') {
        Some(i) => &after_scheme[i..],
        None => "/",
    }
}
