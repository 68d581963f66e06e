//! Retrying expectations on locators and page URLs
//!
//! Every expectation polls until it holds or the timeout elapses; only the
//! final observation is reported.

use regex::Regex;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::browser::{url_path, BrowserPage, Locator, TextMatch};
use crate::error::{E2eError, E2eResult};

pub const DEFAULT_EXPECT_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll `check` until it reports success
///
/// `check` yields `Ok(Err(observed))` while the condition does not hold yet;
/// engine errors are retried as well, since elements may still be attaching.
pub async fn poll_until<F, Fut>(what: &str, timeout: Duration, mut check: F) -> E2eResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Result<(), String>>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let observed = match check().await {
            Ok(Ok(())) => {
                debug!("Expectation met after {} attempt(s): {}", attempts, what);
                return Ok(());
            }
            Ok(Err(observed)) => observed,
            Err(e) => format!("error: {}", e),
        };

        if Instant::now() >= deadline {
            return Err(E2eError::AssertionFailed(format!(
                "{} (timed out after {:?}; last observed: {})",
                what, timeout, observed
            )));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Expectations on one locator
pub fn expect(locator: &Locator) -> LocatorAssertions {
    LocatorAssertions {
        locator: locator.clone(),
        timeout: DEFAULT_EXPECT_TIMEOUT,
    }
}

pub struct LocatorAssertions {
    locator: Locator,
    timeout: Duration,
}

impl LocatorAssertions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn describe(&self, what: &str) -> String {
        format!("{} {}", self.locator.selector(), what)
    }

    pub async fn to_be_visible(&self) -> E2eResult<()> {
        let locator = &self.locator;
        poll_until(&self.describe("to be visible"), self.timeout, move || async move {
            Ok(check(locator.is_visible().await?, "hidden"))
        })
        .await
    }

    pub async fn to_be_hidden(&self) -> E2eResult<()> {
        let locator = &self.locator;
        poll_until(&self.describe("to be hidden"), self.timeout, move || async move {
            Ok(check(!locator.is_visible().await?, "visible"))
        })
        .await
    }

    /// Whole text equals `expected`, ignoring surrounding whitespace
    pub async fn to_have_text(&self, expected: &str) -> E2eResult<()> {
        let what = self.describe(&format!("to have text {:?}", expected));
        self.text_matches(&what, TextMatch::exact(expected)).await
    }

    pub async fn to_contain_text(&self, expected: &str) -> E2eResult<()> {
        let what = self.describe(&format!("to contain text {:?}", expected));
        self.text_matches(&what, TextMatch::contains(expected)).await
    }

    async fn text_matches(&self, what: &str, expected: TextMatch) -> E2eResult<()> {
        let (locator, expected) = (&self.locator, &expected);
        poll_until(what, self.timeout, move || async move {
            let text = locator.text().await?;
            Ok(check(expected.matches(&text), &format!("{:?}", text)))
        })
        .await
    }

    pub async fn to_have_count(&self, expected: usize) -> E2eResult<()> {
        let what = self.describe(&format!("to match {} element(s)", expected));
        let locator = &self.locator;
        poll_until(&what, self.timeout, move || async move {
            let count = locator.count().await?;
            Ok(check(count == expected, &format!("{} element(s)", count)))
        })
        .await
    }

    pub async fn to_have_attribute(&self, name: &str, expected: &str) -> E2eResult<()> {
        let what = self.describe(&format!("to have {}={:?}", name, expected));
        let locator = &self.locator;
        poll_until(&what, self.timeout, move || async move {
            let value = locator.attribute(name).await?;
            Ok(check(
                value.as_deref() == Some(expected),
                &format!("{:?}", value),
            ))
        })
        .await
    }

    /// Class list contains `class`
    pub async fn to_have_class(&self, class: &str) -> E2eResult<()> {
        let what = self.describe(&format!("to have class {:?}", class));
        let locator = &self.locator;
        poll_until(&what, self.timeout, move || async move {
            let classes = locator.class_list().await?;
            Ok(check(
                classes.iter().any(|c| c == class),
                &format!("{:?}", classes),
            ))
        })
        .await
    }

    pub async fn to_have_css(&self, property: &str, expected: &str) -> E2eResult<()> {
        let what = self.describe(&format!("to have css {}: {}", property, expected));
        let locator = &self.locator;
        poll_until(&what, self.timeout, move || async move {
            let value = locator.css_value(property).await?;
            Ok(check(value == expected, &value))
        })
        .await
    }
}

fn check(holds: bool, observed: &str) -> Result<(), String> {
    if holds {
        Ok(())
    } else {
        Err(observed.to_string())
    }
}

/// Expected page location
#[derive(Debug, Clone)]
pub enum UrlMatch {
    /// Exact path (with query), e.g. `/welcome`
    Path(String),
    /// Regex searched in the full URL
    Pattern(Regex),
}

impl UrlMatch {
    pub fn path(path: impl Into<String>) -> Self {
        UrlMatch::Path(path.into())
    }

    pub fn pattern(source: &str) -> E2eResult<Self> {
        Regex::new(source)
            .map(UrlMatch::Pattern)
            .map_err(|e| E2eError::Configuration(format!("bad URL pattern {:?}: {}", source, e)))
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlMatch::Path(path) => url_path(url) == path,
            UrlMatch::Pattern(re) => re.is_match(url),
        }
    }
}

impl From<&str> for UrlMatch {
    fn from(path: &str) -> Self {
        UrlMatch::path(path)
    }
}

pub async fn expect_url(
    page: &dyn BrowserPage,
    expected: impl Into<UrlMatch>,
    timeout: Duration,
) -> E2eResult<()> {
    let expected = expected.into();
    let what = format!("page URL to match {:?}", expected);
    let expected = &expected;
    poll_until(&what, timeout, move || async move {
        let url = page.current_url().await?;
        Ok(check(expected.matches(&url), &url))
    })
    .await
}
