//! appcheck E2E/API harness
//!
//! Supplies each test with isolated, pre-configured collaborators
//! (authenticated API clients, ephemeral users, page objects) and tears
//! them down whatever the test outcome.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Test body                                                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Worker (fixture::worker)                                   │
//! │    ├── resolve(names) -> ResolvedSet   topological setup    │
//! │    ├── run(names, body)                guaranteed teardown  │
//! │    └── shutdown()                      worker-scope release │
//! │  FixtureGraph (fixture::graph) + Catalog (fixture::catalog) │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UserLifecycle      register / login / delete (API or UI)   │
//! │  ApiClient          REST surface + response contracts       │
//! │  Page objects       LoginPage, RegisterPage, UserProfilePage│
//! │  AuthCache / setup  .auth/api-user.json, .auth/user.json    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserEngine / BrowserPage  <- PlaywrightEngine (Node)    │
//! │  reqwest                                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth_cache;
pub mod browser;
pub mod error;
pub mod expect;
pub mod fixture;
pub mod lifecycle;
pub mod logging;
pub mod pages;
pub mod playwright;
pub mod probe;
pub mod setup;

pub use api::{ApiClient, ApiResponse, AuthContext};
pub use auth_cache::{ApiAuthState, AuthCache};
pub use browser::{BrowserEngine, BrowserPage, Locator, PageOptions, Selector, TextMatch};
pub use error::{E2eError, E2eResult};
pub use expect::{expect, expect_url, UrlMatch};
pub use fixture::catalog::{Catalog, TempAuthUser};
pub use fixture::{Fixture, FixtureDef, FixtureGraph, FixtureKey, Fixtures, Scope, Worker};
pub use lifecycle::{Channel, Deletion, UserLifecycle};
pub use playwright::PlaywrightEngine;
