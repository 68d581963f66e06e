//! Wire and record types for the application's REST surface

use serde::{Deserialize, Serialize};

/// Identifier assigned by the application to users
pub type UserId = u64;

/// Identifier assigned by the application to articles
pub type ArticleId = u64;

/// Bearer token returned by `POST /api/login`
pub type SessionToken = String;

/// User as returned by `/api/users`
///
/// Fields the caller is not allowed to see come back masked (`****`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUser {
    pub id: UserId,
    pub email: String,
    #[serde(rename = "firstname")]
    pub first_name: String,
    #[serde(rename = "lastname")]
    pub last_name: String,
    pub password: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Body of `POST /api/users` and `PUT /api/users/:id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    #[serde(rename = "firstname")]
    pub first_name: String,
    #[serde(rename = "lastname")]
    pub last_name: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl NewUser {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

/// Body of `PATCH /api/users/:id`; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, rename = "firstname", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, rename = "lastname", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// User credential record produced by registration
///
/// `id` stays `None` until the application has assigned one (UI
/// registrations never report it back).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub id: Option<UserId>,
}

impl UserRecord {
    /// Build the record for a user the application just created
    pub fn registered(submitted: &NewUser, created: &ApiUser) -> Self {
        Self {
            first_name: created.first_name.clone(),
            last_name: created.last_name.clone(),
            email: created.email.clone(),
            password: submitted.password.clone(),
            avatar: created.avatar.clone(),
            id: Some(created.id),
        }
    }

    /// Record for a UI registration, where no id is reported
    pub fn unregistered(submitted: &NewUser) -> Self {
        Self {
            first_name: submitted.first_name.clone(),
            last_name: submitted.last_name.clone(),
            email: submitted.email.clone(),
            password: submitted.password.clone(),
            avatar: submitted.avatar.clone(),
            id: None,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }

    /// Apply a partial update the way the application merges it
    pub fn merged(&self, patch: &UserPatch) -> Self {
        Self {
            first_name: patch.first_name.clone().unwrap_or_else(|| self.first_name.clone()),
            last_name: patch.last_name.clone().unwrap_or_else(|| self.last_name.clone()),
            email: patch.email.clone().unwrap_or_else(|| self.email.clone()),
            password: patch.password.clone().unwrap_or_else(|| self.password.clone()),
            avatar: patch.avatar.clone().or_else(|| self.avatar.clone()),
            id: self.id,
        }
    }

    /// Wire representation, for comparing against `/api/users` responses
    pub fn to_api_user(&self) -> Option<ApiUser> {
        Some(ApiUser {
            id: self.id?,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            password: self.password.clone(),
            avatar: self.avatar.clone(),
        })
    }
}

/// Body of `POST /api/login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Response of `POST /api/login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: SessionToken,
}

/// Article as returned by `/api/articles`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub body: String,
    pub date: String,
    pub image: String,
    pub user_id: UserId,
}

/// Body of `POST /api/articles` and `PUT /api/articles/:id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub body: String,
    pub date: String,
    pub image: String,
}

impl NewArticle {
    /// What the application returns after storing this article
    pub fn stored_as(&self, id: ArticleId, user_id: UserId) -> Article {
        Article {
            id,
            title: self.title.clone(),
            body: self.body.clone(),
            date: self.date.clone(),
            image: self.image.clone(),
            user_id,
        }
    }
}

/// Body of `PATCH /api/articles/:id`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticlePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Article {
    pub fn merged(&self, patch: &ArticlePatch) -> Self {
        Self {
            id: self.id,
            title: patch.title.clone().unwrap_or_else(|| self.title.clone()),
            body: patch.body.clone().unwrap_or_else(|| self.body.clone()),
            date: patch.date.clone().unwrap_or_else(|| self.date.clone()),
            image: patch.image.clone().unwrap_or_else(|| self.image.clone()),
            user_id: self.user_id,
        }
    }
}
