//! Database abstraction layer.
//!
//! [`CodeStore`] persists generated code and [`UserStore`] holds accounts.
//! The default implementation of both is [`sqlite::SqliteStore`]. Trait
//! methods use `impl Future` in their signatures, so no `async-trait` is
//! needed on this side.

pub mod sqlite;

use std::future::Future;

use applink_types::{GeneratedCode, UserSession};
use chrono::{DateTime, Utc};

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn session(&self) -> UserSession {
        UserSession {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

pub trait CodeStore: Send + Sync + 'static {
    fn insert_code(
        &self,
        record: GeneratedCode,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Replace the code of an existing row, returning the updated row or
    /// `None` when `id` is unknown.
    fn update_code(
        &self,
        id: &str,
        code: &str,
    ) -> impl Future<Output = Result<Option<GeneratedCode>, sqlx::Error>> + Send;

    fn get_code(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<GeneratedCode>, sqlx::Error>> + Send;
}

pub trait UserStore: Send + Sync + 'static {
    /// Insert a user. Fails with a unique-constraint database error when
    /// the email is taken.
    fn insert_user(
        &self,
        record: UserRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn find_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;

    fn get_user(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;
}
