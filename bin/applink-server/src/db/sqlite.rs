//! SQLite implementation of [`CodeStore`] and [`UserStore`].
//!
//! Migrations under `./migrations` are embedded at compile time and run by
//! [`SqliteStore::connect`]. Queries use the runtime-checked `sqlx::query`
//! form so no `DATABASE_URL` is needed to build.

use applink_types::GeneratedCode;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::{CodeStore, UserRecord, UserStore};

type CodeRow = (String, String, String, String, DateTime<Utc>, DateTime<Utc>);
type UserRow = (String, String, String, String, DateTime<Utc>);

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run pending migrations.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(url).await?;
        Self::migrate(pool).await
    }

    /// A private in-memory database. One connection, so every query sees
    /// the same data.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(pool).await
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

fn code_from_row((id, code, model, prompt, created_at, updated_at): CodeRow) -> GeneratedCode {
    GeneratedCode {
        id,
        code,
        model,
        prompt,
        created_at,
        updated_at,
    }
}

fn user_from_row((id, email, name, password_hash, created_at): UserRow) -> UserRecord {
    UserRecord {
        id,
        email,
        name,
        password_hash,
        created_at,
    }
}

// ── CodeStore ────────────────────────────────────────────────────────────────

impl CodeStore for SqliteStore {
    async fn insert_code(&self, record: GeneratedCode) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO generated_code (id, code, model, prompt, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.id)
        .bind(&record.code)
        .bind(&record.model)
        .bind(&record.prompt)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_code(&self, id: &str, code: &str) -> Result<Option<GeneratedCode>, sqlx::Error> {
        let result = sqlx::query("UPDATE generated_code SET code = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(code)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_code(id).await
    }

    async fn get_code(&self, id: &str) -> Result<Option<GeneratedCode>, sqlx::Error> {
        let row: Option<CodeRow> = sqlx::query_as(
            "SELECT id, code, model, prompt, created_at, updated_at \
             FROM generated_code WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(code_from_row))
    }
}

// ── UserStore ────────────────────────────────────────────────────────────────

impl UserStore for SqliteStore {
    async fn insert_user(&self, record: UserRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id, email, name, password_hash, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&record.id)
        .bind(&record.email)
        .bind(&record.name)
        .bind(&record.password_hash)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, password_hash, created_at FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, password_hash, created_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }
}

/// `true` when `err` is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(id: &str) -> GeneratedCode {
        let now = Utc::now();
        GeneratedCode {
            id: id.into(),
            code: "export default App;".into(),
            model: "gemini-1.5-pro".into(),
            prompt: "todo app".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn user(email: &str) -> UserRecord {
        UserRecord {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.into(),
            name: "Ada".into(),
            password_hash: "hash".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn code_round_trip_and_update() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_code(sample("a")).await.unwrap();

        let fetched = store.get_code("a").await.unwrap().unwrap();
        assert_eq!(fetched.prompt, "todo app");

        let updated = store.update_code("a", "let x = 1;").await.unwrap().unwrap();
        assert_eq!(updated.code, "let x = 1;");
        assert_eq!(updated.created_at, fetched.created_at);
        assert!(updated.updated_at >= fetched.updated_at);
    }

    #[tokio::test]
    async fn update_of_unknown_id_changes_nothing() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.update_code("missing", "x").await.unwrap().is_none());
        assert!(store.get_code("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_timestamp_is_a_decode_error() {
        let store = SqliteStore::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO generated_code (id, code, model, prompt, created_at, updated_at) \
             VALUES ('bad', 'x', 'm', 'p', 'not a time', 'not a time')",
        )
        .execute(&store.pool)
        .await
        .unwrap();
        assert!(matches!(
            store.get_code("bad").await,
            Err(sqlx::Error::ColumnDecode { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_user(user("ada@example.com")).await.unwrap();
        let err = store.insert_user(user("ada@example.com")).await.unwrap_err();
        assert!(is_unique_violation(&err));

        let found = store.find_user_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(store.get_user(&found.id).await.unwrap(), Some(found));
    }
}
