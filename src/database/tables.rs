use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{WEBUI_TABLE, is_reserved};
use crate::error::Error;

/// One row of a tenant's user table, with `data` decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub identifier: String,
    pub data: Value,
    pub created_at: String,
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    identifier: String,
    data: String,
    created_at: String,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self, Error> {
        Ok(Self {
            id: row.id,
            identifier: row.identifier,
            data: serde_json::from_str(&row.data)?,
            created_at: row.created_at,
        })
    }
}

/// Handle on the `{client_id}_users` table of one tenant.
///
/// Construction validates the name, so a `UserTable` never refers to a
/// system table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTable {
    name: String,
}

impl UserTable {
    /// # Errors
    ///
    /// [`Error::ReservedTableName`] for a system table name,
    /// [`Error::InvalidTableName`] for an empty name or one containing `"` or NUL.
    pub fn new(client_id: &str) -> Result<Self, Error> {
        if is_reserved(client_id) {
            return Err(Error::ReservedTableName(client_id.to_owned()));
        }
        if client_id.is_empty() || client_id.contains(['"', '\0']) {
            return Err(Error::InvalidTableName(client_id.to_owned()));
        }
        Ok(Self::named(client_id))
    }

    /// The admin UI's own user table.
    pub(super) fn web_ui() -> Self {
        Self::named(WEBUI_TABLE)
    }

    fn named(client_id: &str) -> Self {
        Self {
            name: format!("{client_id}_users"),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn quoted(&self) -> String {
        format!("\"{}\"", self.name)
    }

    pub async fn create(&self, pool: &SqlitePool) -> Result<(), Error> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                identifier TEXT UNIQUE NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            self.quoted()
        );
        sqlx::query(&sql).execute(pool).await?;
        tracing::info!(table = %self.name, "User table created");
        Ok(())
    }

    pub async fn drop(&self, pool: &SqlitePool) -> Result<(), Error> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.quoted());
        sqlx::query(&sql).execute(pool).await?;
        tracing::info!(table = %self.name, "User table dropped");
        Ok(())
    }

    /// Insert a user; `created_at` is stamped now (RFC 3339, UTC).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] on a duplicate `id` or `identifier`.
    pub async fn insert(
        &self,
        pool: &SqlitePool,
        id: &str,
        identifier: &str,
        data: &Value,
    ) -> Result<UserRecord, Error> {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| Error::Database(sqlx::Error::Encode(Box::new(e))))?;
        let encoded = serde_json::to_string(data)?;

        let sql = format!(
            "INSERT INTO {} (id, identifier, data, created_at) VALUES (?, ?, ?, ?)",
            self.quoted()
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(identifier)
            .bind(&encoded)
            .bind(&created_at)
            .execute(pool)
            .await?;

        Ok(UserRecord {
            id: id.to_owned(),
            identifier: identifier.to_owned(),
            data: data.clone(),
            created_at,
        })
    }

    pub async fn find_by_identifier(
        &self,
        pool: &SqlitePool,
        identifier: &str,
    ) -> Result<Option<UserRecord>, Error> {
        let sql = format!(
            "SELECT id, identifier, data, created_at FROM {} WHERE identifier = ?",
            self.quoted()
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(identifier)
            .fetch_optional(pool)
            .await?
            .map(UserRecord::try_from)
            .transpose()
    }

    /// Replace a user's `data`. Returns `false` if no row matched.
    pub async fn update_data(
        &self,
        pool: &SqlitePool,
        identifier: &str,
        data: &Value,
    ) -> Result<bool, Error> {
        let sql = format!("UPDATE {} SET data = ? WHERE identifier = ?", self.quoted());
        let result = sqlx::query(&sql)
            .bind(serde_json::to_string(data)?)
            .bind(identifier)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn setup_test_db() -> SqlitePool {
        SqlitePool::connect(":memory:").await.unwrap()
    }

    #[test]
    fn reserved_names_are_rejected() {
        for name in super::super::RESERVED_TABLE_NAMES {
            assert!(matches!(
                UserTable::new(name),
                Err(Error::ReservedTableName(n)) if n == name
            ));
        }
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(matches!(UserTable::new(""), Err(Error::InvalidTableName(_))));
        assert!(matches!(
            UserTable::new("a\"; DROP TABLE x; --"),
            Err(Error::InvalidTableName(_))
        ));
        assert!(matches!(UserTable::new("a\0b"), Err(Error::InvalidTableName(_))));
    }

    #[test]
    fn table_name_is_suffixed() {
        assert_eq!(UserTable::new("acme").unwrap().name(), "acme_users");
        assert_eq!(UserTable::web_ui().name(), "openauth_webui_users");
    }

    #[tokio::test]
    async fn user_lifecycle() {
        let pool = setup_test_db().await;
        let table = UserTable::new("acme").unwrap();
        table.create(&pool).await.unwrap();
        table.create(&pool).await.unwrap();

        let inserted = table
            .insert(&pool, "u1", "a@example.com", &json!({"plan": "free"}))
            .await
            .unwrap();
        assert!(OffsetDateTime::parse(&inserted.created_at, &Rfc3339).is_ok());

        let found = table
            .find_by_identifier(&pool, "a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, inserted);

        assert!(
            table
                .update_data(&pool, "a@example.com", &json!({"plan": "pro"}))
                .await
                .unwrap()
        );
        let found = table
            .find_by_identifier(&pool, "a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.data, json!({"plan": "pro"}));

        assert!(!table.update_data(&pool, "nobody", &json!({})).await.unwrap());
        assert!(table.find_by_identifier(&pool, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_identifier_fails() {
        let pool = setup_test_db().await;
        let table = UserTable::new("acme").unwrap();
        table.create(&pool).await.unwrap();
        table.insert(&pool, "u1", "dup", &json!({})).await.unwrap();

        let err = table.insert(&pool, "u2", "dup", &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn drop_removes_table() {
        let pool = setup_test_db().await;
        let table = UserTable::new("acme").unwrap();
        table.create(&pool).await.unwrap();
        table.drop(&pool).await.unwrap();
        table.drop(&pool).await.unwrap();

        let err = table.find_by_identifier(&pool, "x").await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let pool = setup_test_db().await;
        let acme = UserTable::new("acme").unwrap();
        let globex = UserTable::new("globex").unwrap();
        acme.create(&pool).await.unwrap();
        globex.create(&pool).await.unwrap();

        acme.insert(&pool, "u1", "same@example.com", &json!(1)).await.unwrap();
        globex.insert(&pool, "u1", "same@example.com", &json!(2)).await.unwrap();

        let a = acme.find_by_identifier(&pool, "same@example.com").await.unwrap().unwrap();
        let g = globex.find_by_identifier(&pool, "same@example.com").await.unwrap().unwrap();
        assert_eq!(a.data, json!(1));
        assert_eq!(g.data, json!(2));
    }
}
