/// Embedded document-store persistence backend
///
/// One row per unit holding the JSON document, with a store-native locator
/// index maintained alongside the record rows. Stored documents that fail
/// to parse at load time are moved into a quarantine table so they are
/// never retried.
use crate::{
    error::{DirectoryError, DirectoryResult},
    model::{AccountLocators, Person, ProfileRecord},
    store::{PersistenceBackend, ProfileLoad, RecordLoad},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Connect and run table migrations
    pub async fn connect(url: &str) -> DirectoryResult<Self> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(DirectoryError::Database)?;

        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    async fn migrate(&self) -> DirectoryResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS people (
                id INTEGER PRIMARY KEY,
                doc TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS person_locators (
                locator TEXT PRIMARY KEY,
                person_id INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                account_key TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS account_locators (
                account_key TEXT PRIMARY KEY,
                doc TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quarantine (
                source TEXT NOT NULL,
                unit_key TEXT NOT NULL,
                doc TEXT NOT NULL,
                quarantined_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Copy an unparseable stored document into the quarantine table.
    /// The caller drops the live row so it is never re-indexed.
    async fn quarantine(&self, source: &str, unit_key: &str, doc: &str) -> DirectoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO quarantine (source, unit_key, doc, quarantined_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(source)
        .bind(unit_key)
        .bind(doc)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// By-locator lookup resolved entirely inside the database, against
    /// the `person_locators` index table.
    ///
    /// The record store answers queries from its in-memory indices; this
    /// path is for callers working against the database alone (maintenance
    /// tooling, or verifying the index table tracks record rewrites).
    pub async fn record_by_locator(&self, locator: &str) -> DirectoryResult<Option<Person>> {
        let row = sqlx::query(
            r#"
            SELECT p.doc
            FROM people p
            JOIN person_locators pl ON pl.person_id = p.id
            WHERE pl.locator = ?1
            "#,
        )
        .bind(locator)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let doc: String = row.try_get("doc")?;
                Ok(serde_json::from_str(&doc).ok())
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PersistenceBackend for SqliteBackend {
    async fn load_records(&self) -> DirectoryResult<RecordLoad> {
        let rows = sqlx::query("SELECT id, doc FROM people")
            .fetch_all(&self.pool)
            .await?;

        let mut load = RecordLoad::default();

        for row in rows {
            let id: i64 = row.try_get("id")?;
            let doc: String = row.try_get("doc")?;

            match serde_json::from_str::<Person>(&doc) {
                Ok(person) => load.records.push(person),
                Err(e) => {
                    tracing::error!(id, %e, "failed to index stored record, quarantining");
                    self.quarantine("people", &id.to_string(), &doc).await?;
                    sqlx::query("DELETE FROM people WHERE id = ?1")
                        .bind(id)
                        .execute(&self.pool)
                        .await?;
                    load.quarantined += 1;
                }
            }
        }

        Ok(load)
    }

    async fn write_record(&self, person: &Person) -> DirectoryResult<()> {
        let doc = serde_json::to_string(person)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO people (id, doc, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                doc = excluded.doc,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(person.id)
        .bind(&doc)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        // rewrite the native locator index for this record
        sqlx::query("DELETE FROM person_locators WHERE person_id = ?1")
            .bind(person.id)
            .execute(&mut *tx)
            .await?;

        for locator in &person.locators {
            sqlx::query(
                r#"
                INSERT INTO person_locators (locator, person_id)
                VALUES (?1, ?2)
                ON CONFLICT(locator) DO UPDATE SET person_id = excluded.person_id
                "#,
            )
            .bind(locator)
            .bind(person.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove_record(&self, id: i64) -> DirectoryResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM person_locators WHERE person_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM people WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_profiles(&self) -> DirectoryResult<ProfileLoad> {
        let rows = sqlx::query("SELECT account_key, doc FROM profiles")
            .fetch_all(&self.pool)
            .await?;

        let mut load = ProfileLoad::default();

        for row in rows {
            let key: String = row.try_get("account_key")?;
            let doc: String = row.try_get("doc")?;

            match serde_json::from_str::<ProfileRecord>(&doc) {
                Ok(record) => load.profiles.push((key, record)),
                Err(e) => {
                    tracing::error!(key = %key, %e, "failed to index stored profile, quarantining");
                    self.quarantine("profiles", &key, &doc).await?;
                    sqlx::query("DELETE FROM profiles WHERE account_key = ?1")
                        .bind(&key)
                        .execute(&self.pool)
                        .await?;
                    load.quarantined += 1;
                }
            }
        }

        Ok(load)
    }

    async fn read_profile(&self, key: &str) -> DirectoryResult<Option<ProfileRecord>> {
        let row = sqlx::query("SELECT doc FROM profiles WHERE account_key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let doc: String = row.try_get("doc")?;
                Ok(serde_json::from_str(&doc).ok())
            }
            None => Ok(None),
        }
    }

    async fn write_profile(&self, key: &str, record: &ProfileRecord) -> DirectoryResult<()> {
        let doc = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT INTO profiles (account_key, doc, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(account_key) DO UPDATE SET
                doc = excluded.doc,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&doc)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_profile(&self, key: &str) -> DirectoryResult<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE account_key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_mapping(&self) -> DirectoryResult<Vec<AccountLocators>> {
        let rows = sqlx::query("SELECT account_key, doc FROM account_locators")
            .fetch_all(&self.pool)
            .await?;

        let mut mapping = Vec::new();
        for row in rows {
            let doc: String = row.try_get("doc")?;
            match serde_json::from_str::<AccountLocators>(&doc) {
                Ok(entry) => mapping.push(entry),
                Err(e) => {
                    let key: String = row.try_get("account_key")?;
                    tracing::error!(key = %key, %e, "skipping unparseable mapping entry");
                }
            }
        }

        Ok(mapping)
    }

    async fn write_mapping(&self, mapping: &[AccountLocators]) -> DirectoryResult<()> {
        // wholesale rewrite, mirroring the mapping file semantics
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM account_locators")
            .execute(&mut *tx)
            .await?;

        for entry in mapping {
            sqlx::query("INSERT INTO account_locators (account_key, doc) VALUES (?1, ?2)")
                .bind(entry.account.key())
                .bind(serde_json::to_string(entry)?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
