use chrono::{DateTime, SecondsFormat, Utc};
use lexicards_core::{
    repo::{sort_cards, Repository},
    Card, CardContent, CardId, CoreError, Folder, FolderId, Rating, Review, SchedulingState,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use std::path::Path;
use tracing::error;

const CARD_COLUMNS: &str = "id,folder_id,word,pronunciation,meaning,synonyms,examples,\
    repetitions,ease,interval_days,next_review,last_reviewed,version,created_at";

pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    /// Private in-memory database. One connection, since every connection to
    /// `:memory:` would otherwise see its own empty database.
    pub async fn open_memory() -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    async fn ensure_schema(&self) -> Result<(), CoreError> {
        const STMT: &str = r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS folders (
          id          TEXT PRIMARY KEY,
          name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
          created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cards (
          id             TEXT PRIMARY KEY,
          folder_id      TEXT NOT NULL,
          word           TEXT NOT NULL,
          pronunciation  TEXT NOT NULL DEFAULT '',
          meaning        TEXT NOT NULL DEFAULT '',
          synonyms       TEXT NOT NULL DEFAULT '',
          examples       TEXT NOT NULL DEFAULT '[]',
          repetitions    INTEGER NOT NULL DEFAULT 0,
          ease           REAL    NOT NULL DEFAULT 2.5,
          interval_days  INTEGER NOT NULL DEFAULT 0,
          next_review    TEXT    NOT NULL,
          last_reviewed  TEXT,
          version        INTEGER NOT NULL DEFAULT 0,
          created_at     TEXT NOT NULL,
          FOREIGN KEY(folder_id) REFERENCES folders(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS reviews (
          id             TEXT PRIMARY KEY,
          card_id        TEXT NOT NULL,
          rating         TEXT NOT NULL,
          reviewed_at    TEXT NOT NULL,
          interval_days  INTEGER NOT NULL,
          ease_after     REAL NOT NULL,
          FOREIGN KEY(card_id) REFERENCES cards(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_cards_folder_due ON cards (folder_id, next_review);
        CREATE INDEX IF NOT EXISTS idx_reviews_card_time ON reviews (card_id, reviewed_at);
        "#;

        for chunk in STMT.split(';') {
            let sql = chunk.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(storage("sqlite schema"))?;
        }
        Ok(())
    }

    async fn card_exists(&self, id: CardId) -> Result<bool, CoreError> {
        Ok(sqlx::query("SELECT 1 FROM cards WHERE id=? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("read card"))?
            .is_some())
    }
}

#[async_trait::async_trait]
impl Repository for SqliteRepo {
    // ===== Folders =====
    async fn create_folder(&self, name: &str) -> Result<Folder, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Invalid("folder name must not be empty"));
        }
        // uniqueness is enforced by the NOCASE index
        let folder = Folder::new(name);
        sqlx::query("INSERT INTO folders (id,name,created_at) VALUES (?,?,?)")
            .bind(folder.id.to_string())
            .bind(&folder.name)
            .bind(dt_to_str(folder.created_at))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                    CoreError::Conflict("folder name already exists")
                } else {
                    storage("insert folder")(e)
                }
            })?;
        Ok(folder)
    }

    async fn get_folder(&self, id: FolderId) -> Result<Folder, CoreError> {
        let row = sqlx::query("SELECT id,name,created_at FROM folders WHERE id=?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("read folder"))?;
        let row = row.ok_or(CoreError::NotFound("folder"))?;
        row_into_folder(row)
    }

    async fn list_folders(&self) -> Result<Vec<Folder>, CoreError> {
        let rows = sqlx::query("SELECT id,name,created_at FROM folders ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list folders"))?;
        rows.into_iter().map(row_into_folder).collect()
    }

    async fn delete_folder(&self, id: FolderId) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(storage("tx"))?;

        // Manual cascade (robust even if PRAGMA foreign_keys is off)
        sqlx::query("DELETE FROM reviews WHERE card_id IN (SELECT id FROM cards WHERE folder_id=?)")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage("del reviews"))?;

        sqlx::query("DELETE FROM cards WHERE folder_id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage("del cards"))?;

        let res = sqlx::query("DELETE FROM folders WHERE id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage("del folder"))?;
        if res.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(CoreError::NotFound("folder"));
        }

        tx.commit().await.map_err(storage("tx commit"))
    }

    // ===== Cards =====
    async fn add_card(&self, folder_id: FolderId, content: &CardContent) -> Result<Card, CoreError> {
        content.validate()?;
        let exists = sqlx::query("SELECT 1 FROM folders WHERE id=? LIMIT 1")
            .bind(folder_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("read folder"))?
            .is_some();
        if !exists {
            return Err(CoreError::NotFound("folder"));
        }

        let card = Card::new(folder_id, content.clone());
        let st = &card.schedule;
        sqlx::query(&format!(
            "INSERT INTO cards ({CARD_COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?)"
        ))
        .bind(card.id.to_string())
        .bind(card.folder_id.to_string())
        .bind(&card.content.word)
        .bind(&card.content.pronunciation)
        .bind(&card.content.meaning)
        .bind(&card.content.synonyms)
        .bind(examples_to_str(&card.content.examples)?)
        .bind(i64::from(st.repetitions))
        .bind(st.ease)
        .bind(i64::from(st.interval_days))
        .bind(dt_to_str(st.next_review))
        .bind(st.last_reviewed.map(dt_to_str))
        .bind(card.version as i64)
        .bind(dt_to_str(card.created_at))
        .execute(&self.pool)
        .await
        .map_err(storage("insert card"))?;

        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        let row = sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM cards WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("read card"))?;
        let row = row.ok_or(CoreError::NotFound("card"))?;
        row_into_card(row)
    }

    async fn list_cards(&self, folder_id: Option<FolderId>) -> Result<Vec<Card>, CoreError> {
        let rows = if let Some(fid) = folder_id {
            sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM cards WHERE folder_id=?"))
                .bind(fid.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(storage("list cards"))?
        } else {
            sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM cards"))
                .fetch_all(&self.pool)
                .await
                .map_err(storage("list cards"))?
        };
        let mut v = rows
            .into_iter()
            .map(row_into_card)
            .collect::<Result<Vec<_>, _>>()?;
        sort_cards(&mut v);
        Ok(v)
    }

    async fn update_content(&self, id: CardId, content: &CardContent) -> Result<Card, CoreError> {
        content.validate()?;
        let res = sqlx::query(
            r#"
            UPDATE cards SET
              word=?, pronunciation=?, meaning=?, synonyms=?, examples=?, version=version+1
            WHERE id=?
            "#,
        )
        .bind(&content.word)
        .bind(&content.pronunciation)
        .bind(&content.meaning)
        .bind(&content.synonyms)
        .bind(examples_to_str(&content.examples)?)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage("update card"))?;
        if res.rows_affected() == 0 {
            return Err(CoreError::NotFound("card"));
        }
        self.get_card(id).await
    }

    async fn update_schedule(
        &self,
        id: CardId,
        expected_version: u64,
        state: &SchedulingState,
    ) -> Result<Card, CoreError> {
        let res = sqlx::query(
            r#"
            UPDATE cards SET
              repetitions=?, ease=?, interval_days=?, next_review=?, last_reviewed=?,
              version=version+1
            WHERE id=? AND version=?
            "#,
        )
        .bind(i64::from(state.repetitions))
        .bind(state.ease)
        .bind(i64::from(state.interval_days))
        .bind(dt_to_str(state.next_review))
        .bind(state.last_reviewed.map(dt_to_str))
        .bind(id.to_string())
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(storage("update schedule"))?;
        if res.rows_affected() == 0 {
            return if self.card_exists(id).await? {
                Err(CoreError::Conflict("card was modified concurrently"))
            } else {
                Err(CoreError::NotFound("card"))
            };
        }
        self.get_card(id).await
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(storage("tx"))?;
        sqlx::query("DELETE FROM reviews WHERE card_id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage("del reviews"))?;
        let res = sqlx::query("DELETE FROM cards WHERE id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage("del card"))?;
        if res.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(CoreError::NotFound("card"));
        }
        tx.commit().await.map_err(storage("tx commit"))
    }

    // ===== Reviews =====
    async fn insert_review(&self, review: &Review) -> Result<(), CoreError> {
        if !self.card_exists(review.card_id).await? {
            return Err(CoreError::NotFound("card"));
        }
        sqlx::query(
            r#"INSERT INTO reviews (id,card_id,rating,reviewed_at,interval_days,ease_after)
               VALUES (?,?,?,?,?,?)"#,
        )
        .bind(review.id.to_string())
        .bind(review.card_id.to_string())
        .bind(review.rating.as_str())
        .bind(dt_to_str(review.reviewed_at))
        .bind(i64::from(review.interval_days))
        .bind(review.ease_after)
        .execute(&self.pool)
        .await
        .map_err(storage("insert review"))?;
        Ok(())
    }

    async fn list_reviews_for_card(&self, card_id: CardId) -> Result<Vec<Review>, CoreError> {
        let rows = sqlx::query(
            r#"SELECT id,card_id,rating,reviewed_at,interval_days,ease_after
               FROM reviews WHERE card_id=? ORDER BY reviewed_at ASC"#,
        )
        .bind(card_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("list reviews"))?;
        rows.into_iter().map(row_into_review).collect()
    }

    async fn list_reviews(&self) -> Result<Vec<Review>, CoreError> {
        let rows = sqlx::query(
            r#"SELECT id,card_id,rating,reviewed_at,interval_days,ease_after
               FROM reviews ORDER BY reviewed_at ASC"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage("list reviews"))?;
        rows.into_iter().map(row_into_review).collect()
    }
}

// ===== Helpers =====
fn storage(ctx: &'static str) -> impl FnOnce(sqlx::Error) -> CoreError {
    move |e| {
        error!(error = %e, "{ctx}");
        CoreError::Storage(ctx)
    }
}

fn uuid_from_str(s: String) -> Result<uuid::Uuid, CoreError> {
    uuid::Uuid::parse_str(&s).map_err(|_| CoreError::Invalid("uuid"))
}

// Fixed-width UTC timestamps sort correctly as text.
fn dt_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn dt_from_str(s: String) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(&s)
        .map_err(|_| CoreError::Invalid("datetime"))
        .map(|dt| dt.with_timezone(&Utc))
}

fn examples_to_str(examples: &[String]) -> Result<String, CoreError> {
    serde_json::to_string(examples).map_err(|_| CoreError::Invalid("examples"))
}

fn row_into_folder(row: sqlx::sqlite::SqliteRow) -> Result<Folder, CoreError> {
    Ok(Folder {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        name: row.get::<String, _>("name"),
        created_at: dt_from_str(row.get::<String, _>("created_at"))?,
    })
}

fn row_into_card(row: sqlx::sqlite::SqliteRow) -> Result<Card, CoreError> {
    let examples_json: String = row.get("examples");
    let examples: Vec<String> =
        serde_json::from_str(&examples_json).map_err(|_| CoreError::Invalid("examples"))?;

    Ok(Card {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        folder_id: uuid_from_str(row.get::<String, _>("folder_id"))?,
        content: CardContent {
            word: row.get("word"),
            pronunciation: row.get("pronunciation"),
            meaning: row.get("meaning"),
            synonyms: row.get("synonyms"),
            examples,
        },
        schedule: SchedulingState {
            repetitions: u32::try_from(row.get::<i64, _>("repetitions"))
                .map_err(|_| CoreError::InvalidState("negative repetitions"))?,
            ease: row.get::<f64, _>("ease"),
            interval_days: u32::try_from(row.get::<i64, _>("interval_days"))
                .map_err(|_| CoreError::InvalidState("negative interval"))?,
            next_review: dt_from_str(row.get::<String, _>("next_review"))?,
            last_reviewed: row
                .get::<Option<String>, _>("last_reviewed")
                .map(dt_from_str)
                .transpose()?,
        },
        version: row.get::<i64, _>("version") as u64,
        created_at: dt_from_str(row.get::<String, _>("created_at"))?,
    })
}

fn row_into_review(row: sqlx::sqlite::SqliteRow) -> Result<Review, CoreError> {
    let rating: Rating = row.get::<String, _>("rating").parse()?;
    Ok(Review {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        card_id: uuid_from_str(row.get::<String, _>("card_id"))?,
        rating,
        reviewed_at: dt_from_str(row.get::<String, _>("reviewed_at"))?,
        interval_days: u32::try_from(row.get::<i64, _>("interval_days"))
            .map_err(|_| CoreError::Invalid("interval"))?,
        ease_after: row.get::<f64, _>("ease_after"),
    })
}
