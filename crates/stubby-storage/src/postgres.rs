use crate::MAX_CREATE_ATTEMPTS;
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgExecutor, PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use stubby_core::repository::{
    CreatedLink, Link, LinkRepository, Result, UserLink, UserLinkRepository,
};
use stubby_core::{DeleteRequest, ShortId, StorageError, UserId};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../ddl/postgres/schema.sql");
const SHORT_ID_CONSTRAINT: &str = "links_short_id_key";

/// Postgres implementation of both repository contracts.
///
/// URL dedup is delegated to the `links_original_url_key` constraint through
/// `INSERT .. ON CONFLICT`, so concurrent creators of the same URL always
/// observe one canonical row. Soft deletion flips `is_deleted`; rows are
/// never removed.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a repository from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a new connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the `links` and `user_links` tables if they are missing.
    pub async fn create_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Inserts `short_id -> original_url` or returns the row already holding
    /// `original_url`. The flag is `true` when this call created the row.
    async fn upsert_link(
        &self,
        short_id: &ShortId,
        original_url: &str,
    ) -> std::result::Result<(Link, bool), sqlx::Error> {
        let row = sqlx::query(
            r#"
            INSERT INTO links (short_id, original_url)
            VALUES ($1, $2)
            ON CONFLICT (original_url) DO UPDATE SET original_url = links.original_url
            RETURNING id, short_id, original_url, is_deleted, (xmax = 0) AS inserted
            "#,
        )
        .bind(short_id.as_str())
        .bind(original_url)
        .fetch_one(&self.pool)
        .await?;

        Ok((link_from_row(&row)?, row.try_get("inserted")?))
    }
}

fn is_short_id_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db_err| {
        db_err.is_unique_violation() && db_err.constraint() == Some(SHORT_ID_CONSTRAINT)
    })
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn link_from_row(row: &PgRow) -> std::result::Result<Link, sqlx::Error> {
    Ok(Link {
        id: row.try_get("id")?,
        short_id: ShortId::new_unchecked(row.try_get::<String, _>("short_id")?),
        original_url: row.try_get("original_url")?,
        is_deleted: row.try_get("is_deleted")?,
    })
}

fn user_link_from_row(row: &PgRow) -> std::result::Result<UserLink, sqlx::Error> {
    Ok(UserLink {
        id: row.try_get("user_link_id")?,
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        link: link_from_row(row)?,
    })
}

async fn next_counter<'e, E: PgExecutor<'e>>(executor: E) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM links")
        .fetch_one(executor)
        .await
        .map_err(map_sqlx_error)?;
    Ok(count + 1)
}

async fn find_link_by_url<'e, E: PgExecutor<'e>>(
    executor: E,
    original_url: &str,
) -> Result<Option<Link>> {
    sqlx::query(
        r#"
        SELECT id, short_id, original_url, is_deleted
        FROM links
        WHERE original_url = $1
        LIMIT 1
        "#,
    )
    .bind(original_url)
    .fetch_optional(executor)
    .await
    .map_err(map_sqlx_error)?
    .map(|row| link_from_row(&row).map_err(map_sqlx_error))
    .transpose()
}

/// Inserts one batch entry inside the caller's transaction.
///
/// `ON CONFLICT DO NOTHING` keeps the transaction usable when the candidate
/// collides: the URL is re-checked (a concurrent writer may have created it)
/// and otherwise the candidate is bumped. `bump` is shared by the whole batch
/// so later positions skip ids already found taken.
async fn insert_batch_entry(
    conn: &mut PgConnection,
    original_url: &str,
    candidate: i64,
    bump: &mut i64,
) -> Result<Link> {
    for _ in 0..MAX_CREATE_ATTEMPTS {
        let short_id = ShortId::from_counter(candidate + *bump);

        let row = sqlx::query(
            r#"
            INSERT INTO links (short_id, original_url)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING id, short_id, original_url, is_deleted
            "#,
        )
        .bind(short_id.as_str())
        .bind(original_url)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        if let Some(row) = row {
            return link_from_row(&row).map_err(map_sqlx_error);
        }

        if let Some(link) = find_link_by_url(&mut *conn, original_url).await? {
            return Ok(link);
        }

        debug!(short_id = %short_id, "batch short id already taken, bumping");
        *bump += 1;
    }

    Err(StorageError::Conflict(format!(
        "no free short id for '{}' after {} attempts",
        original_url, MAX_CREATE_ATTEMPTS
    )))
}

#[async_trait]
impl LinkRepository for PostgresRepository {
    async fn create_link(
        &self,
        short_id: Option<&ShortId>,
        original_url: &str,
    ) -> Result<CreatedLink> {
        if let Some(short_id) = short_id {
            return match self.upsert_link(short_id, original_url).await {
                Ok((link, _)) => {
                    let conflict = link.short_id != *short_id;
                    Ok(CreatedLink { link, conflict })
                }
                Err(err) if is_short_id_violation(&err) => {
                    Err(StorageError::Conflict(short_id.to_string()))
                }
                Err(err) => Err(map_sqlx_error(err)),
            };
        }

        for attempt in 0..MAX_CREATE_ATTEMPTS {
            let candidate = ShortId::from_counter(next_counter(&self.pool).await? + attempt);

            match self.upsert_link(&candidate, original_url).await {
                // Racing creators may derive the same candidate, so "already
                // existed" is what marks a conflict, not the id comparison.
                Ok((link, inserted)) => {
                    return Ok(CreatedLink {
                        link,
                        conflict: !inserted,
                    })
                }
                Err(err) if is_short_id_violation(&err) => {
                    debug!(short_id = %candidate, attempt, "derived short id already taken");
                }
                Err(err) => return Err(map_sqlx_error(err)),
            }
        }

        Err(StorageError::Conflict(format!(
            "no free short id for '{}' after {} attempts",
            original_url, MAX_CREATE_ATTEMPTS
        )))
    }

    async fn create_batch(&self, original_urls: &[String]) -> Result<Vec<Link>> {
        if original_urls.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping `tx` on any early return rolls the whole batch back.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let base = next_counter(&mut *tx).await?;
        let mut bump = 0;
        let mut links = Vec::with_capacity(original_urls.len());

        for (position, original_url) in original_urls.iter().enumerate() {
            let link = match find_link_by_url(&mut *tx, original_url).await? {
                Some(existing) => existing,
                None => {
                    insert_batch_entry(&mut *tx, original_url, base + position as i64, &mut bump)
                        .await?
                }
            };
            links.push(link);
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(links)
    }

    async fn find_by_short_id(&self, short_id: &ShortId) -> Result<Option<Link>> {
        sqlx::query(
            r#"
            SELECT id, short_id, original_url, is_deleted
            FROM links
            WHERE short_id = $1
            LIMIT 1
            "#,
        )
        .bind(short_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .map(|row| link_from_row(&row).map_err(map_sqlx_error))
        .transpose()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl UserLinkRepository for PostgresRepository {
    async fn create_user_link(&self, user_id: &UserId, link_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_links (user_id, link_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, link_id) DO NOTHING
            "#,
        )
        .bind(*user_id.as_uuid())
        .bind(link_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_link_id(&self, user_id: &UserId, link_id: i64) -> Result<Option<UserLink>> {
        sqlx::query(
            r#"
            SELECT ul.id AS user_link_id, ul.user_id,
                   l.id, l.short_id, l.original_url, l.is_deleted
            FROM user_links AS ul
            JOIN links AS l ON ul.link_id = l.id
            WHERE ul.user_id = $1 AND ul.link_id = $2
            LIMIT 1
            "#,
        )
        .bind(*user_id.as_uuid())
        .bind(link_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .map(|row| user_link_from_row(&row).map_err(map_sqlx_error))
        .transpose()
    }

    async fn list_user_links(&self, user_id: &UserId) -> Result<Vec<UserLink>> {
        let rows = sqlx::query(
            r#"
            SELECT ul.id AS user_link_id, ul.user_id,
                   l.id, l.short_id, l.original_url, l.is_deleted
            FROM user_links AS ul
            JOIN links AS l ON ul.link_id = l.id
            WHERE ul.user_id = $1
            ORDER BY ul.id
            "#,
        )
        .bind(*user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| user_link_from_row(row).map_err(map_sqlx_error))
            .collect()
    }

    async fn delete_links(&self, requests: &[DeleteRequest]) -> Result<u64> {
        let requests: Vec<&DeleteRequest> = requests.iter().filter(|r| !r.is_empty()).collect();
        if requests.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "UPDATE links AS l SET is_deleted = TRUE \
             FROM user_links AS ul \
             WHERE l.id = ul.link_id AND (",
        );

        for (i, request) in requests.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }

            let short_ids: Vec<String> = request
                .short_ids
                .iter()
                .map(|id| id.as_str().to_owned())
                .collect();

            builder
                .push("(l.short_id = ANY(")
                .push_bind(short_ids)
                .push(") AND ul.user_id = ")
                .push_bind(*request.user_id.as_uuid())
                .push(")");
        }
        builder.push(")");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
