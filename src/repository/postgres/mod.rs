//! PostgreSQL storage (`slurm` schema).
//!
//! Statements are built per call with [`sqlx::QueryBuilder`]; the repository
//! holds no query state of its own. Functions suffixed `_tx` run on a
//! connection the caller already placed inside a transaction.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder, Transaction};
use tracing::info;
use uuid::Uuid;

use super::transaction::Scope;
use super::{log_error, RepoResult, DEFAULT_TIMEOUT};
use crate::config::DatabaseConfig;
use crate::domain::{Contact, ContactDetails, Group, GroupDetails, Pagination, Sorts};

mod contact;
mod contact_in_group;
mod group;

pub(crate) type PgTx = Transaction<'static, Postgres>;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Upper bound for one repository call, commit or rollback included.
    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
    options: Options,
}

/// Opens the shared connection pool.
pub async fn connect(config: &DatabaseConfig) -> RepoResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.timeout)
        .connect(&config.url)
        .await
        .map_err(log_error)?;
    info!(max_connections = config.max_connections, "database pool ready");
    Ok(pool)
}

impl PgRepository {
    pub fn new(pool: PgPool, options: Options) -> Self {
        Self { pool, options }
    }

    /// Applies pending migrations from `migrations/`.
    pub async fn migrate(&self) -> RepoResult<()> {
        MIGRATOR.run(&self.pool).await.map_err(log_error)?;
        info!("database migrations applied");
        Ok(())
    }

    fn scope(&self) -> Scope {
        Scope::new(self.options.timeout)
    }

    async fn begin(&self, scope: &Scope) -> RepoResult<PgTx> {
        scope
            .run(async { self.pool.begin().await.map_err(log_error) })
            .await
    }
}

#[derive(Debug, FromRow)]
struct ContactRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    phone_number: String,
    email: Option<String>,
    name: String,
    surname: String,
    patronymic: String,
    age: i16,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact::restore(
            row.id,
            row.created_at,
            row.modified_at,
            ContactDetails {
                phone_number: row.phone_number,
                email: row.email,
                name: row.name,
                surname: row.surname,
                patronymic: row.patronymic,
                // bounded by the column's CHECK constraint
                age: row.age.clamp(0, i16::from(u8::MAX)) as u8,
            },
        )
    }
}

#[derive(Debug, FromRow)]
struct GroupRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    name: String,
    description: String,
    contact_count: i64,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group::restore(
            row.id,
            row.created_at,
            row.modified_at,
            GroupDetails {
                name: row.name,
                description: row.description,
            },
            u64::try_from(row.contact_count).unwrap_or(0),
        )
    }
}

/// Appends `ORDER BY`, qualifying columns with `alias`. Ties always break on
/// `created_at` then `id` so pages are stable.
fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sorts: &Sorts, alias: &str) {
    qb.push(" ORDER BY ");
    for sort in sorts.iter() {
        qb.push(alias)
            .push(sort.column)
            .push(" ")
            .push(sort.direction.as_sql())
            .push(", ");
    }
    if !sorts.iter().any(|s| s.column == "created_at") {
        qb.push(alias).push("created_at ASC, ");
    }
    qb.push(alias).push("id ASC");
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: Pagination) {
    qb.push(" LIMIT ")
        .push_bind(i64::try_from(page.limit()).unwrap_or(i64::MAX))
        .push(" OFFSET ")
        .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
