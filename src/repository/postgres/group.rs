use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use super::{push_order, push_page, to_count, GroupRow, PgRepository};
use crate::domain::{Group, QueryParameter};
use crate::repository::{log_error, GroupStorage, RepoError, RepoResult};

const GROUP_COLUMNS: &str =
    "g.id, g.created_at, g.modified_at, g.name, g.description, g.contact_count";

#[async_trait]
impl GroupStorage for PgRepository {
    #[instrument(skip_all, fields(group_id = %group.id()))]
    async fn create_group(&self, group: Group) -> RepoResult<Group> {
        let details = group.details();
        let sql = format!(
            r#"INSERT INTO slurm."group" AS g (id, created_at, modified_at, name, description)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING {GROUP_COLUMNS}"#
        );
        let row: GroupRow = self
            .scope()
            .run(async {
                sqlx::query_as::<_, GroupRow>(&sql)
                    .bind(group.id())
                    .bind(group.created_at())
                    .bind(group.modified_at())
                    .bind(&details.name)
                    .bind(&details.description)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(log_error)
            })
            .await?;
        Ok(row.into())
    }

    #[instrument(skip_all, fields(group_id = %group.id()))]
    async fn update_group(&self, group: Group) -> RepoResult<Group> {
        let details = group.details();
        let sql = format!(
            r#"UPDATE slurm."group" g SET name = $2, description = $3, modified_at = now()
               WHERE g.id = $1
               RETURNING {GROUP_COLUMNS}"#
        );
        let row: Option<GroupRow> = self
            .scope()
            .run(async {
                sqlx::query_as::<_, GroupRow>(&sql)
                    .bind(group.id())
                    .bind(&details.name)
                    .bind(&details.description)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(log_error)
            })
            .await?;
        row.map(Group::from).ok_or(RepoError::NotFound {
            entity: "group",
            id: group.id(),
        })
    }

    #[instrument(skip(self))]
    async fn delete_group(&self, id: Uuid) -> RepoResult<()> {
        let deleted = self
            .scope()
            .run(async {
                sqlx::query(r#"DELETE FROM slurm."group" WHERE id = $1"#)
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(log_error)
            })
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(RepoError::NotFound { entity: "group", id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn read_group(&self, id: Uuid) -> RepoResult<Group> {
        let sql = format!(r#"SELECT {GROUP_COLUMNS} FROM slurm."group" g WHERE g.id = $1"#);
        let row: Option<GroupRow> = self
            .scope()
            .run(async {
                sqlx::query_as::<_, GroupRow>(&sql)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(log_error)
            })
            .await?;
        row.map(Group::from)
            .ok_or(RepoError::NotFound { entity: "group", id })
    }

    #[instrument(skip(self))]
    async fn list_groups(&self, params: &QueryParameter) -> RepoResult<Vec<Group>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!(r#"SELECT {GROUP_COLUMNS} FROM slurm."group" g"#));
        push_order(&mut qb, &params.sorts, "g.");
        push_page(&mut qb, params.pagination);

        let rows: Vec<GroupRow> = self
            .scope()
            .run(async {
                qb.build_query_as::<GroupRow>()
                    .fetch_all(&self.pool)
                    .await
                    .map_err(log_error)
            })
            .await?;
        Ok(rows.into_iter().map(Group::from).collect())
    }

    #[instrument(skip(self))]
    async fn count_groups(&self) -> RepoResult<u64> {
        let total: i64 = self
            .scope()
            .run(async {
                sqlx::query_scalar::<_, i64>(r#"SELECT count(*) FROM slurm."group""#)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(log_error)
            })
            .await?;
        Ok(to_count(total))
    }
}

pub(super) async fn ensure_group_exists(pool: &PgPool, id: Uuid) -> RepoResult<()> {
    let found: Option<Uuid> =
        sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM slurm."group" WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(log_error)?;
    match found {
        Some(_) => Ok(()),
        None => Err(RepoError::NotFound { entity: "group", id }),
    }
}
