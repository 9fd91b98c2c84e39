use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::contact_in_group::{lock_groups_tx, update_group_contact_counts_tx};
use super::{push_order, push_page, to_count, ContactRow, PgRepository};
use crate::domain::{Contact, ContactFilter, QueryParameter};
use crate::repository::transaction::finish;
use crate::repository::{log_error, ContactStorage, RepoError, RepoResult};

pub(super) const CONTACT_COLUMNS: &str = "c.id, c.created_at, c.modified_at, c.phone_number, \
     c.email, c.name, c.surname, c.patronymic, c.age";

// 9 binds per row keeps one statement well under the 65535 bind limit.
const INSERT_BATCH: usize = 1000;

#[async_trait]
impl ContactStorage for PgRepository {
    #[instrument(skip_all, fields(contacts = contacts.len()))]
    async fn create_contacts(&self, contacts: Vec<Contact>) -> RepoResult<Vec<Contact>> {
        let scope = self.scope();
        let mut tx = self.begin(&scope).await?;
        let outcome = scope.run(insert_contacts_tx(&mut tx, &contacts)).await;
        finish(&scope, tx, outcome).await
    }

    #[instrument(skip_all, fields(contact_id = %contact.id()))]
    async fn update_contact(&self, contact: Contact) -> RepoResult<Contact> {
        let details = contact.details();
        let sql = format!(
            "UPDATE slurm.contact c SET \
                phone_number = $2, email = $3, name = $4, surname = $5, \
                patronymic = $6, age = $7, modified_at = now() \
             WHERE c.id = $1 \
             RETURNING {CONTACT_COLUMNS}"
        );
        let row: Option<ContactRow> = self
            .scope()
            .run(async {
                sqlx::query_as::<_, ContactRow>(&sql)
                    .bind(contact.id())
                    .bind(&details.phone_number)
                    .bind(&details.email)
                    .bind(&details.name)
                    .bind(&details.surname)
                    .bind(&details.patronymic)
                    .bind(i16::from(details.age))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(log_error)
            })
            .await?;
        row.map(Contact::from).ok_or(RepoError::NotFound {
            entity: "contact",
            id: contact.id(),
        })
    }

    #[instrument(skip(self))]
    async fn delete_contact(&self, id: Uuid) -> RepoResult<()> {
        let scope = self.scope();
        let mut tx = self.begin(&scope).await?;
        let outcome = scope.run(delete_contact_tx(&mut tx, id)).await;
        finish(&scope, tx, outcome).await
    }

    #[instrument(skip(self))]
    async fn read_contact(&self, id: Uuid) -> RepoResult<Contact> {
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM slurm.contact c WHERE c.id = $1");
        let row: Option<ContactRow> = self
            .scope()
            .run(async {
                sqlx::query_as::<_, ContactRow>(&sql)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(log_error)
            })
            .await?;
        row.map(Contact::from).ok_or(RepoError::NotFound {
            entity: "contact",
            id,
        })
    }

    #[instrument(skip(self))]
    async fn list_contacts(
        &self,
        filter: &ContactFilter,
        params: &QueryParameter,
    ) -> RepoResult<Vec<Contact>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CONTACT_COLUMNS} FROM slurm.contact c WHERE TRUE"
        ));
        push_filter(&mut qb, filter);
        push_order(&mut qb, &params.sorts, "c.");
        push_page(&mut qb, params.pagination);

        let rows: Vec<ContactRow> = self
            .scope()
            .run(async {
                qb.build_query_as::<ContactRow>()
                    .fetch_all(&self.pool)
                    .await
                    .map_err(log_error)
            })
            .await?;
        Ok(rows.into_iter().map(Contact::from).collect())
    }

    #[instrument(skip(self))]
    async fn count_contacts(&self, filter: &ContactFilter) -> RepoResult<u64> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT count(*) FROM slurm.contact c WHERE TRUE");
        push_filter(&mut qb, filter);

        let total: i64 = self
            .scope()
            .run(async {
                qb.build_query_scalar::<i64>()
                    .fetch_one(&self.pool)
                    .await
                    .map_err(log_error)
            })
            .await?;
        Ok(to_count(total))
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ContactFilter) {
    if let Some(phone) = filter.phone_number.as_deref().filter(|p| !p.is_empty()) {
        qb.push(" AND strpos(c.phone_number, ")
            .push_bind(phone.to_string())
            .push(") > 0");
    }
}

/// Inserts `contacts` and returns them as stored. This is the contact
/// creation step shared with create-into-group.
pub(super) async fn insert_contacts_tx(
    conn: &mut PgConnection,
    contacts: &[Contact],
) -> RepoResult<Vec<Contact>> {
    let mut created = Vec::with_capacity(contacts.len());
    for batch in contacts.chunks(INSERT_BATCH) {
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO slurm.contact AS c \
             (id, created_at, modified_at, phone_number, email, name, surname, patronymic, age) ",
        );
        qb.push_values(batch, |mut row, contact| {
            let details = contact.details();
            row.push_bind(contact.id())
                .push_bind(contact.created_at())
                .push_bind(contact.modified_at())
                .push_bind(details.phone_number.clone())
                .push_bind(details.email.clone())
                .push_bind(details.name.clone())
                .push_bind(details.surname.clone())
                .push_bind(details.patronymic.clone())
                .push_bind(i16::from(details.age));
        });
        qb.push(" RETURNING ").push(CONTACT_COLUMNS);

        let rows: Vec<ContactRow> = qb
            .build_query_as::<ContactRow>()
            .fetch_all(&mut *conn)
            .await
            .map_err(log_error)?;
        created.extend(rows.into_iter().map(Contact::from));
    }
    debug!(created = created.len(), "contacts inserted");
    Ok(created)
}

/// Removes the contact's memberships first so every affected group's
/// `contact_count` can be recomputed in the same transaction.
///
/// Group locks come before the contact lock, the order attaches take them
/// in. Once the contact is locked no new attach of it can commit, so groups
/// that only show up in the membership delete were joined by transactions
/// that already committed.
async fn delete_contact_tx(conn: &mut PgConnection, id: Uuid) -> RepoResult<()> {
    let member_of: Vec<Uuid> = sqlx::query_scalar::<_, Uuid>(
        "SELECT group_id FROM slurm.contact_in_group WHERE contact_id = $1",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(log_error)?;
    lock_groups_tx(conn, &member_of).await?;

    sqlx::query("SELECT id FROM slurm.contact WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(log_error)?;

    let groups: Vec<Uuid> = sqlx::query_scalar::<_, Uuid>(
        "DELETE FROM slurm.contact_in_group WHERE contact_id = $1 RETURNING group_id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(log_error)?;
    lock_groups_tx(conn, &groups).await?;

    let deleted = sqlx::query("DELETE FROM slurm.contact WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(log_error)?
        .rows_affected();
    if deleted == 0 {
        return Err(RepoError::NotFound {
            entity: "contact",
            id,
        });
    }

    update_group_contact_counts_tx(conn, &groups).await?;
    debug!(groups = groups.len(), "contact deleted");
    Ok(())
}
