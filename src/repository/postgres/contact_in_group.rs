//! Membership reconciliation against `slurm.contact_in_group`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::contact::{insert_contacts_tx, CONTACT_COLUMNS};
use super::group::ensure_group_exists;
use super::{push_order, push_page, ContactRow, PgRepository};
use crate::domain::{Contact, QueryParameter};
use crate::repository::membership::{existence_map, missing_members, MembershipRow};
use crate::repository::transaction::finish;
use crate::repository::{log_error, ContactInGroupStorage, RepoResult};

/// Bulk-load statement; rows must follow this column order.
const COPY_CONTACT_IN_GROUP: &str = "COPY slurm.contact_in_group \
     (created_at, updated_at, group_id, contact_id) FROM STDIN WITH (FORMAT csv)";

/// Serializes membership writers per group. Statements issued after the lock
/// is granted see every membership committed by the previous holder.
const LOCK_GROUPS: &str = r#"SELECT g.id FROM slurm."group" g
    WHERE g.id = ANY($1)
    ORDER BY g.id
    FOR UPDATE"#;

const UPDATE_GROUP_CONTACT_COUNT: &str = r#"UPDATE slurm."group" g
    SET contact_count = (
            SELECT count(*) FROM slurm.contact_in_group m WHERE m.group_id = g.id
        ),
        modified_at = now()
    WHERE g.id = ANY($1)"#;

#[async_trait]
impl ContactInGroupStorage for PgRepository {
    #[instrument(skip(self, contacts), fields(contacts = contacts.len()))]
    async fn create_contacts_into_group(
        &self,
        group_id: Uuid,
        contacts: Vec<Contact>,
    ) -> RepoResult<Vec<Contact>> {
        let scope = self.scope();
        let mut tx = self.begin(&scope).await?;
        let outcome = scope
            .run(create_contacts_into_group_tx(&mut tx, group_id, &contacts))
            .await;
        finish(&scope, tx, outcome).await
    }

    #[instrument(skip(self, contact_ids), fields(candidates = contact_ids.len()))]
    async fn add_contacts_to_group(
        &self,
        group_id: Uuid,
        contact_ids: Vec<Uuid>,
    ) -> RepoResult<u64> {
        let scope = self.scope();
        let mut tx = self.begin(&scope).await?;
        let outcome = scope
            .run(fill_group_tx(&mut tx, group_id, &contact_ids))
            .await;
        finish(&scope, tx, outcome).await
    }

    #[instrument(skip(self))]
    async fn delete_contact_from_group(&self, group_id: Uuid, contact_id: Uuid) -> RepoResult<()> {
        let scope = self.scope();
        let mut tx = self.begin(&scope).await?;
        let outcome = scope
            .run(delete_contact_from_group_tx(&mut tx, group_id, contact_id))
            .await;
        finish(&scope, tx, outcome).await
    }

    #[instrument(skip(self))]
    async fn list_contacts_in_group(
        &self,
        group_id: Uuid,
        params: &QueryParameter,
    ) -> RepoResult<Vec<Contact>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CONTACT_COLUMNS} FROM slurm.contact c \
             JOIN slurm.contact_in_group m ON m.contact_id = c.id \
             WHERE m.group_id = "
        ));
        qb.push_bind(group_id);
        push_order(&mut qb, &params.sorts, "c.");
        push_page(&mut qb, params.pagination);

        let scope = self.scope();
        let rows: Vec<ContactRow> = scope
            .run(async {
                ensure_group_exists(&self.pool, group_id).await?;
                qb.build_query_as::<ContactRow>()
                    .fetch_all(&self.pool)
                    .await
                    .map_err(log_error)
            })
            .await?;
        Ok(rows.into_iter().map(Contact::from).collect())
    }
}

async fn create_contacts_into_group_tx(
    conn: &mut PgConnection,
    group_id: Uuid,
    contacts: &[Contact],
) -> RepoResult<Vec<Contact>> {
    let created = insert_contacts_tx(conn, contacts).await?;
    let contact_ids: Vec<Uuid> = created.iter().map(Contact::id).collect();
    fill_group_tx(conn, group_id, &contact_ids).await?;
    Ok(created)
}

async fn delete_contact_from_group_tx(
    conn: &mut PgConnection,
    group_id: Uuid,
    contact_id: Uuid,
) -> RepoResult<()> {
    lock_groups_tx(conn, &[group_id]).await?;
    let deleted =
        sqlx::query("DELETE FROM slurm.contact_in_group WHERE group_id = $1 AND contact_id = $2")
            .bind(group_id)
            .bind(contact_id)
            .execute(&mut *conn)
            .await
            .map_err(log_error)?
            .rows_affected();
    update_group_contact_count_tx(conn, group_id).await?;
    debug!(deleted, "membership removed");
    Ok(())
}

/// Attaches the candidates that are not members yet and refreshes the
/// group's count. Returns the number of memberships inserted.
pub(super) async fn fill_group_tx(
    conn: &mut PgConnection,
    group_id: Uuid,
    contact_ids: &[Uuid],
) -> RepoResult<u64> {
    if contact_ids.is_empty() {
        debug!("nothing to attach");
        return Ok(0);
    }

    // a missing group locks nothing and fails on the foreign key below
    lock_groups_tx(conn, &[group_id]).await?;
    let (_, exists) = check_exist_contact_in_group_tx(conn, group_id, contact_ids).await?;
    let missing = missing_members(contact_ids, &exists);
    if missing.is_empty() {
        debug!("nothing to attach");
        return Ok(0);
    }

    let rows = MembershipRow::stamped(group_id, &missing, Utc::now());
    let inserted = copy_memberships_tx(conn, &rows).await?;
    update_group_contact_count_tx(conn, group_id).await?;
    debug!(inserted, "memberships attached");
    Ok(inserted)
}

/// Returns the candidates already in the group together with a map that
/// answers membership for every candidate. Reconciliation only needs the
/// map; the list is kept for callers that report which IDs were skipped.
/// Issues no query for an empty candidate list.
pub(super) async fn check_exist_contact_in_group_tx(
    conn: &mut PgConnection,
    group_id: Uuid,
    contact_ids: &[Uuid],
) -> RepoResult<(Vec<Uuid>, HashMap<Uuid, bool>)> {
    if contact_ids.is_empty() {
        return Ok((Vec::new(), HashMap::new()));
    }

    let existing: Vec<Uuid> = sqlx::query_scalar::<_, Uuid>(
        "SELECT contact_id FROM slurm.contact_in_group \
         WHERE group_id = $1 AND contact_id = ANY($2)",
    )
    .bind(group_id)
    .bind(contact_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(log_error)?;

    let exists = existence_map(contact_ids, &existing);
    Ok((existing, exists))
}

/// Takes the row locks of `group_ids` in id order so concurrent writers on
/// overlapping groups cannot deadlock.
pub(super) async fn lock_groups_tx(conn: &mut PgConnection, group_ids: &[Uuid]) -> RepoResult<()> {
    if group_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(LOCK_GROUPS)
        .bind(group_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(log_error)?;
    Ok(())
}

pub(super) async fn update_group_contact_count_tx(
    conn: &mut PgConnection,
    group_id: Uuid,
) -> RepoResult<()> {
    update_group_contact_counts_tx(conn, &[group_id]).await
}

/// Recomputes `contact_count` from membership rows for every listed group.
pub(super) async fn update_group_contact_counts_tx(
    conn: &mut PgConnection,
    group_ids: &[Uuid],
) -> RepoResult<()> {
    if group_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(UPDATE_GROUP_CONTACT_COUNT)
        .bind(group_ids)
        .execute(&mut *conn)
        .await
        .map_err(log_error)?;
    Ok(())
}

async fn copy_memberships_tx(conn: &mut PgConnection, rows: &[MembershipRow]) -> RepoResult<u64> {
    let payload = encode_csv(rows);
    let mut copy = conn
        .copy_in_raw(COPY_CONTACT_IN_GROUP)
        .await
        .map_err(log_error)?;
    copy.send(payload.into_bytes()).await.map_err(log_error)?;
    copy.finish().await.map_err(log_error)
}

fn encode_csv(rows: &[MembershipRow]) -> String {
    let mut out = String::with_capacity(rows.len() * 128);
    for row in rows {
        out.push_str(&row.created_at.to_rfc3339_opts(SecondsFormat::Micros, true));
        out.push(',');
        out.push_str(&row.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true));
        out.push(',');
        out.push_str(&row.group_id.hyphenated().to_string());
        out.push(',');
        out.push_str(&row.contact_id.hyphenated().to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn csv_rows_follow_copy_column_order() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let group = Uuid::nil();
        let contact = Uuid::from_u128(1);

        let csv = encode_csv(&MembershipRow::stamped(group, &[contact], now));

        assert_eq!(
            csv,
            "2024-03-01T10:30:00.000000Z,2024-03-01T10:30:00.000000Z,\
             00000000-0000-0000-0000-000000000000,\
             00000000-0000-0000-0000-000000000001\n"
        );
    }

    #[test]
    fn csv_has_one_line_per_row() {
        let rows = MembershipRow::stamped(
            Uuid::new_v4(),
            &[Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()],
            Utc::now(),
        );
        assert_eq!(encode_csv(&rows).lines().count(), 3);
    }
}
