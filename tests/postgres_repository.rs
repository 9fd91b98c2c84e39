//! Repository tests against a live PostgreSQL.
//!
//! `sqlx::test` creates a throwaway database per test from `DATABASE_URL` and
//! applies `migrations/`. Run with
//! `DATABASE_URL=postgres://... cargo test --test postgres_repository -- --ignored`.

use std::collections::HashSet;
use std::time::Duration;

use contact_service::domain::QueryParameter;
use contact_service::repository::postgres::Options;
use contact_service::repository::transaction::{finish, Scope};
use contact_service::{
    Contact, ContactDetails, ContactInGroupStorage, ContactStorage, Group, GroupDetails,
    GroupStorage, PgRepository, RepoError,
};
use sqlx::PgPool;
use uuid::Uuid;

fn repo(pool: PgPool) -> PgRepository {
    PgRepository::new(pool, Options::default())
}

fn contact(phone: &str, name: &str) -> Contact {
    Contact::new(ContactDetails {
        phone_number: phone.to_string(),
        name: name.to_string(),
        ..Default::default()
    })
    .unwrap()
}

async fn group(repo: &PgRepository, name: &str) -> Uuid {
    let group = Group::new(GroupDetails {
        name: name.to_string(),
        description: String::new(),
    })
    .unwrap();
    repo.create_group(group).await.unwrap().id()
}

async fn contacts(repo: &PgRepository, phones: &[&str]) -> Vec<Uuid> {
    let batch = phones.iter().map(|p| contact(p, "member")).collect();
    repo.create_contacts(batch)
        .await
        .unwrap()
        .iter()
        .map(Contact::id)
        .collect()
}

async fn stored_count(repo: &PgRepository, group_id: Uuid) -> u64 {
    repo.read_group(group_id).await.unwrap().contact_count()
}

async fn membership_rows(pool: &PgPool, group_id: Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT count(*) FROM slurm.contact_in_group WHERE group_id = $1",
    )
    .bind(group_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn attach_is_idempotent(pool: PgPool) {
    let repo = repo(pool.clone());
    let group_id = group(&repo, "friends").await;
    let ids = contacts(&repo, &["1001"]).await;

    assert_eq!(repo.add_contacts_to_group(group_id, ids.clone()).await.unwrap(), 1);
    assert_eq!(repo.add_contacts_to_group(group_id, ids).await.unwrap(), 0);

    assert_eq!(membership_rows(&pool, group_id).await, 1);
    assert_eq!(stored_count(&repo, group_id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn only_missing_members_are_copied(pool: PgPool) {
    let repo = repo(pool.clone());
    let group_id = group(&repo, "team").await;
    let ids = contacts(&repo, &["1001", "1002", "1003"]).await;
    let (a, b, c) = (ids[0], ids[1], ids[2]);
    repo.add_contacts_to_group(group_id, vec![a, b]).await.unwrap();

    let added = repo.add_contacts_to_group(group_id, vec![b, c, c]).await.unwrap();

    assert_eq!(added, 1);
    let members: HashSet<Uuid> = repo
        .list_contacts_in_group(group_id, &QueryParameter::default())
        .await
        .unwrap()
        .iter()
        .map(Contact::id)
        .collect();
    assert_eq!(members, HashSet::from([a, b, c]));
    assert_eq!(stored_count(&repo, group_id).await, 3);
    assert_eq!(membership_rows(&pool, group_id).await, 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn empty_candidate_list_changes_nothing(pool: PgPool) {
    let repo = repo(pool);
    let group_id = group(&repo, "quiet").await;
    let before = repo.read_group(group_id).await.unwrap();

    assert_eq!(repo.add_contacts_to_group(group_id, Vec::new()).await.unwrap(), 0);

    let after = repo.read_group(group_id).await.unwrap();
    assert_eq!(after.contact_count(), 0);
    assert_eq!(after.modified_at(), before.modified_at());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn create_into_missing_group_rolls_back(pool: PgPool) {
    let repo = repo(pool);
    let x = contact("2001", "X");
    let x_id = x.id();

    let err = repo
        .create_contacts_into_group(Uuid::new_v4(), vec![x])
        .await
        .unwrap_err();

    assert!(matches!(err, RepoError::Constraint { .. }), "{err:?}");
    assert!(matches!(
        repo.read_contact(x_id).await,
        Err(RepoError::NotFound { entity: "contact", .. })
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn create_into_group_attaches_new_contacts(pool: PgPool) {
    let repo = repo(pool.clone());
    let group_id = group(&repo, "new").await;

    let created = repo
        .create_contacts_into_group(group_id, vec![contact("2001", "X"), contact("2002", "Y")])
        .await
        .unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(stored_count(&repo, group_id).await, 2);
    assert_eq!(membership_rows(&pool, group_id).await, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn detaching_absent_member_is_ok(pool: PgPool) {
    let repo = repo(pool);
    let group_id = group(&repo, "team").await;
    let ids = contacts(&repo, &["1001"]).await;
    repo.add_contacts_to_group(group_id, ids).await.unwrap();

    repo.delete_contact_from_group(group_id, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(stored_count(&repo, group_id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn deleting_contact_recounts_its_groups(pool: PgPool) {
    let repo = repo(pool.clone());
    let first = group(&repo, "first").await;
    let second = group(&repo, "second").await;
    let ids = contacts(&repo, &["1001", "1002"]).await;
    repo.add_contacts_to_group(first, ids.clone()).await.unwrap();
    repo.add_contacts_to_group(second, vec![ids[0]]).await.unwrap();

    repo.delete_contact(ids[0]).await.unwrap();

    assert_eq!(stored_count(&repo, first).await, 1);
    assert_eq!(stored_count(&repo, second).await, 0);
    assert_eq!(membership_rows(&pool, first).await, 1);
    assert!(matches!(
        repo.delete_contact(ids[0]).await,
        Err(RepoError::NotFound { .. })
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn attaching_unknown_contact_leaves_group_untouched(pool: PgPool) {
    let repo = repo(pool.clone());
    let group_id = group(&repo, "team").await;
    let ids = contacts(&repo, &["1001"]).await;

    let err = repo
        .add_contacts_to_group(group_id, vec![ids[0], Uuid::new_v4()])
        .await
        .unwrap_err();

    assert!(matches!(err, RepoError::Constraint { .. }), "{err:?}");
    assert_eq!(membership_rows(&pool, group_id).await, 0);
    assert_eq!(stored_count(&repo, group_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_attaches_keep_count_in_sync(pool: PgPool) {
    let repo = repo(pool.clone());
    let group_id = group(&repo, "crowd").await;
    let phones: Vec<String> = (0..40).map(|i| format!("{}", 5000 + i)).collect();
    let phones: Vec<&str> = phones.iter().map(String::as_str).collect();
    let ids = contacts(&repo, &phones).await;

    let tasks: Vec<_> = ids
        .iter()
        .map(|&id| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.add_contacts_to_group(group_id, vec![id]).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 1);
    }

    assert_eq!(membership_rows(&pool, group_id).await, 40);
    assert_eq!(stored_count(&repo, group_id).await, 40);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn racing_attaches_of_one_pair_insert_once(pool: PgPool) {
    let repo = repo(pool.clone());
    let group_id = group(&repo, "pair").await;
    let id = contacts(&repo, &["1001"]).await[0];

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.add_contacts_to_group(group_id, vec![id]).await })
        })
        .collect();
    let mut added = 0;
    for task in tasks {
        added += task.await.unwrap().unwrap();
    }

    assert_eq!(added, 1);
    assert_eq!(membership_rows(&pool, group_id).await, 1);
    assert_eq!(stored_count(&repo, group_id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_detach_and_delete_keep_count_in_sync(pool: PgPool) {
    let repo = repo(pool.clone());
    let group_id = group(&repo, "churn").await;
    let ids = contacts(&repo, &["1001", "1002", "1003", "1004", "1005", "1006"]).await;
    repo.add_contacts_to_group(group_id, ids.clone()).await.unwrap();

    let mut tasks = Vec::new();
    for (i, &id) in ids.iter().enumerate() {
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                repo.delete_contact_from_group(group_id, id).await
            } else {
                repo.delete_contact(id).await
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(membership_rows(&pool, group_id).await, 0);
    assert_eq!(stored_count(&repo, group_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn commit_past_the_deadline_times_out(pool: PgPool) {
    let scope = Scope::new(Duration::ZERO);
    let tx = pool.begin().await.unwrap();

    let outcome = finish(&scope, tx, Ok(())).await;

    assert!(matches!(outcome, Err(RepoError::Timeout(_))), "{outcome:?}");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn rollback_past_the_deadline_keeps_the_cause(pool: PgPool) {
    let scope = Scope::new(Duration::ZERO);
    let mut tx = pool.begin().await.unwrap();
    sqlx::query(r#"INSERT INTO slurm."group" (id, name) VALUES ($1, 'temp')"#)
        .bind(Uuid::new_v4())
        .execute(&mut *tx)
        .await
        .unwrap();
    let cause = RepoError::NotFound {
        entity: "group",
        id: Uuid::nil(),
    };

    let outcome = finish::<()>(&scope, tx, Err(cause)).await;

    assert!(matches!(outcome, Err(RepoError::NotFound { entity: "group", .. })));
    let groups: i64 = sqlx::query_scalar(r#"SELECT count(*) FROM slurm."group""#)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(groups, 0);
}
