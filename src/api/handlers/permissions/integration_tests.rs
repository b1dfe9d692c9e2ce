use super::storage::{self, DeleteGroupOutcome};
use crate::authz::{self, GrantFlags, Role, SubjectType};
use anyhow::{Context, Result};
use sqlx::{Connection, PgConnection, PgPool, Row, postgres::PgPoolOptions};
use std::collections::HashSet;
use test_support::{TestNetwork, postgres::PostgresContainer, runtime};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/migrations/0001_init.sql"
));

struct TestContext {
    _postgres: PostgresContainer,
    pool: PgPool,
}

impl TestContext {
    async fn new() -> Result<Self> {
        if let Err(err) = runtime::ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Err(err);
        }

        let network = TestNetwork::new("docgate-permissions");
        let postgres = PostgresContainer::start(network.name()).await?;
        postgres.wait_until_ready().await?;
        apply_schema(&postgres).await?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&postgres.admin_dsn())
            .await
            .context("failed to connect test pool")?;

        Ok(Self {
            _postgres: postgres,
            pool,
        })
    }
}

async fn apply_schema(postgres: &PostgresContainer) -> Result<()> {
    let mut connection = PgConnection::connect(&postgres.admin_dsn())
        .await
        .context("failed to connect for schema setup")?;

    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut connection)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        current.push_str(line);
        current.push('\n');

        if line.trim().ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

async fn insert_principal(pool: &PgPool, username: &str, role: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let query = r"
        INSERT INTO principals (id, username, display_name, role)
        VALUES ($1, $2, $2, $3)
    ";
    sqlx::query(query)
        .bind(id)
        .bind(username)
        .bind(role)
        .execute(pool)
        .await
        .context("insert principal")?;
    Ok(id)
}

async fn insert_resource(
    pool: &PgPool,
    name: &str,
    kind: &str,
    parent_id: Option<Uuid>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let query = r"
        INSERT INTO resources (id, name, kind, parent_id)
        VALUES ($1, $2, $3, $4)
    ";
    sqlx::query(query)
        .bind(id)
        .bind(name)
        .bind(kind)
        .bind(parent_id)
        .execute(pool)
        .await
        .context("insert resource")?;
    Ok(id)
}

fn flags(can_view: bool, can_download: bool) -> GrantFlags {
    GrantFlags {
        can_view,
        can_download,
    }
}

#[tokio::test]
async fn download_without_view_is_stored_as_no_access() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };

    let file = insert_resource(&ctx.pool, "report.pdf", "file", None).await?;
    let user = insert_principal(&ctx.pool, "dana", "standard").await?;

    // The write path normalizes each row before it is stored, the same way
    // the grant-editing handler does.
    let normalized = flags(false, true).normalized();
    storage::replace_grants(&ctx.pool, file, &[(SubjectType::User, user, normalized)]).await?;

    let lineage = storage::grants_for_lineage(&ctx.pool, file).await?;
    assert_eq!(lineage.len(), 1);
    assert!(lineage[0].direct);
    assert!(!lineage[0].flags.can_view);
    assert!(!lineage[0].flags.can_download);

    Ok(())
}

#[tokio::test]
async fn group_grant_on_ancestor_reaches_member_file() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };

    let folder = insert_resource(&ctx.pool, "reports", "folder", None).await?;
    let file = insert_resource(&ctx.pool, "q3.pdf", "file", Some(folder)).await?;
    let user = insert_principal(&ctx.pool, "erin", "standard").await?;
    let group = storage::create_group(&ctx.pool, "analysts")
        .await?
        .context("group name is free")?;
    storage::set_members(&ctx.pool, group, &[user]).await?;
    storage::replace_grants(&ctx.pool, folder, &[(SubjectType::Group, group, flags(true, false))])
        .await?;

    let groups: HashSet<Uuid> = storage::principal_group_ids(&ctx.pool, user)
        .await?
        .into_iter()
        .collect();
    let lineage = storage::grants_for_lineage(&ctx.pool, file).await?;
    assert_eq!(lineage.len(), 1);
    assert!(!lineage[0].direct);

    let applicable = lineage.iter().filter_map(|grant| {
        let applies = match grant.subject_type {
            SubjectType::User => grant.subject_id == user,
            SubjectType::Group => groups.contains(&grant.subject_id),
        };
        applies.then_some(grant.flags)
    });
    let effective = authz::resolve(Role::Standard, applicable);
    assert!(effective.can_view);
    assert!(!effective.can_download);

    Ok(())
}

#[tokio::test]
async fn replacing_grants_drops_absent_rows() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };

    let file = insert_resource(&ctx.pool, "plan.pdf", "file", None).await?;
    let first = insert_principal(&ctx.pool, "gail", "standard").await?;
    let second = insert_principal(&ctx.pool, "hank", "standard").await?;

    storage::replace_grants(
        &ctx.pool,
        file,
        &[
            (SubjectType::User, first, flags(true, true)),
            (SubjectType::User, second, flags(true, false)),
        ],
    )
    .await?;
    storage::replace_grants(&ctx.pool, file, &[(SubjectType::User, second, flags(true, false))])
        .await?;

    let lineage = storage::grants_for_lineage(&ctx.pool, file).await?;
    assert_eq!(lineage.len(), 1);
    assert_eq!(lineage[0].subject_id, second);

    Ok(())
}

#[tokio::test]
async fn reserved_groups_cannot_be_deleted() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };

    let row = sqlx::query("SELECT id FROM principal_groups WHERE name = 'Default'")
        .fetch_one(&ctx.pool)
        .await?;
    let default_id: Uuid = row.get("id");
    assert!(matches!(
        storage::delete_group(&ctx.pool, default_id).await?,
        DeleteGroupOutcome::Reserved
    ));
    assert!(storage::group_exists(&ctx.pool, default_id).await?);

    let group = storage::create_group(&ctx.pool, "temporary")
        .await?
        .context("group name is free")?;
    assert!(matches!(
        storage::delete_group(&ctx.pool, group).await?,
        DeleteGroupOutcome::Deleted
    ));
    assert!(!storage::group_exists(&ctx.pool, group).await?);

    assert!(matches!(
        storage::delete_group(&ctx.pool, Uuid::new_v4()).await?,
        DeleteGroupOutcome::Missing
    ));

    Ok(())
}

#[tokio::test]
async fn grantable_subjects_skip_admins() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };

    let admin = insert_principal(&ctx.pool, "root", "admin").await?;
    let user = insert_principal(&ctx.pool, "frank", "standard").await?;

    let subjects = storage::grantable_subjects(&ctx.pool).await?;
    assert!(subjects.contains(&(SubjectType::User, user)));
    assert!(!subjects.contains(&(SubjectType::User, admin)));
    // The seeded system groups are grantable like any other group.
    assert!(
        subjects
            .iter()
            .filter(|(subject_type, _)| *subject_type == SubjectType::Group)
            .count()
            >= 2
    );

    Ok(())
}
