//! Database helpers for resources, grants, and groups.
//!
//! Grant collection walks the folder tree in a single recursive CTE so the
//! resolution engine always sees the live ancestor chain.

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::authz::{GrantFlags, SubjectType};

/// One stored grant somewhere on the lineage of a requested resource.
pub(crate) struct LineageGrant {
    pub(crate) subject_type: SubjectType,
    pub(crate) subject_id: Uuid,
    /// True when the grant sits on the requested resource itself rather than
    /// on a strict ancestor.
    pub(crate) direct: bool,
    pub(crate) flags: GrantFlags,
}

fn parse_subject_type(value: &str) -> Result<SubjectType> {
    SubjectType::from_str(value).ok_or_else(|| anyhow!("unknown subject type in database: {value}"))
}

/// Resource kind, or None when the id is unknown.
pub(crate) async fn resource_kind(pool: &PgPool, resource_id: Uuid) -> Result<Option<String>> {
    let query = "SELECT kind FROM resources WHERE id = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(resource_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup resource")?;
    Ok(row.map(|row| row.get("kind")))
}

/// Every grant on the resource and its strict ancestors, all subjects.
pub(crate) async fn grants_for_lineage(
    pool: &PgPool,
    resource_id: Uuid,
) -> Result<Vec<LineageGrant>> {
    let query = r"
        WITH RECURSIVE lineage AS (
            SELECT id, parent_id FROM resources WHERE id = $1
            UNION ALL
            SELECT resources.id, resources.parent_id
            FROM resources
            JOIN lineage ON resources.id = lineage.parent_id
        )
        SELECT grants.subject_type, grants.subject_id,
               (grants.target_id = $1) AS direct,
               grants.can_view, grants.can_download
        FROM grants
        JOIN lineage ON lineage.id = grants.target_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(resource_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to collect lineage grants")?;

    rows.into_iter()
        .map(|row| {
            let subject_type: String = row.get("subject_type");
            Ok(LineageGrant {
                subject_type: parse_subject_type(&subject_type)?,
                subject_id: row.get("subject_id"),
                direct: row.get("direct"),
                flags: GrantFlags {
                    can_view: row.get("can_view"),
                    can_download: row.get("can_download"),
                },
            })
        })
        .collect()
}

/// Groups the principal belongs to.
pub(crate) async fn principal_group_ids(pool: &PgPool, principal_id: Uuid) -> Result<Vec<Uuid>> {
    let query = "SELECT group_id FROM group_members WHERE principal_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(principal_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load group memberships")?;
    Ok(rows.into_iter().map(|row| row.get("group_id")).collect())
}

/// Memberships for a set of principals, as (principal, group) pairs.
pub(crate) async fn memberships_for(
    pool: &PgPool,
    principal_ids: &[Uuid],
) -> Result<Vec<(Uuid, Uuid)>> {
    let query = r"
        SELECT principal_id, group_id
        FROM group_members
        WHERE principal_id = ANY($1)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(principal_ids)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load memberships")?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("principal_id"), row.get("group_id")))
        .collect())
}

/// Every subject a grant can be addressed to: all non-admin principals plus
/// all groups. Admins bypass grants, so they never appear in the editor.
pub(crate) async fn grantable_subjects(pool: &PgPool) -> Result<Vec<(SubjectType, Uuid)>> {
    let query = r"
        SELECT 'user' AS subject_type, id FROM principals WHERE role <> 'admin'
        UNION ALL
        SELECT 'group' AS subject_type, id FROM principal_groups
        ORDER BY subject_type DESC, id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list grantable subjects")?;

    rows.into_iter()
        .map(|row| {
            let subject_type: String = row.get("subject_type");
            Ok((parse_subject_type(&subject_type)?, row.get("id")))
        })
        .collect()
}

pub(crate) async fn subject_exists(
    pool: &PgPool,
    subject_type: SubjectType,
    subject_id: Uuid,
) -> Result<bool> {
    let query = match subject_type {
        SubjectType::User => "SELECT 1 FROM principals WHERE id = $1 LIMIT 1",
        SubjectType::Group => "SELECT 1 FROM principal_groups WHERE id = $1 LIMIT 1",
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(subject_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check subject")?;
    Ok(row.is_some())
}

/// Replace the grant set on a target wholesale. Rows arrive pre-validated
/// and pre-normalized; the swap runs in one transaction so readers never see
/// a half-applied edit.
pub(crate) async fn replace_grants(
    pool: &PgPool,
    target_id: Uuid,
    rows: &[(SubjectType, Uuid, GrantFlags)],
) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let query = "DELETE FROM grants WHERE target_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(target_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear grants")?;

    let query = r"
        INSERT INTO grants (target_id, subject_type, subject_id, can_view, can_download)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (target_id, subject_type, subject_id) DO UPDATE
        SET can_view = EXCLUDED.can_view,
            can_download = EXCLUDED.can_download
    ";
    for (subject_type, subject_id, flags) in rows {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(target_id)
            .bind(subject_type.as_str())
            .bind(subject_id)
            .bind(flags.can_view)
            .bind(flags.can_download)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert grant")?;
    }

    tx.commit().await.context("failed to commit grants")?;
    Ok(())
}

pub(crate) struct GroupRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) is_system: bool,
    pub(crate) member_count: i64,
}

pub(crate) async fn list_groups(pool: &PgPool) -> Result<Vec<GroupRecord>> {
    let query = r"
        SELECT principal_groups.id, principal_groups.name, principal_groups.is_system,
               COUNT(group_members.principal_id) AS member_count
        FROM principal_groups
        LEFT JOIN group_members ON group_members.group_id = principal_groups.id
        GROUP BY principal_groups.id
        ORDER BY principal_groups.name
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list groups")?;
    Ok(rows
        .into_iter()
        .map(|row| GroupRecord {
            id: row.get("id"),
            name: row.get("name"),
            is_system: row.get("is_system"),
            member_count: row.get("member_count"),
        })
        .collect())
}

/// Create a group. Returns None when the name is already taken.
pub(crate) async fn create_group(pool: &PgPool, name: &str) -> Result<Option<Uuid>> {
    let query = r"
        INSERT INTO principal_groups (name)
        VALUES ($1)
        ON CONFLICT (name) DO NOTHING
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to create group")?;
    Ok(row.map(|row| row.get("id")))
}

pub(crate) enum DeleteGroupOutcome {
    Deleted,
    Missing,
    Reserved,
}

/// Delete a group unless it is one of the reserved system groups. The guard
/// lives in the statement itself so it cannot race with a concurrent edit.
pub(crate) async fn delete_group(pool: &PgPool, group_id: Uuid) -> Result<DeleteGroupOutcome> {
    let query = r"
        DELETE FROM principal_groups
        WHERE id = $1
          AND NOT is_system
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(group_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to delete group")?;
    if row.is_some() {
        return Ok(DeleteGroupOutcome::Deleted);
    }

    let query = "SELECT is_system FROM principal_groups WHERE id = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(group_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check group")?;
    Ok(match row {
        Some(_) => DeleteGroupOutcome::Reserved,
        None => DeleteGroupOutcome::Missing,
    })
}

pub(crate) async fn group_exists(pool: &PgPool, group_id: Uuid) -> Result<bool> {
    let query = "SELECT 1 FROM principal_groups WHERE id = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(group_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check group")?;
    Ok(row.is_some())
}

/// Replace a group's membership wholesale, in one transaction.
pub(crate) async fn set_members(pool: &PgPool, group_id: Uuid, members: &[Uuid]) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let query = "DELETE FROM group_members WHERE group_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(group_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear members")?;

    let query = r"
        INSERT INTO group_members (group_id, principal_id)
        SELECT $1, id FROM principals WHERE id = ANY($2)
        ON CONFLICT DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(group_id)
        .bind(members)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert members")?;

    tx.commit().await.context("failed to commit membership")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse_subject_type;
    use crate::authz::SubjectType;

    #[test]
    fn parse_subject_type_accepts_known_values() {
        assert!(matches!(parse_subject_type("user"), Ok(SubjectType::User)));
        assert!(matches!(parse_subject_type("group"), Ok(SubjectType::Group)));
        assert!(parse_subject_type("robot").is_err());
    }
}
