//! Grant editing, effective-permission lookup, and group administration.

pub(crate) mod storage;

#[cfg(test)]
mod integration_tests;

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use self::storage::{DeleteGroupOutcome, LineageGrant};
use crate::{
    api::{error::ApiError, handlers::auth::principal},
    authz::{self, Effective, GrantFlags, Role, SubjectType},
};

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct GrantRow {
    pub subject_type: SubjectType,
    pub subject_id: Uuid,
    pub can_view: bool,
    pub can_download: bool,
}

/// Editor view of one grantable subject: its direct flags on the target
/// (all-false when no row exists) and the rights it would hold even without
/// them. The inherited flags are recomputed on every read.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GrantListRow {
    pub subject_type: SubjectType,
    pub subject_id: Uuid,
    pub can_view: bool,
    pub can_download: bool,
    pub inherited_view: bool,
    pub inherited_download: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GrantListResponse {
    pub target_id: Uuid,
    pub rows: Vec<GrantListRow>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetGrantsRequest {
    pub rows: Vec<GrantRow>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GroupResponse {
    pub id: Uuid,
    pub name: String,
    pub is_system: bool,
    pub member_count: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetMembersRequest {
    pub group_id: Uuid,
    pub members: Vec<Uuid>,
}

async fn require_target(
    pool: &PgPool,
    target_type: &str,
    target_id: Uuid,
) -> Result<(), ApiError> {
    let kind = storage::resource_kind(pool, target_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    // A mismatched kind means the caller is addressing a different object
    // than the one stored under this id; treat it as unknown.
    if kind != target_type {
        return Err(ApiError::NotFound);
    }
    Ok(())
}

/// Rights a subject would hold on the target without its direct grant:
/// ancestor grants for the subject itself, plus (for users) grants held by
/// the listed groups anywhere on the lineage.
fn inherited_for(
    subject_type: SubjectType,
    subject_id: Uuid,
    groups_of_subject: &HashSet<Uuid>,
    lineage: &[LineageGrant],
) -> Effective {
    let flags = lineage.iter().filter_map(|grant| {
        let own = grant.subject_type == subject_type && grant.subject_id == subject_id;
        let via_group = subject_type == SubjectType::User
            && grant.subject_type == SubjectType::Group
            && groups_of_subject.contains(&grant.subject_id);
        if (own && !grant.direct) || via_group {
            Some(grant.flags)
        } else {
            None
        }
    });
    authz::resolve(Role::Standard, flags)
}

/// One editor row per grantable subject, whether or not a direct grant
/// exists yet, so an admin can see inherited rights before granting.
fn editor_rows(
    subjects: &[(SubjectType, Uuid)],
    memberships: &[(Uuid, Uuid)],
    lineage: &[LineageGrant],
) -> Vec<GrantListRow> {
    subjects
        .iter()
        .map(|&(subject_type, subject_id)| {
            let direct = lineage
                .iter()
                .find(|grant| {
                    grant.direct
                        && grant.subject_type == subject_type
                        && grant.subject_id == subject_id
                })
                .map_or(GrantFlags::default(), |grant| grant.flags);
            let groups: HashSet<Uuid> = memberships
                .iter()
                .filter(|(principal_id, _)| *principal_id == subject_id)
                .map(|(_, group_id)| *group_id)
                .collect();
            let inherited = inherited_for(subject_type, subject_id, &groups, lineage);
            GrantListRow {
                subject_type,
                subject_id,
                can_view: direct.can_view,
                can_download: direct.can_download,
                inherited_view: inherited.can_view,
                inherited_download: inherited.can_download,
            }
        })
        .collect()
}

#[utoipa::path(
    get,
    path = "/v1/permissions/{target_type}/{id}",
    params(
        ("target_type" = String, Path, description = "Resource kind, file or folder"),
        ("id" = Uuid, Path, description = "Resource id")
    ),
    responses(
        (status = 200, description = "Every grantable subject with its direct and inherited flags", body = GrantListResponse),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Unknown resource")
    ),
    security(("bearer" = [])),
    tag = "permissions"
)]
pub async fn get_grants(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path((target_type, target_id)): Path<(String, Uuid)>,
) -> Result<Json<GrantListResponse>, ApiError> {
    principal::require_admin(&pool, &headers).await?;
    require_target(&pool, &target_type, target_id).await?;

    let lineage = storage::grants_for_lineage(&pool, target_id).await?;
    let subjects = storage::grantable_subjects(&pool).await?;
    let user_subjects: Vec<Uuid> = subjects
        .iter()
        .filter(|(subject_type, _)| *subject_type == SubjectType::User)
        .map(|(_, subject_id)| *subject_id)
        .collect();
    let memberships = storage::memberships_for(&pool, &user_subjects).await?;

    Ok(Json(GrantListResponse {
        target_id,
        rows: editor_rows(&subjects, &memberships, &lineage),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/permissions/{target_type}/{id}",
    params(
        ("target_type" = String, Path, description = "Resource kind, file or folder"),
        ("id" = Uuid, Path, description = "Resource id")
    ),
    request_body = SetGrantsRequest,
    responses(
        (status = 204, description = "Grant set replaced"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Unknown resource or subject")
    ),
    security(("bearer" = [])),
    tag = "permissions"
)]
pub async fn set_grants(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path((target_type, target_id)): Path<(String, Uuid)>,
    Json(request): Json<SetGrantsRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = principal::require_admin(&pool, &headers).await?;
    require_target(&pool, &target_type, target_id).await?;

    let mut rows = Vec::with_capacity(request.rows.len());
    for row in &request.rows {
        if !storage::subject_exists(&pool, row.subject_type, row.subject_id).await? {
            return Err(ApiError::NotFound);
        }
        // Client-computed flags are never trusted; the invariant is
        // re-derived here per row.
        let flags = GrantFlags {
            can_view: row.can_view,
            can_download: row.can_download,
        }
        .normalized();
        rows.push((row.subject_type, row.subject_id, flags));
    }

    storage::replace_grants(&pool, target_id, &rows).await?;
    info!(admin = %caller.id, target = %target_id, rows = rows.len(), "grants replaced");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/permissions/effective/{id}",
    params(
        ("id" = Uuid, Path, description = "Resource id")
    ),
    responses(
        (status = 200, description = "Caller's effective rights on the resource", body = Effective),
        (status = 404, description = "Unknown resource")
    ),
    security(("bearer" = [])),
    tag = "permissions"
)]
pub async fn effective(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(resource_id): Path<Uuid>,
) -> Result<Json<Effective>, ApiError> {
    let caller = principal::require_auth(&pool, &headers).await?;
    if storage::resource_kind(&pool, resource_id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let groups: HashSet<Uuid> = storage::principal_group_ids(&pool, caller.id)
        .await?
        .into_iter()
        .collect();
    let lineage = storage::grants_for_lineage(&pool, resource_id).await?;
    let flags = lineage.iter().filter_map(|grant| {
        let applies = match grant.subject_type {
            SubjectType::User => grant.subject_id == caller.id,
            SubjectType::Group => groups.contains(&grant.subject_id),
        };
        applies.then_some(grant.flags)
    });

    Ok(Json(authz::resolve(caller.role, flags)))
}

#[utoipa::path(
    get,
    path = "/v1/groups",
    responses(
        (status = 200, description = "All groups with member counts", body = [GroupResponse]),
        (status = 403, description = "Admin role required")
    ),
    security(("bearer" = [])),
    tag = "groups"
)]
pub async fn list_groups(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    principal::require_admin(&pool, &headers).await?;
    let groups = storage::list_groups(&pool)
        .await?
        .into_iter()
        .map(|group| GroupResponse {
            id: group.id,
            name: group.name,
            is_system: group.is_system,
            member_count: group.member_count,
        })
        .collect();
    Ok(Json(groups))
}

#[utoipa::path(
    post,
    path = "/v1/groups",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group created", body = GroupResponse),
        (status = 403, description = "Admin role required"),
        (status = 409, description = "Name already taken")
    ),
    security(("bearer" = [])),
    tag = "groups"
)]
pub async fn create_group(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), ApiError> {
    let caller = principal::require_admin(&pool, &headers).await?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::Conflict("group name must not be empty".to_string()));
    }

    let id = storage::create_group(&pool, name)
        .await?
        .ok_or_else(|| ApiError::Conflict(format!("group {name} already exists")))?;
    info!(admin = %caller.id, group = %id, "group created");
    Ok((
        StatusCode::CREATED,
        Json(GroupResponse {
            id,
            name: name.to_string(),
            is_system: false,
            member_count: 0,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/v1/groups/{id}",
    params(
        ("id" = Uuid, Path, description = "Group id")
    ),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 403, description = "Admin role required, or group is reserved"),
        (status = 404, description = "Unknown group")
    ),
    security(("bearer" = [])),
    tag = "groups"
)]
pub async fn delete_group(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let caller = principal::require_admin(&pool, &headers).await?;
    match storage::delete_group(&pool, group_id).await? {
        DeleteGroupOutcome::Deleted => {
            info!(admin = %caller.id, group = %group_id, "group deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        DeleteGroupOutcome::Missing => Err(ApiError::NotFound),
        DeleteGroupOutcome::Reserved => Err(ApiError::Forbidden),
    }
}

#[utoipa::path(
    post,
    path = "/v1/groups/members",
    request_body = SetMembersRequest,
    responses(
        (status = 204, description = "Membership replaced"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Unknown group")
    ),
    security(("bearer" = [])),
    tag = "groups"
)]
pub async fn set_members(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(request): Json<SetMembersRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = principal::require_admin(&pool, &headers).await?;
    if !storage::group_exists(&pool, request.group_id).await? {
        return Err(ApiError::NotFound);
    }
    storage::set_members(&pool, request.group_id, &request.members).await?;
    info!(
        admin = %caller.id,
        group = %request.group_id,
        members = request.members.len(),
        "group membership replaced"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::{LineageGrant, editor_rows, inherited_for};
    use crate::authz::{GrantFlags, SubjectType};
    use std::collections::HashSet;
    use uuid::Uuid;

    fn grant(
        subject_type: SubjectType,
        subject_id: Uuid,
        direct: bool,
        can_view: bool,
        can_download: bool,
    ) -> LineageGrant {
        LineageGrant {
            subject_type,
            subject_id,
            direct,
            flags: GrantFlags {
                can_view,
                can_download,
            },
        }
    }

    #[test]
    fn direct_grant_is_excluded_from_inherited() {
        let user = Uuid::from_u128(1);
        let lineage = vec![grant(SubjectType::User, user, true, true, true)];
        let inherited = inherited_for(SubjectType::User, user, &HashSet::new(), &lineage);
        assert!(!inherited.can_view);
        assert!(!inherited.can_download);
    }

    #[test]
    fn ancestor_grant_counts_as_inherited() {
        let user = Uuid::from_u128(1);
        let lineage = vec![
            grant(SubjectType::User, user, true, false, false),
            grant(SubjectType::User, user, false, true, false),
        ];
        let inherited = inherited_for(SubjectType::User, user, &HashSet::new(), &lineage);
        assert!(inherited.can_view);
        assert!(!inherited.can_download);
    }

    #[test]
    fn group_grant_on_target_counts_for_member() {
        let user = Uuid::from_u128(1);
        let group = Uuid::from_u128(2);
        let groups = HashSet::from([group]);
        let lineage = vec![grant(SubjectType::Group, group, true, true, true)];
        let inherited = inherited_for(SubjectType::User, user, &groups, &lineage);
        assert!(inherited.can_view);
        assert!(inherited.can_download);
    }

    #[test]
    fn unrelated_group_grant_is_ignored() {
        let user = Uuid::from_u128(1);
        let other_group = Uuid::from_u128(3);
        let lineage = vec![grant(SubjectType::Group, other_group, false, true, true)];
        let inherited = inherited_for(SubjectType::User, user, &HashSet::new(), &lineage);
        assert!(!inherited.can_view);
    }

    #[test]
    fn every_subject_gets_a_row_even_without_a_grant() {
        let granted = Uuid::from_u128(1);
        let ungranted = Uuid::from_u128(2);
        let group = Uuid::from_u128(3);
        let subjects = vec![
            (SubjectType::User, granted),
            (SubjectType::User, ungranted),
            (SubjectType::Group, group),
        ];
        let lineage = vec![grant(SubjectType::User, granted, true, true, false)];

        let rows = editor_rows(&subjects, &[], &lineage);
        assert_eq!(rows.len(), 3);
        assert!(rows[0].can_view && !rows[0].can_download);
        assert!(!rows[1].can_view && !rows[1].can_download);
        assert!(!rows[2].can_view && !rows[2].can_download);
    }

    #[test]
    fn ungranted_member_shows_rights_inherited_via_group() {
        let user = Uuid::from_u128(1);
        let group = Uuid::from_u128(2);
        let subjects = vec![(SubjectType::User, user), (SubjectType::Group, group)];
        let memberships = vec![(user, group)];
        // The group holds view on an ancestor; the user has no row at all.
        let lineage = vec![grant(SubjectType::Group, group, false, true, false)];

        let rows = editor_rows(&subjects, &memberships, &lineage);
        let user_row = &rows[0];
        assert_eq!(user_row.subject_id, user);
        assert!(!user_row.can_view);
        assert!(user_row.inherited_view);
        assert!(!user_row.inherited_download);
    }

    #[test]
    fn group_rows_inherit_only_their_own_ancestor_grants() {
        let group = Uuid::from_u128(2);
        let lineage = vec![
            grant(SubjectType::Group, group, true, true, false),
            grant(SubjectType::Group, group, false, false, true),
        ];
        let inherited = inherited_for(SubjectType::Group, group, &HashSet::new(), &lineage);
        // The ancestor row is download-only; read-side normalization applies.
        assert!(inherited.can_view);
        assert!(inherited.can_download);
    }
}
