//! Permission resolution engine.
//!
//! Effective rights for a (principal, resource) pair are the permissive union
//! of every grant that applies to the principal: the direct grant on the
//! resource, grants held by any of the principal's groups on the resource,
//! and the same two lookups repeated for every strict ancestor folder.
//! There is no deny grant; absence of a permissive grant is the only way to
//! deny. Admins bypass grants entirely.
//!
//! Grant collection against the store lives in the permissions handlers; this
//! module is the pure core so the union and normalization rules are testable
//! without a database.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Role attached to a principal. Admins are unconditionally granted both
/// flags by [`resolve`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Standard,
}

impl Role {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Standard => "standard",
        }
    }

    pub(crate) fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "admin" => Some(Self::Admin),
            "standard" => Some(Self::Standard),
            _ => None,
        }
    }
}

/// Subject of a grant row: a single principal or a whole group.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    User,
    Group,
}

impl SubjectType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }

    pub(crate) fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "user" => Some(Self::User),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// View/download flags of a single stored grant.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GrantFlags {
    pub can_view: bool,
    pub can_download: bool,
}

impl GrantFlags {
    /// Enforce the download-implies-view invariant on a single row.
    ///
    /// `download=true, view=false` is corrected to `view=true`; a row that
    /// revokes view also loses download. Both the write path and the resolver
    /// apply this independently, never trusting client-computed values.
    #[must_use]
    pub fn normalized(self) -> Self {
        if self.can_download && !self.can_view {
            // A writer clearing view intends revocation, so download follows.
            Self {
                can_view: false,
                can_download: false,
            }
        } else {
            self
        }
    }
}

/// Resolved outcome for a (principal, resource) pair.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Effective {
    pub can_view: bool,
    pub can_download: bool,
}

impl Effective {
    pub const ALL: Self = Self {
        can_view: true,
        can_download: true,
    };
}

/// Fold the collected grants into the effective outcome.
///
/// `grants` must already contain every applicable row: direct and group
/// grants on the resource itself and on each strict ancestor folder. Order
/// is irrelevant since the union is commutative.
#[must_use]
pub fn resolve<I>(role: Role, grants: I) -> Effective
where
    I: IntoIterator<Item = GrantFlags>,
{
    if role == Role::Admin {
        return Effective::ALL;
    }

    let mut effective = Effective::default();
    for grant in grants {
        // Read-side normalization: a download grant always implies view,
        // even if a stored row predates the write-path invariant.
        effective.can_view |= grant.can_view || grant.can_download;
        effective.can_download |= grant.can_download;
    }
    effective
}

#[cfg(test)]
mod tests {
    use super::{Effective, GrantFlags, Role, SubjectType, resolve};

    fn flags(can_view: bool, can_download: bool) -> GrantFlags {
        GrantFlags {
            can_view,
            can_download,
        }
    }

    #[test]
    fn role_round_trips() {
        assert_eq!(Role::from_str(Role::Admin.as_str()), Some(Role::Admin));
        assert_eq!(
            Role::from_str(Role::Standard.as_str()),
            Some(Role::Standard)
        );
        assert_eq!(Role::from_str("root"), None);
    }

    #[test]
    fn subject_type_names() {
        assert_eq!(SubjectType::User.as_str(), "user");
        assert_eq!(SubjectType::Group.as_str(), "group");
        assert_eq!(SubjectType::from_str("user"), Some(SubjectType::User));
        assert_eq!(SubjectType::from_str("group"), Some(SubjectType::Group));
        assert_eq!(SubjectType::from_str("robot"), None);
    }

    #[test]
    fn no_grants_denies_everything() {
        assert_eq!(resolve(Role::Standard, []), Effective::default());
    }

    #[test]
    fn admin_overrides_empty_grant_set() {
        assert_eq!(resolve(Role::Admin, []), Effective::ALL);
    }

    #[test]
    fn admin_overrides_regardless_of_rows() {
        assert_eq!(resolve(Role::Admin, [flags(false, false)]), Effective::ALL);
    }

    #[test]
    fn stray_download_only_row_still_implies_view() {
        // Rows written before the invariant existed resolve safely.
        let effective = resolve(Role::Standard, [flags(false, true)]);
        assert!(effective.can_view);
        assert!(effective.can_download);
    }

    #[test]
    fn union_is_permissive_across_rows() {
        // One row grants view, another download; the union has both.
        let effective = resolve(Role::Standard, [flags(true, false), flags(false, true)]);
        assert_eq!(effective, Effective::ALL);
    }

    #[test]
    fn download_implies_view_in_every_combination() {
        let inputs = [false, true];
        for view in inputs {
            for download in inputs {
                let effective = resolve(Role::Standard, [flags(view, download)]);
                if effective.can_download {
                    assert!(effective.can_view);
                }
            }
        }
    }

    #[test]
    fn normalization_clears_download_when_view_revoked() {
        let row = flags(false, true).normalized();
        assert_eq!(row, flags(false, false));
    }

    #[test]
    fn normalization_keeps_consistent_rows() {
        assert_eq!(flags(true, true).normalized(), flags(true, true));
        assert_eq!(flags(true, false).normalized(), flags(true, false));
    }

    #[test]
    fn view_only_rows_never_produce_download() {
        let effective = resolve(
            Role::Standard,
            [flags(true, false), flags(true, false), flags(false, false)],
        );
        assert!(effective.can_view);
        assert!(!effective.can_download);
    }
}
