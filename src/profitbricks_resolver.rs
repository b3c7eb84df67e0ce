//! Identity resolution.
//!
//! Maps a human identity (name or id) onto exactly one listed resource.
//!
//! Rules:
//! - UUID-shaped identities match by id only, never by name.
//! - Other identities match by name; when no name matches, an exact id match
//!   is accepted (LAN ids are small integers, not UUIDs).
//! - Two or more name matches are an `AmbiguousMatch`, never a guess.

use uuid::Uuid;

use crate::profitbricks_error::{ProfitbricksError, Result};
use crate::profitbricks_types::{Properties, Resource, ResourceKind};

/// Whether `identity` is a hyphenated UUID (`8-4-4-4-12` hex digits).
#[must_use]
pub fn is_uuid(identity: &str) -> bool {
    identity.len() == 36 && Uuid::try_parse(identity).is_ok()
}

/// Find the resource `identity` refers to, if any.
///
/// # Errors
///
/// Returns `AmbiguousMatch` when more than one resource carries the name.
pub fn lookup<'a, P: Properties>(
    items: &'a [Resource<P>],
    identity: &str,
    kind: ResourceKind,
) -> Result<Option<&'a Resource<P>>> {
    if is_uuid(identity) {
        return Ok(items.iter().find(|r| r.id.eq_ignore_ascii_case(identity)));
    }

    let mut named = items.iter().filter(|r| r.name() == Some(identity));
    match (named.next(), named.next()) {
        (Some(only), None) => Ok(Some(only)),
        (Some(_), Some(_)) => Err(ProfitbricksError::AmbiguousMatch {
            kind,
            identity: identity.to_string(),
            count: items.iter().filter(|r| r.name() == Some(identity)).count(),
        }),
        (None, _) => Ok(items.iter().find(|r| r.id == identity)),
    }
}

/// Resolve `identity` to exactly one resource.
///
/// # Errors
///
/// Returns `NotFound` when nothing matches and `AmbiguousMatch` when the name is shared.
pub fn resolve<'a, P: Properties>(
    items: &'a [Resource<P>],
    identity: &str,
    kind: ResourceKind,
) -> Result<&'a Resource<P>> {
    lookup(items, identity, kind)?.ok_or_else(|| ProfitbricksError::not_found(kind, identity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profitbricks_types::{DatacenterProperties, LanProperties};

    const ID_A: &str = "2f0b4c1e-8a5d-4e6f-9b7c-0d1e2f3a4b5c";
    const ID_B: &str = "7c6b5a49-3827-4165-a4b3-c2d1e0f9a8b7";

    fn dc(id: &str, name: &str) -> Resource<DatacenterProperties> {
        Resource {
            id: id.to_string(),
            resource_type: None,
            href: None,
            properties: DatacenterProperties {
                name: Some(name.to_string()),
                ..DatacenterProperties::default()
            },
            entities: None,
            metadata: None,
        }
    }

    #[test]
    fn uuid_shape_detection() {
        assert!(is_uuid(ID_A));
        assert!(is_uuid(&ID_A.to_uppercase()));
        assert!(!is_uuid("2f0b4c1e8a5d4e6f9b7c0d1e2f3a4b5c"));
        assert!(!is_uuid("web01"));
        assert!(!is_uuid("zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz"));
    }

    #[test]
    fn uuid_identities_never_match_by_name() {
        // A resource *named* like another's id must not be picked.
        let items = vec![dc(ID_B, ID_A)];
        assert!(lookup(&items, ID_A, ResourceKind::Datacenter).unwrap().is_none());

        let items = vec![dc(ID_B, ID_A), dc(ID_A, "real")];
        let found = resolve(&items, ID_A, ResourceKind::Datacenter).unwrap();
        assert_eq!(found.name(), Some("real"));
    }

    #[test]
    fn names_resolve_to_the_single_match() {
        let items = vec![dc(ID_A, "Tardis One"), dc(ID_B, "Tardis Two")];
        let found = resolve(&items, "Tardis Two", ResourceKind::Datacenter).unwrap();
        assert_eq!(found.id, ID_B);
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let items = vec![dc(ID_A, "dup"), dc(ID_B, "dup")];
        let err = resolve(&items, "dup", ResourceKind::Datacenter).unwrap_err();
        assert!(matches!(
            err,
            ProfitbricksError::AmbiguousMatch { count: 2, .. }
        ));
    }

    #[test]
    fn missing_identity_is_not_found() {
        let items = vec![dc(ID_A, "one")];
        let err = resolve(&items, "two", ResourceKind::Datacenter).unwrap_err();
        assert!(matches!(err, ProfitbricksError::NotFound { .. }));
    }

    #[test]
    fn numeric_lan_ids_match_when_no_name_does() {
        let lan = |id: &str, name: &str| Resource {
            id: id.to_string(),
            resource_type: None,
            href: None,
            properties: LanProperties {
                name: Some(name.to_string()),
                ..LanProperties::default()
            },
            entities: None,
            metadata: None,
        };
        let items = vec![lan("1", "public"), lan("2", "private")];
        assert_eq!(resolve(&items, "2", ResourceKind::Lan).unwrap().id, "2");
        assert_eq!(resolve(&items, "public", ResourceKind::Lan).unwrap().id, "1");
    }
}
