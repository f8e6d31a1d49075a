//! Identifiers for Consul secrets engine roles.
//!
//! A role lives at the logical path `<backend>/roles/<name>`, and that path is
//! also the only handle persisted for it. Records written by older releases
//! used `<backend>,<name>` instead; [`upgrade_legacy_id`] rewrites those and is
//! meant to run before any decode.
//!
//! Both decoders split on the *last* `/roles/` that still leaves a non-empty
//! name, so a backend or name that itself contains `/roles/` will not survive
//! a round-trip.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Separator between the backend mount and the role name.
pub const ROLES_SEGMENT: &str = "/roles/";

static BACKEND_FROM_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)/roles/.+$").expect("backend pattern is valid"));
static NAME_FROM_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+/roles/(.+$)").expect("name pattern is valid"));

/// The decode step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOp {
    Name,
    Backend,
}

impl fmt::Display for DecodeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeOp::Name => f.write_str("decode-name"),
            DecodeOp::Backend => f.write_str("decode-parent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleIdError {
    #[error("{op}: malformed role ID {id:?}")]
    Malformed { op: DecodeOp, id: String },

    #[error("{op}: unexpected number of matches ({captures}) in {id:?}")]
    UnexpectedCaptures {
        op: DecodeOp,
        id: String,
        captures: usize,
    },
}

impl RoleIdError {
    /// The identifier that failed to decode.
    pub fn id(&self) -> &str {
        match self {
            RoleIdError::Malformed { id, .. } | RoleIdError::UnexpectedCaptures { id, .. } => id,
        }
    }

    pub fn op(&self) -> DecodeOp {
        match self {
            RoleIdError::Malformed { op, .. } | RoleIdError::UnexpectedCaptures { op, .. } => *op,
        }
    }
}

/// Builds the logical path of a role: `<backend>/roles/<name>`.
///
/// Leading and trailing slashes are trimmed from `backend`; `name` is embedded
/// verbatim.
pub fn role_path(backend: &str, name: &str) -> String {
    format!("{}{}{}", backend.trim_matches('/'), ROLES_SEGMENT, name)
}

/// Extracts the role name from a role path.
pub fn name_from_path(path: &str) -> Result<String, RoleIdError> {
    capture(&NAME_FROM_PATH, path, DecodeOp::Name)
}

/// Extracts the backend mount from a role path.
pub fn backend_from_path(path: &str) -> Result<String, RoleIdError> {
    capture(&BACKEND_FROM_PATH, path, DecodeOp::Backend)
}

fn capture(pattern: &Regex, path: &str, op: DecodeOp) -> Result<String, RoleIdError> {
    let captures = pattern.captures(path).ok_or_else(|| RoleIdError::Malformed {
        op,
        id: path.to_string(),
    })?;
    if captures.len() != 2 {
        return Err(RoleIdError::UnexpectedCaptures {
            op,
            id: path.to_string(),
            captures: captures.len(),
        });
    }
    captures
        .get(1)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| RoleIdError::Malformed {
            op,
            id: path.to_string(),
        })
}

/// Rewrites a legacy `<backend>,<name>` ID into a role path.
///
/// Returns `None` when `id` is not in the legacy shape, i.e. it does not split
/// into exactly two non-empty parts on `,`.
pub fn upgrade_legacy_id(id: &str) -> Option<String> {
    let mut parts = id.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(backend), Some(name), None) if !backend.is_empty() && !name.is_empty() => {
            Some(role_path(backend, name))
        }
        _ => None,
    }
}

/// Same as [`upgrade_legacy_id`] but always yields an ID, passing through
/// anything that is not a legacy ID.
pub fn migrate_legacy_id(id: &str) -> String {
    upgrade_legacy_id(id).unwrap_or_else(|| id.to_string())
}

/// Structured identity of a role. Its `Display` form is the role path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleId {
    backend: String,
    name: String,
}

impl RoleId {
    pub fn new(backend: &str, name: &str) -> Self {
        Self {
            backend: backend.trim_matches('/').to_string(),
            name: name.to_string(),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The logical path used as the Vault key and persisted handle.
    pub fn path(&self) -> String {
        role_path(&self.backend, &self.name)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.backend, ROLES_SEGMENT, self.name)
    }
}

impl FromStr for RoleId {
    type Err = RoleIdError;

    /// Parses a role path. Legacy IDs are not accepted here; run them through
    /// [`migrate_legacy_id`] first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = name_from_path(s)?;
        let backend = backend_from_path(s)?;
        Ok(Self { backend, name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn role_path_trims_backend_slashes() {
        assert_eq!(role_path("/foo/", "bar"), "foo/roles/bar");
        assert_eq!(role_path("foo", "bar"), "foo/roles/bar");
        assert_eq!(role_path("//nested/consul//", "bar"), "nested/consul/roles/bar");
    }

    #[test]
    fn role_path_keeps_name_verbatim() {
        assert_eq!(role_path("consul", "/team/a/"), "consul/roles//team/a/");
    }

    #[test]
    fn decodes_simple_path() {
        assert_eq!(name_from_path("foo/roles/bar").unwrap(), "bar");
        assert_eq!(backend_from_path("foo/roles/bar").unwrap(), "foo");
    }

    #[test]
    fn decodes_nested_backend_and_slashed_name() {
        let path = role_path("secrets/consul-dc1", "team/app");
        assert_eq!(backend_from_path(&path).unwrap(), "secrets/consul-dc1");
        assert_eq!(name_from_path(&path).unwrap(), "team/app");
    }

    #[test]
    fn missing_separator_is_malformed() {
        let err = name_from_path("no-roles-segment").unwrap_err();
        assert_eq!(
            err,
            RoleIdError::Malformed {
                op: DecodeOp::Name,
                id: "no-roles-segment".to_string()
            }
        );
        let err = backend_from_path("no-roles-segment").unwrap_err();
        assert_eq!(err.op(), DecodeOp::Backend);
        assert_eq!(err.id(), "no-roles-segment");
        assert!(matches!(err, RoleIdError::Malformed { .. }));
    }

    #[test]
    fn empty_segments_are_malformed() {
        assert!(name_from_path("consul/roles/").is_err());
        assert!(backend_from_path("/roles/web").is_err());
        assert!(name_from_path("").is_err());
    }

    #[test]
    fn error_message_names_operation() {
        let err = backend_from_path("consul,web").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("decode-parent"), "{}", msg);
        assert!(msg.contains("malformed role ID"), "{}", msg);
        assert!(msg.contains("consul,web"), "{}", msg);
    }

    #[test]
    fn repeated_separator_splits_on_last_occurrence() {
        // Not invertible; pinned so a change in behaviour is noticed.
        let path = role_path("a/roles/b", "c");
        assert_eq!(backend_from_path(&path).unwrap(), "a/roles/b");
        assert_eq!(name_from_path(&path).unwrap(), "c");

        let path = role_path("a", "b/roles/c");
        assert_eq!(backend_from_path(&path).unwrap(), "a/roles/b");
        assert_eq!(name_from_path(&path).unwrap(), "c");
    }

    #[test]
    fn upgrades_legacy_ids() {
        assert_eq!(upgrade_legacy_id("foo,bar").as_deref(), Some("foo/roles/bar"));
        assert_eq!(upgrade_legacy_id("/foo/,bar").as_deref(), Some("foo/roles/bar"));
        assert_eq!(migrate_legacy_id("foo,bar"), "foo/roles/bar");
    }

    #[test]
    fn leaves_non_legacy_ids_alone() {
        for id in ["foo/roles/bar", "a,b,c", "noseparator", ",bar", "foo,", ""] {
            assert_eq!(upgrade_legacy_id(id), None, "{}", id);
            assert_eq!(migrate_legacy_id(id), id);
        }
    }

    #[test]
    fn role_id_parses_and_displays() {
        let id: RoleId = "consul/roles/web".parse().unwrap();
        assert_eq!(id.backend(), "consul");
        assert_eq!(id.name(), "web");
        assert_eq!(id.to_string(), "consul/roles/web");
        assert_eq!(RoleId::new("/consul/", "web"), id);
        assert_eq!(id.path(), id.to_string());
        assert!("consul,web".parse::<RoleId>().is_err());
    }

    fn segment() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_.-]{1,12}(/[A-Za-z0-9_.-]{1,12}){0,2}"
            .prop_filter("must not contain the roles separator", |s| {
                !s.contains(ROLES_SEGMENT) && !s.starts_with("roles/") && !s.ends_with("/roles")
            })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(backend in segment(), name in segment()) {
            let path = role_path(&backend, &name);
            prop_assert_eq!(backend_from_path(&path).unwrap(), backend.clone());
            prop_assert_eq!(name_from_path(&path).unwrap(), name.clone());
            prop_assert_eq!(path.parse::<RoleId>().unwrap(), RoleId::new(&backend, &name));
        }

        #[test]
        fn migration_is_noop_on_encoded_ids(backend in segment(), name in segment()) {
            let path = role_path(&backend, &name);
            prop_assert_eq!(upgrade_legacy_id(&path), None);
            prop_assert_eq!(migrate_legacy_id(&path), path);
        }
    }
}
