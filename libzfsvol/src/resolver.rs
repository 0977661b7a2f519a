//! Volume name resolution.
//!
//! Every volume lives exactly one level beneath a configured root dataset.
//! [`NameResolver`] maps a caller-supplied name onto that dataset path and is
//! the only place the root-prefix rules are encoded; all driver operations go
//! through it.

use crate::error::VolumeError;

/// Characters that would address a snapshot or bookmark instead of a
/// filesystem.
const RESERVED: [char; 2] = ['@', '#'];

/// Maps volume names to canonical dataset paths.
///
/// Immutable after construction, so it can be shared by concurrent request
/// handlers without locking.
#[derive(Debug, Clone)]
pub struct NameResolver {
    roots: Vec<String>,
    legacy_names: bool,
}

impl NameResolver {
    /// `roots` is the ordered list of root dataset paths; the first one is the
    /// target for legacy (unqualified) names.
    pub fn new(roots: Vec<String>, legacy_names: bool) -> Self {
        Self {
            roots,
            legacy_names,
        }
    }

    /// Resolve `name` to the dataset path backing it.
    ///
    /// A name of the form `<root>/<leaf>` is returned unchanged. With legacy
    /// names enabled, a bare `<leaf>` resolves against the first root.
    /// Anything else fails with [`VolumeError::InvalidName`].
    pub fn resolve(&self, name: &str) -> Result<String, VolumeError> {
        for root in &self.roots {
            if let Some(leaf) = name
                .strip_prefix(root.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                && is_leaf(leaf)
            {
                return Ok(name.to_owned());
            }
        }

        if self.legacy_names
            && is_leaf(name)
            && let Some(first) = self.roots.first()
        {
            return Ok(format!("{first}/{name}"));
        }

        Err(VolumeError::InvalidName(name.to_owned()))
    }

    /// The unqualified name under which a child of the first root is also
    /// listed, if legacy names are enabled and `path` is such a child.
    pub fn legacy_alias<'a>(&self, path: &'a str) -> Option<&'a str> {
        if !self.legacy_names {
            return None;
        }
        let first = self.roots.first()?;
        path.strip_prefix(first.as_str())?
            .strip_prefix('/')
            .filter(|leaf| is_leaf(leaf))
    }
}

/// A single, non-empty path segment that names a filesystem.
fn is_leaf(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains('/') && !segment.contains(RESERVED)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(legacy: bool) -> NameResolver {
        NameResolver::new(vec!["tank/a".into(), "tank/b".into()], legacy)
    }

    #[test]
    fn qualified_names_are_returned_unchanged() {
        let r = resolver(false);
        for name in ["tank/a/vol1", "tank/b/vol1", "tank/b/some-other_vol.2"] {
            assert_eq!(r.resolve(name).unwrap(), name);
        }
    }

    #[test]
    fn qualified_resolution_is_idempotent() {
        let r = resolver(true);
        let once = r.resolve("vol1").unwrap();
        assert_eq!(r.resolve(&once).unwrap(), once);
    }

    #[test]
    fn bare_names_use_first_root_in_legacy_mode() {
        let r = resolver(true);
        assert_eq!(r.resolve("vol1").unwrap(), "tank/a/vol1");
    }

    #[test]
    fn bare_names_are_rejected_without_legacy_mode() {
        let r = resolver(false);
        assert_eq!(
            r.resolve("vol1"),
            Err(VolumeError::InvalidName("vol1".into()))
        );
    }

    #[test]
    fn nested_names_are_rejected() {
        let r = resolver(true);
        assert!(matches!(
            r.resolve("tank/a/b/c"),
            Err(VolumeError::InvalidName(_))
        ));

        let r = NameResolver::new(vec!["a/b".into()], true);
        assert_eq!(
            r.resolve("a/b/c/d"),
            Err(VolumeError::InvalidName("a/b/c/d".into()))
        );
        assert_eq!(r.resolve("a/b/c").unwrap(), "a/b/c");
    }

    #[test]
    fn names_outside_every_root_are_rejected() {
        let r = resolver(true);
        assert!(r.resolve("tank/c/vol1").is_err());
        // Prefix must end at a path boundary.
        assert!(r.resolve("tank/ab/vol1").is_err());
        assert!(r.resolve("other/vol1").is_err());
    }

    #[test]
    fn empty_and_reserved_leaves_are_rejected() {
        let r = resolver(true);
        for name in ["", "tank/a/", "tank/a/vol@snap", "vol#mark", "tank/a"] {
            assert!(r.resolve(name).is_err(), "{name:?} should not resolve");
        }
    }

    #[test]
    fn legacy_alias_only_for_first_root() {
        let r = resolver(true);
        assert_eq!(r.legacy_alias("tank/a/vol1"), Some("vol1"));
        assert_eq!(r.legacy_alias("tank/b/vol1"), None);
        assert_eq!(resolver(false).legacy_alias("tank/a/vol1"), None);
    }
}
