//! Protocol version parsing and compatibility checks

use semver::Version;

use crate::PROTOCOL_VERSION;

/// Parsed protocol version of this build
#[must_use]
pub fn protocol_version() -> Version {
    Version::parse(PROTOCOL_VERSION).expect("PROTOCOL_VERSION is valid semver")
}

/// Check whether a peer's advertised version can talk to ours
///
/// Versions are compatible when they share a major version. While the major
/// version is `0`, the minor version must match as well.
#[must_use]
pub fn is_compatible(ours: &Version, theirs: &Version) -> bool {
    if ours.major != theirs.major {
        return false;
    }
    ours.major != 0 || ours.minor == theirs.minor
}

/// Parse a peer version string and check it against ours
///
/// Unparseable versions are never compatible.
#[must_use]
pub fn is_compatible_str(theirs: &str) -> bool {
    match Version::parse(theirs) {
        Ok(version) => is_compatible(&protocol_version(), &version),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_same_version_is_compatible() {
        assert!(is_compatible(&v("0.3.0"), &v("0.3.0")));
    }

    #[test]
    fn test_patch_difference_is_compatible() {
        assert!(is_compatible(&v("0.3.0"), &v("0.3.7")));
    }

    #[test]
    fn test_zero_major_minor_difference_is_incompatible() {
        assert!(!is_compatible(&v("0.3.0"), &v("0.4.0")));
    }

    #[test]
    fn test_major_difference_is_incompatible() {
        assert!(!is_compatible(&v("1.0.0"), &v("2.0.0")));
        assert!(is_compatible(&v("1.2.0"), &v("1.9.1")));
    }

    #[test]
    fn test_garbage_is_incompatible() {
        assert!(!is_compatible_str("not-a-version"));
        assert!(is_compatible_str(PROTOCOL_VERSION));
    }
}
