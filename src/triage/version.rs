//! Lenient version coercion.

use regex::Regex;
use semver::Version;
use std::sync::LazyLock;

static COERCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d])(\d{1,16})(?:\.(\d{1,16}))?(?:\.(\d{1,16}))?(?:$|[^\d])")
        .expect("hardcoded version coercion regex")
});

/// Pull the first `major[.minor[.patch]]` out of an arbitrary string.
///
/// Missing components become zero, anything around the numbers (a leading `v`,
/// `-SNAPSHOT`, build metadata) is ignored. Returns `None` when the string holds
/// no usable number.
pub fn coerce(raw: &str) -> Option<Version> {
    let captures = COERCE_REGEX.captures(raw)?;
    let component = |index: usize| -> Option<u64> {
        match captures.get(index) {
            Some(digits) => digits.as_str().parse().ok(),
            None => Some(0),
        }
    };

    Some(Version::new(component(1)?, component(2)?, component(3)?))
}

#[cfg(test)]
mod tests {
    use super::coerce;
    use semver::Version;

    #[test]
    fn plain_versions_round_through() {
        assert_eq!(coerce("15.4.2"), Some(Version::new(15, 4, 2)));
    }

    #[test]
    fn tag_prefix_and_suffix_are_ignored() {
        assert_eq!(coerce("v15.0.0"), Some(Version::new(15, 0, 0)));
        assert_eq!(coerce("15.1.0-SNAPSHOT"), Some(Version::new(15, 1, 0)));
        assert_eq!(coerce("14.2.3+build.77"), Some(Version::new(14, 2, 3)));
    }

    #[test]
    fn missing_components_become_zero() {
        assert_eq!(coerce("v2"), Some(Version::new(2, 0, 0)));
        assert_eq!(coerce("1.20"), Some(Version::new(1, 20, 0)));
    }

    #[test]
    fn first_version_in_prose_wins() {
        assert_eq!(
            coerce("SkinsRestorer 14.2.3 (git 1a2b3c)"),
            Some(Version::new(14, 2, 3))
        );
    }

    #[test]
    fn garbage_does_not_coerce() {
        assert_eq!(coerce(""), None);
        assert_eq!(coerce("unknown"), None);
        assert_eq!(coerce("12345678901234567890"), None);
    }

    #[test]
    fn coerced_versions_compare_semantically() {
        let current = coerce("1.9.0").expect("current");
        let latest = coerce("v1.10.0").expect("latest");
        assert!(current < latest);
    }
}
