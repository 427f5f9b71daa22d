use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use std::cmp::Ordering;

static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[vV]?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:[-+]?([0-9A-Za-z.\-]+))?$").unwrap()
});

/// Strips the decoration GitHub tags usually carry (`v1.2.0` -> `1.2.0`).
pub fn normalize_tag(tag: &str) -> String {
    let trimmed = tag.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
        .to_string()
}

/// Parses a release tag into a semantic version, filling in missing
/// minor/patch components. Returns `None` for tags that don't look like versions.
pub fn parse_lenient(tag: &str) -> Option<Version> {
    let caps = VERSION_REGEX.captures(tag.trim())?;
    let major: u64 = caps.get(1)?.as_str().parse().ok()?;
    let minor: u64 = caps
        .get(2)
        .map_or(Ok(0), |m| m.as_str().parse())
        .ok()?;
    let patch: u64 = caps
        .get(3)
        .map_or(Ok(0), |m| m.as_str().parse())
        .ok()?;

    let mut version = Version::new(major, minor, patch);
    if let Some(pre) = caps.get(4) {
        // Anything that isn't a valid prerelease identifier is ignored.
        if let Ok(pre) = semver::Prerelease::new(pre.as_str()) {
            version.pre = pre;
        }
    }
    Some(version)
}

/// Orders two version strings. Falls back to a plain string comparison
/// of the normalized tags when either side isn't a version.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => normalize_tag(a).cmp(&normalize_tag(b)),
    }
}

/// Whether `latest` should be offered as an update over `installed`.
pub fn is_newer(latest: &str, installed: &str) -> bool {
    match (parse_lenient(latest), parse_lenient(installed)) {
        (Some(latest), Some(installed)) => latest > installed,
        _ => normalize_tag(latest) != normalize_tag(installed),
    }
}
