//! Version-tag algebra (component C1).
//!
//! Parses, compares, range-matches, and categorizes tags of the shape
//! `v?MAJOR.MINOR.PATCH(-PRERELEASE)?`. This module has no dependency on
//! the entity model or the datastore so it can be exercised in isolation,
//! the way the teacher keeps `version_matcher` free of `registry.rs`.

use std::cmp::Ordering;

/// A parsed version tag.
///
/// `raw` preserves the original string (including an optional leading
/// `v`) so callers can round-trip it back into `tag_map` keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTag {
    pub raw: String,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl VersionTag {
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }
}

/// Parses a tag of the shape `v?MAJOR.MINOR.PATCH(-PRERELEASE)?`.
///
/// Returns `None` for anything else: extra dot-separated components,
/// non-numeric components, or an empty prerelease after a trailing `-`.
pub fn parse(tag: &str) -> Option<VersionTag> {
    let body = tag.strip_prefix('v').unwrap_or(tag);
    let (core, prerelease) = match body.find('-') {
        Some(idx) => {
            let pre = &body[idx + 1..];
            if pre.is_empty() {
                return None;
            }
            (&body[..idx], Some(pre.to_string()))
        }
        None => (body, None),
    };

    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next()?.parse::<u64>().ok()?;
    let patch = parts.next()?.parse::<u64>().ok()?;
    if parts.next().is_some() {
        return None;
    }

    Some(VersionTag {
        raw: tag.to_string(),
        major,
        minor,
        patch,
        prerelease,
    })
}

/// `true` iff `tag` is parseable per the grammar above.
pub fn is_valid(tag: &str) -> bool {
    parse(tag).is_some()
}

/// Compares two parsed tags: numeric triple first, then pre-release
/// precedence (a pre-release sorts strictly below the same numeric
/// triple without one; two pre-releases compare dot-component-wise per
/// semver precedence: numeric identifiers compare numerically and sort
/// below alphanumeric ones, shorter identifier lists sort below longer
/// ones that share the same prefix).
pub fn compare_tags(a: &VersionTag, b: &VersionTag) -> Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| match (&a.prerelease, &b.prerelease) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(pa), Some(pb)) => compare_prerelease(pa, pb),
        })
}

fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut ai = a.split('.');
    let mut bi = b.split('.');
    loop {
        match (ai.next(), bi.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) => {
                let ord = match (ca.parse::<u64>(), cb.parse::<u64>()) {
                    (Ok(na), Ok(nb)) => na.cmp(&nb),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => ca.cmp(cb),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Compares two raw tag strings. Unparseable tags sort below parseable
/// ones (stable, but not meaningful on its own); two unparseable tags
/// fall back to a plain string comparison. Callers that maintain
/// `VersionCache` always filter with [`is_valid`] first, so this
/// fallback path is only reachable from ad hoc callers.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(pa), Some(pb)) => compare_tags(&pa, &pb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Sorts a set of tags ascending per [`compare_tags`].
pub fn sort_tags(tags: &mut [VersionTag]) {
    tags.sort_by(compare_tags);
}

/// Picks the default version: the latest non-pre-release if one
/// exists, otherwise the latest pre-release, otherwise `None`.
///
/// Accepts versions in any order (not just pre-sorted) so callers can
/// pass either a freshly sorted `VersionCache` or an unordered scan.
pub fn default_version(versions: &[VersionTag]) -> Option<&VersionTag> {
    versions
        .iter()
        .filter(|v| !v.is_prerelease())
        .max_by(|a, b| compare_tags(a, b))
        .or_else(|| versions.iter().max_by(|a, b| compare_tags(a, b)))
}

/// Convenience wrapper over [`default_version`] for callers holding raw
/// tag strings (e.g. a `VersionCache`) rather than parsed `VersionTag`s.
pub fn default_tag(tags: &[String]) -> Option<String> {
    let parsed: Vec<_> = tags.iter().filter_map(|t| parse(t)).collect();
    default_version(&parsed).map(|v| v.raw.clone())
}

/// Result of [`matches`] range matching.
///
/// `matches` never panics and never propagates a parse error: a
/// malformed spec simply fails to match, mirroring
/// `original_source/src/versiontag.py`'s `except ValueError` fallback.
pub fn matches(version: &str, spec: &str) -> bool {
    let spec = spec.trim();
    if spec.is_empty() || spec == "*" || spec == "master" {
        return true;
    }

    let normalized_version = version.strip_prefix('v').unwrap_or(version);
    let Ok(ver) = node_semver::Version::parse(normalized_version) else {
        return false;
    };

    let desugared = desugar(spec);
    match node_semver::Range::parse(&desugared) {
        Ok(range) => range.satisfies(&ver),
        Err(_) => false,
    }
}

/// Desugars the two spec-specific shorthands into an explicit
/// `>=lo <hi` range, then falls through unchanged for everything else
/// (delegated to standard semver range matching by the caller).
fn desugar(spec: &str) -> String {
    if let Some((major, minor)) = parse_x_range(spec) {
        return match minor {
            Some(minor) => format!(">={major}.{minor}.0 <{major}.{}.0", minor + 1),
            None => format!(">={major}.0.0 <{}.0.0", major + 1),
        };
    }
    if let Some(major) = parse_bare_tilde_major(spec) {
        return format!(">={major}.0.0 <{}.0.0", major + 1);
    }
    spec.to_string()
}

/// Matches `N.x`, `N.x.x`, and `N.M.x`. Returns `(major, Some(minor))`
/// for the last form, `(major, None)` for the first two.
fn parse_x_range(spec: &str) -> Option<(u64, Option<u64>)> {
    let parts: Vec<&str> = spec.split('.').collect();
    match parts.as_slice() {
        [major, "x"] => parts[0].parse().ok().map(|m| (m, None)),
        [major, "x", "x"] => major.parse().ok().map(|m| (m, None)),
        [major, minor, "x"] => {
            let major = major.parse().ok()?;
            let minor = minor.parse().ok()?;
            Some((major, Some(minor)))
        }
        _ => None,
    }
}

/// Matches a bare `~N` (no minor component) — distinct from `~N.M`
/// which is left to fall through to standard range matching.
fn parse_bare_tilde_major(spec: &str) -> Option<u64> {
    let rest = spec.strip_prefix('~')?;
    if rest.is_empty() || rest.contains('.') {
        return None;
    }
    rest.parse().ok()
}

/// How a candidate tag relates to the existing (already-ingested) set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Unknown,
    PreRelease,
    Major,
    Minor,
    Patch,
}

/// Categorizes `candidate` relative to `existing`.
///
/// `Unknown` when `existing` is empty or `candidate` doesn't parse;
/// `PreRelease` when candidate carries a pre-release tag; otherwise
/// `Major`/`Minor`/`Patch` relative to the largest member of `existing`
/// strictly less than `candidate` (or, if no such member exists — the
/// candidate is not actually the newest — relative to the overall
/// largest member of `existing`, so the function still returns a
/// useful bump kind instead of refusing to answer).
pub fn categorize(candidate: &str, existing: &[VersionTag]) -> Category {
    if existing.is_empty() {
        return Category::Unknown;
    }
    let Some(candidate) = parse(candidate) else {
        return Category::Unknown;
    };
    if candidate.is_prerelease() {
        return Category::PreRelease;
    }

    let baseline = existing
        .iter()
        .filter(|v| compare_tags(v, &candidate) == Ordering::Less)
        .max_by(|a, b| compare_tags(a, b))
        .or_else(|| existing.iter().max_by(|a, b| compare_tags(a, b)))
        .expect("existing is non-empty");

    if baseline.major != candidate.major {
        Category::Major
    } else if baseline.minor != candidate.minor {
        Category::Minor
    } else {
        Category::Patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(s: &str) -> VersionTag {
        parse(s).expect("valid test tag")
    }

    #[test]
    fn parses_with_and_without_v_prefix() {
        assert!(is_valid("1.2.3"));
        assert!(is_valid("v1.2.3"));
        assert!(is_valid("v1.2.3-beta.1"));
        assert!(!is_valid("1.2"));
        assert!(!is_valid("1.2.3.4"));
        assert!(!is_valid("1.2.x"));
        assert!(!is_valid("v1.2.3-"));
        assert!(!is_valid("abc"));
    }

    #[test]
    fn compares_numeric_triple_first() {
        assert_eq!(compare("1.0.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare("1.2.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare("2.0.0", "1.99.99"), Ordering::Greater);
    }

    #[test]
    fn prerelease_sorts_below_release() {
        assert_eq!(compare("1.0.0-alpha", "1.0.0"), Ordering::Less);
        assert_eq!(compare("1.0.0", "1.0.0-alpha"), Ordering::Greater);
    }

    #[test]
    fn prerelease_precedence_numeric_vs_alpha() {
        assert_eq!(compare("1.0.0-1", "1.0.0-alpha"), Ordering::Less);
        assert_eq!(compare("1.0.0-alpha", "1.0.0-alpha.1"), Ordering::Less);
        assert_eq!(compare("1.0.0-alpha.1", "1.0.0-alpha.beta"), Ordering::Less);
        assert_eq!(compare("1.0.0-beta", "1.0.0-beta.2"), Ordering::Less);
        assert_eq!(compare("1.0.0-beta.2", "1.0.0-beta.11"), Ordering::Less);
    }

    #[test]
    fn default_version_prefers_stable() {
        let versions = vec![tag("1.0.0-beta"), tag("0.9.0"), tag("1.0.0")];
        assert_eq!(default_version(&versions).unwrap().raw, "1.0.0");
    }

    #[test]
    fn default_version_falls_back_to_prerelease() {
        let versions = vec![tag("1.0.0-alpha"), tag("1.0.0-beta")];
        assert_eq!(default_version(&versions).unwrap().raw, "1.0.0-beta");
    }

    #[test]
    fn default_version_empty_is_none() {
        assert!(default_version(&[]).is_none());
    }

    #[test]
    fn matches_wildcard_and_master() {
        assert!(matches("1.2.3", "*"));
        assert!(matches("1.2.3", "master"));
    }

    #[test]
    fn matches_x_ranges() {
        assert!(matches("1.5.0", "1.x"));
        assert!(matches("1.5.0", "1.x.x"));
        assert!(matches("2.0.0", "1.x"));
        assert!(!matches("1.2.0", "1.1.x"));
        assert!(matches("1.1.9", "1.1.x"));
    }

    #[test]
    fn matches_bare_tilde_major() {
        assert!(matches("1.5.0", "~1"));
        assert!(!matches("2.0.0", "~1"));
    }

    #[test]
    fn matches_standard_range_delegate() {
        assert!(matches("1.2.3", "^1.0.0"));
        assert!(matches("1.2.3", ">=1.0.0 <2.0.0"));
        assert!(!matches("2.0.0", "^1.0.0"));
    }

    #[test]
    fn matches_exact() {
        assert!(matches("1.2.3", "1.2.3"));
        assert!(!matches("1.2.4", "1.2.3"));
    }

    #[test]
    fn malformed_spec_does_not_panic_and_returns_false() {
        assert!(!matches("1.2.3", "not a range $$"));
        assert!(!matches("not a version", "^1.0.0"));
    }

    #[test]
    fn categorize_unknown_when_no_existing_or_unparseable() {
        assert_eq!(categorize("1.0.0", &[]), Category::Unknown);
        assert_eq!(categorize("nope", &[tag("1.0.0")]), Category::Unknown);
    }

    #[test]
    fn categorize_prerelease() {
        let existing = vec![tag("1.0.0")];
        assert_eq!(categorize("1.1.0-beta", &existing), Category::PreRelease);
    }

    #[test]
    fn categorize_major_minor_patch() {
        let existing = vec![tag("1.0.0"), tag("1.2.0")];
        assert_eq!(categorize("2.0.0", &existing), Category::Major);
        assert_eq!(categorize("1.3.0", &existing), Category::Minor);
        assert_eq!(categorize("1.2.1", &existing), Category::Patch);
    }
}
