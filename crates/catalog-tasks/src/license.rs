//! License resolution (§4.5): descriptor SPDX field → manifest
//! `license` → registry `license`, validated against the SPDX
//! allowlist. Grounded on the `spdx` crate usage visible in the
//! crates.io backend's own Cargo.toml in the retrieval pack.

/// Resolves the first non-empty candidate that parses as a valid
/// SPDX license expression.
pub fn resolve<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .find(|s| is_valid_spdx(s))
        .map(|s| s.to_string())
}

pub fn is_valid_spdx(identifier: &str) -> bool {
    spdx::Expression::parse(identifier).is_ok()
}
