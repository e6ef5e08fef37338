//! Single-use XSRF token admission (§4.4 step 1, §6).
//!
//! Tokens are issued by `/manage/token` and consumed exactly once: a
//! read removes the entry, so replay of the same token is rejected.

use dashmap::DashSet;
use uuid::Uuid;

#[derive(Default)]
pub struct XsrfTokenStore {
    tokens: DashSet<String>,
}

impl XsrfTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> String {
        let token = Uuid::new_v4().to_string();
        self.tokens.insert(token.clone());
        token
    }

    /// Consumes `token` if present, returning whether it was valid.
    /// A second call with the same token always returns `false`.
    pub fn consume(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }
}

/// Task admission (§4.4 step 1): accept either the platform's queue
/// header or a valid single-use token, never both required.
pub fn admit(has_queue_header: bool, token: Option<&str>, store: &XsrfTokenStore) -> bool {
    if has_queue_header {
        return true;
    }
    match token {
        Some(token) => store.consume(token),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_is_valid_exactly_once() {
        let store = XsrfTokenStore::new();
        let token = store.issue();
        assert!(store.consume(&token));
        assert!(!store.consume(&token));
    }

    #[test]
    fn admit_accepts_queue_header_without_a_token() {
        let store = XsrfTokenStore::new();
        assert!(admit(true, None, &store));
    }

    #[test]
    fn admit_rejects_missing_header_and_missing_token() {
        let store = XsrfTokenStore::new();
        assert!(!admit(false, None, &store));
    }

    #[test]
    fn admit_rejects_reused_token() {
        let store = XsrfTokenStore::new();
        let token = store.issue();
        assert!(admit(false, Some(&token), &store));
        assert!(!admit(false, Some(&token), &store));
    }
}
