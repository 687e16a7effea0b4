//! Per-broadcaster authorization tokens

use std::collections::HashMap;

/// Supplies the token used to subscribe on a broadcaster's behalf.
#[async_trait::async_trait]
pub trait TokenResolver: Send + Sync + 'static {
    /// Token for `broadcaster_id`, if one is known. A scheme prefix is
    /// allowed; the listener strips it.
    async fn resolve(&self, broadcaster_id: &str) -> Option<String>;
}

/// Fixed id to token map, usually loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, String>,
}

impl StaticTokenResolver {
    /// Wrap an id to token map
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    /// Number of known tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no tokens are known
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait::async_trait]
impl TokenResolver for StaticTokenResolver {
    async fn resolve(&self, broadcaster_id: &str) -> Option<String> {
        self.tokens.get(broadcaster_id).cloned()
    }
}

/// Remove a leading `oauth:` or `Bearer ` scheme, case-insensitively.
///
/// Returns `None` when nothing is left.
pub fn strip_auth_scheme(token: &str) -> Option<String> {
    let token = token.trim();
    let stripped = ["oauth:", "bearer "]
        .iter()
        .find_map(|prefix| {
            token
                .get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| &token[prefix.len()..])
        })
        .unwrap_or(token)
        .trim();

    (!stripped.is_empty()).then(|| stripped.to_string())
}
