//! Header sanitization
//!
//! Rules are tried in registration order and the first rule whose predicate
//! accepts a header name decides its placeholder. Later matching rules are
//! ignored for that header. Predicates decide case sensitivity themselves.

use std::fmt;
use std::sync::Arc;

use crate::models::Headers;

pub const DEFAULT_PLACEHOLDER: &str = "***";

type HeaderPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A redaction rule: header-name predicate plus replacement text
#[derive(Clone)]
pub struct SanitizedHeader {
    placeholder: String,
    predicate: HeaderPredicate,
}

impl SanitizedHeader {
    pub fn new<P>(placeholder: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            placeholder: placeholder.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Rule with the default `***` placeholder
    pub fn matching<P>(predicate: P) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::new(DEFAULT_PLACEHOLDER, predicate)
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn matches(&self, name: &str) -> bool {
        (self.predicate)(name)
    }
}

impl fmt::Debug for SanitizedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SanitizedHeader")
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

/// Apply `rules` to every header name, replacing matched values with a
/// single placeholder value.
pub fn sanitize_headers(headers: &Headers, rules: &[SanitizedHeader]) -> Headers {
    headers
        .iter()
        .map(|(name, values)| {
            let values = match rules.iter().find(|rule| rule.matches(name)) {
                Some(rule) => vec![rule.placeholder.clone()],
                None => values.to_vec(),
            };
            (name.to_string(), values)
        })
        .collect()
}
