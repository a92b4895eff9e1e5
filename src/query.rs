//! Filter expressions for the provider query language
//!
//! All escaping of user-supplied text happens here. Filters stay typed
//! until a provider renders them, so adapters that speak a different
//! dialect (see [`crate::imap`]) never see a pre-built string.
//!
//! Doubling single quotes keeps a literal from terminating early. It is
//! not a complete sanitizer for the filter language.

use std::fmt;

const SUBJECT: &str = "urn:schemas:httpmail:subject";
const TEXT_DESCRIPTION: &str = "urn:schemas:httpmail:textdescription";

/// A search filter over named message properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Case-insensitive phrase match on the subject OR the body text.
    /// Used by the indexed (advanced) search path.
    PhraseMatch(String),
    /// Substring match on the subject only. Used by the fallback path,
    /// where body text is not reachable.
    SubjectContains(String),
}

impl Filter {
    #[must_use]
    pub fn phrase_match(text: &str) -> Self {
        Self::PhraseMatch(text.to_string())
    }

    #[must_use]
    pub fn subject_contains(text: &str) -> Self {
        Self::SubjectContains(text.to_string())
    }

    /// The raw, unescaped search text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::PhraseMatch(text) | Self::SubjectContains(text) => text,
        }
    }

    /// Render to the structured `@SQL=` filter string.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::PhraseMatch(text) => {
                let lit = escape_literal(text);
                format!(
                    "@SQL=\"{SUBJECT}\" ci_phrasematch '{lit}' OR \"{TEXT_DESCRIPTION}\" ci_phrasematch '{lit}'"
                )
            }
            Self::SubjectContains(text) => {
                let lit = escape_literal(text);
                format!("@SQL=\"{SUBJECT}\" LIKE '%{lit}%'")
            }
        }
    }

    /// Whether a message with this subject and body satisfies the
    /// filter, using the same case-insensitive semantics providers
    /// apply server-side.
    #[must_use]
    pub fn matches(&self, subject: &str, body: &str) -> bool {
        let needle = self.text().to_lowercase();
        match self {
            Self::PhraseMatch(_) => {
                subject.to_lowercase().contains(&needle) || body.to_lowercase().contains(&needle)
            }
            Self::SubjectContains(_) => subject.to_lowercase().contains(&needle),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Double every single quote so `text` can sit inside a quoted literal.
#[must_use]
pub fn escape_literal(text: &str) -> String {
    text.replace('\'', "''")
}
