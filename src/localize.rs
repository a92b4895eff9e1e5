//! Folder path localization
//!
//! Mail stores report folder paths in the user's locale, while the
//! indexed search scope expects the canonical English root names.
//! [`ScopeToken::for_path`] rewrites a known localized tail segment
//! and produces the single-quoted token the filter language expects.

use std::fmt;

/// Localized root-folder names and their canonical English equivalent.
const LOCALIZED_ROOTS: &[(&str, &str)] = &[
    ("Posteingang", "Inbox"),
    ("Gesendete Elemente", "Sent Items"),
    ("Entwürfe", "Drafts"),
    ("Gelöschte Elemente", "Deleted Items"),
    ("Junk-E-Mail", "Junk Email"),
];

/// Rewrite the final path segment when it is a known localized root
/// folder name. Any other segment is left untouched.
#[must_use]
pub fn canonical_path(path: &str) -> String {
    let (parent, tail) = match path.rfind(['\\', '/']) {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    };

    LOCALIZED_ROOTS
        .iter()
        .find(|(localized, _)| *localized == tail)
        .map_or_else(|| path.to_string(), |(_, english)| format!("{parent}{english}"))
}

/// A quoted, locale-canonicalized folder path used as a search scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeToken {
    path: String,
}

impl ScopeToken {
    /// Canonicalize `path` and wrap it as a scope token.
    #[must_use]
    pub fn for_path(path: &str) -> Self {
        Self {
            path: canonical_path(path),
        }
    }

    /// The canonical, unquoted path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path wrapped in single quotes with embedded quotes doubled.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("'{}'", self.path.replace('\'', "''"))
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}
