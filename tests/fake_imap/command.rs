//! Command line parsing.
//!
//! Lines are split into tokens: atoms, and quoted strings with their
//! `\"` and `\\` escapes undone. Literals (`{n}`) are not supported;
//! the adapter never sends them.

use super::mailbox::TestEmail;

/// A tagged client command.
#[derive(Debug, PartialEq, Eq)]
pub struct Command {
    pub tag: String,
    /// Upper-cased command name, `UID ` prefix included.
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = tokenize(line.trim_end_matches(['\r', '\n']))?.into_iter();
        let tag = tokens.next()?;
        let mut name = tokens.next()?.to_ascii_uppercase();
        if name == "UID" {
            name = format!("UID {}", tokens.next()?.to_ascii_uppercase());
        }
        Some(Self {
            tag,
            name,
            args: tokens.collect(),
        })
    }
}

fn tokenize(line: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c == ' ' {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next()? {
                    '"' => break,
                    '\\' => token.push(chars.next()?),
                    other => token.push(other),
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c == ' ' {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Some(tokens)
}

/// The `SEARCH` keys the adapter uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    All,
    Subject(String),
    Body(String),
    Text(String),
    Not(Box<Criterion>),
    Or(Box<Criterion>, Box<Criterion>),
    And(Vec<Criterion>),
}

impl Criterion {
    /// Parse `SEARCH` arguments, skipping a leading `CHARSET`.
    pub fn parse(args: &[String]) -> Option<Self> {
        let mut rest = args;
        if rest
            .first()
            .is_some_and(|a| a.eq_ignore_ascii_case("CHARSET"))
        {
            rest = rest.get(2..)?;
        }

        let mut keys = Vec::new();
        while !rest.is_empty() {
            let (key, tail) = Self::parse_key(rest)?;
            keys.push(key);
            rest = tail;
        }
        match keys.len() {
            0 => None,
            1 => keys.pop(),
            _ => Some(Self::And(keys)),
        }
    }

    fn parse_key(args: &[String]) -> Option<(Self, &[String])> {
        let (first, rest) = args.split_first()?;
        match first.to_ascii_uppercase().as_str() {
            "ALL" => Some((Self::All, rest)),
            "SUBJECT" => Some((Self::Subject(rest.first()?.clone()), &rest[1..])),
            "BODY" => Some((Self::Body(rest.first()?.clone()), &rest[1..])),
            "TEXT" => Some((Self::Text(rest.first()?.clone()), &rest[1..])),
            "NOT" => {
                let (inner, rest) = Self::parse_key(rest)?;
                Some((Self::Not(Box::new(inner)), rest))
            }
            "OR" => {
                let (left, rest) = Self::parse_key(rest)?;
                let (right, rest) = Self::parse_key(rest)?;
                Some((Self::Or(Box::new(left), Box::new(right)), rest))
            }
            _ => None,
        }
    }

    /// Whether evaluating this needs a full-text index.
    pub fn needs_body(&self) -> bool {
        match self {
            Self::Body(_) | Self::Text(_) => true,
            Self::All | Self::Subject(_) => false,
            Self::Not(inner) => inner.needs_body(),
            Self::Or(left, right) => left.needs_body() || right.needs_body(),
            Self::And(keys) => keys.iter().any(Self::needs_body),
        }
    }

    /// Case-insensitive substring match, as IMAP servers do.
    pub fn matches(&self, email: &TestEmail) -> bool {
        let contains = |haystack: String, needle: &str| {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        };
        match self {
            Self::All => true,
            Self::Subject(text) => contains(email.subject(), text),
            Self::Body(text) => contains(email.body(), text),
            Self::Text(text) => contains(String::from_utf8_lossy(&email.raw).into_owned(), text),
            Self::Not(inner) => !inner.matches(email),
            Self::Or(left, right) => left.matches(email) || right.matches(email),
            Self::And(keys) => keys.iter().all(|k| k.matches(email)),
        }
    }
}

/// Expand a UID set such as `3`, `1,4` or `2:5`.
pub fn parse_uid_set(set: &str) -> Vec<u32> {
    set.split(',')
        .flat_map(|part| match part.split_once(':') {
            Some((start, end)) => match (start.parse::<u32>(), end.parse::<u32>()) {
                (Ok(start), Ok(end)) => (start.min(end)..=start.max(end)).collect(),
                _ => Vec::new(),
            },
            None => part.parse().into_iter().collect(),
        })
        .collect()
}

/// IMAP `LIST` wildcard match: `*` spans anything, `%` stops at `/`.
pub fn list_matches(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    glob(&pattern, &name)
}

fn glob(pattern: &[char], name: &[char]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some(('*', rest)) => (0..=name.len()).any(|i| glob(rest, &name[i..])),
        Some(('%', rest)) => (0..=name.len())
            .take_while(|&i| i == 0 || name[i - 1] != '/')
            .any(|i| glob(rest, &name[i..])),
        Some((c, rest)) => name.first() == Some(c) && glob(rest, &name[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_uid_commands_and_quoted_strings() {
        let command =
            Command::parse("A0004 UID SEARCH OR SUBJECT \"say \\\"hi\\\"\" BODY \"x\"\r\n")
                .unwrap();

        assert_eq!(command.tag, "A0004");
        assert_eq!(command.name, "UID SEARCH");
        assert_eq!(command.args, args(&["OR", "SUBJECT", "say \"hi\"", "BODY", "x"]));
    }

    #[test]
    fn parses_empty_quoted_reference() {
        let command = Command::parse("A2 LIST \"\" \"Other Users/%\"").unwrap();
        assert_eq!(command.args, args(&["", "Other Users/%"]));
    }

    #[test]
    fn criteria_skip_charset() {
        let criterion =
            Criterion::parse(&args(&["CHARSET", "UTF-8", "SUBJECT", "Störung"])).unwrap();
        assert_eq!(criterion, Criterion::Subject("Störung".to_string()));
        assert!(!criterion.needs_body());
    }

    #[test]
    fn or_of_subject_and_body_needs_body() {
        let criterion =
            Criterion::parse(&args(&["OR", "SUBJECT", "a", "BODY", "a"])).unwrap();
        assert!(criterion.needs_body());
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(Criterion::parse(&args(&["FLAGGED"])).is_none());
        assert!(Criterion::parse(&args(&["SUBJECT"])).is_none());
    }

    #[test]
    fn uid_sets_expand() {
        assert_eq!(parse_uid_set("7"), vec![7]);
        assert_eq!(parse_uid_set("1,4:6"), vec![1, 4, 5, 6]);
    }

    #[test]
    fn percent_does_not_cross_hierarchy() {
        assert!(list_matches("%", "INBOX"));
        assert!(!list_matches("%", "Other Users/team@example.com"));
        assert!(list_matches(
            "Other Users/team@example.com/%",
            "Other Users/team@example.com/Sent Items"
        ));
        assert!(list_matches("*", "Other Users/team@example.com/INBOX"));
        assert!(!list_matches("Other Users/team@example.com", "Other Users/team@example.com/INBOX"));
    }
}
