//! Required password character groups.
//!
//! Configured as a `:`-separated list, e.g. `abcdefghijklmnopqrstuvwxyz:0123456789`.
//! A group that needs a literal colon escapes it as `\:`, a literal backslash
//! before a colon as `\\`.

use std::convert::Infallible;
use std::fmt::{self, Write as _};
use std::ops::Deref;
use std::str::FromStr;

const SEPARATOR: char = ':';
const ESCAPE: char = '\\';

/// Character groups a password must draw at least one character from, each.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PasswordRequiredCharacters(Vec<String>);

impl PasswordRequiredCharacters {
    #[must_use]
    pub fn new(groups: Vec<String>) -> Self {
        Self(groups)
    }

    /// `true` when `password` contains a character from every group.
    #[must_use]
    pub fn is_satisfied_by(&self, password: &str) -> bool {
        self.0
            .iter()
            .all(|group| password.chars().any(|c| group.contains(c)))
    }
}

impl FromStr for PasswordRequiredCharacters {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut groups = Vec::new();
        let mut group = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                ESCAPE => match chars.peek() {
                    Some(&next) if matches!(next, SEPARATOR | ESCAPE) => {
                        group.push(next);
                        chars.next();
                    }
                    _ => group.push(ESCAPE),
                },
                SEPARATOR => groups.push(std::mem::take(&mut group)),
                _ => group.push(c),
            }
        }
        groups.push(group);

        Ok(Self(groups.into_iter().filter(|group| !group.is_empty()).collect()))
    }
}

impl fmt::Display for PasswordRequiredCharacters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_char(SEPARATOR)?;
            }
            for c in group.chars() {
                if matches!(c, SEPARATOR | ESCAPE) {
                    f.write_char(ESCAPE)?;
                }
                f.write_char(c)?;
            }
        }
        Ok(())
    }
}

impl Deref for PasswordRequiredCharacters {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode(value: &str) -> Vec<String> {
        value
            .parse::<PasswordRequiredCharacters>()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn decodes_groups() {
        let cases: [(&str, &[&str]); 8] = [
            ("a:b:c", &["a", "b", "c"]),
            ("a\\:b:c", &["a:b", "c"]),
            ("a:b\\:c", &["a", "b:c"]),
            ("\\:a:b:c", &[":a", "b", "c"]),
            ("a:b:c\\:", &["a", "b", "c:"]),
            ("::\\::", &[":"]),
            ("", &[]),
            (" ", &[" "]),
        ];

        for (value, expected) in cases {
            assert_eq!(decode(value), expected, "decoding {value:?}");
        }
    }

    #[test]
    fn display_escapes_colons() {
        let groups: PasswordRequiredCharacters = "a\\:b:0123456789".parse().unwrap();
        assert_eq!(groups.to_string(), "a\\:b:0123456789");
        assert_eq!(
            groups.to_string().parse::<PasswordRequiredCharacters>().unwrap(),
            groups
        );
    }

    #[test]
    fn displayed_groups_decode_to_themselves() {
        let cases: [&[&str]; 7] = [
            &["a:b:c", "x"],
            &["a\\", "b"],
            &[":::", "0123456789"],
            &["\\:", ":\\"],
            &["\\\\", "c:"],
            &["a\\b", "d\\:e"],
            &[" ", "abc"],
        ];

        for groups in cases {
            let groups = PasswordRequiredCharacters::new(
                groups.iter().map(|group| (*group).to_string()).collect(),
            );
            let displayed = groups.to_string();
            assert_eq!(
                displayed.parse::<PasswordRequiredCharacters>().unwrap(),
                groups,
                "decoding {displayed:?}"
            );
        }
    }

    #[test]
    fn lone_backslash_is_literal() {
        assert_eq!(decode("a\\b:c"), ["a\\b", "c"]);
        assert_eq!(decode("a\\\\:b"), ["a\\", "b"]);
    }

    #[test]
    fn checks_password_against_groups() {
        let groups: PasswordRequiredCharacters =
            "abcdefghijklmnopqrstuvwxyz:ABCDEFGHIJKLMNOPQRSTUVWXYZ:0123456789"
                .parse()
                .unwrap();
        assert_eq!(groups.len(), 3);
        assert!(groups.is_satisfied_by("Passw0rd"));
        assert!(!groups.is_satisfied_by("password1"));
        assert!(PasswordRequiredCharacters::default().is_satisfied_by(""));
    }
}
