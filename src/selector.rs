//! Header selectors restricting which messages a receive may take.
//!
//! The supported grammar is a conjunction of equality tests:
//!
//! ```text
//! selector := term ( "AND" term )*
//! term     := key "=" "'" value "'"
//! ```
//!
//! `AND` is case-insensitive and a single quote inside a value is written as
//! two quotes. Correlation keys produced by
//! [`DefaultCorrelator`](crate::correlation::DefaultCorrelator) use the same
//! form, so a key can always be parsed back into a selector.

use std::fmt;

use thiserror::Error;

/// Source of values a [`Selector`] is evaluated against.
pub trait SelectorSource {
    /// Value for `key`, if the message carries one.
    fn selector_value(&self, key: &str) -> Option<&str>;
}

/// Errors raised while parsing a selector expression.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// The expression contained no terms.
    #[error("selector is empty")]
    Empty,
    /// A term did not have the form `key = 'value'`.
    #[error("malformed selector term '{0}'")]
    MalformedTerm(String),
    /// A quoted value was never closed.
    #[error("unterminated quote in selector '{0}'")]
    UnterminatedQuote(String),
}

/// Conjunction of `key = 'value'` tests.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Selector {
    terms: Vec<(String, String)>,
}

impl Selector {
    /// Selector with a single equality test.
    #[must_use]
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            terms: vec![(key.into(), value.into())],
        }
    }

    /// Add another equality test.
    #[must_use]
    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.terms.push((key.into(), value.into()));
        self
    }

    /// Parse an expression such as `operation = 'sayHello' AND id = '7'`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] if the expression is empty or malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use replyframe::selector::Selector;
    ///
    /// let selector = Selector::parse("operation = 'it''s' AND id = '7'").unwrap();
    /// assert_eq!(selector, Selector::eq("operation", "it's").and("id", "7"));
    /// ```
    pub fn parse(expression: &str) -> Result<Self, SelectorError> {
        let mut terms = Vec::new();
        let mut rest = expression.trim();
        if rest.is_empty() {
            return Err(SelectorError::Empty);
        }
        loop {
            let (key, after_eq) = rest
                .split_once('=')
                .ok_or_else(|| SelectorError::MalformedTerm(rest.to_owned()))?;
            let key = key.trim();
            let quoted = after_eq.trim_start();
            if key.is_empty() || !quoted.starts_with('\'') {
                return Err(SelectorError::MalformedTerm(rest.to_owned()));
            }
            let (value, remainder) = read_quoted(&quoted[1..])
                .ok_or_else(|| SelectorError::UnterminatedQuote(expression.to_owned()))?;
            terms.push((key.to_owned(), value));

            let remainder = remainder.trim_start();
            if remainder.is_empty() {
                break;
            }
            rest = strip_and(remainder)
                .ok_or_else(|| SelectorError::MalformedTerm(remainder.to_owned()))?;
        }
        Ok(Self { terms })
    }

    /// Returns true when every term matches `source`.
    pub fn matches<S: SelectorSource + ?Sized>(&self, source: &S) -> bool {
        self.terms
            .iter()
            .all(|(key, value)| source.selector_value(key) == Some(value.as_str()))
    }
}

/// Read a quoted value up to its closing quote, unescaping doubled quotes.
fn read_quoted(input: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut chars = input.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c != '\'' {
            value.push(c);
            continue;
        }
        if matches!(chars.peek(), Some((_, '\''))) {
            chars.next();
            value.push('\'');
        } else {
            return Some((value, &input[idx + 1..]));
        }
    }
    None
}

fn strip_and(input: &str) -> Option<&str> {
    let head = input.get(..3)?;
    let tail = &input[3..];
    (head.eq_ignore_ascii_case("and") && tail.starts_with(char::is_whitespace))
        .then(|| tail.trim_start())
}

/// Quote `value` for inclusion in a selector expression.
#[must_use]
pub fn quote(value: &str) -> String { format!("'{}'", value.replace('\'', "''")) }

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{key} = {}", quote(value))?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    impl SelectorSource for HashMap<&str, &str> {
        fn selector_value(&self, key: &str) -> Option<&str> { self.get(key).copied() }
    }

    #[rstest]
    #[case("a = 'b'", Selector::eq("a", "b"))]
    #[case("  a='b'  ", Selector::eq("a", "b"))]
    #[case("a = 'b' and c = 'd'", Selector::eq("a", "b").and("c", "d"))]
    #[case("a = 'x AND y'", Selector::eq("a", "x AND y"))]
    #[case("a = ''''", Selector::eq("a", "'"))]
    #[case("a = ''", Selector::eq("a", ""))]
    fn parses_expressions(#[case] input: &str, #[case] expected: Selector) {
        assert_eq!(Selector::parse(input).expect("selector should parse"), expected);
    }

    #[rstest]
    #[case::empty("   ", SelectorError::Empty)]
    #[case::no_eq("a", SelectorError::MalformedTerm("a".into()))]
    #[case::unquoted("a = b", SelectorError::MalformedTerm("a = b".into()))]
    #[case::open_quote("a = 'b", SelectorError::UnterminatedQuote("a = 'b".into()))]
    #[case::trailing("a = 'b' OR c = 'd'", SelectorError::MalformedTerm("OR c = 'd'".into()))]
    fn rejects_malformed(#[case] input: &str, #[case] expected: SelectorError) {
        assert_eq!(Selector::parse(input), Err(expected));
    }

    #[test]
    fn display_round_trips_escaped_values() {
        let selector = Selector::eq("id", "o'neil").and("kind", "x");
        let rendered = selector.to_string();
        assert_eq!(rendered, "id = 'o''neil' AND kind = 'x'");
        assert_eq!(Selector::parse(&rendered), Ok(selector));
    }

    #[test]
    fn matches_all_terms() {
        let source = HashMap::from([("a", "1"), ("b", "2")]);
        assert!(Selector::eq("a", "1").matches(&source));
        assert!(Selector::eq("a", "1").and("b", "2").matches(&source));
        assert!(!Selector::eq("a", "1").and("b", "3").matches(&source));
        assert!(!Selector::eq("c", "1").matches(&source));
    }
}
