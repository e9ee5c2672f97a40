//! Wildcard queries over the term dictionary.
//!
//! A wildcard is kept unexpanded in the query tree; the expander
//! materialises it per shard at match time (see [`crate::query::expand`]).

use regex::Regex;

use crate::error::{DoruError, Result};
use crate::query::node::{Query, QueryNode};

/// Which of `*` and `?` act as metacharacters in a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatternFlags {
    /// `*` matches zero or more Unicode scalars, `?` exactly one.
    Glob,
    /// Only `?` is a metacharacter; `*` is literal.
    Single,
    /// Only `*` is a metacharacter; `?` is literal.
    Multi,
    /// No metacharacters; the pattern is a term prefix.
    #[default]
    Prefix,
}

/// Strategy for bounding the number of terms an expansion produces.
///
/// The count is per shard: in a multi-shard database the union expansion
/// may exceed the limit when some terms are missing from some shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpansionLimit {
    /// Fail with an expansion-limit error when the limit would be
    /// exceeded. A limit of 0 means unlimited.
    #[default]
    Error,
    /// Keep the first `max_expansion` terms in dictionary order.
    First,
    /// Keep the `max_expansion` terms with the highest collection
    /// frequency in the shard, ties broken by dictionary order.
    MostFrequent,
}

/// The operator an expansion combines its terms under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combiner {
    /// Weight the expanded terms as one pseudo-term.
    #[default]
    Synonym,
    /// Sum the weights of matching expanded terms.
    Or,
    /// Take the best weight among matching expanded terms.
    Max,
}

impl Combiner {
    pub(crate) fn op_name(self) -> &'static str {
        match self {
            Combiner::Synonym => "SYNONYM",
            Combiner::Or => "OR",
            Combiner::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct WildcardSpec {
    pub pattern: String,
    pub max_expansion: u32,
    pub limit: ExpansionLimit,
    pub combiner: Combiner,
    pub flags: PatternFlags,
}

/// Builder for wildcard queries.
///
/// ```
/// use doru::query::{ExpansionLimit, Wildcard};
///
/// let q = Wildcard::new("s")
///     .max_expansion(2)
///     .limit(ExpansionLimit::First)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct Wildcard {
    spec: WildcardSpec,
}

impl Wildcard {
    /// Create a wildcard query with default settings: prefix semantics,
    /// unlimited expansion, synonym combiner.
    pub fn new<P: Into<String>>(pattern: P) -> Self {
        Wildcard {
            spec: WildcardSpec {
                pattern: pattern.into(),
                max_expansion: 0,
                limit: ExpansionLimit::default(),
                combiner: Combiner::default(),
                flags: PatternFlags::default(),
            },
        }
    }

    /// Set the maximum number of terms to expand to per shard (0 =
    /// unlimited).
    pub fn max_expansion(mut self, max_expansion: u32) -> Self {
        self.spec.max_expansion = max_expansion;
        self
    }

    /// Set the limit policy.
    pub fn limit(mut self, limit: ExpansionLimit) -> Self {
        self.spec.limit = limit;
        self
    }

    /// Set the combining operator.
    pub fn combiner(mut self, combiner: Combiner) -> Self {
        self.spec.combiner = combiner;
        self
    }

    /// Set which metacharacters the pattern uses.
    pub fn flags(mut self, flags: PatternFlags) -> Self {
        self.spec.flags = flags;
        self
    }

    /// Build the query node.
    ///
    /// An empty pattern builds `MatchNothing`; a pattern which matches
    /// every term (such as `*` or `?*` under glob flags) builds
    /// `MatchAll`.
    pub fn build(self) -> Query {
        if self.spec.pattern.is_empty() {
            return Query::match_nothing();
        }
        if matches_everything(&self.spec.pattern, self.spec.flags) {
            return Query::match_all();
        }
        Query::from_node(QueryNode::Wildcard(self.spec))
    }
}

// True when every pattern char is a metacharacter and at least one is a
// `*`, so any term at all would match.
fn matches_everything(pattern: &str, flags: PatternFlags) -> bool {
    match flags {
        PatternFlags::Glob => {
            pattern.chars().all(|c| c == '*' || c == '?') && pattern.contains('*')
        }
        PatternFlags::Multi => pattern.chars().all(|c| c == '*'),
        PatternFlags::Single | PatternFlags::Prefix => false,
    }
}

/// A pattern compiled for matching dictionary terms.
#[derive(Debug)]
pub(crate) struct CompiledPattern {
    /// Literal prefix used to seek into the dictionary.
    prefix: Vec<u8>,
    /// Anchored regex over the whole term; `None` for plain prefixes.
    regex: Option<Regex>,
}

impl CompiledPattern {
    pub(crate) fn compile(pattern: &str, flags: PatternFlags) -> Result<CompiledPattern> {
        if flags == PatternFlags::Prefix {
            return Ok(CompiledPattern {
                prefix: pattern.as_bytes().to_vec(),
                regex: None,
            });
        }

        let star_magic = matches!(flags, PatternFlags::Glob | PatternFlags::Multi);
        let question_magic = matches!(flags, PatternFlags::Glob | PatternFlags::Single);

        let mut prefix = String::new();
        let mut regex_pattern = String::from("^");
        let mut in_prefix = true;
        for ch in pattern.chars() {
            let meta = (ch == '*' && star_magic) || (ch == '?' && question_magic);
            if in_prefix && !meta {
                prefix.push(ch);
            } else {
                in_prefix = false;
            }
            if ch == '*' && star_magic {
                regex_pattern.push_str(".*");
            } else if ch == '?' && question_magic {
                regex_pattern.push('.');
            } else {
                let mut buf = [0u8; 4];
                regex_pattern.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
            }
        }
        regex_pattern.push('$');

        let regex = Regex::new(&regex_pattern).map_err(|e| {
            DoruError::invalid_argument(format!("invalid wildcard pattern {pattern:?}: {e}"))
        })?;
        Ok(CompiledPattern {
            prefix: prefix.into_bytes(),
            regex: Some(regex),
        })
    }

    /// The dictionary prefix shared by every possible match.
    pub(crate) fn seek_prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Check one dictionary term against the pattern.
    ///
    /// Metacharacters match Unicode scalars, so a term that is not valid
    /// UTF-8 can only be matched by a plain prefix pattern.
    pub(crate) fn matches(&self, term: &[u8]) -> bool {
        match &self.regex {
            None => term.starts_with(&self.prefix),
            Some(regex) => match std::str::from_utf8(term) {
                Ok(term) => regex.is_match(term),
                Err(_) => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::node::QueryKind;

    #[test]
    fn test_empty_pattern_is_match_nothing() {
        assert_eq!(
            Wildcard::new("").flags(PatternFlags::Glob).build().description(),
            "Query()"
        );
        assert!(Wildcard::new("").build().is_match_nothing());
    }

    #[test]
    fn test_match_everything_patterns() {
        for pattern in ["*", "**", "?*", "*?", "*?*"] {
            let q = Wildcard::new(pattern).flags(PatternFlags::Glob).build();
            assert_eq!(q.description(), "Query(<alldocuments>)", "pattern {pattern}");
        }
        // `?` alone requires exactly one scalar, so it is a real pattern.
        let q = Wildcard::new("?").flags(PatternFlags::Glob).build();
        assert_eq!(q.kind(), QueryKind::Wildcard);
        // With only `?` magic, `*` stays literal.
        let q = Wildcard::new("*").flags(PatternFlags::Single).build();
        assert_eq!(q.kind(), QueryKind::Wildcard);
    }

    #[test]
    fn test_prefix_matching() {
        let p = CompiledPattern::compile("se", PatternFlags::Prefix).unwrap();
        assert!(p.matches(b"search"));
        assert!(p.matches(b"se"));
        assert!(!p.matches(b"say"));
        assert_eq!(p.seek_prefix(), b"se");
    }

    #[test]
    fn test_glob_matching() {
        let p = CompiledPattern::compile("b*anas", PatternFlags::Glob).unwrap();
        assert!(p.matches(b"bananas"));
        assert!(!p.matches(b"banannas"));
        assert_eq!(p.seek_prefix(), b"b");

        let p = CompiledPattern::compile("t?st", PatternFlags::Glob).unwrap();
        assert!(p.matches(b"test"));
        assert!(p.matches("t\u{00ea}st".as_bytes()));
        assert!(!p.matches(b"toast"));
        assert!(!p.matches(b"tst"));
    }

    #[test]
    fn test_single_char_wildcard_counts_scalars() {
        let p = CompiledPattern::compile("t??st", PatternFlags::Single).unwrap();
        // A two-byte UTF-8 character is one scalar, not two.
        assert!(!p.matches("t\u{00ea}st".as_bytes()));
        assert!(p.matches(b"toast"));

        // `*` is literal under Single.
        let p = CompiledPattern::compile("t*t", PatternFlags::Single).unwrap();
        assert!(p.matches(b"t*t"));
        assert!(!p.matches(b"tot"));
    }

    #[test]
    fn test_multi_char_wildcard() {
        let p = CompiledPattern::compile("*ann*", PatternFlags::Multi).unwrap();
        assert!(p.matches(b"annas"));
        assert!(p.matches(b"banannas"));
        assert!(!p.matches(b"bananas"));

        // `?` is literal under Multi.
        let p = CompiledPattern::compile("b?n*", PatternFlags::Multi).unwrap();
        assert!(p.matches(b"b?nanas"));
        assert!(!p.matches(b"bananas"));
    }

    #[test]
    fn test_regex_specials_are_literal() {
        let p = CompiledPattern::compile("a.c*", PatternFlags::Glob).unwrap();
        assert!(p.matches(b"a.cd"));
        assert!(!p.matches(b"abcd"));
    }

    #[test]
    fn test_non_utf8_terms_only_match_prefix_patterns() {
        let p = CompiledPattern::compile("t*", PatternFlags::Glob).unwrap();
        assert!(!p.matches(b"t\xff\xfe"));

        let p = CompiledPattern::compile("t", PatternFlags::Prefix).unwrap();
        assert!(p.matches(b"t\xff\xfe"));
    }
}
