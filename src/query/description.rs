//! Canonical textual description of a query.
//!
//! The rendering is stable across invocations and identical for
//! structurally equal trees, so it doubles as a regression oracle.

use std::fmt::Write;

use crate::query::node::{BoolOp, PositionalOp, Query, QueryNode};

/// Render the canonical description, e.g. `Query((foo AND bar))`.
pub(crate) fn describe(query: &Query) -> String {
    match &*query.inner {
        QueryNode::MatchNothing => "Query()".to_string(),
        _ => {
            let mut out = String::from("Query(");
            inner(query, &mut out);
            out.push(')');
            out
        }
    }
}

fn inner(query: &Query, out: &mut String) {
    match &*query.inner {
        QueryNode::MatchAll => out.push_str("<alldocuments>"),
        QueryNode::MatchNothing => out.push_str("<matchnothing>"),
        QueryNode::Term(leaf) => {
            escape_term(&leaf.term, out);
            if leaf.wqf != 1 {
                let _ = write!(out, "#{}", leaf.wqf);
            }
            if leaf.pos != 0 {
                let _ = write!(out, "@{}", leaf.pos);
            }
        }
        QueryNode::Source(source) => {
            let _ = write!(out, "PostingSource({})", source.name());
        }
        QueryNode::Bool { op, children } => {
            let name = match op {
                BoolOp::And => "AND",
                BoolOp::Or => "OR",
                BoolOp::Xor => "XOR",
                BoolOp::AndNot => "AND_NOT",
                BoolOp::AndMaybe => "AND_MAYBE",
                BoolOp::Filter => "FILTER",
                BoolOp::Synonym => "SYNONYM",
                BoolOp::Max => "MAX",
            };
            joined(children, name, out);
        }
        QueryNode::Positional {
            op,
            window,
            children,
        } => {
            let name = match op {
                PositionalOp::Phrase => "PHRASE",
                PositionalOp::Near => "NEAR",
            };
            joined(children, &format!("{name} {window}"), out);
        }
        QueryNode::EliteSet { k, children } => {
            joined(children, &format!("ELITE_SET {k}"), out);
        }
        QueryNode::Scale { factor, child } => {
            let _ = write!(out, "{factor} * ");
            inner(child, out);
        }
        QueryNode::Value { slot, lower, upper } => match (lower, upper) {
            (Some(lo), Some(hi)) => {
                let _ = write!(out, "VALUE_RANGE {slot} ");
                escape_term(lo, out);
                out.push(' ');
                escape_term(hi, out);
            }
            (Some(lo), None) => {
                let _ = write!(out, "VALUE_GE {slot} ");
                escape_term(lo, out);
            }
            (None, Some(hi)) => {
                let _ = write!(out, "VALUE_LE {slot} ");
                escape_term(hi, out);
            }
            (None, None) => out.push_str("<alldocuments>"),
        },
        QueryNode::Wildcard(spec) => {
            let _ = write!(out, "WILDCARD {} ", spec.combiner.op_name());
            escape_term(spec.pattern.as_bytes(), out);
        }
        QueryNode::EditDistance(spec) => {
            let _ = write!(out, "EDIT_DISTANCE {} ", spec.combiner.op_name());
            escape_term(spec.target.as_bytes(), out);
            let _ = write!(out, "~{}", spec.edit_distance);
        }
    }
}

fn joined(children: &[Query], separator: &str, out: &mut String) {
    out.push('(');
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            let _ = write!(out, " {separator} ");
        }
        inner(child, out);
    }
    out.push(')');
}

/// Escape a term for description output.
///
/// Control bytes, DEL, backslash and bytes that are not part of valid
/// UTF-8 render as `\xhh`; everything else passes through unchanged.
pub(crate) fn escape_term(term: &[u8], out: &mut String) {
    for chunk in term.utf8_chunks() {
        for ch in chunk.valid().chars() {
            let code = ch as u32;
            if ch == '\\' {
                out.push_str("\\x5c");
            } else if code < 0x20 || code == 0x7f {
                let _ = write!(out, "\\x{code:02x}");
            } else {
                out.push(ch);
            }
        }
        for &byte in chunk.invalid() {
            let _ = write!(out, "\\x{byte:02x}");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::query::node::{Query, QueryKind};

    #[test]
    fn test_leaf_descriptions() {
        assert_eq!(Query::match_all().description(), "Query(<alldocuments>)");
        assert_eq!(Query::match_nothing().description(), "Query()");
        assert_eq!(Query::term("foo").description(), "Query(foo)");
        assert_eq!(Query::term_with("foo", 2, 1).description(), "Query(foo#2@1)");
    }

    #[test]
    fn test_compound_descriptions() {
        let q = Query::term("foo") & Query::term("bar");
        assert_eq!(q.description(), "Query((foo AND bar))");

        let q = Query::term("foo") | Query::term("bar");
        assert_eq!(q.description(), "Query((foo OR bar))");

        let q = Query::term("foo") ^ Query::term("bar");
        assert_eq!(q.description(), "Query((foo XOR bar))");

        let q = Query::and_maybe(Query::term("foo"), Query::term("bar"));
        assert_eq!(q.description(), "Query((foo AND_MAYBE bar))");

        let q = Query::filter(Query::term("foo"), Query::term("bar"));
        assert_eq!(q.description(), "Query((foo FILTER bar))");

        let q = Query::compound(QueryKind::Synonym, ["a", "b"].map(Query::term)).unwrap();
        assert_eq!(q.description(), "Query((a SYNONYM b))");

        let q = Query::compound(QueryKind::Max, ["a", "b"].map(Query::term)).unwrap();
        assert_eq!(q.description(), "Query((a MAX b))");
    }

    #[test]
    fn test_positional_descriptions() {
        let a_or_b = Query::term("a") | Query::term("b");
        let q = Query::near([a_or_b.clone(), a_or_b.clone()], None);
        assert_eq!(q.description(), "Query(((a OR b) NEAR 2 (a OR b)))");

        let q = Query::phrase([a_or_b.clone(), a_or_b], None);
        assert_eq!(q.description(), "Query(((a OR b) PHRASE 2 (a OR b)))");

        let q = Query::phrase(["one", "two", "three"].map(Query::term), Some(5));
        assert_eq!(q.description(), "Query((one PHRASE 5 two PHRASE 5 three))");
    }

    #[test]
    fn test_scale_descriptions() {
        let q = 1.25 * (Query::term("one") | Query::term("two"));
        assert_eq!(q.description(), "Query(1.25 * (one OR two))");

        let q = (Query::term("one") & Query::term("two")) * 42.0;
        assert_eq!(q.description(), "Query(42 * (one AND two))");

        let q = Query::term("one") / 2.0;
        assert_eq!(q.description(), "Query(0.5 * one)");
    }

    #[test]
    fn test_value_descriptions() {
        let q = Query::value_ge(1234, "x");
        assert_eq!(q.description(), "Query(VALUE_GE 1234 x)");

        let q = Query::value_le(3, "m");
        assert_eq!(q.description(), "Query(VALUE_LE 3 m)");

        let q = Query::value_range(1, "a", "b");
        assert_eq!(q.description(), "Query(VALUE_RANGE 1 a b)");
    }

    #[test]
    fn test_non_utf8_term_escaping() {
        let q = Query::term(b"\xc0\x80\xf5\x80\x80\x80\xfe\xff".to_vec());
        assert_eq!(
            q.description(),
            "Query(\\xc0\\x80\\xf5\\x80\\x80\\x80\\xfe\\xff)"
        );

        let q = Query::term(b"\x00\x1f".to_vec());
        assert_eq!(q.description(), "Query(\\x00\\x1f)");

        // Backslashes are encoded so output is unambiguous.
        let q = Query::term("back\\slash");
        assert_eq!(q.description(), "Query(back\\x5cslash)");

        // DEL is escaped.
        let q = Query::term("D\x7f_\x7f~");
        assert_eq!(q.description(), "Query(D\\x7f_\\x7f~)");

        // Multi-byte UTF-8 passes through unescaped.
        let q = Query::term("t\u{00ea}st");
        assert_eq!(q.description(), "Query(t\u{00ea}st)");
    }

    #[test]
    fn test_description_stability() {
        let q = Query::term("foo") & (Query::term("bar") | Query::term("baz"));
        let first = q.description();
        assert_eq!(q.description(), first);

        let structurally_equal =
            Query::term("foo") & (Query::term("bar") | Query::term("baz"));
        assert_eq!(structurally_equal.description(), first);
    }

    #[test]
    fn test_display_matches_description() {
        let q = Query::term("foo") | Query::term("bar");
        assert_eq!(format!("{q}"), q.description());
    }
}
