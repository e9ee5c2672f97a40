//! Query tree construction and structural introspection.
//!
//! A [`Query`] is an immutable, structurally shared tree. Handles are
//! reference counted and cheap to clone; the in-place accumulators
//! (`&=`, `|=`, `^=`) observe the reference count and only append to a
//! compound the caller solely owns, so shared trees are never mutated.

use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Div, Mul, Not};
use std::sync::Arc;

use crate::error::{DoruError, Result};
use crate::query::editdist::EditDistanceSpec;
use crate::query::wildcard::WildcardSpec;
use crate::search::matcher::ExternalSource;

/// The kind of a query node, for structural introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Matches every document with weight zero.
    MatchAll,
    /// Matches no document.
    MatchNothing,
    /// A term leaf.
    Term,
    /// An externally supplied posting source.
    PostingSource,
    /// Intersection; weight is the sum of child weights.
    And,
    /// Union; weight is the sum over matching children.
    Or,
    /// Documents matched by an odd number of children.
    Xor,
    /// Left minus right; weight from the left only.
    AndNot,
    /// Left, with the right's weight added where it also matches.
    AndMaybe,
    /// Left restricted to the right's docid set; weight from the left.
    Filter,
    /// Ordered positional window match.
    Phrase,
    /// Unordered positional window match.
    Near,
    /// Children weighted as a single pseudo-term.
    Synonym,
    /// Union; weight is the maximum child weight per document.
    Max,
    /// Union over the k highest-weighted children.
    EliteSet,
    /// Child with its weight multiplied by a constant factor.
    ScaleWeight,
    /// Documents whose slot value is >= a bound.
    ValueGe,
    /// Documents whose slot value is <= a bound.
    ValueLe,
    /// Documents whose slot value lies in a closed range.
    ValueRange,
    /// Unexpanded wildcard.
    Wildcard,
    /// Unexpanded edit-distance query.
    EditDistance,
}

/// Multi-child boolean-algebra operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoolOp {
    And,
    Or,
    Xor,
    AndNot,
    AndMaybe,
    Filter,
    Synonym,
    Max,
}

/// Positional operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PositionalOp {
    Phrase,
    Near,
}

/// A term leaf.
#[derive(Debug, Clone)]
pub(crate) struct TermLeaf {
    pub term: Vec<u8>,
    pub wqf: u32,
    pub pos: u32,
    /// True for terms produced by wildcard/edit-distance expansion, which
    /// are excluded from `matching_terms` reporting.
    pub synthetic: bool,
}

#[derive(Debug)]
pub(crate) enum QueryNode {
    MatchAll,
    MatchNothing,
    Term(TermLeaf),
    Source(Arc<dyn ExternalSource>),
    Bool {
        op: BoolOp,
        children: Vec<Query>,
    },
    Positional {
        op: PositionalOp,
        window: u32,
        children: Vec<Query>,
    },
    EliteSet {
        k: usize,
        children: Vec<Query>,
    },
    Scale {
        factor: f64,
        child: Query,
    },
    Value {
        slot: u32,
        lower: Option<Vec<u8>>,
        upper: Option<Vec<u8>>,
    },
    Wildcard(WildcardSpec),
    EditDistance(EditDistanceSpec),
}

/// An immutable query tree with shared ownership.
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) inner: Arc<QueryNode>,
}

impl Query {
    pub(crate) fn from_node(node: QueryNode) -> Query {
        Query {
            inner: Arc::new(node),
        }
    }

    /// The query matching every document, with weight zero.
    pub fn match_all() -> Query {
        Query::from_node(QueryNode::MatchAll)
    }

    /// The query matching no document.
    pub fn match_nothing() -> Query {
        Query::from_node(QueryNode::MatchNothing)
    }

    /// A term leaf with wqf 1 and no position.
    pub fn term<T: Into<Vec<u8>>>(term: T) -> Query {
        Query::term_with(term, 1, 0)
    }

    /// A term leaf with an explicit within-query frequency and position.
    ///
    /// A position of 0 means "unset".
    pub fn term_with<T: Into<Vec<u8>>>(term: T, wqf: u32, pos: u32) -> Query {
        Query::from_node(QueryNode::Term(TermLeaf {
            term: term.into(),
            wqf,
            pos,
            synthetic: false,
        }))
    }

    pub(crate) fn synthetic_term(term: Vec<u8>) -> Query {
        Query::from_node(QueryNode::Term(TermLeaf {
            term,
            wqf: 1,
            pos: 0,
            synthetic: true,
        }))
    }

    /// A query backed by an externally supplied posting source.
    pub fn source(source: Arc<dyn ExternalSource>) -> Query {
        Query::from_node(QueryNode::Source(source))
    }

    /// Intersection of two queries.
    pub fn and(left: Query, right: Query) -> Query {
        Query::bool_from_children(BoolOp::And, vec![left, right])
    }

    /// Union of two queries.
    pub fn or(left: Query, right: Query) -> Query {
        Query::bool_from_children(BoolOp::Or, vec![left, right])
    }

    /// Symmetric difference of two queries.
    pub fn xor(left: Query, right: Query) -> Query {
        Query::bool_from_children(BoolOp::Xor, vec![left, right])
    }

    /// Documents matching `left` but not `right`; weight from `left`.
    pub fn and_not(left: Query, right: Query) -> Query {
        Query::bool_from_children(BoolOp::AndNot, vec![left, right])
    }

    /// Documents matching `left`, with `right`'s weight where it matches.
    pub fn and_maybe(left: Query, right: Query) -> Query {
        Query::bool_from_children(BoolOp::AndMaybe, vec![left, right])
    }

    /// Documents matching `left` restricted to `right`; `right` is
    /// evaluated unweighted.
    pub fn filter(left: Query, right: Query) -> Query {
        Query::bool_from_children(BoolOp::Filter, vec![left, right])
    }

    /// Build a compound query of `kind` over an iterator of children.
    ///
    /// Supported kinds: `And`, `Or`, `Xor`, `AndNot`, `AndMaybe`, `Filter`,
    /// `Synonym`, `Max`. The binary kinds (`AndNot`, `AndMaybe`, `Filter`)
    /// require exactly two children.
    pub fn compound<I>(kind: QueryKind, children: I) -> Result<Query>
    where
        I: IntoIterator<Item = Query>,
    {
        let op = match kind {
            QueryKind::And => BoolOp::And,
            QueryKind::Or => BoolOp::Or,
            QueryKind::Xor => BoolOp::Xor,
            QueryKind::AndNot => BoolOp::AndNot,
            QueryKind::AndMaybe => BoolOp::AndMaybe,
            QueryKind::Filter => BoolOp::Filter,
            QueryKind::Synonym => BoolOp::Synonym,
            QueryKind::Max => BoolOp::Max,
            other => {
                return Err(DoruError::invalid_argument(format!(
                    "{other:?} cannot be built from a plain child list"
                )));
            }
        };
        let children: Vec<Query> = children.into_iter().collect();
        if matches!(op, BoolOp::AndNot | BoolOp::AndMaybe | BoolOp::Filter) && children.len() != 2 {
            return Err(DoruError::invalid_argument(format!(
                "{kind:?} requires exactly two subqueries, got {}",
                children.len()
            )));
        }
        Ok(Query::bool_from_children(op, children))
    }

    /// An ordered positional query: children must occur in order within a
    /// window of `window` positions. `None` selects the default window,
    /// the number of children; smaller explicit windows are widened to it.
    pub fn phrase<I>(children: I, window: Option<u32>) -> Query
    where
        I: IntoIterator<Item = Query>,
    {
        Query::positional(PositionalOp::Phrase, children, window)
    }

    /// An unordered positional query within a window of `window` positions.
    pub fn near<I>(children: I, window: Option<u32>) -> Query
    where
        I: IntoIterator<Item = Query>,
    {
        Query::positional(PositionalOp::Near, children, window)
    }

    fn positional<I>(op: PositionalOp, children: I, window: Option<u32>) -> Query
    where
        I: IntoIterator<Item = Query>,
    {
        let children: Vec<Query> = children.into_iter().collect();
        // A subquery which cannot match makes the whole window unmatchable.
        if children.is_empty() || children.iter().any(Query::is_match_nothing) {
            return Query::match_nothing();
        }
        if children.len() == 1 {
            return children.into_iter().next().unwrap_or_else(Query::match_nothing);
        }
        let len = children.len() as u32;
        let window = window.unwrap_or(len).max(len);
        Query::from_node(QueryNode::Positional {
            op,
            window,
            children,
        })
    }

    /// Union over the `k` children with the highest weight upper bounds;
    /// an approximation of `Or` for wide queries.
    pub fn elite_set<I>(children: I, k: usize) -> Query
    where
        I: IntoIterator<Item = Query>,
    {
        let children: Vec<Query> = children
            .into_iter()
            .filter(|c| !c.is_match_nothing())
            .collect();
        match children.len() {
            0 => Query::match_nothing(),
            1 => children.into_iter().next().unwrap_or_else(Query::match_nothing),
            _ => Query::from_node(QueryNode::EliteSet {
                k: k.max(1),
                children,
            }),
        }
    }

    /// Multiply the weight contribution of `child` by `factor`.
    ///
    /// A factor of 1 collapses to the child; a factor of 0 keeps the
    /// match-set but zeroes the weight. Negative or non-finite factors are
    /// rejected.
    pub fn scale(factor: f64, child: Query) -> Result<Query> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(DoruError::invalid_argument(format!(
                "scale factor must be finite and non-negative, got {factor}"
            )));
        }
        if factor == 1.0 {
            return Ok(child);
        }
        if child.is_match_nothing() {
            return Ok(child);
        }
        // Nested scales compose into one node.
        if let QueryNode::Scale {
            factor: inner,
            child: grandchild,
        } = &*child.inner
        {
            return Query::scale(factor * inner, grandchild.clone());
        }
        Ok(Query::from_node(QueryNode::Scale { factor, child }))
    }

    /// Documents whose value in `slot` is >= `lower`.
    pub fn value_ge<V: Into<Vec<u8>>>(slot: u32, lower: V) -> Query {
        Query::from_node(QueryNode::Value {
            slot,
            lower: Some(lower.into()),
            upper: None,
        })
    }

    /// Documents whose value in `slot` is <= `upper`.
    pub fn value_le<V: Into<Vec<u8>>>(slot: u32, upper: V) -> Query {
        Query::from_node(QueryNode::Value {
            slot,
            lower: None,
            upper: Some(upper.into()),
        })
    }

    /// Documents whose value in `slot` lies in `[lower, upper]`.
    pub fn value_range<V: Into<Vec<u8>>>(slot: u32, lower: V, upper: V) -> Query {
        Query::from_node(QueryNode::Value {
            slot,
            lower: Some(lower.into()),
            upper: Some(upper.into()),
        })
    }

    pub(crate) fn bool_from_children(op: BoolOp, children: Vec<Query>) -> Query {
        match op {
            BoolOp::And | BoolOp::Filter => {
                if children.is_empty() || children.iter().any(Query::is_match_nothing) {
                    return Query::match_nothing();
                }
            }
            BoolOp::AndNot | BoolOp::AndMaybe => {
                let left_nothing = children.first().is_none_or(Query::is_match_nothing);
                if left_nothing {
                    return Query::match_nothing();
                }
                let right_nothing = children.get(1).is_none_or(Query::is_match_nothing);
                if right_nothing {
                    return children.into_iter().next().unwrap_or_else(Query::match_nothing);
                }
            }
            BoolOp::Or | BoolOp::Xor | BoolOp::Synonym | BoolOp::Max => {
                let mut kept: Vec<Query> = children
                    .into_iter()
                    .filter(|c| !c.is_match_nothing())
                    .collect();
                return match kept.len() {
                    0 => Query::match_nothing(),
                    1 => kept.pop().unwrap_or_else(Query::match_nothing),
                    _ => Query::from_node(QueryNode::Bool { op, children: kept }),
                };
            }
        }
        if children.len() == 1 {
            return children.into_iter().next().unwrap_or_else(Query::match_nothing);
        }
        Query::from_node(QueryNode::Bool { op, children })
    }

    /// The kind of the root node.
    pub fn kind(&self) -> QueryKind {
        match &*self.inner {
            QueryNode::MatchAll => QueryKind::MatchAll,
            QueryNode::MatchNothing => QueryKind::MatchNothing,
            QueryNode::Term(_) => QueryKind::Term,
            QueryNode::Source(_) => QueryKind::PostingSource,
            QueryNode::Bool { op, .. } => match op {
                BoolOp::And => QueryKind::And,
                BoolOp::Or => QueryKind::Or,
                BoolOp::Xor => QueryKind::Xor,
                BoolOp::AndNot => QueryKind::AndNot,
                BoolOp::AndMaybe => QueryKind::AndMaybe,
                BoolOp::Filter => QueryKind::Filter,
                BoolOp::Synonym => QueryKind::Synonym,
                BoolOp::Max => QueryKind::Max,
            },
            QueryNode::Positional { op, .. } => match op {
                PositionalOp::Phrase => QueryKind::Phrase,
                PositionalOp::Near => QueryKind::Near,
            },
            QueryNode::EliteSet { .. } => QueryKind::EliteSet,
            QueryNode::Scale { .. } => QueryKind::ScaleWeight,
            QueryNode::Value { lower, upper, .. } => match (lower, upper) {
                (Some(_), Some(_)) => QueryKind::ValueRange,
                (Some(_), None) => QueryKind::ValueGe,
                _ => QueryKind::ValueLe,
            },
            QueryNode::Wildcard(_) => QueryKind::Wildcard,
            QueryNode::EditDistance(_) => QueryKind::EditDistance,
        }
    }

    /// Number of direct subqueries.
    pub fn num_subqueries(&self) -> usize {
        match &*self.inner {
            QueryNode::Bool { children, .. }
            | QueryNode::Positional { children, .. }
            | QueryNode::EliteSet { children, .. } => children.len(),
            QueryNode::Scale { .. } => 1,
            _ => 0,
        }
    }

    /// The `i`-th direct subquery, if any.
    pub fn subquery(&self, i: usize) -> Option<Query> {
        match &*self.inner {
            QueryNode::Bool { children, .. }
            | QueryNode::Positional { children, .. }
            | QueryNode::EliteSet { children, .. } => children.get(i).cloned(),
            QueryNode::Scale { child, .. } if i == 0 => Some(child.clone()),
            _ => None,
        }
    }

    /// The term of a term leaf.
    pub fn leaf_term(&self) -> Option<&[u8]> {
        match &*self.inner {
            QueryNode::Term(leaf) => Some(&leaf.term),
            _ => None,
        }
    }

    /// The within-query frequency of a term leaf.
    pub fn leaf_wqf(&self) -> Option<u32> {
        match &*self.inner {
            QueryNode::Term(leaf) => Some(leaf.wqf),
            _ => None,
        }
    }

    /// The position of a term leaf (0 = unset).
    pub fn leaf_pos(&self) -> Option<u32> {
        match &*self.inner {
            QueryNode::Term(leaf) => Some(leaf.pos),
            _ => None,
        }
    }

    /// The window of a PHRASE or NEAR node.
    pub fn window(&self) -> Option<u32> {
        match &*self.inner {
            QueryNode::Positional { window, .. } => Some(*window),
            _ => None,
        }
    }

    /// The factor of a scale-weight node.
    pub fn scale_factor(&self) -> Option<f64> {
        match &*self.inner {
            QueryNode::Scale { factor, .. } => Some(*factor),
            _ => None,
        }
    }

    /// Whether this query matches no document.
    pub fn is_match_nothing(&self) -> bool {
        matches!(&*self.inner, QueryNode::MatchNothing)
    }

    /// Whether this query matches every document.
    pub fn is_match_all(&self) -> bool {
        matches!(&*self.inner, QueryNode::MatchAll)
    }

    /// The canonical textual description of this query.
    pub fn description(&self) -> String {
        crate::query::description::describe(self)
    }

    // `AND_NOT(MatchAll, x)` is how `!x` is represented; combining it back
    // under `&` must produce `AND_NOT(lhs, x)` rather than nesting it.
    fn strip_not(&self) -> Option<Query> {
        match &*self.inner {
            QueryNode::Bool {
                op: BoolOp::AndNot,
                children,
            } if children.len() == 2 && children[0].is_match_all() => Some(children[1].clone()),
            _ => None,
        }
    }

    fn accumulate(&mut self, op: BoolOp, rhs: Query) {
        match op {
            BoolOp::And => {
                if rhs.is_match_nothing() {
                    *self = Query::match_nothing();
                    return;
                }
                if self.is_match_nothing() {
                    return;
                }
            }
            BoolOp::Or | BoolOp::Xor => {
                if rhs.is_match_nothing() {
                    return;
                }
                if self.is_match_nothing() {
                    *self = rhs;
                    return;
                }
            }
            _ => {}
        }
        if op == BoolOp::Xor && Arc::ptr_eq(&self.inner, &rhs.inner) {
            // x XOR x matches nothing, whoever else holds the tree.
            *self = Query::match_nothing();
            return;
        }
        let same_op = matches!(&*self.inner, QueryNode::Bool { op: top, .. } if *top == op);
        if same_op && !Arc::ptr_eq(&self.inner, &rhs.inner) {
            // Append in place only while we are the sole owner.
            if let Some(QueryNode::Bool { children, .. }) = Arc::get_mut(&mut self.inner) {
                children.push(rhs);
                return;
            }
        }
        *self = Query::bool_from_children(op, vec![self.clone(), rhs]);
    }
}

impl BitAnd for Query {
    type Output = Query;

    fn bitand(self, rhs: Query) -> Query {
        if let Some(negated) = rhs.strip_not() {
            return Query::and_not(self, negated);
        }
        Query::and(self, rhs)
    }
}

impl BitOr for Query {
    type Output = Query;

    fn bitor(self, rhs: Query) -> Query {
        Query::or(self, rhs)
    }
}

impl BitXor for Query {
    type Output = Query;

    fn bitxor(self, rhs: Query) -> Query {
        Query::xor(self, rhs)
    }
}

impl Not for Query {
    type Output = Query;

    fn not(self) -> Query {
        Query::and_not(Query::match_all(), self)
    }
}

impl BitAndAssign for Query {
    fn bitand_assign(&mut self, rhs: Query) {
        if let Some(negated) = rhs.strip_not() {
            if !self.is_match_nothing() {
                *self = Query::and_not(self.clone(), negated);
            }
            return;
        }
        self.accumulate(BoolOp::And, rhs);
    }
}

impl BitOrAssign for Query {
    fn bitor_assign(&mut self, rhs: Query) {
        self.accumulate(BoolOp::Or, rhs);
    }
}

impl BitXorAssign for Query {
    fn bitxor_assign(&mut self, rhs: Query) {
        self.accumulate(BoolOp::Xor, rhs);
    }
}

impl Mul<f64> for Query {
    type Output = Query;

    /// Scale the query's weight contribution.
    ///
    /// Panics if `factor` is negative or not finite; use [`Query::scale`]
    /// for a fallible version.
    fn mul(self, factor: f64) -> Query {
        match Query::scale(factor, self) {
            Ok(q) => q,
            Err(e) => panic!("{e}"),
        }
    }
}

impl Mul<Query> for f64 {
    type Output = Query;

    fn mul(self, query: Query) -> Query {
        query * self
    }
}

impl Div<f64> for Query {
    type Output = Query;

    /// Scale the query's weight contribution by `1 / divisor`.
    ///
    /// Panics if the reciprocal is negative or not finite.
    fn div(self, divisor: f64) -> Query {
        self * divisor.recip()
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_introspection() {
        let q = Query::term_with("foo", 2, 1);
        assert_eq!(q.kind(), QueryKind::Term);
        assert_eq!(q.num_subqueries(), 0);
        assert_eq!(q.leaf_term(), Some(&b"foo"[..]));
        assert_eq!(q.leaf_wqf(), Some(2));
        assert_eq!(q.leaf_pos(), Some(1));

        let q = Query::term("bar");
        assert_eq!(q.leaf_wqf(), Some(1));
        assert_eq!(q.leaf_pos(), Some(0));
    }

    #[test]
    fn test_match_all_and_nothing_introspection() {
        assert_eq!(Query::match_all().kind(), QueryKind::MatchAll);
        assert_eq!(Query::match_all().num_subqueries(), 0);
        assert_eq!(Query::match_nothing().kind(), QueryKind::MatchNothing);
        assert_eq!(Query::match_nothing().num_subqueries(), 0);
    }

    #[test]
    fn test_operator_kinds() {
        let q = Query::term("foo") & Query::term("bar");
        assert_eq!(q.kind(), QueryKind::And);

        let q = Query::term("foo") | Query::term("bar");
        assert_eq!(q.kind(), QueryKind::Or);

        let q = Query::term("foo") ^ Query::term("bar");
        assert_eq!(q.kind(), QueryKind::Xor);

        let q = !Query::term("bar");
        assert_eq!(q.kind(), QueryKind::AndNot);
        assert_eq!(q.subquery(0).unwrap().kind(), QueryKind::MatchAll);
        assert_eq!(q.subquery(1).unwrap().kind(), QueryKind::Term);

        let q = Query::term("foo") & !Query::term("bar");
        assert_eq!(q.kind(), QueryKind::AndNot);
        assert_eq!(q.subquery(0).unwrap().kind(), QueryKind::Term);
    }

    #[test]
    fn test_scale_introspection() {
        let q = 1.25 * (Query::term("one") | Query::term("two"));
        assert_eq!(q.kind(), QueryKind::ScaleWeight);
        assert_eq!(q.num_subqueries(), 1);
        assert_eq!(q.subquery(0).unwrap().kind(), QueryKind::Or);

        let q = Query::term("one") / 2.0;
        assert_eq!(q.kind(), QueryKind::ScaleWeight);
        assert_eq!(q.scale_factor(), Some(0.5));
        assert_eq!(q.subquery(0).unwrap().kind(), QueryKind::Term);
    }

    #[test]
    fn test_scale_simplifications() {
        let q = Query::scale(1.0, Query::term("one")).unwrap();
        assert_eq!(q.kind(), QueryKind::Term);

        let q = Query::scale(2.0, Query::scale(3.0, Query::term("one")).unwrap()).unwrap();
        assert_eq!(q.scale_factor(), Some(6.0));
        assert_eq!(q.subquery(0).unwrap().kind(), QueryKind::Term);

        assert!(Query::scale(-1.0, Query::term("one")).is_err());
        assert!(Query::scale(f64::NAN, Query::term("one")).is_err());
    }

    #[test]
    fn test_positional_window_defaults() {
        let q = Query::phrase([Query::term("a"), Query::term("b")], None);
        assert_eq!(q.kind(), QueryKind::Phrase);
        assert_eq!(q.window(), Some(2));

        let q = Query::near(
            [Query::term("a"), Query::term("b"), Query::term("c")],
            Some(10),
        );
        assert_eq!(q.kind(), QueryKind::Near);
        assert_eq!(q.window(), Some(10));

        // Too-small windows widen to the child count.
        let q = Query::phrase([Query::term("a"), Query::term("b")], Some(1));
        assert_eq!(q.window(), Some(2));
    }

    #[test]
    fn test_positional_match_nothing_child_collapses() {
        let q = Query::phrase([Query::term("at"), Query::match_nothing()], None);
        assert!(q.is_match_nothing());

        let q = Query::near([Query::match_nothing(), Query::term("at")], None);
        assert!(q.is_match_nothing());
    }

    #[test]
    fn test_compound_from_iterator() {
        let q = Query::compound(
            QueryKind::Xor,
            ["a", "b", "c"].map(Query::term),
        )
        .unwrap();
        assert_eq!(q.kind(), QueryKind::Xor);
        assert_eq!(q.num_subqueries(), 3);

        assert!(Query::compound(QueryKind::AndNot, [Query::term("a")]).is_err());
        assert!(Query::compound(QueryKind::Phrase, [Query::term("a")]).is_err());
    }

    #[test]
    fn test_empty_compound_is_match_nothing() {
        let q = Query::compound(QueryKind::Or, []).unwrap();
        assert!(q.is_match_nothing());
        let q = Query::compound(QueryKind::And, []).unwrap();
        assert!(q.is_match_nothing());
    }
}
