//! Structural query rewrites applied before matching.
//!
//! Every rewrite preserves both the match-set and the weighting of the
//! query. Rewrites that depend on index contents (empty posting lists,
//! vacant value ranges, wildcard expansion) happen later, at lowering
//! time, because they vary per shard.

use log::debug;

use crate::query::node::{BoolOp, Query, QueryNode};

/// Rewrite a query to a cheaper equivalent form, to fixpoint.
pub fn optimize(query: &Query) -> Query {
    let mut current = query.clone();
    // Each pass is bottom-up, so a handful of iterations reaches fixpoint
    // even for rewrites that expose each other.
    for _ in 0..16 {
        match rewrite(&current) {
            Some(next) => {
                debug!("optimizer: {} -> {}", current, next);
                current = next;
            }
            None => break,
        }
    }
    current
}

// Returns None when the subtree is already in normal form.
fn rewrite(query: &Query) -> Option<Query> {
    match &*query.inner {
        QueryNode::Bool { op, children } => rewrite_bool(*op, children),
        QueryNode::Positional { op, window, children } => {
            // Positional children are never restructured (that would change
            // the window semantics), but are optimised internally.
            let rewritten = rewrite_children(children)?;
            Some(Query::positional_from_parts(*op, *window, rewritten))
        }
        QueryNode::EliteSet { k, children } => {
            let rewritten = rewrite_children(children)?;
            Some(Query::elite_set(rewritten, *k))
        }
        QueryNode::Scale { factor, child } => {
            let rewritten = rewrite(child)?;
            // Construction re-applies factor composition and collapse.
            Some(Query::scale(*factor, rewritten).unwrap_or_else(|_| child.clone()))
        }
        _ => None,
    }
}

fn rewrite_bool(op: BoolOp, children: &[Query]) -> Option<Query> {
    let mut changed = false;
    let mut new_children: Vec<Query> = Vec::with_capacity(children.len());
    for child in children {
        let child = match rewrite(child) {
            Some(rewritten) => {
                changed = true;
                rewritten
            }
            None => child.clone(),
        };
        // Same-op nests flatten for the associative operators.
        let flattens = matches!(
            op,
            BoolOp::And | BoolOp::Or | BoolOp::Xor | BoolOp::Synonym | BoolOp::Max
        );
        if flattens && child.kind_matches_bool(op) {
            changed = true;
            new_children.extend(child.bool_children());
        } else {
            new_children.push(child);
        }
    }

    match op {
        BoolOp::And | BoolOp::Filter => {
            if new_children.iter().any(Query::is_match_nothing) {
                return Some(Query::match_nothing());
            }
            if new_children.len() > 1 && new_children.iter().all(Query::is_match_all) {
                return Some(Query::match_all());
            }
            // MatchAll carries weight zero, so it is droppable from an
            // intersection as long as something else remains. Not from a
            // FILTER: its left side fixes which child carries the weight.
            if op == BoolOp::And
                && new_children.iter().any(Query::is_match_all)
                && new_children.iter().any(|c| !c.is_match_all())
            {
                new_children.retain(|c| !c.is_match_all());
                changed = true;
            }
            if op == BoolOp::Filter && new_children.len() == 2 && new_children[1].is_match_all() {
                // Filtering by everything filters out nothing, and the
                // filter side is unweighted anyway.
                return Some(new_children.swap_remove(0));
            }
        }
        BoolOp::AndNot => {
            if new_children.len() == 2 {
                if new_children[0].is_match_nothing() {
                    return Some(Query::match_nothing());
                }
                if new_children[1].is_match_nothing() {
                    return Some(new_children.swap_remove(0));
                }
                if new_children[1].is_match_all() {
                    return Some(Query::match_nothing());
                }
            }
        }
        BoolOp::AndMaybe => {
            if new_children.len() == 2 {
                if new_children[0].is_match_nothing() {
                    return Some(Query::match_nothing());
                }
                if new_children[1].is_match_nothing() {
                    return Some(new_children.swap_remove(0));
                }
            }
        }
        BoolOp::Or | BoolOp::Xor | BoolOp::Synonym | BoolOp::Max => {
            let before = new_children.len();
            new_children.retain(|c| !c.is_match_nothing());
            changed |= new_children.len() != before;
        }
    }

    if !changed {
        return None;
    }
    Some(Query::bool_from_children(op, new_children))
}

fn rewrite_children(children: &[Query]) -> Option<Vec<Query>> {
    let mut changed = false;
    let rewritten: Vec<Query> = children
        .iter()
        .map(|child| match rewrite(child) {
            Some(q) => {
                changed = true;
                q
            }
            None => child.clone(),
        })
        .collect();
    changed.then_some(rewritten)
}

impl Query {
    fn kind_matches_bool(&self, op: BoolOp) -> bool {
        matches!(&*self.inner, QueryNode::Bool { op: top, .. } if *top == op)
    }

    fn bool_children(&self) -> Vec<Query> {
        match &*self.inner {
            QueryNode::Bool { children, .. } => children.clone(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn positional_from_parts(
        op: crate::query::node::PositionalOp,
        window: u32,
        children: Vec<Query>,
    ) -> Query {
        if children.iter().any(Query::is_match_nothing) {
            return Query::match_nothing();
        }
        Query::from_node(QueryNode::Positional {
            op,
            window,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::node::{Query, QueryKind};

    #[test]
    fn test_flattens_nested_same_op() {
        let q = (Query::term("a") & Query::term("b")) & (Query::term("c") & Query::term("d"));
        let optimized = optimize(&q);
        assert_eq!(optimized.description(), "Query((a AND b AND c AND d))");

        let q = (Query::term("a") | Query::term("b")) | Query::term("c");
        assert_eq!(optimize(&q).description(), "Query((a OR b OR c))");
    }

    #[test]
    fn test_does_not_flatten_across_ops() {
        let q = (Query::term("a") | Query::term("b")) & Query::term("c");
        assert_eq!(optimize(&q).description(), "Query(((a OR b) AND c))");
    }

    #[test]
    fn test_drops_match_all_from_and() {
        let q = Query::and(Query::match_all(), Query::term("a"));
        assert_eq!(optimize(&q).description(), "Query(a)");

        // But an AND of nothing but MatchAll stays MatchAll.
        let q = Query::and(Query::match_all(), Query::match_all());
        assert!(optimize(&q).is_match_all());
    }

    #[test]
    fn test_and_not_match_all_rhs_is_empty() {
        let q = Query::and_not(Query::term("a"), Query::match_all());
        assert!(optimize(&q).is_match_nothing());
    }

    #[test]
    fn test_and_not_lhs_match_all_is_kept() {
        // The negation must not be discarded when the left side matches
        // everything.
        let q = Query::and_not(Query::match_all(), Query::term("the"));
        let optimized = optimize(&q);
        assert_eq!(optimized.kind(), QueryKind::AndNot);
        assert_eq!(
            optimized.description(),
            "Query((<alldocuments> AND_NOT the))"
        );
    }

    #[test]
    fn test_filter_by_match_all_collapses() {
        let q = Query::filter(Query::term("a"), Query::match_all());
        assert_eq!(optimize(&q).description(), "Query(a)");
    }

    #[test]
    fn test_positional_children_not_restructured() {
        let a_or_b = Query::term("a") | Query::term("b");
        let q = Query::phrase([a_or_b.clone(), a_or_b], None);
        let optimized = optimize(&q);
        assert_eq!(
            optimized.description(),
            "Query(((a OR b) PHRASE 2 (a OR b)))"
        );
    }

    #[test]
    fn test_phrase_stays_under_and_not() {
        // The positional subtree must survive as a positional leaf of the
        // boolean skeleton.
        let phrase = Query::phrase([Query::term("the"), Query::term("king")], None);
        let mut q = phrase.clone();
        q &= !Query::term("worldtornado");
        q &= Query::term("a");
        let optimized = optimize(&q);
        assert_eq!(
            optimized.description(),
            "Query((((the PHRASE 2 king) AND_NOT worldtornado) AND a))"
        );
    }

    #[test]
    fn test_scale_composition() {
        let q = Query::scale(2.0, Query::scale(3.0, Query::term("a")).unwrap()).unwrap();
        let optimized = optimize(&q);
        assert_eq!(optimized.scale_factor(), Some(6.0));
    }

    #[test]
    fn test_optimize_is_idempotent() {
        let q = (Query::term("a") & Query::term("b")) & (Query::match_all() & Query::term("c"));
        let once = optimize(&q);
        let twice = optimize(&once);
        assert_eq!(once.description(), twice.description());
    }
}
