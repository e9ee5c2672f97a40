//! Lowering of a query tree into a matcher tree, one shard at a time.
//!
//! Lowering returns `Ok(None)` for a subtree that cannot match anything
//! on this shard (an unknown term, a vacant value range, an unmatched
//! wildcard). The boolean rules then collapse around that absence: an
//! empty AND child sinks the AND, an empty AND_NOT or AND_MAYBE right
//! side leaves the left side untouched, and so on. This keeps index-
//! dependent simplification out of the structural optimiser.

use std::sync::Arc;

use crate::error::{DoruError, Result};
use crate::index::IndexReader;
use crate::query::expand;
use crate::query::node::{BoolOp, PositionalOp, Query, QueryKind, QueryNode};
use crate::search::estimate;
use crate::search::matcher::{
    AllDocsMatcher, AndMatcher, AndMaybeMatcher, AndNotMatcher, FilterMatcher, Matcher, OrMatcher,
    PositionalMatcher, ScaleMatcher, SynonymMatcher, TermMatcher, ValueRangeMatcher, XorMatcher,
};
use crate::weight::{TermStats, WeightingScheme};

/// Statistics shared by every shard of a search.
#[derive(Debug)]
pub(crate) struct GlobalStats {
    pub collection_size: u64,
    pub avg_doc_length: f64,
    shards: Vec<Arc<dyn IndexReader>>,
}

impl GlobalStats {
    pub(crate) fn new(shards: Vec<Arc<dyn IndexReader>>) -> Self {
        let collection_size: u64 = shards.iter().map(|s| s.doc_count()).sum();
        let total_length: u64 = shards.iter().map(|s| s.total_doc_length()).sum();
        let avg_doc_length = if collection_size == 0 {
            0.0
        } else {
            total_length as f64 / collection_size as f64
        };
        GlobalStats {
            collection_size,
            avg_doc_length,
            shards,
        }
    }

    fn term_stats(&self, term: &[u8], wqf: u32) -> TermStats {
        let termfreq: u64 = self.shards.iter().map(|s| s.term_doc_freq(term)).sum();
        let collection_freq: u64 = self
            .shards
            .iter()
            .map(|s| s.term_collection_freq(term))
            .sum();
        TermStats {
            collection_size: self.collection_size,
            termfreq,
            collection_freq,
            avg_doc_length: self.avg_doc_length,
            wqf,
        }
    }
}

pub(crate) struct ShardContext<'a> {
    pub reader: &'a Arc<dyn IndexReader>,
    pub scheme: &'a dyn WeightingScheme,
    pub stats: &'a GlobalStats,
}

impl ShardContext<'_> {
    fn doc_count(&self) -> u64 {
        self.reader.doc_count()
    }
}

/// Lower a query on one shard. `None` means the subtree matches nothing
/// there.
pub(crate) fn lower(
    query: &Query,
    cx: &ShardContext<'_>,
    weighted: bool,
) -> Result<Option<Box<dyn Matcher>>> {
    match &*query.inner {
        QueryNode::MatchNothing => Ok(None),
        QueryNode::MatchAll => {
            let matcher = AllDocsMatcher::new(Arc::clone(cx.reader));
            Ok((!matcher.at_end()).then(|| Box::new(matcher) as Box<dyn Matcher>))
        }
        QueryNode::Term(leaf) => {
            let Some(postings) = cx.reader.term_postings(&leaf.term) else {
                return Ok(None);
            };
            if postings.is_empty() {
                return Ok(None);
            }
            let scorer = weighted
                .then(|| cx.scheme.for_term(&cx.stats.term_stats(&leaf.term, leaf.wqf)));
            Ok(Some(Box::new(TermMatcher::new(
                postings,
                scorer,
                Arc::clone(cx.reader),
            ))))
        }
        QueryNode::Source(source) => {
            let matcher = source.open(cx.reader)?;
            if matcher.at_end() {
                return Ok(None);
            }
            if weighted {
                Ok(Some(matcher))
            } else {
                Ok(Some(Box::new(ScaleMatcher::new(matcher, 0.0))))
            }
        }
        QueryNode::Bool { op, children } => lower_bool(*op, children, cx, weighted),
        QueryNode::Positional {
            op,
            window,
            children,
        } => lower_positional(*op, *window, children, cx, weighted),
        QueryNode::EliteSet { k, children } => {
            let mut lowered = Vec::with_capacity(children.len());
            for child in children {
                if let Some(matcher) = lower(child, cx, weighted)? {
                    lowered.push(matcher);
                }
            }
            if lowered.is_empty() {
                return Ok(None);
            }
            // Keep the k children that could contribute the most weight.
            lowered.sort_by(|a, b| {
                b.max_weight()
                    .partial_cmp(&a.max_weight())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            lowered.truncate(*k);
            Ok(Some(collapse_union(lowered, cx.doc_count())))
        }
        QueryNode::Scale { factor, child } => {
            // A zero factor zeroes the weights but keeps the match-set, so
            // the child is simply lowered unweighted.
            let child_weighted = weighted && *factor != 0.0;
            let Some(matcher) = lower(child, cx, child_weighted)? else {
                return Ok(None);
            };
            Ok(Some(Box::new(ScaleMatcher::new(matcher, *factor))))
        }
        QueryNode::Value { slot, lower, upper } => {
            let Some(stats) = cx.reader.value_stats(*slot) else {
                return Ok(None);
            };
            // A range past the stored bounds admits no document.
            if let Some(lo) = lower
                && *lo > stats.upper
            {
                return Ok(None);
            }
            if let Some(hi) = upper
                && *hi < stats.lower
            {
                return Ok(None);
            }
            let matcher = ValueRangeMatcher::new(
                Arc::clone(cx.reader),
                *slot,
                lower.clone(),
                upper.clone(),
            );
            if matcher.at_end() {
                return Ok(None);
            }
            Ok(Some(Box::new(matcher)))
        }
        QueryNode::Wildcard(spec) => {
            let expanded = expand::expand_wildcard(spec, cx.reader.as_ref())?;
            lower(&expanded, cx, weighted)
        }
        QueryNode::EditDistance(spec) => {
            let expanded = expand::expand_edit_distance(spec, cx.reader.as_ref())?;
            lower(&expanded, cx, weighted)
        }
    }
}

fn lower_bool(
    op: BoolOp,
    children: &[Query],
    cx: &ShardContext<'_>,
    weighted: bool,
) -> Result<Option<Box<dyn Matcher>>> {
    let doc_count = cx.doc_count();
    match op {
        BoolOp::And => {
            let mut lowered = Vec::with_capacity(children.len());
            for child in children {
                let Some(matcher) = lower(child, cx, weighted)? else {
                    return Ok(None);
                };
                lowered.push(matcher);
            }
            if lowered.len() == 1 {
                return Ok(lowered.pop());
            }
            let matcher = AndMatcher::new(lowered, doc_count)?;
            Ok((!matcher.at_end()).then(|| Box::new(matcher) as Box<dyn Matcher>))
        }
        BoolOp::Or => {
            let lowered = lower_live_children(children, cx, weighted)?;
            if lowered.is_empty() {
                return Ok(None);
            }
            Ok(Some(collapse_union(lowered, doc_count)))
        }
        BoolOp::Xor => {
            let lowered = lower_live_children(children, cx, weighted)?;
            match lowered.len() {
                0 => Ok(None),
                1 => Ok(lowered.into_iter().next()),
                _ => {
                    let matcher = XorMatcher::new(lowered, doc_count)?;
                    Ok((!matcher.at_end()).then(|| Box::new(matcher) as Box<dyn Matcher>))
                }
            }
        }
        BoolOp::AndNot => {
            let (left, right) = binary(children)?;
            let Some(left) = lower(left, cx, weighted)? else {
                return Ok(None);
            };
            // The right side only removes documents; when it matches
            // nothing here the left side passes through unchanged.
            let Some(right) = lower(right, cx, false)? else {
                return Ok(Some(left));
            };
            let matcher = AndNotMatcher::new(left, right, doc_count)?;
            Ok((!matcher.at_end()).then(|| Box::new(matcher) as Box<dyn Matcher>))
        }
        BoolOp::AndMaybe => {
            let (left, right) = binary(children)?;
            let Some(left) = lower(left, cx, weighted)? else {
                return Ok(None);
            };
            let Some(right) = lower(right, cx, weighted)? else {
                return Ok(Some(left));
            };
            Ok(Some(Box::new(AndMaybeMatcher::new(left, right)?)))
        }
        BoolOp::Filter => {
            let (left, right) = binary(children)?;
            let Some(left) = lower(left, cx, weighted)? else {
                return Ok(None);
            };
            let Some(right) = lower(right, cx, false)? else {
                return Ok(None);
            };
            let matcher = FilterMatcher::new(left, right, doc_count)?;
            Ok((!matcher.at_end()).then(|| Box::new(matcher) as Box<dyn Matcher>))
        }
        BoolOp::Synonym => {
            let lowered = lower_live_children(children, cx, false)?;
            if lowered.is_empty() {
                return Ok(None);
            }
            let scorer = weighted.then(|| {
                // The union is weighted as one pseudo-term whose termfreq
                // is the union estimate.
                let child_estimates: Vec<_> = lowered.iter().map(|c| c.estimates()).collect();
                let union_estimate = estimate::for_or(&child_estimates, doc_count).est;
                cx.scheme.for_term(&TermStats {
                    collection_size: cx.stats.collection_size,
                    termfreq: union_estimate,
                    collection_freq: union_estimate,
                    avg_doc_length: cx.stats.avg_doc_length,
                    wqf: 1,
                })
            });
            Ok(Some(Box::new(SynonymMatcher::new(
                lowered,
                scorer,
                Arc::clone(cx.reader),
                doc_count,
            ))))
        }
        BoolOp::Max => {
            let lowered = lower_live_children(children, cx, weighted)?;
            match lowered.len() {
                0 => Ok(None),
                1 => Ok(lowered.into_iter().next()),
                _ => Ok(Some(Box::new(OrMatcher::new_max(lowered, doc_count)))),
            }
        }
    }
}

fn lower_positional(
    op: PositionalOp,
    window: u32,
    children: &[Query],
    cx: &ShardContext<'_>,
    weighted: bool,
) -> Result<Option<Box<dyn Matcher>>> {
    // Composite children whose own structure constrains positions are not
    // supported; reject them whenever the query is evaluated, even on a
    // shard that could not match anyway.
    for child in children {
        match child.kind() {
            QueryKind::And | QueryKind::Near | QueryKind::Phrase => {
                return Err(DoruError::unimplemented(format!(
                    "{:?} is not supported as a subquery of a positional operator",
                    child.kind()
                )));
            }
            _ => {}
        }
    }
    // Without positional data this shard contributes no window matches,
    // but other shards still can.
    if !cx.reader.has_positions() {
        return Ok(None);
    }
    let mut lowered = Vec::with_capacity(children.len());
    for child in children {
        let Some(matcher) = lower(child, cx, weighted)? else {
            return Ok(None);
        };
        lowered.push(matcher);
    }
    let matcher = match op {
        PositionalOp::Phrase => PositionalMatcher::phrase(
            lowered,
            window,
            cx.doc_count(),
            cx.stats.avg_doc_length,
        )?,
        PositionalOp::Near => PositionalMatcher::near(
            lowered,
            window,
            cx.doc_count(),
            cx.stats.avg_doc_length,
        )?,
    };
    Ok((!matcher.at_end()).then(|| Box::new(matcher) as Box<dyn Matcher>))
}

fn lower_live_children(
    children: &[Query],
    cx: &ShardContext<'_>,
    weighted: bool,
) -> Result<Vec<Box<dyn Matcher>>> {
    let mut lowered = Vec::with_capacity(children.len());
    for child in children {
        if let Some(matcher) = lower(child, cx, weighted)? {
            lowered.push(matcher);
        }
    }
    Ok(lowered)
}

fn collapse_union(mut lowered: Vec<Box<dyn Matcher>>, doc_count: u64) -> Box<dyn Matcher> {
    if lowered.len() == 1 {
        return lowered.remove(0);
    }
    Box::new(OrMatcher::new(lowered, doc_count))
}

fn binary(children: &[Query]) -> Result<(&Query, &Query)> {
    match children {
        [left, right] => Ok((left, right)),
        _ => Err(DoruError::query(format!(
            "binary operator with {} subqueries",
            children.len()
        ))),
    }
}
