//! Iteration over the terms of a query tree.

use crate::query::node::{Query, QueryNode};

/// Iterator over the terms of a query, yielded as owned byte strings.
#[derive(Debug)]
pub struct Terms {
    items: std::vec::IntoIter<Vec<u8>>,
}

impl Iterator for Terms {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        self.items.next()
    }
}

impl ExactSizeIterator for Terms {
    fn len(&self) -> usize {
        self.items.len()
    }
}

impl Query {
    /// Iterate every term leaf in tree order, duplicates preserved.
    ///
    /// Synthetic leaves (`MatchAll`, `MatchNothing`, posting sources) and
    /// empty-string terms are skipped.
    pub fn terms(&self) -> Terms {
        let mut items = Vec::new();
        collect(self, &mut items);
        Terms {
            items: items.into_iter(),
        }
    }

    /// Iterate the distinct terms of the query in lexicographic byte order.
    pub fn unique_terms(&self) -> Terms {
        let mut items = Vec::new();
        collect(self, &mut items);
        items.sort_unstable();
        items.dedup();
        Terms {
            items: items.into_iter(),
        }
    }
}

fn collect(query: &Query, out: &mut Vec<Vec<u8>>) {
    match &*query.inner {
        QueryNode::Term(leaf) => {
            if !leaf.term.is_empty() {
                out.push(leaf.term.clone());
            }
        }
        QueryNode::Bool { children, .. }
        | QueryNode::Positional { children, .. }
        | QueryNode::EliteSet { children, .. } => {
            for child in children {
                collect(child, out);
            }
        }
        QueryNode::Scale { child, .. } => collect(child, out),
        QueryNode::MatchAll
        | QueryNode::MatchNothing
        | QueryNode::Source(_)
        | QueryNode::Value { .. }
        | QueryNode::Wildcard(_)
        | QueryNode::EditDistance(_) => {}
    }
}
