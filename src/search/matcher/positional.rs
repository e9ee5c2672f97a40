//! Positional combinators: PHRASE and NEAR.
//!
//! Both intersect their children like AND and then check a window
//! constraint over the children's term positions. A child with no
//! positional information can never satisfy a slot; a child that matches
//! all positions (such as `MatchAll`) satisfies its slot anywhere.

use crate::error::Result;
use crate::index::DocId;
use crate::search::estimate::{self, Estimates};
use crate::search::matcher::Matcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ordered,
    Unordered,
}

/// Matcher for PHRASE (ordered) and NEAR (unordered) windows.
#[derive(Debug)]
pub struct PositionalMatcher {
    children: Vec<Box<dyn Matcher>>,
    window: u32,
    mode: Mode,
    doc_count: u64,
    avg_doc_length: f64,
    exhausted: bool,
}

impl PositionalMatcher {
    /// Create a PHRASE matcher positioned on its first match.
    pub fn phrase(
        children: Vec<Box<dyn Matcher>>,
        window: u32,
        doc_count: u64,
        avg_doc_length: f64,
    ) -> Result<Self> {
        Self::new(children, window, Mode::Ordered, doc_count, avg_doc_length)
    }

    /// Create a NEAR matcher positioned on its first match.
    pub fn near(
        children: Vec<Box<dyn Matcher>>,
        window: u32,
        doc_count: u64,
        avg_doc_length: f64,
    ) -> Result<Self> {
        Self::new(children, window, Mode::Unordered, doc_count, avg_doc_length)
    }

    fn new(
        children: Vec<Box<dyn Matcher>>,
        window: u32,
        mode: Mode,
        doc_count: u64,
        avg_doc_length: f64,
    ) -> Result<Self> {
        let mut matcher = PositionalMatcher {
            children,
            window,
            mode,
            doc_count,
            avg_doc_length,
            exhausted: false,
        };
        matcher.align(0)?;
        Ok(matcher)
    }

    // Intersection stepping, continuing past documents that fail the
    // window check.
    fn align(&mut self, target: DocId) -> Result<()> {
        let mut target = target;
        'outer: loop {
            let mut highest = target;
            for child in &mut self.children {
                child.skip_to(target)?;
                if child.at_end() {
                    self.exhausted = true;
                    return Ok(());
                }
                highest = highest.max(child.docid());
            }
            if self.children.iter().any(|c| c.docid() != highest) {
                target = highest;
                continue 'outer;
            }
            if self.window_matches() {
                return Ok(());
            }
            target = highest + 1;
        }
    }

    fn window_matches(&self) -> bool {
        // Wildcard slots are satisfied anywhere, so only positional
        // children constrain the window.
        let mut lists: Vec<Vec<u32>> = Vec::with_capacity(self.children.len());
        for child in &self.children {
            if child.matches_all_positions() {
                continue;
            }
            match child.positions() {
                Some(positions) if !positions.is_empty() => lists.push(positions),
                // No positional information: the window can never be
                // satisfied (e.g. a shard indexed without positions).
                _ => return false,
            }
        }
        match self.mode {
            Mode::Ordered => ordered_within(&lists, self.window),
            Mode::Unordered => unordered_within(&lists, self.window),
        }
    }
}

// True when one position per list can be chosen in list order, strictly
// increasing, spanning at most `window` positions.
fn ordered_within(lists: &[Vec<u32>], window: u32) -> bool {
    let Some(first) = lists.first() else {
        return true;
    };
    for &start in first {
        let mut prev = start;
        let mut ok = true;
        for list in &lists[1..] {
            // The smallest usable position leaves the most room, so a
            // greedy choice is exact here.
            match list.iter().find(|&&p| p > prev) {
                Some(&p) if p - start < window => prev = p,
                _ => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            return true;
        }
    }
    false
}

// True when one position per list can be chosen, all distinct, spanning at
// most `window` positions, in any order.
fn unordered_within(lists: &[Vec<u32>], window: u32) -> bool {
    if lists.is_empty() {
        return true;
    }
    let mut anchors: Vec<u32> = lists.iter().flatten().copied().collect();
    anchors.sort_unstable();
    anchors.dedup();

    for &lo in &anchors {
        let hi = lo + window - 1;
        let candidates: Vec<Vec<u32>> = lists
            .iter()
            .map(|list| {
                list.iter()
                    .copied()
                    .filter(|&p| p >= lo && p <= hi)
                    .collect()
            })
            .collect();
        if candidates.iter().any(Vec::is_empty) {
            continue;
        }
        let mut used = Vec::with_capacity(candidates.len());
        if assign_distinct(&candidates, 0, &mut used) {
            return true;
        }
    }
    false
}

// Backtracking assignment of one distinct position per candidate list;
// duplicate terms at the same position only count once.
fn assign_distinct(candidates: &[Vec<u32>], idx: usize, used: &mut Vec<u32>) -> bool {
    if idx == candidates.len() {
        return true;
    }
    for &p in &candidates[idx] {
        if !used.contains(&p) {
            used.push(p);
            if assign_distinct(candidates, idx + 1, used) {
                return true;
            }
            used.pop();
        }
    }
    false
}

impl Matcher for PositionalMatcher {
    fn at_end(&self) -> bool {
        self.exhausted
    }

    fn docid(&self) -> DocId {
        self.children.first().map_or(DocId::MAX, |c| c.docid())
    }

    fn next(&mut self) -> Result<()> {
        if !self.exhausted {
            let target = self.docid() + 1;
            self.align(target)?;
        }
        Ok(())
    }

    fn skip_to(&mut self, target: DocId) -> Result<()> {
        if !self.exhausted && target > self.docid() {
            self.align(target)?;
        }
        Ok(())
    }

    fn weight(&self) -> f64 {
        self.children.iter().map(|c| c.weight()).sum()
    }

    fn max_weight(&self) -> f64 {
        self.children.iter().map(|c| c.max_weight()).sum()
    }

    fn estimates(&self) -> Estimates {
        let child_estimates: Vec<Estimates> =
            self.children.iter().map(|c| c.estimates()).collect();
        let intersection = estimate::for_and(&child_estimates, self.doc_count);
        estimate::for_positional(intersection, self.window, self.avg_doc_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::index::{Document, IndexReader, MemoryIndex};
    use crate::search::matcher::{AllDocsMatcher, OrMatcher, TermMatcher};

    fn reader(texts: &[&str]) -> Arc<dyn IndexReader> {
        let mut index = MemoryIndex::new();
        for text in texts {
            let mut doc = Document::new();
            doc.index_text(text);
            index.add_document(doc);
        }
        Arc::new(index)
    }

    fn term(reader: &Arc<dyn IndexReader>, term: &str) -> Box<dyn Matcher> {
        let postings = reader
            .term_postings(term.as_bytes())
            .unwrap_or_else(|| Arc::new(Vec::new()));
        Box::new(TermMatcher::new(postings, None, Arc::clone(reader)))
    }

    fn drain(matcher: &mut dyn Matcher) -> Vec<u64> {
        let mut docids = Vec::new();
        while !matcher.at_end() {
            docids.push(matcher.docid());
            matcher.next().unwrap();
        }
        docids
    }

    #[test]
    fn test_ordered_within() {
        assert!(ordered_within(&[vec![1], vec![2]], 2));
        assert!(!ordered_within(&[vec![2], vec![1]], 2));
        assert!(!ordered_within(&[vec![1], vec![3]], 2));
        assert!(ordered_within(&[vec![1], vec![3]], 3));
        assert!(ordered_within(&[vec![5, 10], vec![11], vec![12]], 3));
        assert!(!ordered_within(&[vec![5, 10], vec![11], vec![12]], 2));
    }

    #[test]
    fn test_unordered_within() {
        assert!(unordered_within(&[vec![2], vec![1]], 2));
        assert!(!unordered_within(&[vec![4], vec![1]], 2));
        // Identical position lists need two distinct positions.
        assert!(!unordered_within(&[vec![3], vec![3]], 2));
        assert!(unordered_within(&[vec![3, 4], vec![3, 4]], 2));
    }

    #[test]
    fn test_phrase_exact_adjacency() {
        let r = reader(&["the cat sat", "sat the cat", "the big cat"]);
        let mut m = PositionalMatcher::phrase(
            vec![term(&r, "the"), term(&r, "cat")],
            2,
            3,
            3.0,
        )
        .unwrap();
        assert_eq!(drain(&mut m), vec![1, 2]);
    }

    #[test]
    fn test_phrase_window_allows_gaps() {
        let r = reader(&["the big cat", "cat the big"]);
        let mut m = PositionalMatcher::phrase(
            vec![term(&r, "the"), term(&r, "cat")],
            3,
            2,
            3.0,
        )
        .unwrap();
        // Order must still hold: only doc 1 has "the" before "cat".
        assert_eq!(drain(&mut m), vec![1]);
    }

    #[test]
    fn test_near_is_order_free() {
        let r = reader(&["the big cat", "cat the big"]);
        let mut m = PositionalMatcher::near(
            vec![term(&r, "the"), term(&r, "cat")],
            3,
            2,
            3.0,
        )
        .unwrap();
        assert_eq!(drain(&mut m), vec![1, 2]);
    }

    #[test]
    fn test_near_repeated_term_needs_two_positions() {
        let r = reader(&["word other word", "word once"]);
        let mut m = PositionalMatcher::near(
            vec![term(&r, "word"), term(&r, "word")],
            3,
            2,
            3.0,
        )
        .unwrap();
        assert_eq!(drain(&mut m), vec![1]);

        // A tighter window misses the repeat.
        let mut m = PositionalMatcher::near(
            vec![term(&r, "word"), term(&r, "word")],
            2,
            2,
            3.0,
        )
        .unwrap();
        assert!(m.at_end());
    }

    #[test]
    fn test_phrase_over_or_children() {
        let r = reader(&["is a test", "a is test"]);
        let or = |rdr: &Arc<dyn IndexReader>| -> Box<dyn Matcher> {
            Box::new(OrMatcher::new(
                vec![term(rdr, "is"), term(rdr, "as"), term(rdr, "be")],
                2,
            ))
        };
        let mut m =
            PositionalMatcher::phrase(vec![or(&r), term(&r, "a")], 2, 2, 3.0).unwrap();
        assert_eq!(drain(&mut m), vec![1]);

        // Reversed slots match the other document only.
        let mut m =
            PositionalMatcher::phrase(vec![term(&r, "a"), or(&r)], 2, 2, 3.0).unwrap();
        assert_eq!(drain(&mut m), vec![2]);
    }

    #[test]
    fn test_match_all_child_fills_any_slot() {
        let r = reader(&["and then some"]);
        let all: Box<dyn Matcher> = Box::new(AllDocsMatcher::new(Arc::clone(&r)));
        let mut m =
            PositionalMatcher::phrase(vec![term(&r, "and"), all], 2, 1, 3.0).unwrap();
        assert_eq!(drain(&mut m), vec![1]);
    }

    #[test]
    fn test_positionless_child_matches_nothing() {
        // Terms indexed without positions cannot satisfy a window.
        let mut index = MemoryIndex::new();
        let mut doc = Document::new();
        doc.add_term("this");
        doc.add_term("paragraph");
        index.add_document(doc);
        let r: Arc<dyn IndexReader> = Arc::new(index);

        let m = PositionalMatcher::phrase(
            vec![term(&r, "this"), term(&r, "paragraph")],
            2,
            1,
            2.0,
        )
        .unwrap();
        assert!(m.at_end());
    }

    #[test]
    fn test_phrase_estimates_bounded() {
        let r = reader(&["a b", "a b", "b a"]);
        let m = PositionalMatcher::phrase(
            vec![term(&r, "a"), term(&r, "b")],
            2,
            3,
            2.0,
        )
        .unwrap();
        let e = m.estimates();
        assert_eq!(e.min, 0);
        assert_eq!(e.max, 3);
        assert!(e.est <= e.max);
    }
}
