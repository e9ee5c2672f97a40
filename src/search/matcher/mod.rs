//! Matcher trait and leaf matchers over posting lists.
//!
//! A matcher is a pull-based iterator over `(docid, weight)` pairs in
//! increasing docid order. Matchers are constructed already positioned on
//! their first match (or at end); `next` and `skip_to` move forward only.

pub mod boolean;
pub mod multi;
pub mod positional;

pub use self::boolean::{
    AndMatcher, AndMaybeMatcher, AndNotMatcher, FilterMatcher, OrMatcher, XorMatcher,
};
pub use self::multi::{ScaleMatcher, SynonymMatcher};
pub use self::positional::PositionalMatcher;

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::Result;
use crate::index::{DocId, IndexReader, PostingListRef};
use crate::search::estimate::Estimates;
use crate::weight::TermScorer;

/// Pull-based iterator over matching documents.
pub trait Matcher: Send + Debug {
    /// Whether the matcher is exhausted.
    fn at_end(&self) -> bool;

    /// The current docid. Only meaningful while `at_end()` is false.
    fn docid(&self) -> DocId;

    /// Advance to the next matching document.
    fn next(&mut self) -> Result<()>;

    /// Advance to the least matching docid >= `target`. Never moves
    /// backwards; a target at or before the current docid is a no-op.
    fn skip_to(&mut self, target: DocId) -> Result<()>;

    /// The weight of the current document.
    fn weight(&self) -> f64;

    /// An upper bound on `weight()` over all documents.
    fn max_weight(&self) -> f64;

    /// Within-document frequency at the current document, where the
    /// matcher tracks one (term matchers and unions of them).
    fn wdf(&self) -> u64 {
        0
    }

    /// Sorted term positions within the current document, where known.
    /// `None` means the matcher has no positional information.
    fn positions(&self) -> Option<Vec<u32>> {
        None
    }

    /// Whether the matcher satisfies any position slot (used by the
    /// positional operators for `MatchAll` children).
    fn matches_all_positions(&self) -> bool {
        false
    }

    /// Inclusive bounds on the docids this matcher can yield.
    fn docid_range(&self) -> (DocId, DocId) {
        (1, DocId::MAX)
    }

    /// Match-count bounds for this matcher.
    fn estimates(&self) -> Estimates;
}

/// An externally supplied posting source.
///
/// Implementations open one matcher per shard; the returned matcher obeys
/// the full [`Matcher`] contract.
pub trait ExternalSource: Send + Sync + Debug {
    /// Name used in query descriptions.
    fn name(&self) -> &str {
        "ExternalSource"
    }

    /// Open a matcher over one shard.
    fn open(&self, reader: &Arc<dyn IndexReader>) -> Result<Box<dyn Matcher>>;
}

/// Matcher over a single term's posting list.
pub struct TermMatcher {
    postings: PostingListRef,
    idx: usize,
    scorer: Option<Box<dyn TermScorer>>,
    reader: Arc<dyn IndexReader>,
}

impl Debug for TermMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermMatcher")
            .field("idx", &self.idx)
            .field("len", &self.postings.len())
            .finish()
    }
}

impl TermMatcher {
    /// Create a matcher over a posting list. Pass no scorer for an
    /// unweighted (zero-weight) evaluation.
    pub fn new(
        postings: PostingListRef,
        scorer: Option<Box<dyn TermScorer>>,
        reader: Arc<dyn IndexReader>,
    ) -> Self {
        TermMatcher {
            postings,
            idx: 0,
            scorer,
            reader,
        }
    }
}

impl Matcher for TermMatcher {
    fn at_end(&self) -> bool {
        self.idx >= self.postings.len()
    }

    fn docid(&self) -> DocId {
        self.postings.get(self.idx).map_or(DocId::MAX, |p| p.docid)
    }

    fn next(&mut self) -> Result<()> {
        if !self.at_end() {
            self.idx += 1;
        }
        Ok(())
    }

    fn skip_to(&mut self, target: DocId) -> Result<()> {
        while !self.at_end() && self.docid() < target {
            self.idx += 1;
        }
        Ok(())
    }

    fn weight(&self) -> f64 {
        match &self.scorer {
            Some(scorer) => {
                let posting = &self.postings[self.idx];
                scorer.score(posting.wdf, self.reader.doc_length(posting.docid))
            }
            None => 0.0,
        }
    }

    fn max_weight(&self) -> f64 {
        self.scorer.as_ref().map_or(0.0, |s| s.max_score())
    }

    fn wdf(&self) -> u64 {
        self.postings.get(self.idx).map_or(0, |p| p.wdf)
    }

    fn positions(&self) -> Option<Vec<u32>> {
        self.postings.get(self.idx).map(|p| p.positions.clone())
    }

    fn docid_range(&self) -> (DocId, DocId) {
        match (self.postings.first(), self.postings.last()) {
            (Some(first), Some(last)) => (first.docid, last.docid),
            _ => (1, 0),
        }
    }

    fn estimates(&self) -> Estimates {
        Estimates::exact(self.postings.len() as u64)
    }
}

/// Matcher over every document in a shard, with weight zero.
#[derive(Debug)]
pub struct AllDocsMatcher {
    reader: Arc<dyn IndexReader>,
    current: DocId,
    exhausted: bool,
}

impl AllDocsMatcher {
    /// Create a matcher positioned on the first document.
    pub fn new(reader: Arc<dyn IndexReader>) -> Self {
        let mut matcher = AllDocsMatcher {
            reader,
            current: 0,
            exhausted: false,
        };
        matcher.advance_from(1);
        matcher
    }

    fn advance_from(&mut self, mut candidate: DocId) {
        let max = self.reader.max_docid();
        while candidate <= max {
            if self.reader.doc_exists(candidate) {
                self.current = candidate;
                return;
            }
            candidate += 1;
        }
        self.exhausted = true;
    }
}

impl Matcher for AllDocsMatcher {
    fn at_end(&self) -> bool {
        self.exhausted
    }

    fn docid(&self) -> DocId {
        self.current
    }

    fn next(&mut self) -> Result<()> {
        if !self.exhausted {
            self.advance_from(self.current + 1);
        }
        Ok(())
    }

    fn skip_to(&mut self, target: DocId) -> Result<()> {
        if !self.exhausted && target > self.current {
            self.advance_from(target);
        }
        Ok(())
    }

    fn weight(&self) -> f64 {
        0.0
    }

    fn max_weight(&self) -> f64 {
        0.0
    }

    fn matches_all_positions(&self) -> bool {
        true
    }

    fn docid_range(&self) -> (DocId, DocId) {
        (1, self.reader.max_docid())
    }

    fn estimates(&self) -> Estimates {
        Estimates::exact(self.reader.doc_count())
    }
}

/// Matcher over documents whose slot value lies in a byte range.
#[derive(Debug)]
pub struct ValueRangeMatcher {
    reader: Arc<dyn IndexReader>,
    slot: u32,
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
    current: DocId,
    exhausted: bool,
}

impl ValueRangeMatcher {
    /// Create a matcher positioned on the first document in range.
    pub fn new(
        reader: Arc<dyn IndexReader>,
        slot: u32,
        lower: Option<Vec<u8>>,
        upper: Option<Vec<u8>>,
    ) -> Self {
        let mut matcher = ValueRangeMatcher {
            reader,
            slot,
            lower,
            upper,
            current: 0,
            exhausted: false,
        };
        matcher.advance_from(1);
        matcher
    }

    fn in_range(&self, docid: DocId) -> bool {
        match self.reader.value(self.slot, docid) {
            Some(value) => {
                self.lower.as_ref().is_none_or(|lo| value >= *lo)
                    && self.upper.as_ref().is_none_or(|hi| value <= *hi)
            }
            None => false,
        }
    }

    fn advance_from(&mut self, mut candidate: DocId) {
        let max = self.reader.max_docid();
        while candidate <= max {
            if self.in_range(candidate) {
                self.current = candidate;
                return;
            }
            candidate += 1;
        }
        self.exhausted = true;
    }
}

impl Matcher for ValueRangeMatcher {
    fn at_end(&self) -> bool {
        self.exhausted
    }

    fn docid(&self) -> DocId {
        self.current
    }

    fn next(&mut self) -> Result<()> {
        if !self.exhausted {
            self.advance_from(self.current + 1);
        }
        Ok(())
    }

    fn skip_to(&mut self, target: DocId) -> Result<()> {
        if !self.exhausted && target > self.current {
            self.advance_from(target);
        }
        Ok(())
    }

    fn weight(&self) -> f64 {
        0.0
    }

    fn max_weight(&self) -> f64 {
        0.0
    }

    fn estimates(&self) -> Estimates {
        let valued = self
            .reader
            .value_stats(self.slot)
            .map_or(0, |stats| stats.count);
        Estimates {
            min: 0,
            est: valued / 2,
            max: valued,
        }
    }
}

/// An [`ExternalSource`] weighting documents by a stored slot value parsed
/// as a float.
#[derive(Debug)]
pub struct ValueWeightSource {
    slot: u32,
}

impl ValueWeightSource {
    /// Create a source reading weights from `slot`.
    pub fn new(slot: u32) -> Self {
        ValueWeightSource { slot }
    }
}

impl ExternalSource for ValueWeightSource {
    fn name(&self) -> &str {
        "ValueWeightSource"
    }

    fn open(&self, reader: &Arc<dyn IndexReader>) -> Result<Box<dyn Matcher>> {
        Ok(Box::new(ValueWeightMatcher {
            inner: ValueRangeMatcher::new(Arc::clone(reader), self.slot, None, None),
        }))
    }
}

#[derive(Debug)]
struct ValueWeightMatcher {
    inner: ValueRangeMatcher,
}

impl ValueWeightMatcher {
    fn current_value(&self) -> f64 {
        self.inner
            .reader
            .value(self.inner.slot, self.inner.current)
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|text| text.parse().ok())
            .unwrap_or(0.0)
    }
}

impl Matcher for ValueWeightMatcher {
    fn at_end(&self) -> bool {
        self.inner.at_end()
    }

    fn docid(&self) -> DocId {
        self.inner.docid()
    }

    fn next(&mut self) -> Result<()> {
        self.inner.next()
    }

    fn skip_to(&mut self, target: DocId) -> Result<()> {
        self.inner.skip_to(target)
    }

    fn weight(&self) -> f64 {
        self.current_value()
    }

    fn max_weight(&self) -> f64 {
        f64::MAX
    }

    fn estimates(&self) -> Estimates {
        self.inner.estimates()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, MemoryIndex};

    fn drain(matcher: &mut dyn Matcher) -> Vec<DocId> {
        let mut docids = Vec::new();
        while !matcher.at_end() {
            docids.push(matcher.docid());
            matcher.next().unwrap();
        }
        docids
    }

    fn reader_with_terms(docs: &[&[&str]]) -> Arc<dyn IndexReader> {
        let mut index = MemoryIndex::new();
        for terms in docs {
            let mut doc = Document::new();
            for term in *terms {
                doc.add_term(*term);
            }
            index.add_document(doc);
        }
        Arc::new(index)
    }

    #[test]
    fn test_term_matcher_iteration() {
        let reader = reader_with_terms(&[&["a"], &["b"], &["a"], &["a", "b"]]);
        let postings = reader.term_postings(b"a").unwrap();
        let mut m = TermMatcher::new(postings, None, Arc::clone(&reader));
        assert_eq!(drain(&mut m), vec![1, 3, 4]);
        assert_eq!(m.estimates(), Estimates::exact(3));
    }

    #[test]
    fn test_term_matcher_skip_to() {
        let reader = reader_with_terms(&[&["a"], &["b"], &["a"], &["a"]]);
        let postings = reader.term_postings(b"a").unwrap();
        let mut m = TermMatcher::new(postings, None, Arc::clone(&reader));
        m.skip_to(2).unwrap();
        assert_eq!(m.docid(), 3);
        // Backwards targets are no-ops.
        m.skip_to(1).unwrap();
        assert_eq!(m.docid(), 3);
        m.skip_to(9).unwrap();
        assert!(m.at_end());
    }

    #[test]
    fn test_all_docs_matcher() {
        let reader = reader_with_terms(&[&["a"], &["b"], &["c"]]);
        let mut m = AllDocsMatcher::new(Arc::clone(&reader));
        assert!(m.matches_all_positions());
        assert_eq!(m.weight(), 0.0);
        assert_eq!(drain(&mut m), vec![1, 2, 3]);
    }

    #[test]
    fn test_value_range_matcher() {
        let mut index = MemoryIndex::new();
        for value in ["apple", "banana", "cherry"] {
            let mut doc = Document::new();
            doc.add_term("x");
            doc.set_value(0, value);
            index.add_document(doc);
        }
        let reader: Arc<dyn IndexReader> = Arc::new(index);

        let mut m = ValueRangeMatcher::new(
            Arc::clone(&reader),
            0,
            Some(b"b".to_vec()),
            Some(b"cherry".to_vec()),
        );
        assert_eq!(drain(&mut m), vec![2, 3]);

        let mut m = ValueRangeMatcher::new(Arc::clone(&reader), 0, Some(b"d".to_vec()), None);
        assert!(m.at_end());
        assert_eq!(drain(&mut m), Vec::<DocId>::new());
    }

    #[test]
    fn test_value_weight_source() {
        let mut index = MemoryIndex::new();
        for value in ["1.5", "0.25"] {
            let mut doc = Document::new();
            doc.add_term("x");
            doc.set_value(3, value);
            index.add_document(doc);
        }
        let reader: Arc<dyn IndexReader> = Arc::new(index);

        let source = ValueWeightSource::new(3);
        let mut m = source.open(&reader).unwrap();
        assert_eq!(m.docid(), 1);
        assert_eq!(m.weight(), 1.5);
        m.next().unwrap();
        assert_eq!(m.weight(), 0.25);
        m.next().unwrap();
        assert!(m.at_end());
    }
}
