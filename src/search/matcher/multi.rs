//! Synonym and scale-weight combinators.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::Result;
use crate::index::{DocId, IndexReader};
use crate::search::estimate::Estimates;
use crate::search::matcher::{Matcher, OrMatcher};
use crate::weight::TermScorer;

/// Children weighted as one pseudo-term.
///
/// The union of the children is enumerated like OR, but the weighting
/// scheme is applied once, to the summed within-document frequency, so a
/// term matched through several children is not weighted twice.
pub struct SynonymMatcher {
    union: OrMatcher,
    scorer: Option<Box<dyn TermScorer>>,
    reader: Arc<dyn IndexReader>,
}

impl Debug for SynonymMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynonymMatcher")
            .field("union", &self.union)
            .finish()
    }
}

impl SynonymMatcher {
    /// Create a synonym matcher. Children must be lowered unweighted;
    /// pass no scorer for a fully unweighted evaluation.
    pub fn new(
        children: Vec<Box<dyn Matcher>>,
        scorer: Option<Box<dyn TermScorer>>,
        reader: Arc<dyn IndexReader>,
        doc_count: u64,
    ) -> Self {
        SynonymMatcher {
            union: OrMatcher::new(children, doc_count),
            scorer,
            reader,
        }
    }
}

impl Matcher for SynonymMatcher {
    fn at_end(&self) -> bool {
        self.union.at_end()
    }

    fn docid(&self) -> DocId {
        self.union.docid()
    }

    fn next(&mut self) -> Result<()> {
        self.union.next()
    }

    fn skip_to(&mut self, target: DocId) -> Result<()> {
        self.union.skip_to(target)
    }

    fn weight(&self) -> f64 {
        match &self.scorer {
            Some(scorer) => {
                let doc_length = self.reader.doc_length(self.union.docid());
                scorer.score(self.union.wdf(), doc_length)
            }
            None => 0.0,
        }
    }

    fn max_weight(&self) -> f64 {
        self.scorer.as_ref().map_or(0.0, |s| s.max_score())
    }

    fn wdf(&self) -> u64 {
        self.union.wdf()
    }

    fn positions(&self) -> Option<Vec<u32>> {
        self.union.positions()
    }

    fn estimates(&self) -> Estimates {
        self.union.estimates()
    }
}

/// Delegates to its child with the weight multiplied by a constant.
#[derive(Debug)]
pub struct ScaleMatcher {
    child: Box<dyn Matcher>,
    factor: f64,
}

impl ScaleMatcher {
    /// Create a scale matcher over `child`.
    pub fn new(child: Box<dyn Matcher>, factor: f64) -> Self {
        ScaleMatcher { child, factor }
    }
}

impl Matcher for ScaleMatcher {
    fn at_end(&self) -> bool {
        self.child.at_end()
    }

    fn docid(&self) -> DocId {
        self.child.docid()
    }

    fn next(&mut self) -> Result<()> {
        self.child.next()
    }

    fn skip_to(&mut self, target: DocId) -> Result<()> {
        self.child.skip_to(target)
    }

    fn weight(&self) -> f64 {
        self.factor * self.child.weight()
    }

    fn max_weight(&self) -> f64 {
        self.factor * self.child.max_weight()
    }

    fn wdf(&self) -> u64 {
        self.child.wdf()
    }

    fn positions(&self) -> Option<Vec<u32>> {
        self.child.positions()
    }

    fn matches_all_positions(&self) -> bool {
        self.child.matches_all_positions()
    }

    fn docid_range(&self) -> (DocId, DocId) {
        self.child.docid_range()
    }

    fn estimates(&self) -> Estimates {
        self.child.estimates()
    }
}
