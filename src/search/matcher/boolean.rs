//! Boolean combinators over child matchers.

use crate::error::Result;
use crate::index::DocId;
use crate::search::estimate::{self, Estimates};
use crate::search::matcher::Matcher;

fn child_estimates(children: &[Box<dyn Matcher>]) -> Vec<Estimates> {
    children.iter().map(|c| c.estimates()).collect()
}

/// Intersection; weight is the sum of child weights.
#[derive(Debug)]
pub struct AndMatcher {
    children: Vec<Box<dyn Matcher>>,
    doc_count: u64,
    exhausted: bool,
}

impl AndMatcher {
    /// Create an intersection matcher positioned on its first match.
    pub fn new(children: Vec<Box<dyn Matcher>>, doc_count: u64) -> Result<Self> {
        // Disjoint child docid ranges mean an empty intersection without
        // touching any posting list.
        let mut lowest = 1;
        let mut highest = DocId::MAX;
        for child in &children {
            let (lo, hi) = child.docid_range();
            lowest = lowest.max(lo);
            highest = highest.min(hi);
        }
        let mut matcher = AndMatcher {
            children,
            doc_count,
            exhausted: lowest > highest,
        };
        if !matcher.exhausted {
            matcher.align(lowest)?;
        }
        Ok(matcher)
    }

    // Position every child on the least common docid >= target.
    fn align(&mut self, target: DocId) -> Result<()> {
        let mut target = target;
        loop {
            let mut highest = target;
            for child in &mut self.children {
                child.skip_to(target)?;
                if child.at_end() {
                    self.exhausted = true;
                    return Ok(());
                }
                highest = highest.max(child.docid());
            }
            if self.children.iter().all(|c| c.docid() == highest) {
                return Ok(());
            }
            target = highest;
        }
    }
}

impl Matcher for AndMatcher {
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
        estimate::for_and(&child_estimates(&self.children), self.doc_count)
    }
}

/// Union; weight is the sum over children matching the current document.
#[derive(Debug)]
pub struct OrMatcher {
    children: Vec<Box<dyn Matcher>>,
    doc_count: u64,
    take_max: bool,
}

impl OrMatcher {
    /// Create a union matcher summing child weights.
    pub fn new(children: Vec<Box<dyn Matcher>>, doc_count: u64) -> Self {
        OrMatcher {
            children,
            doc_count,
            take_max: false,
        }
    }

    /// Create a union matcher taking the best child weight per document
    /// (the MAX operator).
    pub fn new_max(children: Vec<Box<dyn Matcher>>, doc_count: u64) -> Self {
        OrMatcher {
            children,
            doc_count,
            take_max: true,
        }
    }

    fn current(&self) -> Option<DocId> {
        self.children
            .iter()
            .filter(|c| !c.at_end())
            .map(|c| c.docid())
            .min()
    }

    fn matching(&self) -> impl Iterator<Item = &Box<dyn Matcher>> {
        let current = self.current();
        self.children
            .iter()
            .filter(move |c| !c.at_end() && Some(c.docid()) == current)
    }
}

impl Matcher for OrMatcher {
    fn at_end(&self) -> bool {
        self.current().is_none()
    }

    fn docid(&self) -> DocId {
        self.current().unwrap_or(DocId::MAX)
    }

    fn next(&mut self) -> Result<()> {
        if let Some(current) = self.current() {
            for child in &mut self.children {
                if !child.at_end() && child.docid() == current {
                    child.next()?;
                }
            }
        }
        Ok(())
    }

    fn skip_to(&mut self, target: DocId) -> Result<()> {
        for child in &mut self.children {
            if !child.at_end() && child.docid() < target {
                child.skip_to(target)?;
            }
        }
        Ok(())
    }

    fn weight(&self) -> f64 {
        if self.take_max {
            self.matching()
                .map(|c| c.weight())
                .fold(0.0, f64::max)
        } else {
            self.matching().map(|c| c.weight()).sum()
        }
    }

    fn max_weight(&self) -> f64 {
        if self.take_max {
            self.children
                .iter()
                .map(|c| c.max_weight())
                .fold(0.0, f64::max)
        } else {
            self.children.iter().map(|c| c.max_weight()).sum()
        }
    }

    fn wdf(&self) -> u64 {
        self.matching().map(|c| c.wdf()).sum()
    }

    fn positions(&self) -> Option<Vec<u32>> {
        // Any matching child's term can fill a position slot.
        let mut merged: Vec<u32> = Vec::new();
        let mut any = false;
        for child in self.matching() {
            if let Some(positions) = child.positions() {
                any = true;
                merged.extend(positions);
            }
        }
        if !any {
            return None;
        }
        merged.sort_unstable();
        merged.dedup();
        Some(merged)
    }

    fn docid_range(&self) -> (DocId, DocId) {
        // The union spans every child's range; a child with a small range
        // must not clip the others (that once lost documents here).
        let mut lowest = DocId::MAX;
        let mut highest = 0;
        for child in &self.children {
            let (lo, hi) = child.docid_range();
            lowest = lowest.min(lo);
            highest = highest.max(hi);
        }
        (lowest, highest)
    }

    fn estimates(&self) -> Estimates {
        estimate::for_or(&child_estimates(&self.children), self.doc_count)
    }
}

/// Documents matched by an odd number of children.
#[derive(Debug)]
pub struct XorMatcher {
    children: Vec<Box<dyn Matcher>>,
    doc_count: u64,
    current: DocId,
    exhausted: bool,
}

impl XorMatcher {
    /// Create a symmetric-difference matcher positioned on its first match.
    pub fn new(children: Vec<Box<dyn Matcher>>, doc_count: u64) -> Result<Self> {
        let mut matcher = XorMatcher {
            children,
            doc_count,
            current: 0,
            exhausted: false,
        };
        matcher.settle()?;
        Ok(matcher)
    }

    fn frontier(&self) -> Option<DocId> {
        self.children
            .iter()
            .filter(|c| !c.at_end())
            .map(|c| c.docid())
            .min()
    }

    // Advance until the least live docid is matched by an odd number of
    // children.
    fn settle(&mut self) -> Result<()> {
        loop {
            let Some(candidate) = self.frontier() else {
                self.exhausted = true;
                return Ok(());
            };
            let matching = self
                .children
                .iter()
                .filter(|c| !c.at_end() && c.docid() == candidate)
                .count();
            if matching % 2 == 1 {
                self.current = candidate;
                return Ok(());
            }
            for child in &mut self.children {
                if !child.at_end() && child.docid() == candidate {
                    child.next()?;
                }
            }
        }
    }
}

impl Matcher for XorMatcher {
    fn at_end(&self) -> bool {
        self.exhausted
    }

    fn docid(&self) -> DocId {
        self.current
    }

    fn next(&mut self) -> Result<()> {
        if !self.exhausted {
            for child in &mut self.children {
                if !child.at_end() && child.docid() == self.current {
                    child.next()?;
                }
            }
            self.settle()?;
        }
        Ok(())
    }

    fn skip_to(&mut self, target: DocId) -> Result<()> {
        if !self.exhausted && target > self.current {
            for child in &mut self.children {
                if !child.at_end() && child.docid() < target {
                    child.skip_to(target)?;
                }
            }
            self.settle()?;
        }
        Ok(())
    }

    fn weight(&self) -> f64 {
        self.children
            .iter()
            .filter(|c| !c.at_end() && c.docid() == self.current)
            .map(|c| c.weight())
            .sum()
    }

    fn max_weight(&self) -> f64 {
        self.children.iter().map(|c| c.max_weight()).sum()
    }

    fn estimates(&self) -> Estimates {
        estimate::for_xor(&child_estimates(&self.children), self.doc_count)
    }
}

/// Left minus right; weight from the left only.
#[derive(Debug)]
pub struct AndNotMatcher {
    left: Box<dyn Matcher>,
    right: Box<dyn Matcher>,
    doc_count: u64,
}

impl AndNotMatcher {
    /// Create a difference matcher positioned on its first match.
    pub fn new(
        left: Box<dyn Matcher>,
        right: Box<dyn Matcher>,
        doc_count: u64,
    ) -> Result<Self> {
        let mut matcher = AndNotMatcher {
            left,
            right,
            doc_count,
        };
        matcher.settle()?;
        Ok(matcher)
    }

    fn settle(&mut self) -> Result<()> {
        while !self.left.at_end() {
            let candidate = self.left.docid();
            self.right.skip_to(candidate)?;
            if self.right.at_end() || self.right.docid() != candidate {
                break;
            }
            self.left.next()?;
        }
        Ok(())
    }
}

impl Matcher for AndNotMatcher {
    fn at_end(&self) -> bool {
        self.left.at_end()
    }

    fn docid(&self) -> DocId {
        self.left.docid()
    }

    fn next(&mut self) -> Result<()> {
        self.left.next()?;
        self.settle()
    }

    fn skip_to(&mut self, target: DocId) -> Result<()> {
        self.left.skip_to(target)?;
        self.settle()
    }

    fn weight(&self) -> f64 {
        self.left.weight()
    }

    fn max_weight(&self) -> f64 {
        self.left.max_weight()
    }

    fn wdf(&self) -> u64 {
        self.left.wdf()
    }

    fn positions(&self) -> Option<Vec<u32>> {
        self.left.positions()
    }

    fn docid_range(&self) -> (DocId, DocId) {
        self.left.docid_range()
    }

    fn estimates(&self) -> Estimates {
        estimate::for_and_not(
            self.left.estimates(),
            self.right.estimates(),
            self.doc_count,
        )
    }
}

/// Left, with the right's weight added where it also matches.
#[derive(Debug)]
pub struct AndMaybeMatcher {
    left: Box<dyn Matcher>,
    right: Box<dyn Matcher>,
}

impl AndMaybeMatcher {
    /// Create a maybe matcher positioned on the left's first match.
    pub fn new(left: Box<dyn Matcher>, right: Box<dyn Matcher>) -> Result<Self> {
        let mut matcher = AndMaybeMatcher { left, right };
        matcher.sync()?;
        Ok(matcher)
    }

    fn sync(&mut self) -> Result<()> {
        if !self.left.at_end() {
            self.right.skip_to(self.left.docid())?;
        }
        Ok(())
    }

    fn right_matches(&self) -> bool {
        !self.left.at_end() && !self.right.at_end() && self.right.docid() == self.left.docid()
    }
}

impl Matcher for AndMaybeMatcher {
    fn at_end(&self) -> bool {
        self.left.at_end()
    }

    fn docid(&self) -> DocId {
        self.left.docid()
    }

    fn next(&mut self) -> Result<()> {
        self.left.next()?;
        self.sync()
    }

    fn skip_to(&mut self, target: DocId) -> Result<()> {
        self.left.skip_to(target)?;
        self.sync()
    }

    fn weight(&self) -> f64 {
        let mut weight = self.left.weight();
        if self.right_matches() {
            weight += self.right.weight();
        }
        weight
    }

    fn max_weight(&self) -> f64 {
        self.left.max_weight() + self.right.max_weight()
    }

    fn wdf(&self) -> u64 {
        self.left.wdf()
    }

    fn positions(&self) -> Option<Vec<u32>> {
        self.left.positions()
    }

    fn estimates(&self) -> Estimates {
        self.left.estimates()
    }
}

/// Left restricted to the right's docid set; weight from the left only.
#[derive(Debug)]
pub struct FilterMatcher {
    inner: AndMatcher,
}

impl FilterMatcher {
    /// Create a filter matcher positioned on its first match. The right
    /// side should be lowered unweighted.
    pub fn new(
        left: Box<dyn Matcher>,
        right: Box<dyn Matcher>,
        doc_count: u64,
    ) -> Result<Self> {
        Ok(FilterMatcher {
            inner: AndMatcher::new(vec![left, right], doc_count)?,
        })
    }

    fn left(&self) -> &dyn Matcher {
        self.inner.children[0].as_ref()
    }
}

impl Matcher for FilterMatcher {
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
        self.left().weight()
    }

    fn max_weight(&self) -> f64 {
        self.left().max_weight()
    }

    fn wdf(&self) -> u64 {
        self.left().wdf()
    }

    fn positions(&self) -> Option<Vec<u32>> {
        self.left().positions()
    }

    fn estimates(&self) -> Estimates {
        self.inner.estimates()
    }
}
