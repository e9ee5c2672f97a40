//! Search execution: databases, the searcher, and match sets.

pub mod estimate;
mod lower;
pub mod matcher;

pub use self::estimate::Estimates;
pub use self::matcher::{ExternalSource, Matcher, ValueWeightSource};

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DoruError, Result};
use crate::index::{DocId, IndexReader, MemoryIndex};
use crate::query::node::{Query, QueryNode};
use crate::query::optimizer;
use crate::search::lower::{GlobalStats, ShardContext};
use crate::weight::{Bm25Weight, WeightingScheme};

/// A set of index shards searched as one collection.
///
/// Global docids interleave the shards: local docid `l` of shard `s` (of
/// `n` shards) becomes `(l - 1) * n + s + 1`, so single-shard databases
/// keep their docids unchanged.
#[derive(Debug, Clone, Default)]
pub struct Database {
    shards: Vec<Arc<dyn IndexReader>>,
}

impl Database {
    /// Create an empty database.
    pub fn new() -> Self {
        Database::default()
    }

    /// Add a shard.
    pub fn add_shard(&mut self, reader: Arc<dyn IndexReader>) {
        self.shards.push(reader);
    }

    /// Add an in-memory index as a shard.
    pub fn add_index(&mut self, index: MemoryIndex) {
        self.add_shard(Arc::new(index));
    }

    /// The shards of this database.
    pub fn shards(&self) -> &[Arc<dyn IndexReader>] {
        &self.shards
    }

    /// Total number of documents across all shards.
    pub fn doc_count(&self) -> u64 {
        self.shards.iter().map(|s| s.doc_count()).sum()
    }

    /// Whether any shard stores positional information.
    pub fn has_positions(&self) -> bool {
        self.shards.iter().any(|s| s.has_positions())
    }

    fn global_docid(&self, shard: usize, local: DocId) -> DocId {
        (local - 1) * self.shards.len() as u64 + shard as u64 + 1
    }

    fn local_docid(&self, global: DocId) -> Option<(usize, DocId)> {
        let n = self.shards.len() as u64;
        if n == 0 || global == 0 {
            return None;
        }
        let shard = ((global - 1) % n) as usize;
        let local = (global - 1) / n + 1;
        Some((shard, local))
    }
}

impl From<MemoryIndex> for Database {
    fn from(index: MemoryIndex) -> Self {
        let mut db = Database::new();
        db.add_index(index);
        db
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The (global) document ID.
    pub docid: DocId,
    /// The document's weight under the active weighting scheme.
    pub weight: f64,
}

/// A ranked page of results plus match-count bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSet {
    /// The requested page of hits, best first.
    pub hits: Vec<SearchHit>,
    /// Fewest documents that can match the query.
    pub matches_lower_bound: u64,
    /// Estimated number of matching documents.
    pub matches_estimated: u64,
    /// Most documents that can match the query.
    pub matches_upper_bound: u64,
}

impl MatchSet {
    /// Number of hits in this page.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Whether the page is empty.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// The docids of this page, in rank order.
    pub fn docids(&self) -> Vec<DocId> {
        self.hits.iter().map(|h| h.docid).collect()
    }

    /// Serialize this match set to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a match set from JSON.
    pub fn from_json(json: &str) -> Result<MatchSet> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Executes queries against a [`Database`].
///
/// A searcher is single-threaded; it borrows only immutable index state,
/// so any number of searchers may run against the same database at once.
#[derive(Debug)]
pub struct Searcher {
    db: Database,
    query: Option<Query>,
    optimized: Option<Query>,
    scheme: Arc<dyn WeightingScheme>,
}

impl Searcher {
    /// Create a searcher with the default BM25 weighting scheme.
    pub fn new(db: Database) -> Self {
        Searcher {
            db,
            query: None,
            optimized: None,
            scheme: Arc::new(Bm25Weight::new()),
        }
    }

    /// Set the query to execute. The query is optimised here; index-
    /// dependent rewrites and unsupported-composition errors surface at
    /// [`Searcher::mset`] time.
    pub fn set_query(&mut self, query: Query) {
        self.optimized = Some(optimizer::optimize(&query));
        self.query = Some(query);
    }

    /// Replace the weighting scheme.
    pub fn set_weighting_scheme(&mut self, scheme: Arc<dyn WeightingScheme>) {
        self.scheme = scheme;
    }

    /// Run the query and return `max_items` ranked hits starting at rank
    /// `first`.
    ///
    /// With `max_items == 0` no documents are enumerated and the
    /// match-count bounds come purely from the estimator; otherwise the
    /// match set is fully enumerated and the bounds are exact.
    pub fn mset(&self, first: usize, max_items: usize) -> Result<MatchSet> {
        let query = self
            .optimized
            .as_ref()
            .ok_or_else(|| DoruError::query("no query set"))?;

        let stats = GlobalStats::new(self.db.shards.to_vec());
        let mut bounds = Estimates::none();
        let mut hits: Vec<SearchHit> = Vec::new();

        for (shard, reader) in self.db.shards.iter().enumerate() {
            let cx = ShardContext {
                reader,
                scheme: self.scheme.as_ref(),
                stats: &stats,
            };
            let Some(mut matcher) = lower::lower(query, &cx, true)? else {
                continue;
            };
            bounds = bounds.combine_shards(matcher.estimates());
            if max_items > 0 {
                while !matcher.at_end() {
                    hits.push(SearchHit {
                        docid: self.db.global_docid(shard, matcher.docid()),
                        weight: matcher.weight(),
                    });
                    matcher.next()?;
                }
            }
        }

        if max_items > 0 {
            // Fully enumerated, so the bounds are exact.
            bounds = Estimates::exact(hits.len() as u64);
        }

        hits.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.docid.cmp(&b.docid))
        });
        let hits: Vec<SearchHit> = hits.into_iter().skip(first).take(max_items).collect();

        Ok(MatchSet {
            hits,
            matches_lower_bound: bounds.min,
            matches_estimated: bounds.est.clamp(bounds.min, bounds.max),
            matches_upper_bound: bounds.max,
        })
    }

    /// The explicit query terms that match `docid`, deduplicated and in
    /// byte order. Terms introduced by wildcard or edit-distance
    /// expansion are not reported.
    ///
    /// Fails with an index error when `docid` is not in the database.
    pub fn matching_terms(&self, docid: DocId) -> Result<Vec<Vec<u8>>> {
        let query = self
            .query
            .as_ref()
            .ok_or_else(|| DoruError::query("no query set"))?;
        let reader = self
            .db
            .local_docid(docid)
            .and_then(|(shard, local)| {
                let reader = self.db.shards.get(shard)?;
                reader.doc_exists(local).then_some((reader, local))
            });
        let Some((reader, local)) = reader else {
            return Err(DoruError::index(format!("document {docid} not found")));
        };

        let mut leaves = Vec::new();
        collect_explicit_terms(query, &mut leaves);
        leaves.sort_unstable();
        leaves.dedup();
        leaves.retain(|term| {
            reader
                .term_postings(term)
                .is_some_and(|postings| postings.binary_search_by_key(&local, |p| p.docid).is_ok())
        });
        Ok(leaves)
    }
}

fn collect_explicit_terms(query: &Query, out: &mut Vec<Vec<u8>>) {
    match &*query.inner {
        QueryNode::Term(leaf) => {
            if !leaf.synthetic && !leaf.term.is_empty() {
                out.push(leaf.term.clone());
            }
        }
        QueryNode::Bool { children, .. }
        | QueryNode::Positional { children, .. }
        | QueryNode::EliteSet { children, .. } => {
            for child in children {
                collect_explicit_terms(child, out);
            }
        }
        QueryNode::Scale { child, .. } => collect_explicit_terms(child, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Document;
    use crate::weight::BoolWeight;

    fn simple_db() -> Database {
        let mut index = MemoryIndex::new();
        for text in ["apple banana", "banana cherry", "apple cherry"] {
            let mut doc = Document::new();
            doc.index_text(text);
            index.add_document(doc);
        }
        Database::from(index)
    }

    fn bool_searcher(db: Database) -> Searcher {
        let mut searcher = Searcher::new(db);
        searcher.set_weighting_scheme(Arc::new(BoolWeight::new()));
        searcher
    }

    #[test]
    fn test_mset_requires_query() {
        let searcher = Searcher::new(simple_db());
        assert!(searcher.mset(0, 10).is_err());
    }

    #[test]
    fn test_term_search() {
        let mut searcher = bool_searcher(simple_db());
        searcher.set_query(Query::term("banana"));
        let mset = searcher.mset(0, 10).unwrap();
        assert_eq!(mset.docids(), vec![1, 2]);
        assert_eq!(mset.matches_lower_bound, 2);
        assert_eq!(mset.matches_estimated, 2);
        assert_eq!(mset.matches_upper_bound, 2);
    }

    #[test]
    fn test_paging() {
        let mut searcher = bool_searcher(simple_db());
        searcher.set_query(Query::term("apple") | Query::term("banana"));
        let all = searcher.mset(0, 10).unwrap();
        assert_eq!(all.docids(), vec![1, 2, 3]);

        let page = searcher.mset(1, 1).unwrap();
        assert_eq!(page.docids(), vec![2]);
        // Bounds describe the whole match set, not the page.
        assert_eq!(page.matches_estimated, 3);
    }

    #[test]
    fn test_zero_items_uses_estimator_only() {
        let mut searcher = bool_searcher(simple_db());
        searcher.set_query(Query::term("apple") & Query::term("banana"));
        let mset = searcher.mset(0, 0).unwrap();
        assert!(mset.is_empty());
        assert!(mset.matches_lower_bound <= 1);
        assert!(mset.matches_upper_bound >= 1);
        assert!(mset.matches_estimated >= mset.matches_lower_bound);
        assert!(mset.matches_estimated <= mset.matches_upper_bound);
    }

    #[test]
    fn test_match_all_and_nothing() {
        let mut searcher = bool_searcher(simple_db());
        searcher.set_query(Query::match_all());
        assert_eq!(searcher.mset(0, 10).unwrap().len(), 3);

        searcher.set_query(Query::match_nothing());
        let mset = searcher.mset(0, 10).unwrap();
        assert!(mset.is_empty());
        assert_eq!(mset.matches_upper_bound, 0);
    }

    #[test]
    fn test_multi_shard_docid_interleaving() {
        let mut first = MemoryIndex::new();
        let mut doc = Document::new();
        doc.add_term("common");
        first.add_document(doc);

        let mut second = MemoryIndex::new();
        let mut doc = Document::new();
        doc.add_term("common");
        second.add_document(doc);
        let mut doc = Document::new();
        doc.add_term("common");
        second.add_document(doc);

        let mut db = Database::new();
        db.add_index(first);
        db.add_index(second);
        assert_eq!(db.doc_count(), 3);

        let mut searcher = bool_searcher(db);
        searcher.set_query(Query::term("common"));
        let mset = searcher.mset(0, 10).unwrap();
        // Shard 0 doc 1 -> 1; shard 1 docs 1, 2 -> 2, 4.
        assert_eq!(mset.docids(), vec![1, 2, 4]);
    }

    #[test]
    fn test_matching_terms_reports_explicit_terms() {
        let mut searcher = bool_searcher(simple_db());
        searcher.set_query(
            Query::term("banana") | Query::term("cherry") | Query::term("missing"),
        );
        let terms = searcher.matching_terms(2).unwrap();
        assert_eq!(terms, vec![b"banana".to_vec(), b"cherry".to_vec()]);

        let terms = searcher.matching_terms(1).unwrap();
        assert_eq!(terms, vec![b"banana".to_vec()]);
    }

    #[test]
    fn test_matching_terms_unknown_docid_is_an_error() {
        let mut searcher = bool_searcher(simple_db());
        searcher.set_query(Query::term("banana"));

        for docid in [0, 4, 99] {
            match searcher.matching_terms(docid) {
                Err(DoruError::Index(_)) => {}
                other => panic!("expected index error for docid {docid}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_match_set_json_round_trip() {
        let mut searcher = bool_searcher(simple_db());
        searcher.set_query(Query::term("banana"));
        let mset = searcher.mset(0, 10).unwrap();

        let json = mset.to_json().unwrap();
        let restored = MatchSet::from_json(&json).unwrap();
        assert_eq!(restored.docids(), mset.docids());
        assert_eq!(restored.matches_estimated, mset.matches_estimated);

        assert!(matches!(
            MatchSet::from_json("{"),
            Err(DoruError::Serialization(_))
        ));
    }

    #[test]
    fn test_ranking_by_weight_then_docid() {
        let mut index = MemoryIndex::new();
        // doc1 mentions "rare" once, doc2 twice; the rest not at all.
        for wdf in [1u64, 2] {
            let mut doc = Document::new();
            doc.add_term_wdf("rare", wdf);
            doc.add_term("filler");
            index.add_document(doc);
        }
        for _ in 0..3 {
            let mut doc = Document::new();
            doc.add_term("filler");
            index.add_document(doc);
        }

        let mut searcher = Searcher::new(Database::from(index));
        searcher.set_query(Query::term("rare"));
        let mset = searcher.mset(0, 10).unwrap();
        assert_eq!(mset.docids(), vec![2, 1]);
        assert!(mset.hits[0].weight > mset.hits[1].weight);
    }
}
