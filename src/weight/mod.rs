//! Pluggable weighting schemes for ranking matches.
//!
//! A [`WeightingScheme`] is consulted once per query term (or per synonym
//! pseudo-term) at lowering time; the [`TermScorer`] it returns is then
//! applied per document with that document's wdf and length.

use std::fmt::Debug;

/// Per-term statistics a scheme is seeded with.
#[derive(Debug, Clone)]
pub struct TermStats {
    /// Number of documents in the whole database (all shards).
    pub collection_size: u64,
    /// Number of documents the term occurs in (all shards).
    pub termfreq: u64,
    /// Total occurrences of the term (all shards).
    pub collection_freq: u64,
    /// Average document length across the database.
    pub avg_doc_length: f64,
    /// Within-query frequency of the term.
    pub wqf: u32,
}

/// Trait for weighting schemes.
pub trait WeightingScheme: Send + Sync + Debug {
    /// Get the name of this scheme.
    fn name(&self) -> &'static str;

    /// Build the per-term scorer for one query term.
    fn for_term(&self, stats: &TermStats) -> Box<dyn TermScorer>;
}

/// Per-document scoring for one term, produced by a [`WeightingScheme`].
pub trait TermScorer: Send + Sync + Debug {
    /// Score one document given the term's wdf and the document length.
    fn score(&self, wdf: u64, doc_length: u64) -> f64;

    /// An upper bound on [`TermScorer::score`] over any document.
    fn max_score(&self) -> f64;
}

/// A weighting scheme assigning zero weight to everything.
///
/// Useful for pure boolean retrieval where ranking is by docid.
#[derive(Debug, Clone, Default)]
pub struct BoolWeight;

impl BoolWeight {
    /// Create a new boolean weighting scheme.
    pub fn new() -> Self {
        BoolWeight
    }
}

impl WeightingScheme for BoolWeight {
    fn name(&self) -> &'static str {
        "bool"
    }

    fn for_term(&self, _stats: &TermStats) -> Box<dyn TermScorer> {
        Box::new(BoolScorer)
    }
}

#[derive(Debug)]
struct BoolScorer;

impl TermScorer for BoolScorer {
    fn score(&self, _wdf: u64, _doc_length: u64) -> f64 {
        0.0
    }

    fn max_score(&self) -> f64 {
        0.0
    }
}

/// BM25 weighting scheme.
#[derive(Debug, Clone)]
pub struct Bm25Weight {
    k1: f64,
    b: f64,
}

impl Bm25Weight {
    /// Create a BM25 scheme with the conventional parameters.
    pub fn new() -> Self {
        Bm25Weight { k1: 1.2, b: 0.75 }
    }

    /// Create a BM25 scheme with custom parameters.
    pub fn with_params(k1: f64, b: f64) -> Self {
        Bm25Weight { k1, b }
    }

    /// Get the k1 parameter.
    pub fn k1(&self) -> f64 {
        self.k1
    }

    /// Get the b parameter.
    pub fn b(&self) -> f64 {
        self.b
    }
}

impl Default for Bm25Weight {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightingScheme for Bm25Weight {
    fn name(&self) -> &'static str {
        "bm25"
    }

    fn for_term(&self, stats: &TermStats) -> Box<dyn TermScorer> {
        let n = stats.collection_size as f64;
        let df = stats.termfreq as f64;
        // Robertson-Walker IDF, floored at zero so common terms never
        // subtract weight.
        let idf = if stats.termfreq == 0 || stats.collection_size == 0 {
            0.0
        } else {
            ((n - df + 0.5) / (df + 0.5)).ln().max(0.0)
        };
        Box::new(Bm25Scorer {
            idf,
            wqf: stats.wqf as f64,
            avg_doc_length: stats.avg_doc_length,
            k1: self.k1,
            b: self.b,
        })
    }
}

#[derive(Debug)]
struct Bm25Scorer {
    idf: f64,
    wqf: f64,
    avg_doc_length: f64,
    k1: f64,
    b: f64,
}

impl TermScorer for Bm25Scorer {
    fn score(&self, wdf: u64, doc_length: u64) -> f64 {
        if wdf == 0 {
            return 0.0;
        }
        let tf = wdf as f64;
        let norm = if self.avg_doc_length > 0.0 {
            1.0 - self.b + self.b * (doc_length as f64 / self.avg_doc_length)
        } else {
            1.0
        };
        let tf_part = (tf * (self.k1 + 1.0)) / (tf + self.k1 * norm);
        self.wqf * self.idf * tf_part
    }

    fn max_score(&self) -> f64 {
        // tf_part tends to k1 + 1 as wdf grows.
        self.wqf * self.idf * (self.k1 + 1.0)
    }
}

/// TF-IDF weighting scheme.
#[derive(Debug, Clone, Default)]
pub struct TfIdfWeight;

impl TfIdfWeight {
    /// Create a new TF-IDF weighting scheme.
    pub fn new() -> Self {
        TfIdfWeight
    }
}

impl WeightingScheme for TfIdfWeight {
    fn name(&self) -> &'static str {
        "tfidf"
    }

    fn for_term(&self, stats: &TermStats) -> Box<dyn TermScorer> {
        let idf = if stats.termfreq == 0 || stats.collection_size == 0 {
            0.0
        } else {
            ((stats.collection_size as f64 + 1.0) / (stats.termfreq as f64)).ln()
        };
        Box::new(TfIdfScorer {
            idf,
            wqf: stats.wqf as f64,
        })
    }
}

#[derive(Debug)]
struct TfIdfScorer {
    idf: f64,
    wqf: f64,
}

impl TermScorer for TfIdfScorer {
    fn score(&self, wdf: u64, doc_length: u64) -> f64 {
        if wdf == 0 || doc_length == 0 {
            return 0.0;
        }
        self.wqf * self.idf * (1.0 + (wdf as f64).ln())
    }

    fn max_score(&self) -> f64 {
        // wdf is bounded by document length; 64 doublings over-covers any
        // realistic document.
        self.wqf * self.idf * (1.0 + 64f64 * 2f64.ln())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(collection_size: u64, termfreq: u64) -> TermStats {
        TermStats {
            collection_size,
            termfreq,
            collection_freq: termfreq,
            avg_doc_length: 10.0,
            wqf: 1,
        }
    }

    #[test]
    fn test_bool_weight_is_zero() {
        let scorer = BoolWeight::new().for_term(&stats(100, 10));
        assert_eq!(scorer.score(5, 20), 0.0);
        assert_eq!(scorer.max_score(), 0.0);
    }

    #[test]
    fn test_bm25_rare_term_outweighs_common() {
        let scheme = Bm25Weight::new();
        let rare = scheme.for_term(&stats(100, 2));
        let common = scheme.for_term(&stats(100, 50));
        assert!(rare.score(1, 10) > common.score(1, 10));
    }

    #[test]
    fn test_bm25_score_bounded_by_max() {
        let scheme = Bm25Weight::new();
        let scorer = scheme.for_term(&stats(100, 5));
        for wdf in [1u64, 2, 10, 1000] {
            assert!(scorer.score(wdf, 10) <= scorer.max_score());
        }
    }

    #[test]
    fn test_bm25_missing_term_scores_zero() {
        let scorer = Bm25Weight::new().for_term(&stats(100, 0));
        assert_eq!(scorer.score(3, 10), 0.0);
    }

    #[test]
    fn test_bm25_wqf_scales_score() {
        let scheme = Bm25Weight::new();
        let mut s = stats(100, 5);
        let single = scheme.for_term(&s);
        s.wqf = 2;
        let double = scheme.for_term(&s);
        let got = double.score(1, 10);
        let want = 2.0 * single.score(1, 10);
        assert!((got - want).abs() < 1e-12);
    }

    #[test]
    fn test_tfidf_grows_with_wdf() {
        let scorer = TfIdfWeight::new().for_term(&stats(100, 5));
        assert!(scorer.score(4, 10) > scorer.score(1, 10));
    }
}
