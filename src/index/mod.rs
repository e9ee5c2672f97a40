//! Index abstraction consumed by the matcher.
//!
//! The storage engine itself is out of scope for this crate: the matcher
//! only needs the narrow read surface defined by [`IndexReader`]. An
//! in-memory implementation suitable for tests and small corpora is
//! provided in [`memory`].

pub mod memory;

pub use self::memory::{Document, MemoryIndex};

use std::fmt::Debug;
use std::sync::Arc;

/// Document identifier. Docids are 1-based; 0 is never a valid docid.
pub type DocId = u64;

/// One entry of a posting list: a document and the term's occurrences in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    /// The document ID.
    pub docid: DocId,
    /// Within-document frequency of the term.
    pub wdf: u64,
    /// Sorted term positions within the document. Empty when the index
    /// carries no positional information.
    pub positions: Vec<u32>,
}

/// A shared, immutable posting list sorted by docid.
pub type PostingListRef = Arc<Vec<Posting>>;

/// One entry of the term dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictEntry {
    /// The term, as stored (not necessarily valid UTF-8).
    pub term: Vec<u8>,
    /// Total occurrences of the term across the shard.
    pub collection_freq: u64,
    /// Number of documents containing the term.
    pub doc_freq: u64,
}

/// Bounds over the values stored in one slot of a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueStats {
    /// Smallest stored value.
    pub lower: Vec<u8>,
    /// Largest stored value.
    pub upper: Vec<u8>,
    /// Number of documents with a value in the slot.
    pub count: u64,
}

/// Read access to one shard (sub-database) of an index.
///
/// All state reachable through a reader is logically immutable for the
/// duration of a search, so concurrent searches may share a reader.
pub trait IndexReader: Send + Sync + Debug {
    /// Number of documents in the shard.
    fn doc_count(&self) -> u64;

    /// The highest docid in use. Zero for an empty shard.
    fn max_docid(&self) -> DocId;

    /// Whether a docid is in use.
    fn doc_exists(&self, docid: DocId) -> bool;

    /// The posting list for a term, or `None` if the term does not occur.
    fn term_postings(&self, term: &[u8]) -> Option<PostingListRef>;

    /// Number of documents containing the term.
    fn term_doc_freq(&self, term: &[u8]) -> u64 {
        self.term_postings(term).map_or(0, |p| p.len() as u64)
    }

    /// Total occurrences of the term across the shard.
    fn term_collection_freq(&self, term: &[u8]) -> u64;

    /// Length (total wdf) of a document.
    fn doc_length(&self, docid: DocId) -> u64;

    /// Sum of all document lengths.
    fn total_doc_length(&self) -> u64;

    /// Whether this shard stores positional information.
    fn has_positions(&self) -> bool;

    /// The value stored for a document in a slot, if any.
    fn value(&self, slot: u32, docid: DocId) -> Option<Vec<u8>>;

    /// Bounds over a value slot, or `None` if the slot is unused.
    fn value_stats(&self, slot: u32) -> Option<ValueStats>;

    /// Iterate dictionary entries whose term starts with `prefix`, in
    /// lexicographic (byte) order.
    fn term_dictionary<'a>(&'a self, prefix: &[u8]) -> Box<dyn Iterator<Item = DictEntry> + 'a>;
}
