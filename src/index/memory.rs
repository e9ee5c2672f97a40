//! In-memory single-shard index.
//!
//! This is the reference [`IndexReader`] implementation used by the test
//! suites and by small corpora that fit in memory. Terms are kept in a
//! `BTreeMap` so the dictionary iterates in byte order, which the wildcard
//! and edit-distance expanders rely on.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use ahash::AHashMap;

use crate::index::{DictEntry, DocId, IndexReader, Posting, PostingListRef, ValueStats};

/// A document under construction, before it is added to a [`MemoryIndex`].
#[derive(Debug, Clone, Default)]
pub struct Document {
    // term -> (wdf, positions)
    terms: BTreeMap<Vec<u8>, (u64, Vec<u32>)>,
    values: Vec<(u32, Vec<u8>)>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Document::default()
    }

    /// Add a term occurrence without positional information.
    pub fn add_term<T: Into<Vec<u8>>>(&mut self, term: T) {
        self.add_term_wdf(term, 1);
    }

    /// Add a term occurrence with an explicit wdf increment.
    pub fn add_term_wdf<T: Into<Vec<u8>>>(&mut self, term: T, wdf: u64) {
        let entry = self.terms.entry(term.into()).or_insert((0, Vec::new()));
        entry.0 += wdf;
    }

    /// Add a term occurrence at a position.
    pub fn add_posting<T: Into<Vec<u8>>>(&mut self, term: T, position: u32) {
        let entry = self.terms.entry(term.into()).or_insert((0, Vec::new()));
        entry.0 += 1;
        entry.1.push(position);
    }

    /// Store a value in a slot.
    pub fn set_value<V: Into<Vec<u8>>>(&mut self, slot: u32, value: V) {
        self.values.push((slot, value.into()));
    }

    /// Index the words of a text, one position per word.
    pub fn index_text(&mut self, text: &str) {
        for (i, word) in text.split_whitespace().enumerate() {
            self.add_posting(word.as_bytes().to_vec(), (i + 1) as u32);
        }
    }

    fn length(&self) -> u64 {
        self.terms.values().map(|(wdf, _)| *wdf).sum()
    }
}

#[derive(Debug, Default)]
struct TermEntry {
    postings: Vec<Posting>,
    collection_freq: u64,
    // Rebuilt lazily so repeated reads share one allocation.
    shared: Option<PostingListRef>,
}

/// An in-memory inverted index holding one shard.
#[derive(Debug)]
pub struct MemoryIndex {
    terms: BTreeMap<Vec<u8>, TermEntry>,
    doc_lengths: BTreeMap<DocId, u64>,
    values: AHashMap<u32, BTreeMap<DocId, Vec<u8>>>,
    total_doc_length: u64,
    next_docid: DocId,
    has_positions: bool,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        MemoryIndex {
            terms: BTreeMap::new(),
            doc_lengths: BTreeMap::new(),
            values: AHashMap::new(),
            total_doc_length: 0,
            next_docid: 1,
            has_positions: false,
        }
    }

    /// Add a document, returning its docid.
    pub fn add_document(&mut self, doc: Document) -> DocId {
        let docid = self.next_docid;
        self.next_docid += 1;

        let length = doc.length();
        self.doc_lengths.insert(docid, length);
        self.total_doc_length += length;

        for (term, (wdf, mut positions)) in doc.terms {
            positions.sort_unstable();
            positions.dedup();
            if !positions.is_empty() {
                self.has_positions = true;
            }
            let entry = self.terms.entry(term).or_default();
            entry.collection_freq += wdf;
            entry.postings.push(Posting {
                docid,
                wdf,
                positions,
            });
            entry.shared = None;
        }

        for (slot, value) in doc.values {
            self.values.entry(slot).or_default().insert(docid, value);
        }

        docid
    }

    fn shared_postings(&self, term: &[u8]) -> Option<PostingListRef> {
        let entry = self.terms.get(term)?;
        if let Some(shared) = &entry.shared {
            return Some(Arc::clone(shared));
        }
        // No cached copy; clone the postings into a fresh Arc. Writers
        // invalidate the cache, so this only costs on first read.
        Some(Arc::new(entry.postings.clone()))
    }

    /// Pre-freeze posting lists so readers share one allocation per term.
    pub fn freeze(&mut self) {
        for entry in self.terms.values_mut() {
            if entry.shared.is_none() {
                entry.shared = Some(Arc::new(entry.postings.clone()));
            }
        }
    }
}

impl IndexReader for MemoryIndex {
    fn doc_count(&self) -> u64 {
        self.doc_lengths.len() as u64
    }

    fn max_docid(&self) -> DocId {
        self.next_docid - 1
    }

    fn doc_exists(&self, docid: DocId) -> bool {
        self.doc_lengths.contains_key(&docid)
    }

    fn term_postings(&self, term: &[u8]) -> Option<PostingListRef> {
        self.shared_postings(term)
    }

    fn term_collection_freq(&self, term: &[u8]) -> u64 {
        self.terms.get(term).map_or(0, |e| e.collection_freq)
    }

    fn doc_length(&self, docid: DocId) -> u64 {
        self.doc_lengths.get(&docid).copied().unwrap_or(0)
    }

    fn total_doc_length(&self) -> u64 {
        self.total_doc_length
    }

    fn has_positions(&self) -> bool {
        self.has_positions
    }

    fn value(&self, slot: u32, docid: DocId) -> Option<Vec<u8>> {
        self.values.get(&slot)?.get(&docid).cloned()
    }

    fn value_stats(&self, slot: u32) -> Option<ValueStats> {
        let slot_values = self.values.get(&slot)?;
        let lower = slot_values.values().min()?.clone();
        let upper = slot_values.values().max()?.clone();
        Some(ValueStats {
            lower,
            upper,
            count: slot_values.len() as u64,
        })
    }

    fn term_dictionary<'a>(&'a self, prefix: &[u8]) -> Box<dyn Iterator<Item = DictEntry> + 'a> {
        let prefix = prefix.to_vec();
        let iter = self
            .terms
            .range::<[u8], _>((Bound::Included(prefix.as_slice()), Bound::Unbounded))
            .take_while(move |(term, _)| term.starts_with(&prefix))
            .map(|(term, entry)| DictEntry {
                term: term.clone(),
                collection_freq: entry.collection_freq,
                doc_freq: entry.postings.len() as u64,
            });
        Box::new(iter)
    }
}
