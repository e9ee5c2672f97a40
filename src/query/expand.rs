//! Expansion of wildcard and edit-distance nodes against a shard's term
//! dictionary.
//!
//! Expansion runs per shard, so the limit policies count per shard too: a
//! multi-shard union may contain more terms than `max_expansion`.

use log::debug;

use crate::error::{DoruError, Result};
use crate::index::{DictEntry, IndexReader};
use crate::query::editdist::{EditDistanceSpec, levenshtein_within};
use crate::query::node::{BoolOp, Query};
use crate::query::wildcard::{Combiner, CompiledPattern, ExpansionLimit, WildcardSpec};

pub(crate) fn expand_wildcard(spec: &WildcardSpec, reader: &dyn IndexReader) -> Result<Query> {
    let pattern = CompiledPattern::compile(&spec.pattern, spec.flags)?;
    let candidates: Vec<DictEntry> = reader
        .term_dictionary(pattern.seek_prefix())
        .filter(|entry| pattern.matches(&entry.term))
        .collect();
    let selected = apply_limit(candidates, spec.max_expansion, spec.limit, || {
        format!("wildcard {:?}", spec.pattern)
    })?;
    Ok(combine(selected, spec.combiner))
}

pub(crate) fn expand_edit_distance(
    spec: &EditDistanceSpec,
    reader: &dyn IndexReader,
) -> Result<Query> {
    let target: Vec<char> = spec.target.chars().collect();
    let prefix: String = target
        .iter()
        .take(spec.fixed_prefix_len as usize)
        .collect();

    let candidates: Vec<DictEntry> = reader
        .term_dictionary(prefix.as_bytes())
        .filter(|entry| {
            // Distance is over scalars, so only UTF-8 terms can qualify.
            let Ok(term) = std::str::from_utf8(&entry.term) else {
                return false;
            };
            let term: Vec<char> = term.chars().collect();
            levenshtein_within(&target, &term, spec.edit_distance).is_some()
        })
        .collect();
    let selected = apply_limit(candidates, spec.max_expansion, spec.limit, || {
        format!("edit distance {:?}~{}", spec.target, spec.edit_distance)
    })?;
    Ok(combine(selected, spec.combiner))
}

fn apply_limit(
    mut candidates: Vec<DictEntry>,
    max_expansion: u32,
    limit: ExpansionLimit,
    what: impl Fn() -> String,
) -> Result<Vec<DictEntry>> {
    let max = max_expansion as usize;
    if max == 0 || candidates.len() <= max {
        return Ok(candidates);
    }
    match limit {
        ExpansionLimit::Error => Err(DoruError::expansion_limit(format!(
            "{} expands to {} terms (limit {})",
            what(),
            candidates.len(),
            max
        ))),
        ExpansionLimit::First => {
            debug!("{} truncated to first {} terms", what(), max);
            candidates.truncate(max);
            Ok(candidates)
        }
        ExpansionLimit::MostFrequent => {
            debug!("{} truncated to {} most frequent terms", what(), max);
            candidates.sort_by(|a, b| {
                b.collection_freq
                    .cmp(&a.collection_freq)
                    .then_with(|| a.term.cmp(&b.term))
            });
            candidates.truncate(max);
            // Back to dictionary order for deterministic output.
            candidates.sort_by(|a, b| a.term.cmp(&b.term));
            Ok(candidates)
        }
    }
}

fn combine(selected: Vec<DictEntry>, combiner: Combiner) -> Query {
    let children: Vec<Query> = selected
        .into_iter()
        .map(|entry| Query::synthetic_term(entry.term))
        .collect();
    let op = match combiner {
        Combiner::Synonym => BoolOp::Synonym,
        Combiner::Or => BoolOp::Or,
        Combiner::Max => BoolOp::Max,
    };
    // No matching term is an empty match, not an error.
    Query::bool_from_children(op, children)
}
