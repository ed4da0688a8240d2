//! In-process full-text index.
//!
//! A plain inverted index (term → doc ids) over the collection's configured
//! index paths. Queries are tokenized the same way as documents and scored
//! by the number of distinct matching terms.

use std::collections::{HashMap, HashSet};

/// Lowercased alphanumeric runs of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() >= 2)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, HashSet<String>>,
    doc_terms: HashMap<String, Vec<String>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a document's extracted field texts, replacing any previous
    /// entry for the same id.
    pub fn add(&mut self, doc_id: &str, fields: &[String]) {
        self.remove(doc_id);
        let mut terms: Vec<String> = fields.iter().flat_map(|field| tokenize(field)).collect();
        terms.sort();
        terms.dedup();
        for term in &terms {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(doc_id.to_string());
        }
        self.doc_terms.insert(doc_id.to_string(), terms);
    }

    pub fn remove(&mut self, doc_id: &str) {
        let Some(terms) = self.doc_terms.remove(doc_id) else {
            return;
        };
        for term in terms {
            if let Some(ids) = self.postings.get_mut(&term) {
                ids.remove(doc_id);
                if ids.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
    }

    /// Score every document against a query: one point per distinct query
    /// term present in the document.
    pub fn score(&self, query: &str) -> HashMap<String, usize> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        let mut scores: HashMap<String, usize> = HashMap::new();
        for term in terms {
            if let Some(ids) = self.postings.get(&term) {
                for id in ids {
                    *scores.entry(id.clone()).or_insert(0) += 1;
                }
            }
        }
        scores
    }

    pub fn is_indexed(&self, doc_id: &str) -> bool {
        self.doc_terms.contains_key(doc_id)
    }
}
