//! Stopword-filtered word-frequency keyword extraction (spec §4.3).

use std::collections::HashMap;

use crate::error::Result;
use crate::processing::extractors::Extractor;
use crate::types::{Chunk, MetaValue};

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "is", "are",
    "was", "were", "be", "been", "being", "this", "that", "these", "those", "it", "its", "as", "by",
    "from", "has", "have", "had", "not", "no", "so", "if", "than", "then", "also", "can", "will",
];

pub struct KeywordExtractor {
    pub top_n: usize,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self { top_n: 10 }
    }
}

impl Extractor for KeywordExtractor {
    fn name(&self) -> &'static str {
        "KeywordExtractor"
    }

    fn extract(&self, chunk: &Chunk) -> Result<Vec<(String, MetaValue)>> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for raw in chunk.content.split_whitespace() {
            let word: String = raw.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase();
            if word.len() < 3 || STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            *counts.entry(word).or_insert(0) += 1;
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.top_n);

        let keywords: Vec<String> = ranked.into_iter().map(|(w, _)| w).collect();
        Ok(vec![("keywords".into(), keywords.into())])
    }
}
