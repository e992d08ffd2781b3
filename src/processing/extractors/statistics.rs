//! Basic text statistics (spec §4.3).

use crate::error::Result;
use crate::processing::extractors::Extractor;
use crate::types::{Chunk, MetaValue};

const WORDS_PER_MINUTE: f64 = 200.0;

pub struct StatisticsExtractor;

impl Extractor for StatisticsExtractor {
    fn name(&self) -> &'static str {
        "StatisticsExtractor"
    }

    fn extract(&self, chunk: &Chunk) -> Result<Vec<(String, MetaValue)>> {
        let word_count = chunk.content.split_whitespace().count();
        let character_count = chunk.content.chars().count();
        let sentence_count = chunk
            .content
            .split(|c| c == '.' || c == '!' || c == '?')
            .filter(|s| !s.trim().is_empty())
            .count();
        let reading_time_minutes = (word_count as f64 / WORDS_PER_MINUTE).max(0.1);

        Ok(vec![
            ("word_count".into(), (word_count as i64).into()),
            ("character_count".into(), (character_count as i64).into()),
            ("sentence_count".into(), (sentence_count as i64).into()),
            ("reading_time_minutes".into(), MetaValue::Number(reading_time_minutes)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_words_and_sentences() {
        let chunk = Chunk::new("One sentence. Another one!", "doc.txt");
        let out = StatisticsExtractor.extract(&chunk).unwrap();
        let word_count = out.iter().find(|(k, _)| k == "word_count").unwrap().1.as_f64().unwrap();
        assert_eq!(word_count, 4.0);
        let sentence_count = out.iter().find(|(k, _)| k == "sentence_count").unwrap().1.as_f64().unwrap();
        assert_eq!(sentence_count, 2.0);
    }
}
