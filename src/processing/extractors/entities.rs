//! Capitalized multi-word phrase heuristic for named-entity-like spans
//! (spec §4.3). No ML — a cheap proxy that catches proper nouns without
//! a dependency on a real NER model, which is out of scope for this crate.

use crate::error::Result;
use crate::processing::extractors::Extractor;
use crate::types::{Chunk, MetaValue};

pub struct EntityExtractor;

impl Extractor for EntityExtractor {
    fn name(&self) -> &'static str {
        "EntityExtractor"
    }

    fn extract(&self, chunk: &Chunk) -> Result<Vec<(String, MetaValue)>> {
        let mut entities = Vec::new();
        let mut current = Vec::new();

        for word in chunk.content.split_whitespace() {
            let trimmed: String = word.trim_matches(|c: char| !c.is_alphanumeric()).to_string();
            let starts_upper = trimmed.chars().next().is_some_and(|c| c.is_uppercase());

            if starts_upper && trimmed.len() > 1 {
                current.push(trimmed);
            } else {
                if current.len() >= 2 {
                    entities.push(current.join(" "));
                }
                current.clear();
            }
        }
        if current.len() >= 2 {
            entities.push(current.join(" "));
        }

        entities.dedup();
        Ok(vec![("entities".into(), entities.into())])
    }
}
