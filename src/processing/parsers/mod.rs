pub mod docx;
pub mod excel;
pub mod markdown;
pub mod msg;
pub mod pdf;
pub mod text;
pub mod universal;

use crate::processing::parser::ParserRegistry;

/// Build the default registry: specific formats first (low priority number,
/// tried first), the universal fallback last (spec §4.1, §9 "long-tail
/// fallback parser").
pub fn default_registry() -> ParserRegistry {
    ParserRegistry::new()
        .register(Box::new(markdown::MarkdownParser), &["*.md", "*.markdown"], 0)
        .register(Box::new(pdf::PdfParser), &["*.pdf"], 0)
        .register(Box::new(docx::DocxParser), &["*.docx"], 0)
        .register(Box::new(excel::ExcelParser), &["*.xlsx", "*.xls", "*.xlsm", "*.ods"], 0)
        .register(Box::new(text::CsvParser), &["*.csv", "*.tsv"], 0)
        .register(Box::new(msg::MsgParser), &["*.msg"], 0)
        .register(Box::new(text::TextParser), &["*.txt", "*.text"], 10)
        .register(Box::new(universal::UniversalParser), &[], 1000)
}
