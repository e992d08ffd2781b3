//! Spreadsheet parser (xlsx/xls/xlsm/ods) via `calamine`: flat pipe-separated
//! text for chunking, plus one `DocumentSection::Table` per sheet (spec §4.1,
//! SPEC_FULL §C.2).

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;

use crate::error::{RagError, Result};
use crate::processing::parser::Parser;
use crate::types::{DocumentSection, FileBlob, Metadata, ParsedDocument, ParsedFragment};

pub struct ExcelParser;

impl Parser for ExcelParser {
    fn name(&self) -> &'static str {
        "ExcelParser"
    }

    fn parse(&self, blob: &FileBlob) -> Result<ParsedDocument> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(blob.bytes.clone()))
            .map_err(|e| RagError::StoreError(format!("{} is not a readable spreadsheet: {e}", blob.filename)))?;

        let sheet_names = workbook.sheet_names().to_vec();
        if sheet_names.is_empty() {
            return Err(RagError::StoreError(format!("{} has no sheets", blob.filename)));
        }

        let mut rendered = String::new();
        let mut sections = Vec::new();

        for sheet_name in &sheet_names {
            let Ok(range) = workbook.worksheet_range(sheet_name) else { continue };
            if range.is_empty() {
                continue;
            }

            let rows: Vec<Vec<String>> = range
                .rows()
                .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
                .filter(|row: &Vec<String>| !row.iter().all(String::is_empty))
                .collect();
            if rows.is_empty() {
                continue;
            }

            if sheet_names.len() > 1 {
                rendered.push_str(&format!("\n--- Sheet: {sheet_name} ---\n"));
            }
            for row in &rows {
                rendered.push_str(&row.join(" | "));
                rendered.push('\n');
            }

            let headers = rows[0].clone();
            let data_rows = rows[1..].to_vec();
            sections.push(DocumentSection::Table {
                headers,
                rows: data_rows,
                page: 0,
                caption: Some(sheet_name.clone()),
            });
        }

        let mut doc_metadata = Metadata::new();
        doc_metadata.insert("sheet_count".into(), (sheet_names.len() as i64).into());

        Ok(ParsedDocument {
            fragments: vec![ParsedFragment { section_label: None, text: rendered, local_metadata: Metadata::new() }],
            structured_sections: sections,
            doc_metadata,
        })
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        _ => cell.to_string(),
    }
}
