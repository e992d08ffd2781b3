//! Outlook MSG parser: reads the OLE/CFBF compound document Outlook stores a
//! `.msg` message in and pulls out headers, body, and attachment metadata as
//! separate fragments (spec §4.1, "email_sections").
//!
//! MSG properties live in top-level streams named `__substg1.0_<tag><type>`,
//! an 8-hex-digit name where the first 4 digits are the MAPI property tag and
//! the last 4 are its type code (`001F` UTF-16LE string, `001E` 8-bit string).
//! Attachments are sibling storages named `__attach_version1.0_#<index>`,
//! each carrying its own `__substg1.0_*` properties.

use std::io::Read;

use crate::error::{RagError, Result};
use crate::processing::parser::Parser;
use crate::types::{FileBlob, Metadata, ParsedDocument, ParsedFragment};

const OLE_SIGNATURE: [u8; 8] = [0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];

const PROP_SUBJECT: &str = "0037";
const PROP_BODY: &str = "1000";
const PROP_BODY_HTML: &str = "1013";
const PROP_SENDER_NAME: &str = "0C1A";
const PROP_SENDER_EMAIL: &str = "0C1F";
const PROP_DISPLAY_TO: &str = "0E04";
const PROP_DISPLAY_CC: &str = "0E03";
const PROP_DISPLAY_BCC: &str = "0E02";
const PROP_MESSAGE_CLASS: &str = "001A";
const PROP_ATTACH_LONG_FILENAME: &str = "3707";
const PROP_ATTACH_FILENAME: &str = "3704";

pub struct MsgParser;

impl Parser for MsgParser {
    fn name(&self) -> &'static str {
        "MsgParser"
    }

    fn parse(&self, blob: &FileBlob) -> Result<ParsedDocument> {
        if blob.bytes.len() < OLE_SIGNATURE.len() || blob.bytes[..8] != OLE_SIGNATURE {
            return Err(RagError::StoreError(format!("{} is not an OLE compound document", blob.filename)));
        }

        let cursor = std::io::Cursor::new(&blob.bytes);
        let mut comp = cfb::CompoundFile::open(cursor)
            .map_err(|e| RagError::StoreError(format!("{} failed to open as compound file: {e}", blob.filename)))?;

        let root_props = read_properties(&mut comp, "/");

        let subject = root_props.get(PROP_SUBJECT).cloned();
        let sender_name = root_props.get(PROP_SENDER_NAME).cloned();
        let sender_email = root_props.get(PROP_SENDER_EMAIL).cloned();
        let display_to = root_props.get(PROP_DISPLAY_TO).cloned();
        let display_cc = root_props.get(PROP_DISPLAY_CC).cloned();
        let display_bcc = root_props.get(PROP_DISPLAY_BCC).cloned();
        let message_class = root_props.get(PROP_MESSAGE_CLASS).cloned();

        let body = root_props
            .get(PROP_BODY)
            .or_else(|| root_props.get(PROP_BODY_HTML))
            .cloned()
            .unwrap_or_default();
        let body = if root_props.contains_key(PROP_BODY) { body } else { strip_html(&body) };

        let mut fragments = Vec::new();

        let mut header_lines = Vec::new();
        if let Some(subject) = &subject {
            header_lines.push(format!("Subject: {subject}"));
        }
        if sender_name.is_some() || sender_email.is_some() {
            let from = [sender_name.as_deref(), sender_email.as_deref()].into_iter().flatten().collect::<Vec<_>>().join(" ");
            header_lines.push(format!("From: {from}"));
        }
        if let Some(to) = &display_to {
            header_lines.push(format!("To: {to}"));
        }
        if let Some(cc) = &display_cc {
            header_lines.push(format!("CC: {cc}"));
        }
        if let Some(bcc) = &display_bcc {
            header_lines.push(format!("BCC: {bcc}"));
        }
        if !header_lines.is_empty() {
            fragments.push(ParsedFragment { section_label: Some("headers".into()), text: header_lines.join("\n"), local_metadata: Metadata::new() });
        }

        if !body.trim().is_empty() {
            fragments.push(ParsedFragment { section_label: Some("body".into()), text: body.trim().to_string(), local_metadata: Metadata::new() });
        }

        for (index, filename) in list_attachments(&mut comp).into_iter().enumerate() {
            fragments.push(ParsedFragment {
                section_label: Some(format!("attachment_{index}")),
                text: format!("Filename: {filename}"),
                local_metadata: Metadata::new(),
            });
        }

        let mut doc_metadata = Metadata::new();
        if let Some(subject) = subject {
            doc_metadata.insert("subject".into(), subject.into());
        }
        if let Some(sender_email) = sender_email {
            doc_metadata.insert("sender_email".into(), sender_email.into());
        }
        if let Some(sender_name) = sender_name {
            doc_metadata.insert("sender_name".into(), sender_name.into());
        }
        if let Some(message_class) = message_class {
            doc_metadata.insert("message_class".into(), message_class.into());
        }

        Ok(ParsedDocument { fragments, structured_sections: vec![], doc_metadata })
    }
}

/// Read every `__substg1.0_<tag><type>` stream directly under `storage_path`,
/// keyed by the 4-hex-digit property tag, decoded as text (UTF-16LE for
/// `001F`, best-effort Latin-1/UTF-8 for `001E`). Binary and unrecognized
/// types are skipped, not errored — MSG parsing degrades gracefully rather
/// than failing the whole file over one unreadable property.
fn read_properties<F: Read + std::io::Seek>(comp: &mut cfb::CompoundFile<F>, storage_path: &str) -> std::collections::HashMap<String, String> {
    let mut props = std::collections::HashMap::new();

    let entries: Vec<(String, bool)> = match comp.read_storage(storage_path) {
        Ok(iter) => iter.map(|e| (e.name().to_string(), e.is_stream())).collect(),
        Err(_) => return props,
    };

    for (name, is_stream) in entries {
        if !is_stream || !name.starts_with("__substg1.0_") {
            continue;
        }
        let Some(suffix) = name.strip_prefix("__substg1.0_") else { continue };
        if suffix.len() != 8 {
            continue;
        }
        let (tag, type_code) = suffix.split_at(4);

        let path = format!("{}/{}", storage_path.trim_end_matches('/'), name);
        let Ok(mut stream) = comp.open_stream(&path) else { continue };
        let mut bytes = Vec::new();
        if stream.read_to_end(&mut bytes).is_err() {
            continue;
        }

        let text = match type_code {
            "001F" => decode_utf16le(&bytes),
            "001E" => Some(String::from_utf8_lossy(&bytes).trim_end_matches('\0').to_string()),
            _ => None,
        };

        if let Some(text) = text {
            if !text.is_empty() {
                props.insert(tag.to_uppercase(), text);
            }
        }
    }

    props
}

fn decode_utf16le(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    let decoded = String::from_utf16_lossy(&units);
    Some(decoded.trim_end_matches('\0').to_string())
}

fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// List attachment filenames from `__attach_version1.0_#*` storages.
fn list_attachments<F: Read + std::io::Seek>(comp: &mut cfb::CompoundFile<F>) -> Vec<String> {
    let storage_names: Vec<String> = match comp.read_storage("/") {
        Ok(iter) => iter.filter(|e| e.is_storage() && e.name().starts_with("__attach_version1.0_")).map(|e| e.name().to_string()).collect(),
        Err(_) => return Vec::new(),
    };

    let mut names = Vec::new();
    for storage_name in storage_names {
        let storage_path = format!("/{storage_name}");
        let props = read_properties(comp, &storage_path);
        if let Some(filename) = props.get(PROP_ATTACH_LONG_FILENAME).or_else(|| props.get(PROP_ATTACH_FILENAME)) {
            names.push(filename.clone());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_ole_files() {
        let blob = FileBlob::new(b"not an ole file".to_vec(), "message.msg");
        let err = MsgParser.parse(&blob).unwrap_err();
        assert_eq!(err.kind(), "StoreError");
    }

    #[test]
    fn decodes_utf16le_subject() {
        let utf16: Vec<u8> = "Hello".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(decode_utf16le(&utf16).unwrap(), "Hello");
    }

    #[test]
    fn strips_html_tags_from_body() {
        let stripped = strip_html("<p>Hello <b>World</b></p>");
        assert_eq!(stripped, "Hello World");
    }
}
