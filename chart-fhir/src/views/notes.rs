//! Clinical notes from DocumentReference attachments.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chart_core::{ClinicalNote, CodeableConcept, NotesConfig, Patient, Reference};

/// One note per DocumentReference attachment, oldest first, undated last.
pub fn clinical_notes(patient: &Patient, config: &NotesConfig) -> Vec<ClinicalNote> {
    let mut notes: Vec<ClinicalNote> = patient
        .document_references
        .iter()
        .flat_map(|document| {
            let note_type = document
                .doc_type
                .as_ref()
                .and_then(CodeableConcept::display_text)
                .map(str::to_string);
            let authors: Vec<String> = document.authors.iter().filter_map(author_name).collect();

            document.content.iter().map(move |attachment| {
                let (text, decoded) = match attachment.data.as_deref() {
                    Some(data) if config.decode && looks_base64(data) => match decode_text(data) {
                        Some(text) => (Some(text), true),
                        None => (Some(data.to_string()), false),
                    },
                    Some(data) => (Some(data.to_string()), false),
                    None => (None, false),
                };

                ClinicalNote {
                    id: document.id.clone(),
                    date: document.date.or(document.period.start),
                    note_type: note_type.clone(),
                    authors: authors.clone(),
                    content_type: attachment.content_type.clone(),
                    text,
                    decoded,
                }
            })
        })
        .collect();

    notes.sort_by_key(|note| (note.date.is_none(), note.date));
    notes
}

/// Non-empty, a multiple of four long, base64 alphabet with at most two
/// trailing `=`.
pub fn looks_base64(payload: &str) -> bool {
    if payload.is_empty() || payload.len() % 4 != 0 {
        return false;
    }

    let body = payload.trim_end_matches('=');
    if payload.len() - body.len() > 2 {
        return false;
    }

    body.bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || byte == b'+' || byte == b'/')
}

fn decode_text(payload: &str) -> Option<String> {
    let bytes = STANDARD.decode(payload).ok()?;
    String::from_utf8(bytes).ok()
}

fn author_name(author: &Reference) -> Option<String> {
    author.display.clone().or_else(|| author.reference.clone())
}
