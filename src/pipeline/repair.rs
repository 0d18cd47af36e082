//! Response repair and merge: raw section responses in, one ordered
//! [`NotesDocument`] out.
//!
//! Each response goes through four stages:
//!
//! 1. [`strip_wrappers`] removes code-fence markers and surrounding whitespace.
//! 2. [`parse_strict`] tries a plain JSON parse (object or array of objects).
//! 3. [`repair_fields`] runs only when the strict parse fails. It pulls
//!    `"type": ..., "text": ...` pairs out of the text with a boundary scan
//!    that tolerates unescaped quotes and newlines inside the text value.
//! 4. Records with a blank kind or text are dropped and the survivors are
//!    concatenated in section order.
//!
//! Losing some sections is not an error. Losing all of them is
//! [`NotesError::AllSectionsUnrecoverable`].

use crate::error::{NotesError, SectionError};
use crate::output::{NoteKind, NoteRecord, NotesDocument, RawSectionResponse};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

// ── Patterns ─────────────────────────────────────────────────────────────

/// Opening or closing fence, with an optional `json` tag.
static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?i:json)?").unwrap());

/// Whitespace, a run of dashes, then optional commas/whitespace. Left behind
/// when a model prefixes records with list dashes outside any string.
static JUNK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+-+[\s,]*").unwrap());

/// Start of one record, up to and including the quote that opens its text.
static RECORD_HEAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""type"\s*:\s*"([^"]*)"\s*,\s*"text"\s*:\s*""#).unwrap()
});

/// What may follow the quote that closes a text value: the next record's
/// `type` key (with or without a comma), a closing brace, or end of input.
/// A trailing comma before the brace or the end is tolerated.
static TEXT_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*(?:,\s*"?type"?\s*:|"type"\s*:|,?\s*\}|,?\s*$)"#).unwrap());

// ── Stage A ──────────────────────────────────────────────────────────────

/// Strip code-fence markers and surrounding whitespace.
///
/// Repeats until nothing changes, so `strip_wrappers(strip_wrappers(s)) ==
/// strip_wrappers(s)` for every input.
pub fn strip_wrappers(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let next = FENCE_RE.replace_all(&current, "").trim().to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

// ── Stage B ──────────────────────────────────────────────────────────────

/// Parse stripped text as JSON records.
///
/// Returns `None` when the text is not JSON, or is JSON but neither an object
/// nor an array. Otherwise every element becomes a candidate record; elements
/// that are not objects become blank candidates, dropped in validation.
pub fn parse_strict(text: &str) -> Option<Vec<NoteRecord>> {
    let items = match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(map) => vec![Value::Object(map)],
        Value::Array(items) => items,
        _ => return None,
    };
    Some(items.iter().map(record_from_value).collect())
}

fn record_from_value(value: &Value) -> NoteRecord {
    let Value::Object(map) = value else {
        return NoteRecord::new(NoteKind::Other(String::new()), "");
    };

    let kind = match map.get("type").or_else(|| map.get("kind")) {
        None | Some(Value::Null) => NoteKind::Note,
        Some(Value::String(s)) => NoteKind::from(s.as_str()),
        Some(other) => NoteKind::from(other.to_string()),
    };
    let text = match map.get("text") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    NoteRecord { kind, text }
}

// ── Stage C ──────────────────────────────────────────────────────────────

/// Recover `{type, text}` pairs from text a JSON parser rejected.
///
/// A text value ends at the first unescaped quote that is followed by the
/// next record's `type` key, a closing brace or end of input, so quotes and
/// newlines inside the value survive. Kind and text are trimmed.
pub fn repair_fields(text: &str) -> Vec<NoteRecord> {
    let cleaned = JUNK_RE.replace_all(text, " ");
    let mut records = Vec::new();
    let mut rest: &str = &cleaned;

    while let Some(caps) = RECORD_HEAD_RE.captures(rest) {
        let (Some(whole), Some(kind)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let body = &rest[whole.end()..];
        let Some(end) = find_text_end(body) else {
            break;
        };
        records.push(NoteRecord::new(
            kind.as_str().trim(),
            unescape(&body[..end]).trim(),
        ));
        rest = &body[end + 1..];
    }
    records
}

fn find_text_end(body: &str) -> Option<usize> {
    body.match_indices('"')
        .map(|(i, _)| i)
        .filter(|&i| !is_escaped(body, i))
        .find(|&i| TEXT_END_RE.is_match(&body[i + 1..]))
}

/// A quote is escaped only by an odd run of backslashes before it.
fn is_escaped(body: &str, quote: usize) -> bool {
    let run = body[..quote].bytes().rev().take_while(|&b| b == b'\\').count();
    run % 2 == 1
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ── Per response ─────────────────────────────────────────────────────────

/// Which stage produced a response's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The stripped text parsed as JSON.
    Strict,
    /// Strict parsing failed; records came from the field scan.
    Repaired,
    /// Neither stage yielded a valid record.
    Unrecovered,
}

/// One response after repair and validation.
#[derive(Debug, Clone)]
pub struct RecoveredResponse {
    pub section: usize,
    pub recovery: Recovery,
    /// Valid records, in response order.
    pub records: Vec<NoteRecord>,
    /// Candidates rejected for a blank kind or text.
    pub dropped: usize,
}

/// Run stages A to D on one response.
pub fn recover_response(response: &RawSectionResponse) -> RecoveredResponse {
    let stripped = strip_wrappers(&response.text);
    let (candidates, mut recovery) = match parse_strict(&stripped) {
        Some(records) => (records, Recovery::Strict),
        None => (repair_fields(&stripped), Recovery::Repaired),
    };

    let total = candidates.len();
    let records: Vec<NoteRecord> = candidates.into_iter().filter(NoteRecord::is_valid).collect();
    if records.is_empty() {
        recovery = Recovery::Unrecovered;
    }

    RecoveredResponse {
        section: response.section,
        recovery,
        dropped: total - records.len(),
        records,
    }
}

// ── Merge ────────────────────────────────────────────────────────────────

/// Result of merging every section's response.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub document: NotesDocument,
    /// Responses that contributed no records.
    pub unrecovered: Vec<SectionError>,
    /// Responses recovered by the field scan rather than a strict parse.
    pub repaired_sections: usize,
    pub dropped_records: usize,
}

/// Repair every response and concatenate the records in input order.
///
/// Fails with [`NotesError::AllSectionsUnrecoverable`] when not a single
/// valid record survives.
pub fn repair_and_merge(responses: &[RawSectionResponse]) -> Result<MergeOutcome, NotesError> {
    let mut records = Vec::new();
    let mut unrecovered = Vec::new();
    let mut repaired_sections = 0;
    let mut dropped_records = 0;

    for response in responses {
        let recovered = recover_response(response);
        dropped_records += recovered.dropped;

        match recovered.recovery {
            Recovery::Strict => {}
            Recovery::Repaired => {
                debug!(
                    "Section {} '{}': recovered {} records by repair",
                    response.section,
                    response.heading,
                    recovered.records.len()
                );
                repaired_sections += 1;
            }
            Recovery::Unrecovered => {
                warn!(
                    "Section {} '{}': no note records could be recovered",
                    response.section, response.heading
                );
                unrecovered.push(SectionError::Unrecoverable {
                    section: response.section,
                    heading: response.heading.clone(),
                });
            }
        }
        records.extend(recovered.records);
    }

    if records.is_empty() {
        return Err(NotesError::AllSectionsUnrecoverable {
            sections: responses.len(),
        });
    }

    Ok(MergeOutcome {
        document: NotesDocument::new(records),
        unrecovered,
        repaired_sections,
        dropped_records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(section: usize, text: &str) -> RawSectionResponse {
        RawSectionResponse {
            section,
            heading: format!("S{section}"),
            text: text.to_string(),
        }
    }

    fn pairs(doc: &NotesDocument) -> Vec<(String, String)> {
        doc.iter()
            .map(|r| (r.kind.to_string(), r.text.clone()))
            .collect()
    }

    // ── Stage A ──────────────────────────────────────────────────────────

    #[test]
    fn strip_removes_json_fence() {
        assert_eq!(
            strip_wrappers("```json\n[{\"type\":\"heading\",\"text\":\"A\"}]\n```"),
            r#"[{"type":"heading","text":"A"}]"#
        );
        assert_eq!(strip_wrappers("```JSON\n{}\n```  "), "{}");
    }

    #[test]
    fn strip_is_idempotent() {
        let inputs = [
            "",
            "   ",
            "plain text",
            "```json\n[]\n```",
            "``````json",
            "`` ```json ` ``",
            "``````json```",
            "```\n```json\n{}\n```\n```",
            "  - \"type\": \"bullet\" ",
        ];
        for input in inputs {
            let once = strip_wrappers(input);
            assert_eq!(strip_wrappers(&once), once, "input: {input:?}");
        }
    }

    // ── Stage B ──────────────────────────────────────────────────────────

    #[test]
    fn strict_object_becomes_single_record() {
        let records = parse_strict(r#"{"type": "heading", "text": "Intro"}"#).unwrap();
        assert_eq!(records, vec![NoteRecord::new("heading", "Intro")]);
    }

    #[test]
    fn strict_non_container_falls_through() {
        assert!(parse_strict(r#""just a string""#).is_none());
        assert!(parse_strict("42").is_none());
        assert!(parse_strict("not json").is_none());
    }

    #[test]
    fn strict_accepts_kind_key_and_defaults_missing_type() {
        let records =
            parse_strict(r#"[{"kind": "bullet", "text": "x"}, {"text": "untyped"}]"#).unwrap();
        assert_eq!(records[0].kind, NoteKind::Bullet);
        assert_eq!(records[1].kind, NoteKind::Note);
    }

    #[test]
    fn strict_result_used_verbatim() {
        // Valid JSON whose text contains a record-like fragment: the field
        // scan would split it, the strict parse must not.
        let text = r#"[{"type": "paragraph", "text": "say \"type\": \"x\", \"text\": \"y\""}]"#;
        let recovered = recover_response(&response(1, text));
        assert_eq!(recovered.recovery, Recovery::Strict);
        assert_eq!(recovered.records.len(), 1);
        assert_eq!(
            recovered.records[0].text,
            r#"say "type": "x", "text": "y""#
        );
    }

    // ── Stage C ──────────────────────────────────────────────────────────

    #[test]
    fn repair_handles_dash_artifact_and_embedded_comma() {
        let input = r#""type": "heading", "text": "A" - "type": "bullet", "text": "B, C""#;
        assert!(parse_strict(input).is_none());
        assert_eq!(
            repair_fields(input),
            vec![NoteRecord::new("heading", "A"), NoteRecord::new("bullet", "B, C")]
        );
    }

    #[test]
    fn repair_keeps_unescaped_quotes_and_newlines() {
        let input = "[{\"type\": \"paragraph\", \"text\": \"He said \"no\"\nand left\"}, \
                     {\"type\": \"bullet\", \"text\": \"ok\"}]";
        assert!(parse_strict(input).is_none());
        let records = repair_fields(input);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "He said \"no\"\nand left");
        assert_eq!(records[1], NoteRecord::new("bullet", "ok"));
    }

    #[test]
    fn repair_survives_trailing_comma() {
        let input = r#"[{"type": "heading", "text": "Demand"},]"#;
        assert_eq!(repair_fields(input), vec![NoteRecord::new("heading", "Demand")]);
    }

    #[test]
    fn repair_keeps_hyphenated_words() {
        let input = r#"{"type": "paragraph", "text": "long-run supply",}"#;
        assert_eq!(repair_fields(input)[0].text, "long-run supply");
    }

    #[test]
    fn repair_ends_text_after_escaped_backslash() {
        let input = r#"[{"type": "paragraph", "text": "Path C:\\"}, {"type": "bullet", "text": "x"}] trailing"#;
        assert!(parse_strict(input).is_none());
        assert_eq!(
            repair_fields(input),
            vec![NoteRecord::new("paragraph", r"Path C:\"), NoteRecord::new("bullet", "x")]
        );
    }

    #[test]
    fn repair_skips_escaped_quotes_inside_text() {
        let input = r#"{"type": "paragraph", "text": "say \"hi\"}, then go"} extra"#;
        assert_eq!(
            repair_fields(input),
            vec![NoteRecord::new("paragraph", r#"say "hi"}, then go"#)]
        );
    }

    #[test]
    fn repair_of_garbage_is_empty() {
        assert!(repair_fields("Sorry, I can't help with that.").is_empty());
    }

    // ── Merge ────────────────────────────────────────────────────────────

    #[test]
    fn round_trip_fenced_response() {
        let raw = "```json\n[{\"type\":\"heading\",\"text\":\"Intro\"},{\"type\":\"paragraph\",\"text\":\"Economics is the study of scarcity.\"}]\n```";
        let merged = repair_and_merge(&[response(1, raw)]).unwrap();
        assert_eq!(
            merged.document.records(),
            &[
                NoteRecord::new("heading", "Intro"),
                NoteRecord::new("paragraph", "Economics is the study of scarcity."),
            ]
        );
        assert_eq!(merged.repaired_sections, 0);
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let merged =
            repair_and_merge(&[response(1, r#"{"type": "quote", "text": "Some aphorism"}"#)])
                .unwrap();
        assert_eq!(merged.document.records()[0].kind.as_str(), "quote");
    }

    #[test]
    fn blank_fields_are_dropped_and_counted() {
        let raw = r#"[
            {"type": "heading", "text": "Keep"},
            {"type": "paragraph", "text": "   "},
            {"type": "", "text": "no kind"},
            {"type": "bullet", "text": ""},
            "stray"
        ]"#;
        let merged = repair_and_merge(&[response(1, raw)]).unwrap();
        assert_eq!(pairs(&merged.document), vec![("heading".into(), "Keep".into())]);
        assert_eq!(merged.dropped_records, 4);
    }

    #[test]
    fn order_follows_responses_and_partial_loss_is_tolerated() {
        let responses = [
            response(1, r#"[{"type":"heading","text":"One"}]"#),
            response(2, "the model rambled instead"),
            response(3, r#""type": "heading", "text": "Three" - "type": "bullet", "text": "3b""#),
        ];
        let merged = repair_and_merge(&responses).unwrap();
        assert_eq!(
            pairs(&merged.document),
            vec![
                ("heading".into(), "One".into()),
                ("heading".into(), "Three".into()),
                ("bullet".into(), "3b".into()),
            ]
        );
        assert_eq!(merged.repaired_sections, 1);
        assert_eq!(merged.unrecovered.len(), 1);
        assert_eq!(merged.unrecovered[0].section(), 2);
    }

    #[test]
    fn strict_empty_array_is_unrecovered() {
        let recovered = recover_response(&response(1, "[]"));
        assert_eq!(recovered.recovery, Recovery::Unrecovered);
    }

    #[test]
    fn all_unrecoverable_is_an_error() {
        let err = repair_and_merge(&[response(1, "nope"), response(2, "[]")]).unwrap_err();
        assert!(matches!(err, NotesError::AllSectionsUnrecoverable { sections: 2 }));
    }
}
