//! Section extraction: one model call that splits a whole document into
//! `(heading, body)` sections.
//!
//! The model receives the raw document bytes and must answer with a flat JSON
//! object. There is no partial extraction: a response that is not a non-empty
//! object fails the document. No retries happen here; transient transport
//! failures are retried by [`crate::pipeline::llm::ProviderModel`].

use crate::config::NotesConfig;
use crate::error::{classify_error, ErrorKind, NotesError, Stage};
use crate::output::{sections_from_pairs, DocumentSection, TokenUsage};
use crate::pipeline::input::DocumentFormat;
use crate::pipeline::llm::{LanguageModel, ModelRequest};
use crate::pipeline::repair::strip_wrappers;
use crate::progress::{notify, UsageStage};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

/// Sections returned by one extraction call, with the call's token usage.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub sections: Vec<DocumentSection>,
    pub usage: TokenUsage,
}

/// Send `bytes` to the model and parse the sections it returns.
///
/// # Errors
/// - [`NotesError::UnsupportedFormat`] for a MIME type other than PDF/DOCX
/// - a stage-tagged model error when the call fails
/// - see [`parse_sections`] for response errors
pub async fn extract(
    model: &dyn LanguageModel,
    bytes: &[u8],
    mime_type: &str,
    config: &NotesConfig,
) -> Result<Extraction, NotesError> {
    let format = DocumentFormat::from_mime(mime_type)?;
    let start = Instant::now();

    let request = ModelRequest::document(config.extraction_system_prompt(), bytes, format.mime_type());
    let reply = model
        .complete(request)
        .await
        .map_err(|e| NotesError::from_model_failure(Stage::Extraction, e.kind(), e.message))?;

    notify(config.progress_callback.as_ref(), |c| {
        c.on_token_usage(UsageStage::Extraction, reply.usage)
    });
    debug!(
        "Extraction: {} input tokens, {} output tokens",
        reply.usage.input_tokens, reply.usage.output_tokens
    );

    let sections = parse_sections(&reply.text)?;
    info!(
        "Extracted {} sections from {} in {}ms",
        sections.len(),
        format,
        start.elapsed().as_millis()
    );
    notify(config.progress_callback.as_ref(), |c| {
        c.on_extraction_complete(sections.len())
    });
    Ok(Extraction {
        sections,
        usage: reply.usage,
    })
}

/// Parse an extraction response into sections, in document order.
///
/// String bodies are taken as-is, `null` becomes an empty body and any other
/// value is kept as compact JSON text. When a duplicate heading appears, the
/// first position wins and the last body is kept.
///
/// # Errors
/// - [`NotesError::NoContentProduced`] for an empty response or `{}`
/// - a stage-tagged model error when unparseable prose reads like a provider
///   error message (credentials, quota, rate limit, network, timeout);
///   broken JSON is never classified this way
/// - [`NotesError::InvalidResponseFormat`] for anything else that is not a
///   JSON object
pub fn parse_sections(text: &str) -> Result<Vec<DocumentSection>, NotesError> {
    let stripped = strip_wrappers(text);
    if stripped.is_empty() {
        return Err(NotesError::NoContentProduced {
            detail: "extraction returned no text".to_string(),
        });
    }

    let map = match serde_json::from_str::<Value>(&stripped) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(NotesError::InvalidResponseFormat {
                detail: format!("expected a JSON object, got {}", json_type(&other)),
            })
        }
        Err(e) => {
            let invalid = NotesError::InvalidResponseFormat {
                detail: e.to_string(),
            };
            // Broken JSON (usually truncated at the token limit) carries the
            // document's own words, which must not be read as an API error.
            if looks_like_json(&stripped) {
                return Err(invalid);
            }
            return Err(match classify_error(&stripped) {
                ErrorKind::ProviderFailure => invalid,
                kind => NotesError::from_model_failure(Stage::Extraction, kind, preview(&stripped)),
            });
        }
    };

    if map.is_empty() {
        return Err(NotesError::NoContentProduced {
            detail: "extraction returned an empty object".to_string(),
        });
    }

    Ok(sections_from_pairs(
        map.into_iter().map(|(heading, body)| (heading, body_text(body))),
    ))
}

fn looks_like_json(text: &str) -> bool {
    text.starts_with('{') || text.starts_with('[')
}

fn body_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First 200 characters, for error details.
fn preview(text: &str) -> String {
    match text.char_indices().nth(200) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::{DOCX_MIME, PDF_MIME};
    use crate::pipeline::testing::ScriptedModel;

    #[test]
    fn parses_sections_in_document_order() {
        let sections = parse_sections(
            r#"{"Scarcity": "Limited resources.", "Opportunity Cost": "What you give up.", "Markets": "Where trade happens."}"#,
        )
        .unwrap();
        let headings: Vec<&str> = sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, ["Scarcity", "Opportunity Cost", "Markets"]);
    }

    #[test]
    fn fenced_object_is_accepted() {
        let sections = parse_sections("```json\n{\"Intro\": \"Text\"}\n```").unwrap();
        assert_eq!(sections, vec![DocumentSection::new("Intro", "Text")]);
    }

    #[test]
    fn duplicate_heading_keeps_first_position_last_body() {
        let sections = parse_sections(r#"{"A": "one", "B": "two", "A": "three"}"#).unwrap();
        assert_eq!(
            sections,
            vec![
                DocumentSection::new("A", "three"),
                DocumentSection::new("B", "two")
            ]
        );
    }

    #[test]
    fn non_string_bodies_are_stringified() {
        let sections = parse_sections(r#"{"A": null, "B": ["x", 1]}"#).unwrap();
        assert_eq!(sections[0].body, "");
        assert_eq!(sections[1].body, r#"["x",1]"#);
    }

    #[test]
    fn empty_object_is_no_content() {
        let err = parse_sections("{}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoContentProduced);
        assert_eq!(parse_sections("  ").unwrap_err().kind(), ErrorKind::NoContentProduced);
    }

    #[test]
    fn array_is_invalid_format() {
        let err = parse_sections(r#"[{"A": "b"}]"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponseFormat);
        assert!(err.to_string().contains("an array"), "got: {err}");
    }

    #[test]
    fn prose_is_invalid_format() {
        let err = parse_sections("Here are the sections you asked for").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponseFormat);
    }

    #[test]
    fn truncated_object_is_invalid_format() {
        for body in [
            r#"{"Retirement": "A 401(k) plan lets employees defer"#,
            r#"{"Networks": "A connection between two computers on a network"#,
            r#"["Access control": "Permission is granted by the"#,
        ] {
            let err = parse_sections(body).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidResponseFormat, "body: {body}");
            assert_eq!(
                err.user_message(),
                ErrorKind::InvalidResponseFormat.user_message()
            );
        }
    }

    #[test]
    fn error_text_in_response_is_classified() {
        let err = parse_sections("Error: API key not valid").unwrap_err();
        assert!(matches!(
            err,
            NotesError::AuthenticationFailure {
                stage: Stage::Extraction,
                ..
            }
        ));
        let err = parse_sections("Resource exhausted: quota for today").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn unsupported_mime_makes_no_call() {
        let model = ScriptedModel::fixed(r#"{"A": "b"}"#);
        let err = extract(&model, b"hello", "text/plain", &NotesConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn extraction_sends_document_without_user_text() {
        let model = ScriptedModel::new(|req| {
            let doc = req.attachment.ok_or("missing attachment")?;
            assert_eq!(doc.mime_type, DOCX_MIME);
            Ok(r#"{"Intro": "Economics is the study of scarcity."}"#.to_string())
        });
        let extraction = extract(&model, b"PK\x03\x04", DOCX_MIME, &NotesConfig::default())
            .await
            .unwrap();
        assert_eq!(extraction.sections.len(), 1);
        assert_eq!(extraction.usage.input_tokens, 10);
        assert_eq!(model.prompts.lock().unwrap()[0], "");
    }

    #[tokio::test]
    async fn call_failure_is_stage_tagged() {
        let model = ScriptedModel::new(|_| Err("503 Service Unavailable".to_string()));
        let err = extract(&model, b"%PDF", PDF_MIME, &NotesConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotesError::NetworkUnavailable {
                stage: Stage::Extraction,
                ..
            }
        ));
    }
}
