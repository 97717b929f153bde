//! Opaque content envelopes
//!
//! Task content and legacy project metadata travel as base64 of a small
//! JSON object. The relay stores the blob byte-for-byte and never looks
//! inside; any change to the blob is a content change.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize)]
struct TaskEnvelope {
    content: String,
}

#[derive(Serialize, Deserialize)]
struct ProjectEnvelope {
    name: String,
    #[serde(default)]
    color: String,
}

/// Wrap task content for the wire.
pub fn encode_task_content(content: &str) -> String {
    let payload = serde_json::to_vec(&TaskEnvelope {
        content: content.to_string(),
    })
    .expect("task envelope serializes");
    STANDARD.encode(payload)
}

/// Unwrap a task content blob.
pub fn decode_task_content(blob: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(blob)
        .map_err(|error| Error::InvalidInput(format!("invalid base64 content blob: {error}")))?;
    let envelope: TaskEnvelope = serde_json::from_slice(&bytes)?;
    Ok(envelope.content)
}

/// Wrap project name/color for the legacy metadata blob.
pub fn encode_project_meta(name: &str, color: &str) -> String {
    let payload = serde_json::to_vec(&ProjectEnvelope {
        name: name.to_string(),
        color: color.to_string(),
    })
    .expect("project envelope serializes");
    STANDARD.encode(payload)
}

/// Unwrap a project metadata blob into `(name, color)`.
///
/// A missing color falls back to the default project color.
pub fn decode_project_meta(blob: &str) -> Result<(String, String)> {
    let bytes = STANDARD
        .decode(blob)
        .map_err(|error| Error::InvalidInput(format!("invalid base64 metadata blob: {error}")))?;
    let envelope: ProjectEnvelope = serde_json::from_slice(&bytes)?;
    let color = if envelope.color.is_empty() {
        "#4ECDC4".to_string()
    } else {
        envelope.color
    };
    Ok((envelope.name, color))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_content_round_trips() {
        let blob = encode_task_content("buy milk");
        assert_eq!(decode_task_content(&blob).unwrap(), "buy milk");
    }

    #[test]
    fn task_content_survives_unicode() {
        let blob = encode_task_content("emoji ✅ and \"quotes\"");
        assert_eq!(
            decode_task_content(&blob).unwrap(),
            "emoji ✅ and \"quotes\""
        );
    }

    #[test]
    fn decode_rejects_bad_base64() {
        assert!(decode_task_content("%%%").is_err());
    }

    #[test]
    fn decode_rejects_non_envelope_json() {
        let blob = STANDARD.encode(b"[1, 2, 3]");
        assert!(decode_task_content(&blob).is_err());
    }

    #[test]
    fn project_meta_round_trips() {
        let blob = encode_project_meta("Garden", "#00FF00");
        assert_eq!(
            decode_project_meta(&blob).unwrap(),
            ("Garden".to_string(), "#00FF00".to_string())
        );
    }

    #[test]
    fn project_meta_defaults_missing_color() {
        let blob = STANDARD.encode(br#"{"name":"Old Data"}"#);
        let (name, color) = decode_project_meta(&blob).unwrap();
        assert_eq!(name, "Old Data");
        assert_eq!(color, "#4ECDC4");
    }
}
