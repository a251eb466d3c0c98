//! Attachment materializer.
//!
//! Turns `{name, data-URI}` pairs into named byte buffers ready to publish.
//! Names end up as repository paths, so they are validated here: no path
//! escapes, no clobbering of the generated files, no duplicates.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::artifact::RESERVED_FILES;

const DEFAULT_MEDIA_TYPE: &str = "text/plain;charset=US-ASCII";

/// Attachment as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentInput {
    pub name: String,
    /// A `data:` URI carrying the content.
    pub url: String,
}

/// A decoded attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Leading text of the content for prompts, if it is text at all.
    pub fn preview(&self, max_chars: usize) -> Option<String> {
        let text = std::str::from_utf8(&self.bytes).ok()?;
        Some(text.chars().take(max_chars).collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("attachment {name:?}: not a data URI")]
    NotDataUri { name: String },
    #[error("attachment {name:?}: data URI has no ',' separator")]
    MissingPayload { name: String },
    #[error("attachment {name:?}: invalid base64 payload: {source}")]
    Base64 {
        name: String,
        source: base64::DecodeError,
    },
    #[error("attachment name {name:?} rejected: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

/// Decode every attachment, stopping at the first failure.
pub fn materialize(inputs: &[AttachmentInput]) -> Result<Vec<Attachment>, AttachmentError> {
    let mut out: Vec<Attachment> = Vec::with_capacity(inputs.len());
    for input in inputs {
        validate_name(&input.name)?;
        if out.iter().any(|a| a.name.eq_ignore_ascii_case(&input.name)) {
            return Err(AttachmentError::InvalidName {
                name: input.name.clone(),
                reason: "duplicate attachment name",
            });
        }
        let (media_type, bytes) = decode_data_uri(&input.name, &input.url)?;
        out.push(Attachment {
            name: input.name.clone(),
            media_type,
            bytes,
        });
    }
    Ok(out)
}

/// Reject names that would escape the repository root or replace one of
/// the generated files.
fn validate_name(name: &str) -> Result<(), AttachmentError> {
    let reject = |reason| {
        Err(AttachmentError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };
    if name.trim().is_empty() {
        return reject("empty name");
    }
    if name.contains('\\') || name.contains('\0') {
        return reject("contains a backslash or NUL");
    }
    if name.starts_with('/') {
        return reject("absolute path");
    }
    if name
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return reject("path traversal or empty path component");
    }
    if RESERVED_FILES.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return reject("collides with a generated file");
    }
    Ok(())
}

/// Parse `data:[<mediatype>][;base64],<payload>`.
fn decode_data_uri(name: &str, uri: &str) -> Result<(String, Vec<u8>), AttachmentError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .or_else(|| uri.trim().strip_prefix("DATA:"))
        .ok_or_else(|| AttachmentError::NotDataUri {
            name: name.to_string(),
        })?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| AttachmentError::MissingPayload {
            name: name.to_string(),
        })?;

    let (media_type, is_base64) = match meta.strip_suffix(";base64") {
        Some(mt) => (mt, true),
        None => (meta, false),
    };
    let media_type = if media_type.is_empty() {
        DEFAULT_MEDIA_TYPE.to_string()
    } else {
        media_type.to_string()
    };

    let bytes = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|source| AttachmentError::Base64 {
                name: name.to_string(),
                source,
            })?
    } else {
        percent_encoding::percent_decode_str(payload).collect()
    };
    Ok((media_type, bytes))
}
