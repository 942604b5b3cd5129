//! Compact share code: the document without attachments or export date,
//! URI-component encoded and then base64, so it round-trips with the web
//! client's `btoa(encodeURIComponent(json))`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use super::document::{
    ExportDocument, ImportDocument, PortableCategory, PortableNotification, PortableSupply,
};
use crate::{AppError, AppResult};

pub const DECODE_CODE: &str = "TOKEN/DECODE";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload<'a> {
    supplies: &'a [PortableSupply],
    categories: &'a [PortableCategory],
    notifications: &'a [PortableNotification],
    #[serde(skip_serializing_if = "Option::is_none")]
    household_id: Option<&'a str>,
}

pub fn encode_token(doc: &ExportDocument) -> AppResult<String> {
    let payload = TokenPayload {
        supplies: &doc.supplies,
        categories: &doc.categories,
        notifications: &doc.notifications,
        household_id: doc.household_id.as_deref(),
    };
    let json = serde_json::to_string(&payload)?;
    let escaped = urlencoding::encode(&json);
    Ok(STANDARD.encode(escaped.as_bytes()))
}

fn decode_error(message: impl Into<String>) -> AppError {
    AppError::new(DECODE_CODE, message)
}

/// Reverse of [`encode_token`]. Whitespace (line wraps from chat apps) is
/// ignored. Every failure is `TOKEN/DECODE`.
pub fn decode_token(text: &str) -> AppResult<ImportDocument> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(decode_error("Please paste a code first"));
    }
    let bytes = STANDARD.decode(compact.as_bytes())?;
    let escaped = String::from_utf8(bytes)
        .map_err(|err| decode_error(format!("Invalid code format: {err}")))?;
    let json = urlencoding::decode(&escaped)
        .map_err(|err| decode_error(format!("Invalid code format: {err}")))?;
    serde_json::from_str(&json).map_err(|err| {
        decode_error("Invalid code format").with_cause(AppError::from(err))
    })
}
