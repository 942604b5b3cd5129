//! The portable household document shared by backups, share tokens, and
//! imports. Field spellings follow the web client: categories carry
//! `isCustom`, notifications `itemName` / `isRead`, and the envelope is
//! camelCase. Every record also accepts the snake_case spelling.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::attachments::{self, Attachment};
use crate::categories::{self, Category, DEFAULT_ICON};
use crate::notifications::{self, Notification};
use crate::supplies::{self, Supply, SupplyStatus};
use crate::time::now_rfc3339;
use crate::util::require_household;
use crate::AppResult;

/// First non-empty candidate, or `""`.
pub fn resolve_name(candidates: &[Option<&str>]) -> String {
    candidates
        .iter()
        .flatten()
        .find(|name| !name.is_empty())
        .map(|name| name.to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableCategory {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_ar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(rename = "isCustom", alias = "is_custom", default, skip_serializing_if = "Option::is_none")]
    pub is_custom: Option<bool>,
}

impl PortableCategory {
    pub fn display_name(&self) -> String {
        resolve_name(&[self.name.as_deref(), self.name_en.as_deref(), self.name_ar.as_deref()])
    }

    pub fn to_row(&self, household_id: &str, now_ms: i64) -> Category {
        Category {
            id: self.id.clone(),
            household_id: household_id.to_string(),
            name: self.display_name(),
            name_ar: self.name_ar.clone().filter(|n| !n.is_empty()),
            name_en: self.name_en.clone().filter(|n| !n.is_empty()),
            icon: self
                .icon
                .clone()
                .filter(|icon| !icon.is_empty())
                .unwrap_or_else(|| DEFAULT_ICON.to_string()),
            is_custom: self.is_custom.unwrap_or(false),
            created_at: now_ms,
        }
    }
}

impl From<&Category> for PortableCategory {
    fn from(c: &Category) -> Self {
        Self {
            id: c.id.clone(),
            name: Some(c.name.clone()),
            name_ar: c.name_ar.clone(),
            name_en: c.name_en.clone(),
            icon: Some(c.icon.clone()),
            is_custom: Some(c.is_custom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableSupply {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_ar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub category: String,
    /// Milliseconds when written by this service; other producers may use
    /// ISO text, which is ignored on import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Value>,
}

impl PortableSupply {
    pub fn display_name(&self) -> String {
        resolve_name(&[self.name.as_deref(), self.name_en.as_deref(), self.name_ar.as_deref()])
    }

    /// Missing status means available; unknown text is `SUPPLY/INVALID_STATUS`.
    pub fn status(&self) -> AppResult<SupplyStatus> {
        match self.status.as_deref() {
            None | Some("") => Ok(SupplyStatus::Available),
            Some(text) => text.parse().map_err(|err: crate::AppError| err.with_context("id", self.id.clone())),
        }
    }

    pub fn to_row(&self, household_id: &str, now_ms: i64) -> AppResult<Supply> {
        let created_at = self
            .created_at
            .as_ref()
            .and_then(Value::as_i64)
            .unwrap_or(now_ms);
        Ok(Supply {
            id: self.id.clone(),
            household_id: household_id.to_string(),
            name: self.display_name(),
            name_ar: self.name_ar.clone().filter(|n| !n.is_empty()),
            name_en: self.name_en.clone().filter(|n| !n.is_empty()),
            status: self.status()?,
            category: self.category.clone(),
            created_at,
            updated_at: now_ms,
        })
    }
}

impl From<&Supply> for PortableSupply {
    fn from(s: &Supply) -> Self {
        Self {
            id: s.id.clone(),
            name: Some(s.name.clone()),
            name_ar: s.name_ar.clone(),
            name_en: s.name_en.clone(),
            status: Some(s.status.as_str().to_string()),
            category: s.category.clone(),
            created_at: Some(Value::from(s.created_at)),
            updated_at: Some(Value::from(s.updated_at)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableNotification {
    pub id: String,
    #[serde(rename = "itemName", alias = "item_name", default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_ar: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(rename = "isRead", alias = "is_read", default, skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

impl PortableNotification {
    pub fn display_name(&self) -> String {
        resolve_name(&[
            self.item_name.as_deref(),
            self.name.as_deref(),
            self.name_en.as_deref(),
            self.name_ar.as_deref(),
        ])
    }

    pub fn to_row(&self, household_id: &str) -> AppResult<Notification> {
        let status = match self.status.as_deref() {
            None | Some("") => SupplyStatus::Low,
            Some(text) => text.parse()?,
        };
        Ok(Notification {
            id: self.id.clone(),
            household_id: household_id.to_string(),
            item_name: self.display_name(),
            category: self.category.clone(),
            status,
            timestamp: self.timestamp.clone().unwrap_or_else(now_rfc3339),
            is_read: self.is_read.unwrap_or(false),
        })
    }
}

impl From<&Notification> for PortableNotification {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id.clone(),
            item_name: Some(n.item_name.clone()),
            name: None,
            name_en: None,
            name_ar: None,
            category: n.category.clone(),
            status: Some(n.status.as_str().to_string()),
            timestamp: Some(n.timestamp.clone()),
            is_read: Some(n.is_read),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableAttachment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", alias = "mimeType", alias = "mime_type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(rename = "dataUrl", alias = "data_url", default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    #[serde(rename = "uploadedAt", alias = "uploaded_at", default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
}

impl PortableAttachment {
    pub fn to_row(&self, household_id: &str) -> Attachment {
        Attachment {
            id: self.id.clone(),
            household_id: household_id.to_string(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            mime_type: self.mime_type.clone(),
            size: self.size,
            data_url: self.data_url.clone(),
            uploaded_at: self.uploaded_at.clone().unwrap_or_else(now_rfc3339),
        }
    }
}

impl From<&Attachment> for PortableAttachment {
    fn from(a: &Attachment) -> Self {
        Self {
            id: a.id.clone(),
            name: Some(a.name.clone()),
            mime_type: a.mime_type.clone(),
            size: a.size,
            data_url: a.data_url.clone(),
            uploaded_at: Some(a.uploaded_at.clone()),
        }
    }
}

/// Full household snapshot. Missing collections deserialize as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    #[serde(default)]
    pub supplies: Vec<PortableSupply>,
    #[serde(default)]
    pub categories: Vec<PortableCategory>,
    #[serde(default)]
    pub notifications: Vec<PortableNotification>,
    #[serde(default, alias = "uploaded_files")]
    pub uploaded_files: Vec<PortableAttachment>,
    #[serde(default, alias = "household_id", skip_serializing_if = "Option::is_none")]
    pub household_id: Option<String>,
    #[serde(default, alias = "export_date", skip_serializing_if = "Option::is_none")]
    pub export_date: Option<String>,
}

/// Imports read the same shape that exports write.
pub type ImportDocument = ExportDocument;

impl ExportDocument {
    pub fn from_rows(
        household_id: &str,
        supplies: &[Supply],
        categories: &[Category],
        notifications: &[Notification],
        attachments: &[Attachment],
    ) -> Self {
        Self {
            supplies: supplies.iter().map(PortableSupply::from).collect(),
            categories: categories.iter().map(PortableCategory::from).collect(),
            notifications: notifications.iter().map(PortableNotification::from).collect(),
            uploaded_files: attachments.iter().map(PortableAttachment::from).collect(),
            household_id: Some(household_id.to_string()),
            export_date: Some(now_rfc3339()),
        }
    }
}

/// Snapshot every collection of the household.
pub async fn build_document(pool: &SqlitePool, household_id: &str) -> AppResult<ExportDocument> {
    let household_id = require_household(household_id)?;
    let supplies = supplies::list(pool, household_id).await?;
    let categories = categories::list(pool, household_id).await?;
    let notifications = notifications::list(pool, household_id).await?;
    let attachments = attachments::list(pool, household_id).await?;
    Ok(ExportDocument::from_rows(
        household_id,
        &supplies,
        &categories,
        &notifications,
        &attachments,
    ))
}

/// Parse backup text. Malformed JSON surfaces as a `JSON/*` error.
pub fn parse_document(text: &str) -> AppResult<ImportDocument> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn name_resolution_prefers_primary_name() {
        assert_eq!(resolve_name(&[Some("Tea"), Some("Tea EN")]), "Tea");
        assert_eq!(resolve_name(&[Some(""), Some("Tea EN"), Some("شاي")]), "Tea EN");
        assert_eq!(resolve_name(&[None, None, Some("شاي")]), "شاي");
        assert_eq!(resolve_name(&[None, None]), "");
    }

    #[test]
    fn parses_web_client_spellings() {
        let doc = parse_document(
            &json!({
                "categories": [{ "id": "c1", "name_en": "Spices", "icon": "🌶️", "isCustom": true }],
                "supplies": [{ "id": "s1", "name_ar": "كمون", "status": "low", "category": "c1",
                               "created_at": "2025-01-01T00:00:00Z" }],
                "notifications": [{ "id": "n1", "item_name": "Cumin", "category": "Spices",
                                    "status": "low", "is_read": true }],
                "householdId": "h1"
            })
            .to_string(),
        )
        .unwrap();
        assert!(doc.uploaded_files.is_empty());
        assert_eq!(doc.categories[0].display_name(), "Spices");
        assert_eq!(doc.categories[0].is_custom, Some(true));
        let supply = doc.supplies[0].to_row("h1", 10).unwrap();
        assert_eq!(supply.name, "كمون");
        assert_eq!(supply.status, SupplyStatus::Low);
        assert_eq!(supply.created_at, 10);
        let notification = doc.notifications[0].to_row("h1").unwrap();
        assert_eq!(notification.item_name, "Cumin");
        assert!(notification.is_read);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let supply = PortableSupply {
            id: "s1".into(),
            name: Some("Tea".into()),
            name_ar: None,
            name_en: None,
            status: Some("plenty".into()),
            category: "pantry".into(),
            created_at: None,
            updated_at: None,
        };
        let err = supply.to_row("h1", 0).unwrap_err();
        assert_eq!(err.code(), "SUPPLY/INVALID_STATUS");
        assert_eq!(err.context().get("id"), Some(&"s1".to_string()));
    }

    #[test]
    fn export_uses_camel_case_envelope() {
        let doc = ExportDocument::from_rows("h1", &[], &[], &[], &[]);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["householdId"], "h1");
        assert!(value.get("uploadedFiles").is_some());
        assert!(value.get("exportDate").is_some());
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let err = parse_document("{ not json").unwrap_err();
        assert!(err.code().starts_with("JSON/"));
    }
}
