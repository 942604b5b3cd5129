use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use ts_rs::TS;

use crate::realtime::{ChangeFeed, Row as ChangeRow, RowChange, Table};
use crate::time::now_rfc3339;
use crate::util::require_household;
use crate::{id, AppError, AppResult};

pub const INVALID_ROLE_CODE: &str = "MEMBER/INVALID_ROLE";
pub const NOT_FOUND_CODE: &str = "MEMBER/NOT_FOUND";

/// The two household roles. `Wife` edits the inventory; `Husband` receives
/// reminders and shops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Role {
    Wife,
    Husband,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Wife => "wife",
            Role::Husband => "husband",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wife" => Ok(Role::Wife),
            "husband" => Ok(Role::Husband),
            other => Err(AppError::new(INVALID_ROLE_CODE, format!("Unknown role: {other}"))
                .with_context("role", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HouseholdMember {
    pub id: String,
    pub household_id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub phone: Option<String>,
    pub invite_token: String,
    pub invite_status: String,
    pub created_at: String,
}

impl TryFrom<&SqliteRow> for HouseholdMember {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            household_id: row.try_get("household_id")?,
            role: role.parse()?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            invite_token: row.try_get("invite_token")?,
            invite_status: row.try_get("invite_status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    #[serde(default)]
    pub household_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

const SELECT_COLUMNS: &str = "SELECT id, household_id, role, email, phone, invite_token, invite_status, created_at FROM household_members";

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Record a pending invite. `householdId` and `role` are required; the email
/// is stored lowercased.
pub async fn invite(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    request: InviteRequest,
) -> AppResult<HouseholdMember> {
    let household_id = non_blank(request.household_id);
    let role = non_blank(request.role);
    let (Some(household_id), Some(role)) = (household_id, role) else {
        return Err(AppError::validation(
            "invite",
            "householdId and role are required",
        ));
    };
    let member = HouseholdMember {
        id: id::new_uuid_v7(),
        household_id,
        role: role.parse()?,
        email: non_blank(request.email).map(|email| email.to_lowercase()),
        phone: non_blank(request.phone),
        invite_token: id::new_uuid_v4(),
        invite_status: "pending".to_string(),
        created_at: now_rfc3339(),
    };
    sqlx::query(
        "INSERT INTO household_members (id, household_id, role, email, phone, invite_token, invite_status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&member.id)
    .bind(&member.household_id)
    .bind(member.role.as_str())
    .bind(&member.email)
    .bind(&member.phone)
    .bind(&member.invite_token)
    .bind(&member.invite_status)
    .bind(&member.created_at)
    .execute(pool)
    .await?;
    feed.publish(
        &member.household_id,
        RowChange::Inserted(ChangeRow::Member(member.clone())),
    );
    Ok(member)
}

pub async fn list(pool: &SqlitePool, household_id: &str) -> AppResult<Vec<HouseholdMember>> {
    let household_id = require_household(household_id)?;
    let rows = sqlx::query(&format!(
        "{SELECT_COLUMNS} WHERE household_id = ? ORDER BY created_at, id"
    ))
    .bind(household_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(HouseholdMember::try_from).collect()
}

pub async fn remove(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    member_id: &str,
) -> AppResult<()> {
    let household_id = require_household(household_id)?;
    let res = sqlx::query("DELETE FROM household_members WHERE household_id = ? AND id = ?")
        .bind(household_id)
        .bind(member_id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::new(NOT_FOUND_CODE, "Member not found").with_context("id", member_id));
    }
    feed.publish(
        household_id,
        RowChange::Deleted {
            table: Table::HouseholdMembers,
            id: member_id.to_string(),
        },
    );
    Ok(())
}

/// Remove every membership row for `email` in the household. Returns how many
/// rows went away.
pub async fn leave(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    household_id: &str,
    email: &str,
) -> AppResult<usize> {
    let household_id = require_household(household_id)?;
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::validation("email", "No authenticated email found"));
    }
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM household_members WHERE household_id = ? AND email = ?",
    )
    .bind(household_id)
    .bind(&email)
    .fetch_all(pool)
    .await?;
    sqlx::query("DELETE FROM household_members WHERE household_id = ? AND email = ?")
        .bind(household_id)
        .bind(&email)
        .execute(pool)
        .await?;
    for id in &ids {
        feed.publish(
            household_id,
            RowChange::Deleted {
                table: Table::HouseholdMembers,
                id: id.clone(),
            },
        );
    }
    Ok(ids.len())
}

/// Most recent membership for an email across all households.
pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<HouseholdMember>> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Ok(None);
    }
    let row = sqlx::query(&format!(
        "{SELECT_COLUMNS} WHERE email = ? ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(&email)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(HouseholdMember::try_from).transpose()
}

pub async fn first_with_role(
    pool: &SqlitePool,
    household_id: &str,
    role: Role,
) -> AppResult<Option<HouseholdMember>> {
    let household_id = require_household(household_id)?;
    let row = sqlx::query(&format!(
        "{SELECT_COLUMNS} WHERE household_id = ? AND role = ? ORDER BY created_at, id LIMIT 1"
    ))
    .bind(household_id)
    .bind(role.as_str())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(HouseholdMember::try_from).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_text() {
        assert_eq!("Husband".parse::<Role>().unwrap(), Role::Husband);
        assert_eq!(Role::Wife.to_string(), "wife");
        assert_eq!("guest".parse::<Role>().unwrap_err().code(), INVALID_ROLE_CODE);
    }

    #[test]
    fn invite_request_reads_camel_case() {
        let req: InviteRequest = serde_json::from_value(serde_json::json!({
            "householdId": "h1",
            "role": "husband",
            "phone": "+15550100"
        }))
        .unwrap();
        assert_eq!(req.household_id.as_deref(), Some("h1"));
        assert_eq!(req.email, None);
    }
}
