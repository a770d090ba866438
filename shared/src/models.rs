use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::{free_tier_expiry, ProfileError, ProfileResult};

/// `classStatus` value that grants the teacher role
pub const TEACHER_CLASS_STATUS: &str = "Teacher";

/// Name used when the signup carries neither first/last name nor a display name
pub const DEFAULT_PROFILE_NAME: &str = "New User";

// ---------------------------------------------------------------------------
// Inbound webhook payload (database event trigger on the auth users table)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupPayload {
    /// Delivery id assigned by the event trigger
    pub id: Option<String>,
    pub trigger: Option<TriggerInfo>,
    pub table: Option<TableInfo>,
    pub event: Option<TriggerEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerInfo {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableInfo {
    pub schema: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerEvent {
    pub op: Option<String>,
    pub data: Option<EventData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventData {
    pub new: Option<NewUserRecord>,
}

/// The freshly inserted auth user row
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserRecord {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub metadata: Option<SignupMetadata>,
}

/// Signup form fields the client stores on the auth user.
///
/// Scalars are accepted in any JSON form and kept as strings; `null`,
/// arrays and objects read as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub class_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub target_exam: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub target_exam_year: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub referred_by_code: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Normalized signup, the input to profile assembly
#[derive(Debug, Clone, PartialEq)]
pub struct SignupEvent {
    pub user_id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub metadata: SignupMetadata,
}

impl SignupPayload {
    /// Parse a raw webhook body
    pub fn from_value(value: Value) -> ProfileResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| ProfileError::InvalidPayload(format!("Malformed event payload: {}", e)))
    }

    pub fn trigger_name(&self) -> Option<&str> {
        self.trigger.as_ref().and_then(|t| t.name.as_deref())
    }

    pub fn operation(&self) -> Option<&str> {
        self.event.as_ref().and_then(|e| e.op.as_deref())
    }

    pub fn source_table(&self) -> Option<String> {
        let table = self.table.as_ref()?;
        match (&table.schema, &table.name) {
            (Some(schema), Some(name)) => Some(format!("{}.{}", schema, name)),
            (None, Some(name)) => Some(name.clone()),
            _ => None,
        }
    }

    /// Extract the new-record data, rejecting payloads without it
    pub fn into_signup_event(self) -> ProfileResult<SignupEvent> {
        let event = self
            .event
            .ok_or_else(|| ProfileError::InvalidPayload("Missing event".to_string()))?;
        let data = event
            .data
            .ok_or_else(|| ProfileError::InvalidPayload("Missing event.data".to_string()))?;
        let record = data
            .new
            .ok_or_else(|| ProfileError::InvalidPayload("Missing event.data.new".to_string()))?;

        let user_id = record
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ProfileError::InvalidPayload("Missing event.data.new.id".to_string()))?;

        Ok(SignupEvent {
            user_id,
            display_name: record.display_name,
            avatar_url: record.avatar_url,
            metadata: record.metadata.unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Profile record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppRole {
    Teacher,
    User,
}

impl AppRole {
    pub fn from_class_status(class_status: Option<&str>) -> Self {
        match class_status {
            Some(TEACHER_CLASS_STATUS) => AppRole::Teacher,
            _ => AppRole::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
}

/// Referral counters per purchase category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStats {
    pub free: u32,
    pub chapterwise: u32,
    pub full_length: u32,
    pub dpp: u32,
    pub combo: u32,
}

/// Insert object for the profiles table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUserProfile {
    pub user_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub class_status: Option<String>,
    pub target_exam: Option<String>,
    pub target_exam_year: Option<i32>,
    pub app_role: AppRole,
    pub subscription_tier: SubscriptionTier,
    pub subscription_expiry_date: DateTime<Utc>,
    pub user_referral_code: String,
    pub referred_by_code: Option<String>,
    pub referral_stats: ReferralStats,
    pub total_points: i64,
}

impl NewUserProfile {
    /// Assemble the profile for a signup. Pure apart from the supplied clock.
    pub fn from_signup(
        event: &SignupEvent,
        referral_code: String,
        now: DateTime<Utc>,
    ) -> ProfileResult<Self> {
        let metadata = &event.metadata;

        Ok(Self {
            user_id: event.user_id.clone(),
            name: derive_profile_name(event),
            avatar_url: event.avatar_url.clone(),
            phone: metadata.phone.clone(),
            class_status: metadata.class_status.clone(),
            target_exam: metadata.target_exam.clone(),
            target_exam_year: parse_exam_year(metadata.target_exam_year.as_deref()),
            app_role: AppRole::from_class_status(metadata.class_status.as_deref()),
            subscription_tier: SubscriptionTier::Free,
            subscription_expiry_date: free_tier_expiry(now)?,
            user_referral_code: referral_code,
            referred_by_code: metadata.referred_by_code.clone(),
            referral_stats: ReferralStats::default(),
            total_points: 0,
        })
    }

    /// Same profile with a different referral code, for the insert retry
    pub fn with_referral_code(mut self, referral_code: String) -> Self {
        self.user_referral_code = referral_code;
        self
    }
}

/// First + last name, else display name, else the default name
pub fn derive_profile_name(event: &SignupEvent) -> String {
    // Empty strings count as absent; whitespace-only values do not.
    let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_owned);

    if let (Some(first), Some(last)) = (
        non_empty(&event.metadata.first_name),
        non_empty(&event.metadata.last_name),
    ) {
        return format!("{} {}", first, last).trim().to_string();
    }

    non_empty(&event.display_name).unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string())
}

pub fn parse_exam_year(raw: Option<&str>) -> Option<i32> {
    raw.and_then(|s| s.trim().parse::<i32>().ok())
}

// ---------------------------------------------------------------------------
// Webhook response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileResponse {
    pub success: bool,
    pub profile_id: String,
}

/// HTTP-style response understood by Function URLs and API Gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HandlerResponse {
    pub fn created(profile_id: String) -> Self {
        let body = CreateProfileResponse {
            success: true,
            profile_id,
        };
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        Self {
            status_code: 200,
            headers,
            // Serializing a struct of a bool and a string cannot fail
            body: serde_json::to_string(&body).unwrap_or_default(),
        }
    }

    pub fn from_error(error: &ProfileError) -> Self {
        Self::plain(error.status_code(), error.to_string())
    }

    pub fn plain(status_code: u16, message: String) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());

        Self {
            status_code,
            headers,
            body: message,
        }
    }
}
