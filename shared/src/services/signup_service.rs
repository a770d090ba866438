use chrono::Utc;
use serde_json::Value;

use crate::{
    HandlerResponse, NewUserProfile, ProfileError, ProfileResult, ProfileService, SignupEvent,
    SignupPayload,
};

/// Turns one signup webhook into one profile row
pub struct SignupService {
    profiles: ProfileService,
}

impl SignupService {
    pub fn new(profiles: ProfileService) -> Self {
        Self { profiles }
    }

    /// Process a webhook body and map the outcome to the caller's response.
    /// Never fails: every error becomes a terminal response.
    pub async fn handle(&self, body: Value) -> HandlerResponse {
        match self.create_profile(body).await {
            Ok(profile_id) => {
                tracing::info!("Profile created: {}", profile_id);
                HandlerResponse::created(profile_id)
            }
            Err(e) => {
                if e.is_client_error() {
                    tracing::warn!("Rejected signup event: {}", e);
                } else {
                    tracing::error!("Failed to create profile: {}", e);
                }
                HandlerResponse::from_error(&e)
            }
        }
    }

    pub async fn create_profile(&self, body: Value) -> ProfileResult<String> {
        let payload = SignupPayload::from_value(body)?;

        tracing::info!(
            "Signup event {:?} - trigger: {:?}, table: {:?}, op: {:?}",
            payload.id,
            payload.trigger_name(),
            payload.source_table(),
            payload.operation()
        );

        let event = payload.into_signup_event()?;
        self.create_profile_for(&event).await
    }

    /// Generate a code, assemble the profile and insert it. A referral code
    /// taken between the uniqueness check and the insert gets one fresh code.
    pub async fn create_profile_for(&self, event: &SignupEvent) -> ProfileResult<String> {
        tracing::info!("Creating profile for user: {}", event.user_id);

        let referral_code = self.profiles.generate_unique_referral_code().await?;
        let profile = NewUserProfile::from_signup(event, referral_code, Utc::now())?;

        match self.profiles.insert_profile(&profile).await {
            Err(ProfileError::DuplicateReferralCode(code)) => {
                tracing::warn!(
                    "Referral code {} was claimed concurrently for user {}; retrying with a new code",
                    code,
                    event.user_id
                );
                let referral_code = self.profiles.generate_unique_referral_code().await?;
                let profile = profile.with_referral_code(referral_code);

                match self.profiles.insert_profile(&profile).await {
                    Err(ProfileError::DuplicateReferralCode(code)) => {
                        Err(ProfileError::PersistenceRejected(format!(
                            "Referral code {} collided on retry",
                            code
                        )))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }
}

/// Unwrap a Function URL / API Gateway envelope to the webhook body. A
/// payload without a string `body` is taken to be the webhook body itself.
pub fn extract_webhook_body(payload: Value) -> ProfileResult<Value> {
    let (body, is_base64) = match &payload {
        Value::Object(envelope) => (
            envelope.get("body").cloned(),
            envelope
                .get("isBase64Encoded")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        ),
        _ => {
            return Err(ProfileError::InvalidPayload(
                "Event payload must be a JSON object".to_string(),
            ))
        }
    };

    match body {
        Some(Value::String(body)) => {
            if is_base64 {
                return Err(ProfileError::InvalidPayload(
                    "Base64-encoded request bodies are not supported; send application/json"
                        .to_string(),
                ));
            }
            serde_json::from_str(&body).map_err(|e| {
                ProfileError::InvalidPayload(format!("Request body is not valid JSON: {}", e))
            })
        }
        Some(Value::Null) => Err(ProfileError::InvalidPayload(
            "Request body is empty".to_string(),
        )),
        _ => Ok(payload),
    }
}
