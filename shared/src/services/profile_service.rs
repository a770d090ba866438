use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    generate_referral_code, GraphQLErrorEntry, GraphQLExecutor, GraphQLRequest, NewUserProfile,
    ProfileError, ProfileResult, StoreConfig,
};

/// Column carrying the unique referral code
pub const REFERRAL_CODE_COLUMN: &str = "user_referral_code";

const CONSTRAINT_VIOLATION: &str = "constraint-violation";

/// Profile table access: referral code lookups and the profile insert
pub struct ProfileService {
    executor: Arc<dyn GraphQLExecutor>,
    table: String,
    code_prefix: String,
    max_code_attempts: u32,
}

impl ProfileService {
    pub fn new(
        executor: Arc<dyn GraphQLExecutor>,
        table: String,
        code_prefix: String,
        max_code_attempts: u32,
    ) -> Self {
        Self {
            executor,
            table,
            code_prefix,
            max_code_attempts: max_code_attempts.max(1),
        }
    }

    pub fn from_config(executor: Arc<dyn GraphQLExecutor>, config: &StoreConfig) -> Self {
        Self::new(
            executor,
            config.profiles_table.clone(),
            config.referral_code_prefix.clone(),
            config.max_code_attempts,
        )
    }

    /// Whether any profile already holds `code`
    pub async fn referral_code_exists(&self, code: &str) -> ProfileResult<bool> {
        let query = format!(
            "query ReferralCodeExists($code: String!) {{ {table}(where: {{{column}: {{_eq: $code}}}}, limit: 1) {{ id }} }}",
            table = self.table,
            column = REFERRAL_CODE_COLUMN,
        );
        let request = GraphQLRequest::new("ReferralCodeExists", query, json!({ "code": code }));

        let response = self.executor.execute(&request).await?;
        if response.has_errors() {
            return Err(ProfileError::GraphQLError(response.error_summary()));
        }

        let matches = response
            .data
            .as_ref()
            .and_then(|data| data.get(&self.table))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ProfileError::GraphQLError(format!("Response is missing the '{}' field", self.table))
            })?;

        Ok(!matches.is_empty())
    }

    /// Draw codes until one is not held by any profile
    pub async fn generate_unique_referral_code(&self) -> ProfileResult<String> {
        let prefix = self.code_prefix.clone();
        self.generate_unique_referral_code_with(move || generate_referral_code(&prefix))
            .await
    }

    /// Generate-and-test loop over candidates from `next_candidate`.
    ///
    /// A lookup failure aborts immediately; only a confirmed collision draws
    /// again. Gives up after `max_code_attempts` collisions.
    pub async fn generate_unique_referral_code_with<F>(
        &self,
        mut next_candidate: F,
    ) -> ProfileResult<String>
    where
        F: FnMut() -> String + Send,
    {
        for attempt in 1..=self.max_code_attempts {
            let candidate = next_candidate();

            match self.referral_code_exists(&candidate).await {
                Ok(false) => {
                    tracing::info!("Referral code {} is unused (attempt {})", candidate, attempt);
                    return Ok(candidate);
                }
                Ok(true) => {
                    tracing::warn!(
                        "Referral code {} already taken (attempt {} of {})",
                        candidate,
                        attempt,
                        self.max_code_attempts
                    );
                }
                Err(e) => {
                    tracing::error!("Referral code uniqueness check failed: {}", e);
                    return Err(ProfileError::CodeGenerationFailed(e.to_string()));
                }
            }
        }

        Err(ProfileError::ReferralCodeExhausted {
            attempts: self.max_code_attempts,
        })
    }

    /// Insert the profile and return the created row id
    pub async fn insert_profile(&self, profile: &NewUserProfile) -> ProfileResult<String> {
        let root_field = format!("insert_{}_one", self.table);
        let query = format!(
            "mutation InsertProfile($object: {table}_insert_input!) {{ {root}(object: $object) {{ id }} }}",
            table = self.table,
            root = root_field,
        );
        let request = GraphQLRequest::new(
            "InsertProfile",
            query,
            json!({ "object": serde_json::to_value(profile)? }),
        );

        let response = self.executor.execute(&request).await?;

        if let Some(errors) = response.errors.as_ref().filter(|errors| !errors.is_empty()) {
            if errors.iter().any(is_referral_code_conflict) {
                return Err(ProfileError::DuplicateReferralCode(
                    profile.user_referral_code.clone(),
                ));
            }
            return Err(ProfileError::PersistenceRejected(response.error_summary()));
        }

        // Hasura returns uuid ids as strings; serial ids come back as numbers.
        let id = response
            .data
            .as_ref()
            .and_then(|data| data.get(&root_field))
            .and_then(|row| row.get("id"))
            .and_then(|id| match id {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or(ProfileError::PersistenceAmbiguous)?;

        Ok(id)
    }
}

/// Uniqueness violation on the referral code column, as opposed to e.g. a
/// second profile for the same user
fn is_referral_code_conflict(error: &GraphQLErrorEntry) -> bool {
    error.code() == Some(CONSTRAINT_VIOLATION) && error.message.contains(REFERRAL_CODE_COLUMN)
}
