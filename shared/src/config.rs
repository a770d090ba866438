use crate::ProfileError;

pub const DEFAULT_PROFILES_TABLE: &str = "profiles";
pub const DEFAULT_REFERRAL_CODE_PREFIX: &str = "edunexus";
pub const DEFAULT_REFERRAL_CODE_MAX_ATTEMPTS: u32 = 10;

/// Connection and policy settings for the profile store
#[derive(Clone)]
pub struct StoreConfig {
    pub graphql_endpoint: String,
    pub admin_secret: String,
    pub profiles_table: String,
    pub referral_code_prefix: String,
    pub max_code_attempts: u32,
}

impl StoreConfig {
    /// Create store config from Lambda environment variables
    pub fn from_env() -> Result<Self, ProfileError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProfileError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let graphql_endpoint = get("GRAPHQL_ENDPOINT")
            .ok_or_else(|| ProfileError::ConfigurationError("GRAPHQL_ENDPOINT not set".to_string()))?;
        let admin_secret = get("GRAPHQL_ADMIN_SECRET").ok_or_else(|| {
            ProfileError::ConfigurationError("GRAPHQL_ADMIN_SECRET not set".to_string())
        })?;

        let profiles_table = get("PROFILES_TABLE").unwrap_or_else(|| DEFAULT_PROFILES_TABLE.to_string());
        let referral_code_prefix =
            get("REFERRAL_CODE_PREFIX").unwrap_or_else(|| DEFAULT_REFERRAL_CODE_PREFIX.to_string());

        let max_code_attempts = match get("REFERRAL_CODE_MAX_ATTEMPTS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ProfileError::ConfigurationError(format!(
                        "REFERRAL_CODE_MAX_ATTEMPTS must be a positive integer, got '{}'",
                        raw
                    )))
                }
            },
            None => DEFAULT_REFERRAL_CODE_MAX_ATTEMPTS,
        };

        Ok(Self {
            graphql_endpoint,
            admin_secret,
            profiles_table,
            referral_code_prefix,
            max_code_attempts,
        })
    }
}

// Keeps the admin secret out of logs.
impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("graphql_endpoint", &self.graphql_endpoint)
            .field("admin_secret", &"[REDACTED]")
            .field("profiles_table", &self.profiles_table)
            .field("referral_code_prefix", &self.referral_code_prefix)
            .field("max_code_attempts", &self.max_code_attempts)
            .finish()
    }
}
