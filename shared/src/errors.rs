use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Referral code generation failed: {0}")]
    CodeGenerationFailed(String),

    #[error("No unused referral code found after {attempts} attempts")]
    ReferralCodeExhausted { attempts: u32 },

    #[error("Profile insert rejected: {0}")]
    PersistenceRejected(String),

    #[error("Profile insert returned no created record")]
    PersistenceAmbiguous,

    #[error("Referral code already taken: {0}")]
    DuplicateReferralCode(String),

    #[error("GraphQL error: {0}")]
    GraphQLError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ProfileError {
    /// HTTP status reported to the webhook caller for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            ProfileError::InvalidPayload(_)
            | ProfileError::PersistenceRejected(_)
            | ProfileError::DuplicateReferralCode(_) => 400,
            ProfileError::ConfigurationError(_)
            | ProfileError::CodeGenerationFailed(_)
            | ProfileError::ReferralCodeExhausted { .. }
            | ProfileError::PersistenceAmbiguous
            | ProfileError::GraphQLError(_)
            | ProfileError::SerializationError(_)
            | ProfileError::InternalError(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

impl From<reqwest::Error> for ProfileError {
    fn from(err: reqwest::Error) -> Self {
        ProfileError::GraphQLError(err.to_string())
    }
}

impl From<serde_json::Error> for ProfileError {
    fn from(err: serde_json::Error) -> Self {
        ProfileError::SerializationError(err.to_string())
    }
}

pub type ProfileResult<T> = Result<T, ProfileError>;
