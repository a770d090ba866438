use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ProfileError, ProfileResult, StoreConfig};

pub const ADMIN_SECRET_HEADER: &str = "x-hasura-admin-secret";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    pub variables: Value,
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    pub fn new(operation_name: &str, query: impl Into<String>, variables: Value) -> Self {
        Self {
            query: query.into(),
            variables,
            operation_name: Some(operation_name.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    pub data: Option<Value>,
    pub errors: Option<Vec<GraphQLErrorEntry>>,
}

impl GraphQLResponse {
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().map_or(false, |errors| !errors.is_empty())
    }

    /// All error messages joined for logging and response bodies
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .flatten()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLErrorEntry {
    pub message: String,
    #[serde(default)]
    pub extensions: Option<GraphQLErrorExtensions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLErrorExtensions {
    pub code: Option<String>,
    pub path: Option<String>,
}

impl GraphQLErrorEntry {
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref().and_then(|e| e.code.as_deref())
    }
}

/// Executes one query or mutation against the profile store
#[async_trait]
pub trait GraphQLExecutor: Send + Sync {
    async fn execute(&self, request: &GraphQLRequest) -> ProfileResult<GraphQLResponse>;
}

/// GraphQL endpoint client authenticated with the admin secret
pub struct GraphQLService {
    client: HttpClient,
    endpoint: String,
    admin_secret: String,
}

impl GraphQLService {
    pub fn new(client: HttpClient, endpoint: String, admin_secret: String) -> Self {
        Self {
            client,
            endpoint,
            admin_secret,
        }
    }

    pub fn from_config(client: HttpClient, config: &StoreConfig) -> Self {
        tracing::info!("GraphQLService initialized with endpoint: {}", config.graphql_endpoint);
        Self::new(
            client,
            config.graphql_endpoint.clone(),
            config.admin_secret.clone(),
        )
    }
}

#[async_trait]
impl GraphQLExecutor for GraphQLService {
    async fn execute(&self, request: &GraphQLRequest) -> ProfileResult<GraphQLResponse> {
        tracing::debug!(
            "Executing GraphQL operation {:?} against {}",
            request.operation_name,
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(ADMIN_SECRET_HEADER, &self.admin_secret)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("GraphQL request failed: {}", e);
                ProfileError::GraphQLError(format!("Request failed: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await?;

        classify_response(status, &body)
    }
}

/// Interpret an HTTP reply from the GraphQL endpoint. Error statuses still
/// carry a GraphQL body when the server got far enough to validate the
/// operation; those are passed through so the store errors reach the caller.
fn classify_response(status: StatusCode, body: &str) -> ProfileResult<GraphQLResponse> {
    match serde_json::from_str::<GraphQLResponse>(body) {
        Ok(parsed) if status.is_success() || parsed.has_errors() => Ok(parsed),
        Ok(_) => Err(ProfileError::GraphQLError(format!(
            "Unexpected HTTP status {} from GraphQL endpoint",
            status
        ))),
        Err(e) if status.is_success() => Err(ProfileError::SerializationError(format!(
            "Failed to parse GraphQL response: {}",
            e
        ))),
        Err(_) => Err(ProfileError::GraphQLError(format!(
            "HTTP {} from GraphQL endpoint: {}",
            status, body
        ))),
    }
}
