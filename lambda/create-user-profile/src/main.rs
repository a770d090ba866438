use anyhow::Context;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use profile_shared::{
    extract_webhook_body, GraphQLService, HandlerResponse, ProfileResult, ProfileService,
    SignupService, StoreConfig,
};

async fn function_handler(
    http: &HttpClient,
    event: LambdaEvent<Value>,
) -> Result<HandlerResponse, Error> {
    let (payload, context) = event.into_parts();

    info!("Received signup webhook, request id: {}", context.request_id);

    let response = handle_signup(http, StoreConfig::from_env(), payload).await;

    info!("Responding with status {}", response.status_code);
    Ok(response)
}

async fn handle_signup(
    http: &HttpClient,
    config: ProfileResult<StoreConfig>,
    payload: Value,
) -> HandlerResponse {
    // Configuration is checked before the payload is even looked at
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Store configuration missing: {}", e);
            return HandlerResponse::from_error(&e);
        }
    };

    let body = match extract_webhook_body(payload) {
        Ok(body) => body,
        Err(e) => {
            warn!("Unreadable webhook request: {}", e);
            return HandlerResponse::from_error(&e);
        }
    };

    let executor = Arc::new(GraphQLService::from_config(http.clone(), &config));
    let service = SignupService::new(ProfileService::from_config(executor, &config));

    service.handle(body).await
}

fn build_http_client() -> anyhow::Result<HttpClient> {
    HttpClient::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    info!("Starting create-user-profile Lambda function");

    // One connection pool per execution environment
    let http = build_http_client()?;
    let http = &http;

    run(service_fn(move |event: LambdaEvent<Value>| async move {
        function_handler(http, event).await
    }))
    .await
}
