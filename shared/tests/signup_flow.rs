// End-to-end signup handling against a scripted GraphQL store
// Run with: cargo test --test signup_flow

use async_trait::async_trait;
use profile_shared::{
    GraphQLErrorEntry, GraphQLErrorExtensions, GraphQLExecutor,
    GraphQLRequest, GraphQLResponse, ProfileError, ProfileResult, ProfileService, SignupService,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays canned responses in order and records every request
struct ScriptedStore {
    responses: Mutex<VecDeque<ProfileResult<GraphQLResponse>>>,
    requests: Mutex<Vec<GraphQLRequest>>,
}

impl ScriptedStore {
    fn new(responses: Vec<ProfileResult<GraphQLResponse>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<GraphQLRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn operations(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.operation_name.unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl GraphQLExecutor for ScriptedStore {
    async fn execute(&self, request: &GraphQLRequest) -> ProfileResult<GraphQLResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProfileError::GraphQLError("no scripted response left".to_string())))
    }
}

fn data(value: Value) -> ProfileResult<GraphQLResponse> {
    Ok(GraphQLResponse {
        data: Some(value),
        errors: None,
    })
}

fn code_unused() -> ProfileResult<GraphQLResponse> {
    data(json!({"profiles": []}))
}

fn code_taken() -> ProfileResult<GraphQLResponse> {
    data(json!({"profiles": [{"id": "existing"}]}))
}

fn inserted(id: &str) -> ProfileResult<GraphQLResponse> {
    data(json!({"insert_profiles_one": {"id": id}}))
}

fn store_error(message: &str, code: &str) -> ProfileResult<GraphQLResponse> {
    Ok(GraphQLResponse {
        data: None,
        errors: Some(vec![GraphQLErrorEntry {
            message: message.to_string(),
            extensions: Some(GraphQLErrorExtensions {
                code: Some(code.to_string()),
                path: None,
            }),
        }]),
    })
}

fn profile_service(store: &Arc<ScriptedStore>, max_attempts: u32) -> ProfileService {
    ProfileService::new(
        store.clone(),
        "profiles".to_string(),
        "edunexus".to_string(),
        max_attempts,
    )
}

fn signup_service(store: &Arc<ScriptedStore>) -> SignupService {
    SignupService::new(profile_service(store, 10))
}

fn signup_payload(metadata: Value) -> Value {
    json!({
        "id": "evt-1",
        "trigger": {"name": "on_user_created"},
        "table": {"schema": "auth", "name": "users"},
        "event": {
            "op": "INSERT",
            "data": {
                "old": null,
                "new": {"id": "u1", "displayName": "Janie", "avatarUrl": null, "metadata": metadata}
            }
        }
    })
}

fn inserted_object(request: &GraphQLRequest) -> Value {
    request.variables["object"].clone()
}

#[tokio::test]
async fn test_end_to_end_teacher_signup() {
    let store = ScriptedStore::new(vec![code_unused(), inserted("p1")]);
    let service = signup_service(&store);

    let response = service
        .handle(signup_payload(json!({
            "firstName": "Jane",
            "lastName": "Doe",
            "classStatus": "Teacher",
            "targetExamYear": "2025"
        })))
        .await;

    assert_eq!(response.status_code, 200);
    let body: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body, json!({"success": true, "profileId": "p1"}));

    let requests = store.requests();
    assert_eq!(store.operations(), vec!["ReferralCodeExists", "InsertProfile"]);

    let checked_code = requests[0].variables["code"].as_str().unwrap().to_string();
    let profile = inserted_object(&requests[1]);
    assert_eq!(profile["user_id"], "u1");
    assert_eq!(profile["name"], "Jane Doe");
    assert_eq!(profile["app_role"], "teacher");
    assert_eq!(profile["target_exam_year"], 2025);
    assert_eq!(profile["subscription_tier"], "free");
    assert_eq!(profile["total_points"], 0);
    assert_eq!(profile["user_referral_code"], checked_code.as_str());
    let digits = checked_code.strip_prefix("edunexus-").unwrap();
    assert_eq!(digits.len(), 6);
    assert!((100_000..=999_999).contains(&digits.parse::<u32>().unwrap()));
}

#[tokio::test]
async fn test_bare_signup_gets_defaults() {
    let store = ScriptedStore::new(vec![code_unused(), inserted("p2")]);
    let service = signup_service(&store);

    let response = service
        .handle(json!({"event": {"data": {"new": {"id": "u2"}}}}))
        .await;
    assert_eq!(response.status_code, 200);

    let profile = inserted_object(&store.requests()[1]);
    assert_eq!(profile["name"], "New User");
    assert_eq!(profile["app_role"], "user");
    assert_eq!(profile["target_exam_year"], Value::Null);
    assert_eq!(profile["referred_by_code"], Value::Null);
}

#[tokio::test]
async fn test_invalid_payload_makes_no_store_calls() {
    let store = ScriptedStore::new(vec![]);
    let service = signup_service(&store);

    for payload in [
        json!({}),
        json!({"event": {"op": "INSERT"}}),
        json!({"event": {"data": {"old": null}}}),
    ] {
        let response = service.handle(payload).await;
        assert_eq!(response.status_code, 400);
    }

    assert!(store.requests().is_empty());
}

#[tokio::test]
async fn test_taken_code_is_discarded_and_redrawn() {
    let store = ScriptedStore::new(vec![code_taken(), code_taken(), code_unused()]);
    let service = profile_service(&store, 10);

    let mut candidates = vec!["edunexus-111111", "edunexus-222222", "edunexus-333333"].into_iter();
    let code = service
        .generate_unique_referral_code_with(move || candidates.next().unwrap().to_string())
        .await
        .unwrap();

    assert_eq!(code, "edunexus-333333");
    let checked: Vec<Value> = store.requests().iter().map(|r| r.variables["code"].clone()).collect();
    assert_eq!(
        checked,
        vec![json!("edunexus-111111"), json!("edunexus-222222"), json!("edunexus-333333")]
    );
}

#[tokio::test]
async fn test_unused_code_accepted_without_further_draws() {
    let store = ScriptedStore::new(vec![code_unused()]);
    let service = profile_service(&store, 10);

    let mut draws = 0;
    let code = service
        .generate_unique_referral_code_with(|| {
            draws += 1;
            "edunexus-424242".to_string()
        })
        .await
        .unwrap();

    assert_eq!(code, "edunexus-424242");
    assert_eq!(draws, 1);
    assert_eq!(store.requests().len(), 1);
}

#[tokio::test]
async fn test_lookup_failure_aborts_generation() {
    let store = ScriptedStore::new(vec![
        Err(ProfileError::GraphQLError("connection reset".to_string())),
        code_unused(),
    ]);
    let service = profile_service(&store, 10);

    let err = service.generate_unique_referral_code().await.unwrap_err();
    assert!(matches!(err, ProfileError::CodeGenerationFailed(_)));
    assert_eq!(store.requests().len(), 1);
}

#[tokio::test]
async fn test_query_errors_abort_generation() {
    let store = ScriptedStore::new(vec![store_error("field 'profiles' not found", "validation-failed")]);
    let service = profile_service(&store, 10);

    let err = service.generate_unique_referral_code().await.unwrap_err();
    assert!(matches!(err, ProfileError::CodeGenerationFailed(_)));
}

#[tokio::test]
async fn test_generation_gives_up_after_max_attempts() {
    let store = ScriptedStore::new(vec![code_taken(), code_taken(), code_taken(), code_unused()]);
    let service = profile_service(&store, 3);

    let err = service.generate_unique_referral_code().await.unwrap_err();
    assert!(matches!(err, ProfileError::ReferralCodeExhausted { attempts: 3 }));
    assert_eq!(err.status_code(), 500);
    assert_eq!(store.requests().len(), 3);
}

#[tokio::test]
async fn test_code_generation_failure_is_server_error() {
    let store = ScriptedStore::new(vec![Err(ProfileError::GraphQLError("timeout".to_string()))]);
    let service = signup_service(&store);

    let response = service.handle(signup_payload(json!({}))).await;
    assert_eq!(response.status_code, 500);
    assert_eq!(store.operations(), vec!["ReferralCodeExists"]);
}

#[tokio::test]
async fn test_rejected_insert_is_bad_request() {
    let store = ScriptedStore::new(vec![
        code_unused(),
        store_error(
            "Uniqueness violation. duplicate key value violates unique constraint \"profiles_user_id_key\"",
            "constraint-violation",
        ),
    ]);
    let service = signup_service(&store);

    let response = service.handle(signup_payload(json!({}))).await;
    assert_eq!(response.status_code, 400);
    assert!(response.body.contains("profiles_user_id_key"));
    assert_eq!(store.operations(), vec!["ReferralCodeExists", "InsertProfile"]);
}

#[tokio::test]
async fn test_insert_without_data_is_server_error() {
    let store = ScriptedStore::new(vec![code_unused(), data(json!({"insert_profiles_one": null}))]);
    let service = signup_service(&store);

    let response = service.handle(signup_payload(json!({}))).await;
    assert_eq!(response.status_code, 500);
    assert_eq!(store.operations(), vec!["ReferralCodeExists", "InsertProfile"]);
}

#[tokio::test]
async fn test_referral_code_race_retries_once_with_new_code() {
    let duplicate_code = || {
        store_error(
            "Uniqueness violation. duplicate key value violates unique constraint \"profiles_user_referral_code_key\"",
            "constraint-violation",
        )
    };
    let store = ScriptedStore::new(vec![code_unused(), duplicate_code(), code_unused(), inserted("p3")]);
    let service = signup_service(&store);

    let response = service.handle(signup_payload(json!({}))).await;
    assert_eq!(response.status_code, 200);
    assert_eq!(
        store.operations(),
        vec!["ReferralCodeExists", "InsertProfile", "ReferralCodeExists", "InsertProfile"]
    );

    let requests = store.requests();
    let retried_code = &requests[2].variables["code"];
    assert_eq!(&inserted_object(&requests[3])["user_referral_code"], retried_code);
}

#[tokio::test]
async fn test_referral_code_race_gives_up_after_one_retry() {
    let duplicate_code = || {
        store_error(
            "Uniqueness violation. duplicate key value violates unique constraint \"profiles_user_referral_code_key\"",
            "constraint-violation",
        )
    };
    let store = ScriptedStore::new(vec![code_unused(), duplicate_code(), code_unused(), duplicate_code()]);
    let service = signup_service(&store);

    let response = service.handle(signup_payload(json!({}))).await;
    assert_eq!(response.status_code, 400);
    assert_eq!(store.requests().len(), 4);
}

#[tokio::test]
async fn test_numeric_profile_id_is_returned_as_string() {
    let store = ScriptedStore::new(vec![data(json!({"insert_profiles_one": {"id": 42}}))]);
    let service = profile_service(&store, 10);

    let profile = serde_json::from_value(json!({
        "user_id": "u1",
        "name": "New User",
        "avatar_url": null,
        "phone": null,
        "class_status": null,
        "target_exam": null,
        "target_exam_year": null,
        "app_role": "user",
        "subscription_tier": "free",
        "subscription_expiry_date": "2125-01-01T00:00:00Z",
        "user_referral_code": "edunexus-123456",
        "referred_by_code": null,
        "referral_stats": {"free": 0, "chapterwise": 0, "full_length": 0, "dpp": 0, "combo": 0},
        "total_points": 0
    }))
    .unwrap();

    assert_eq!(service.insert_profile(&profile).await.unwrap(), "42");
    assert!(store.requests()[0].query.contains("insert_profiles_one"));
}
