//! ARM REST client tests against a local mock server
//!
//! Covers request addressing, error translation, both long-running
//! operation styles, paging, and one full module run over HTTP.

use azrm::arm::{await_completion, ArmClient, Collection, Coordinates, RestClient};
use azrm::catalog::Catalog;
use azrm::modules::{FailureKind, ModuleContext, ModuleRegistry};
use azrm::redact::SensitiveString;
use azrm::retry::PollPolicy;
use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RG_PATH: &str = "/subscriptions/sub1/resourcegroups/rg1";

fn groups() -> Collection {
    Collection::new("/subscriptions/{subscription_id}/resourcegroups/{name}", "2021-04-01")
}

fn all_groups() -> Collection {
    Collection::new("/subscriptions/{subscription_id}/resourcegroups", "2021-04-01")
}

fn rg1() -> Coordinates {
    Coordinates::new().with("name", "rg1")
}

fn client(server: &MockServer) -> RestClient {
    RestClient::new(
        Url::parse(&server.uri()).unwrap(),
        "sub1",
        SensitiveString::new("test-token"),
        Duration::from_secs(5),
        "azrm-tests",
    )
    .unwrap()
}

fn quick() -> PollPolicy {
    PollPolicy::constant(5, Duration::from_millis(10))
}

#[tokio::test]
async fn test_get_sends_token_and_api_version() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RG_PATH))
        .and(query_param("api-version", "2021-04-01"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": RG_PATH,
            "name": "rg1",
            "location": "westus",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let value = client(&server).get(&groups(), &rg1()).await.unwrap();
    assert_eq!(value["location"], "westus");
}

#[tokio::test]
async fn test_error_body_is_translated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": "ResourceGroupNotFound", "message": "Resource group 'rg1' could not be found."}
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "InvalidParameter", "message": "location\nis required"}
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let missing = client.get(&groups(), &rg1()).await.unwrap_err();
    assert!(missing.is_not_found());
    assert_eq!(missing.code.as_deref(), Some("ResourceGroupNotFound"));

    let rejected = client
        .create_or_update(&groups(), &rg1(), &json!({}))
        .await
        .unwrap_err();
    assert!(!rejected.is_not_found());
    assert_eq!(rejected.status, Some(400));
    assert_eq!(rejected.to_string(), "InvalidParameter (400): location is required");
}

#[tokio::test]
async fn test_async_operation_is_polled_to_completion() {
    let server = MockServer::start().await;
    let monitor = format!("{}/operations/op1", server.uri());

    Mock::given(method("PUT"))
        .and(path(RG_PATH))
        .and(body_json(json!({"location": "westus"})))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Azure-AsyncOperation", monitor.as_str())
                .set_body_json(json!({"properties": {"provisioningState": "Creating"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": RG_PATH,
            "properties": {"provisioningState": "Succeeded"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .create_or_update(&groups(), &rg1(), &json!({"location": "westus"}))
        .await
        .unwrap();
    assert!(response.is_pending());

    let value = await_completion(response, &quick(), "create_or_update", &rg1())
        .await
        .unwrap();
    assert_eq!(value["properties"]["provisioningState"], "Succeeded");
}

#[tokio::test]
async fn test_failed_async_operation_is_cloud_failure() {
    let server = MockServer::start().await;
    let monitor = format!("{}/operations/op2", server.uri());

    Mock::given(method("PUT"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(201).insert_header("Azure-AsyncOperation", monitor.as_str()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Failed",
            "error": {"code": "QuotaExceeded", "message": "quota exceeded"},
        })))
        .mount(&server)
        .await;

    let response = client(&server)
        .create_or_update(&groups(), &rg1(), &json!({}))
        .await
        .unwrap();
    let error = await_completion(response, &quick(), "create_or_update", &rg1())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), FailureKind::Cloud);
    assert!(error.to_string().contains("QuotaExceeded"));
}

#[tokio::test]
async fn test_delete_with_location_monitor() {
    let server = MockServer::start().await;
    let monitor = format!("{}/operationresults/op3", server.uri());

    Mock::given(method("DELETE"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(202).insert_header("Location", monitor.as_str()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operationresults/op3"))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operationresults/op3"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let response = client(&server).delete(&groups(), &rg1()).await.unwrap();
    assert!(response.is_pending());
    let value = await_completion(response, &quick(), "delete", &rg1())
        .await
        .unwrap();
    assert!(value.is_null());
}

#[tokio::test]
async fn test_delete_of_missing_resource_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let response = client(&server).delete(&groups(), &rg1()).await.unwrap();
    assert!(!response.is_pending());
}

#[tokio::test]
async fn test_list_follows_next_link() {
    let server = MockServer::start().await;
    let next = format!("{}/page2?api-version=2021-04-01", server.uri());

    Mock::given(method("GET"))
        .and(path("/subscriptions/sub1/resourcegroups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"name": "rg1"}, {"name": "rg2"}],
            "nextLink": next,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"name": "rg3"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items: Vec<_> = client(&server)
        .list(&all_groups(), &Coordinates::new())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let names: Vec<_> = items.iter().map(|i| i["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["rg1", "rg2", "rg3"]);
}

#[tokio::test]
async fn test_resourcegroup_module_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": "ResourceGroupNotFound", "message": "not found"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(RG_PATH))
        .and(body_json(json!({"location": "westus", "tags": {"env": "dev"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": RG_PATH,
            "name": "rg1",
            "location": "westus",
            "tags": {"env": "dev"},
            "properties": {"provisioningState": "Succeeded"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = ModuleRegistry::from_catalog(&Catalog::builtin().unwrap());
    let context = ModuleContext::new(Arc::new(client(&server)))
        .with_polling(quick())
        .with_delete_confirmation(quick());
    let params = json!({"name": "rg1", "location": "westus", "tags": {"env": "dev"}});
    let output = registry
        .execute(
            "azure_rm_resourcegroup",
            params.as_object().unwrap(),
            &context,
        )
        .await;

    assert!(!output.failed, "{:?}", output.msg);
    assert!(output.changed);
    assert_eq!(output.data["state"]["id"], RG_PATH);
    assert_eq!(output.data["state"]["provisioning_state"], "Succeeded");
}
