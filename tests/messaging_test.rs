use std::rc::Rc;

use heading_harvest::messaging::{MessageHandler, Response};
use heading_harvest::{
    extract_sections, ErrorCode, InMemorySectionRepository, Options, Orchestrator, Page, SectionRepository,
};
use serde_json::{json, Value};

const URL: &str = "https://deepwiki.com/owner/repo";
const HTML: &str = r#"<html><head><title>owner/repo</title></head><body><main>
    <h1>Overview</h1><p>What the repository does.</p>
    <h2>Install</h2><p>Add it as a dependency.</p>
    <h2>Usage</h2><p>Call the entry point.</p>
</main></body></html>"#;

fn request(action: &str, payload: Value) -> String {
    json!({ "action": action, "payload": payload }).to_string()
}

fn data(response: &Response) -> &Value {
    assert!(response.success, "request failed: {:?}", response.error);
    response.data.as_ref().unwrap_or(&Value::Null)
}

#[tokio::test]
async fn add_list_remove_round() {
    let repo = Rc::new(InMemorySectionRepository::new());
    let handler = MessageHandler::new(repo.clone());
    let sections = extract_sections(HTML, URL).unwrap().sections;

    for section in &sections {
        let record = serde_json::to_value(section.to_record()).unwrap();
        let response = handler.handle_json(&request("add-section", record)).await;
        assert_eq!(data(&response)["duplicate"], false);
    }

    // Same content under a fresh id is reported as the stored one.
    let mut again = sections[1].to_record();
    let first_id = again.id.clone();
    again.id = "another-id".to_string();
    let response = handler
        .handle_json(&request("add-section", serde_json::to_value(&again).unwrap()))
        .await;
    assert_eq!(data(&response)["duplicate"], true);
    assert_eq!(data(&response)["id"], first_id.as_str());
    assert_eq!(repo.len(), 3);

    let response = handler
        .handle_json(&request("get-sections", json!({ "sort": "title-asc", "limit": 2 })))
        .await;
    let listed = data(&response);
    assert_eq!(listed["total"], 3);
    assert_eq!(listed["hasMore"], true);
    assert_eq!(listed["sections"][0]["titleText"], "Install");
    assert_eq!(listed["sections"][1]["titleText"], "Overview");

    let response = handler
        .handle_json(&request("get-sections", json!({ "filter": { "level": 1 } })))
        .await;
    assert_eq!(data(&response)["total"], 1);

    let response = handler
        .handle_json(&request("remove-section", json!({ "id": first_id })))
        .await;
    assert_eq!(data(&response)["removed"], true);
    assert!(!repo.section_exists(&first_id).await.unwrap());

    let response = handler.handle_json(r#"{"action":"clear-all"}"#).await;
    assert!(response.success);
    assert!(repo.is_empty());
}

#[tokio::test]
async fn malformed_requests_become_validation_errors() {
    let handler = MessageHandler::new(Rc::new(InMemorySectionRepository::new()));

    for raw in [
        "{",
        r#"{"action":"launch"}"#,
        r#"{"action":"add-section","payload":{"id":"x"}}"#,
        r#"{"action":"collect-one-by-selector"}"#,
    ] {
        let response = handler.handle_json(raw).await;
        assert!(!response.success, "{raw} should fail");
        assert_eq!(response.error.as_ref().map(|e| e.code), Some(ErrorCode::ValidationError));
    }

    let response = handler.handle_json(r#"{"action":"get-page-info"}"#).await;
    assert!(!response.success);
    assert_eq!(response.error.map(|e| e.code), Some(ErrorCode::UnknownError));
}

#[tokio::test(start_paused = true)]
async fn page_actions_go_through_the_orchestrator() {
    let page = Rc::new(Page::new(HTML, URL).unwrap());
    let repo = Rc::new(InMemorySectionRepository::new());
    let orch = Orchestrator::new(Rc::clone(&page), repo.clone(), Options::default());
    orch.initialize().await;
    let handler = MessageHandler::with_orchestrator(repo.clone(), Rc::clone(&orch));

    let response = handler
        .handle_json(&request("collect-one-by-selector", json!({ "selector": "main h2" })))
        .await;
    assert_eq!(data(&response)["titleText"], "Install");

    let response = handler.handle_json(r#"{"action":"collect-all-on-page"}"#).await;
    let report = data(&response);
    assert_eq!(report["added"], 2);
    assert_eq!(report["duplicates"], 1);

    let response = handler
        .handle_json(&request("highlight-collectable", json!({ "enabled": true })))
        .await;
    assert_eq!(data(&response)["highlighted"], 3);

    let response = handler.handle_json(r#"{"action":"get-page-info"}"#).await;
    let info = data(&response);
    assert_eq!(info["title"], "owner/repo");
    assert_eq!(info["sectionCount"], 3);
    assert_eq!(info["collectedCount"], 3);
    assert_eq!(info["inScope"], true);
}

#[tokio::test(start_paused = true)]
async fn quota_stops_bulk_collection() {
    let page = Rc::new(Page::new(HTML, URL).unwrap());
    let repo = Rc::new(InMemorySectionRepository::with_limits(Some(1), None));
    let orch = Orchestrator::new(Rc::clone(&page), repo.clone(), Options::default());
    orch.initialize().await;
    let handler = MessageHandler::with_orchestrator(repo.clone(), orch);

    let response = handler.handle_json(r#"{"action":"collect-all-on-page"}"#).await;
    assert!(!response.success);
    assert_eq!(response.error.map(|e| e.code), Some(ErrorCode::QuotaExceeded));
    assert_eq!(repo.get_all_sections().await.unwrap().len(), 1);
}
