use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use org_tree::http::{router, ErrorResponse};
use org_tree::{MemoryNodeStore, Node, OrgTreeRepository};
use serde_json::Value;
use tower::ServiceExt;

fn app() -> Router {
    router(Arc::new(OrgTreeRepository::new(MemoryNodeStore::new())))
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn error_of(body: Value) -> String {
    serde_json::from_value::<ErrorResponse>(body).unwrap().error
}

//  1 root
//    2 c1
//      4 c3
//      5 c4
//        6 c5
//          7 c6
//    3 c2
async fn with_test_nodes() -> Router {
    let app = app();
    for (parent_id, name) in [
        (0, "root"),
        (1, "c1"),
        (1, "c2"),
        (2, "c3"),
        (2, "c4"),
        (5, "c5"),
        (6, "c6"),
    ] {
        let (status, _) = send(&app, Method::POST, &format!("/{parent_id}/{name}")).await;
        assert_eq!(status, StatusCode::CREATED, "creating {name}");
    }
    app
}

#[tokio::test]
async fn create_by_id() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/0/root").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        serde_json::json!({"id": 1, "name": "root", "root_id": 1, "height": 0})
    );

    let (status, body) = send(&app, Method::POST, "/1/c1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        serde_json::json!({"id": 2, "parent_id": 1, "name": "c1", "root_id": 1, "height": 1})
    );

    let (status, body) = send(&app, Method::POST, "/3/c1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_of(body), "Could not find node with ID 3");

    let (status, body) = send(&app, Method::POST, "/1/c1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        error_of(body),
        "the name 'c1' has already been taken under the parent with id #1"
    );

    let (status, body) = send(&app, Method::POST, "/c2?parentID=1").await;
    assert_eq!(status, StatusCode::CREATED);
    let node: Node = serde_json::from_value(body).unwrap();
    assert_eq!((node.parent_id, node.height, node.root_id), (Some(1), 1, 1));
}

#[tokio::test]
async fn create_rejects_bad_input() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/0/bad.name").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_of(body).starts_with("name must match the regex"));

    let (status, body) = send(&app, Method::POST, "/-1/fine").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_of(body), "ids must be greater than or equal 0");

    let (status, _) = send(&app, Method::POST, "/abc/fine").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_roots() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));

    send(&app, Method::POST, "/myRoot").await;
    send(&app, Method::POST, "/myOtherRoot").await;

    let expected = serde_json::json!([
        {"id": 2, "name": "myOtherRoot", "root_id": 2, "height": 0},
        {"id": 1, "name": "myRoot", "root_id": 1, "height": 0},
    ]);
    let (status, body) = send(&app, Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, expected);

    let (_, body) = send(&app, Method::GET, "/0").await;
    assert_eq!(body, expected);
}

#[tokio::test]
async fn get_by_id() {
    let app = with_test_nodes().await;

    let (status, body) = send(&app, Method::GET, "/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_of(body), "Could not find node with ID 42");

    let (status, body) = send(&app, Method::GET, "/-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_of(body), "ids must be greater than or equal 0");

    let (status, body) = send(&app, Method::GET, "/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({
            "id": 1, "name": "root", "root_id": 1, "height": 0,
            "children": [
                {"id": 2, "parent_id": 1, "name": "c1", "root_id": 1, "height": 1},
                {"id": 3, "parent_id": 1, "name": "c2", "root_id": 1, "height": 1},
            ]
        })
    );

    let (_, body) = send(&app, Method::GET, "/6").await;
    assert_eq!(
        body,
        serde_json::json!({
            "id": 6, "parent_id": 5, "name": "c5", "root_id": 1, "height": 3,
            "children": [
                {"id": 7, "parent_id": 6, "name": "c6", "root_id": 1, "height": 4},
            ]
        })
    );

    let (_, body) = send(&app, Method::GET, "/7").await;
    assert_eq!(
        body,
        serde_json::json!({"id": 7, "parent_id": 6, "name": "c6", "root_id": 1, "height": 4})
    );
}

#[tokio::test]
async fn change_parent() {
    let app = with_test_nodes().await;

    let (status, body) = send(&app, Method::PUT, "/1?parentID=42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_of(body), "Could not find node with ID 42");

    let (status, body) = send(&app, Method::PUT, "/42?parentID=1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_of(body), "Could not find node with ID 42");

    let (status, body) = send(&app, Method::PUT, "/1?parentID=2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        error_of(body),
        "the node with id 2 is a descendant of the node with id 1"
    );

    let (status, body) = send(&app, Method::PUT, "/6?parentID=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    let (_, body) = send(&app, Method::GET, "/1").await;
    let root: Node = serde_json::from_value(body).unwrap();
    let children: Vec<(i32, &str, u32)> = root
        .children
        .iter()
        .map(|child| (child.id, child.name.as_str(), child.height))
        .collect();
    assert_eq!(children, vec![(2, "c1", 1), (3, "c2", 1), (6, "c5", 1)]);
}

#[tokio::test]
async fn delete_cascades() {
    let app = with_test_nodes().await;

    let (status, _) = send(&app, Method::DELETE, "/-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for (id, deleted) in [(7, vec![7]), (5, vec![5, 6]), (1, vec![1, 2, 3, 4])] {
        let (status, _) = send(&app, Method::DELETE, &format!("/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        for gone in deleted {
            let (status, _) = send(&app, Method::GET, &format!("/{gone}")).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "node {gone} should be gone");
        }
    }

    let (status, _) = send(&app, Method::DELETE, "/1").await;
    assert_eq!(status, StatusCode::OK);
}
