mod common;

use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{client, file_json, post_json, user_json};
use sea_cli::{NameConflict, PostBody, SeaError, UserSettings, ValidationError};

#[tokio::test]
async fn timeline_keeps_server_order_and_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/timelines/public"))
        .and(query_param("sinceId", "10"))
        .and(query_param("count", "2"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([post_json(12, "newest"), post_json(11, "older")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server.uri(), "", "", "tok");
    let posts = api.timeline(Some(10), Some(2)).await.unwrap();
    let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![12, 11]);
    assert_eq!(posts[0].text, "newest");
}

#[tokio::test]
async fn timeline_accepts_count_bounds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/timelines/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let api = client(&server.uri(), "", "", "tok");
    assert!(api.timeline(None, Some(1)).await.unwrap().is_empty());
    assert!(api.timeline(None, Some(100)).await.unwrap().is_empty());
}

#[tokio::test]
async fn timeline_rejects_count_out_of_range_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let api = client(&server.uri(), "", "", "tok");
    assert!(matches!(api.timeline(None, Some(0)).await, Err(SeaError::Range { .. })));
    assert!(matches!(api.timeline(None, Some(101)).await, Err(SeaError::Range { .. })));
}

#[tokio::test]
async fn one_invalid_post_fails_the_whole_timeline() {
    let server = MockServer::start().await;
    let mut bad = post_json(2, "bad");
    bad["user"]["screenName"] = json!("has space");
    Mock::given(method("GET"))
        .and(path("/api/v1/timelines/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([post_json(1, "ok"), bad])))
        .mount(&server)
        .await;

    let api = client(&server.uri(), "", "", "tok");
    match api.timeline(None, None).await {
        Err(SeaError::Validation(err)) => assert_eq!(err.field_path(), Some("[1].user.screenName")),
        other => panic!("Expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn post_sends_body_and_returns_validated_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/posts"))
        .and(body_json(json!({ "text": "hello", "fileIds": [9] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(post_json(5, "hello")))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server.uri(), "", "", "tok");
    let body = PostBody::new("hello", Some(vec![9])).unwrap();
    let post = api.post(&body).await.unwrap();
    assert_eq!(post.id, 5);
    assert_eq!(post.user.screen_name, "sea_otter");
}

#[tokio::test]
async fn oversized_post_is_never_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let api = client(&server.uri(), "", "", "tok");
    let body = PostBody {
        text: "a".repeat(513),
        file_ids: None,
    };
    assert!(matches!(
        api.post(&body).await,
        Err(SeaError::Validation(ValidationError::Field { .. }))
    ));
}

#[tokio::test]
async fn authorize_stores_token_for_later_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains("client_id=app"))
        .and(body_string_contains("client_secret=shh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "fresh", "token_type": "Bearer" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/account"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
        .expect(1)
        .mount(&server)
        .await;

    let mut api = client(&server.uri(), "app", "shh", "");
    assert!(!api.has_token());
    let auth = api.authorize("the-code").await.unwrap();
    assert_eq!(auth.access_token, "fresh");
    assert!(api.has_token());

    let me = api.account().await.unwrap();
    assert_eq!(me.screen_name, "sea_otter");
}

#[tokio::test]
async fn authorize_failure_is_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let mut api = client(&server.uri(), "app", "shh", "");
    match api.authorize("expired").await {
        Err(SeaError::Remote { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "invalid_grant");
        }
        other => panic!("Expected remote error, got {other:?}"),
    }
    assert!(!api.has_token());
}

#[tokio::test]
async fn post_file_uploads_multipart_with_conflict_flag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/album/files"))
        .and(body_string_contains("name=\"ifNameConflicted\""))
        .and(body_string_contains("add-date-string"))
        .and(body_string_contains("filename=\"wave.png\""))
        .and(body_string_contains("name=\"folderId\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(3, "wave.png")))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server.uri(), "", "", "tok");
    let file = api
        .post_file("wave.png", b"not really a png".to_vec(), NameConflict::AddDateString, Some(4))
        .await
        .unwrap();
    assert_eq!(file.id, 3);
    assert_eq!(file.variants[0].mime, "image/png");
}

#[tokio::test]
async fn post_file_defaults_to_error_on_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/album/files"))
        .and(body_string_contains("error"))
        .respond_with(ResponseTemplate::new(409).set_body_string("name conflict"))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server.uri(), "", "", "tok");
    let err = api
        .post_file("wave.png", b"data".to_vec(), NameConflict::default(), None)
        .await
        .unwrap_err();
    assert!(err.is_remote());
    assert!(matches!(err, SeaError::Remote { status: 409, .. }));
}

#[tokio::test]
async fn user_settings_are_patched() {
    let server = MockServer::start().await;
    let mut updated = user_json();
    updated["name"] = json!("Otter Prime");
    Mock::given(method("PATCH"))
        .and(path("/api/v1/account"))
        .and(body_json(json!({ "name": "Otter Prime" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server.uri(), "", "", "tok");
    let settings = UserSettings::new("Otter Prime").unwrap();
    let user = api.post_user_settings(&settings).await.unwrap();
    assert_eq!(user.name, "Otter Prime");
}

#[tokio::test]
async fn server_errors_carry_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/account"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let api = client(&server.uri(), "", "", "tok");
    match api.account().await {
        Err(SeaError::Remote { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("Expected remote error, got {other:?}"),
    }
}
