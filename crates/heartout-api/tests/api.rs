use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use heartout_api::{AppState, AppStateInner, JwtSettings};
use heartout_db::models::StoryFilter;
use heartout_db::{MemStorage, Storage};
use heartout_gateway::Dispatcher;
use heartout_types::models::UserRole;

const PASSWORD: &str = "Sunrise#2024";

fn story_body(title: &str) -> Value {
    json!({
        "title": title,
        "content": "It was the summer everything changed and I finally said what I meant to say for years.",
        "story_type": "life_story",
        "is_anonymous": false,
        "tags": ["summer", "family"],
        "status": "published",
    })
}

struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        Self::with_admin_emails(&[])
    }

    fn with_admin_emails(emails: &[&str]) -> Self {
        let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
        let mut inner = AppStateInner::new(storage, Dispatcher::new(), JwtSettings::new("integration-test-secret"));
        inner.admin_emails = emails.iter().map(|e| e.to_string()).collect();
        let state: AppState = Arc::new(inner);
        Self {
            router: heartout_api::router(state.clone()),
            state,
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Registers a user and returns (access token, user id).
    async fn register(&self, username: &str) -> (String, i64) {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let token = body["access_token"].as_str().unwrap().to_string();
        let id = body["user"]["id"].as_i64().unwrap();
        (token, id)
    }

    /// Registers a user and gives them `role`.
    async fn staff(&self, username: &str, role: UserRole) -> (String, i64) {
        let (token, id) = self.register(username).await;
        self.state.storage.set_user_role(id, role).unwrap();
        (token, id)
    }

    async fn publish(&self, token: &str, title: &str) -> i64 {
        let (status, body) = self
            .send(Method::POST, "/api/stories", Some(token), Some(story_body(title)))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["story"]["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn health_reports_service() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "heartout-api");
}

#[tokio::test]
async fn register_then_login() {
    let app = TestApp::new();
    app.register("maya").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "maya@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "maya");
    assert!(body["refresh_token"].is_string());

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "maya@example.com", "password": "Wrong#pass1" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = TestApp::new();
    app.register("maya").await;
    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "maya", "email": "maya@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn weak_password_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "maya", "email": "maya@example.com", "password": "password" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = TestApp::new();
    let (status, _) = app.send(Method::GET, "/api/auth/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(Method::GET, "/api/auth/profile", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(Method::POST, "/api/stories", None, Some(story_body("No token here")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_the_token() {
    let app = TestApp::new();
    let (token, _) = app.register("maya").await;

    let (status, _) = app.send(Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send(Method::GET, "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token has been revoked");
}

#[tokio::test]
async fn refresh_token_cannot_authenticate_requests() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "maya", "email": "maya@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let refresh = body["refresh_token"].as_str().unwrap().to_string();

    let (status, _) = app.send(Method::GET, "/api/auth/profile", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(Method::POST, "/api/auth/refresh", None, Some(json!({ "refresh_token": refresh })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = body["access_token"].as_str().unwrap().to_string();
    let (status, _) = app.send(Method::GET, "/api/auth/profile", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn wrong_current_password_leaves_hash_unchanged() {
    let app = TestApp::new();
    let (token, user_id) = app.register("maya").await;
    let before = app.state.storage.get_user(user_id).unwrap().unwrap().password_hash;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/change-password",
            Some(&token),
            Some(json!({ "current_password": "Not#theone1", "new_password": "Another#Pass9" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Current password is incorrect");

    let after = app.state.storage.get_user(user_id).unwrap().unwrap().password_hash;
    assert_eq!(before, after);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/change-password",
            Some(&token),
            Some(json!({ "current_password": PASSWORD, "new_password": "Another#Pass9" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let changed = app.state.storage.get_user(user_id).unwrap().unwrap().password_hash;
    assert_ne!(before, changed);
}

#[tokio::test]
async fn invalid_story_is_not_persisted() {
    let app = TestApp::new();
    let (token, user_id) = app.register("maya").await;

    let mut short_title = story_body("Hi");
    short_title["title"] = json!("Hi");
    let mut short_content = story_body("A proper title");
    short_content["content"] = json!("Too short.");
    let mut bad_type = story_body("A proper title");
    bad_type["story_type"] = json!("poem");
    let mut missing = story_body("A proper title");
    missing.as_object_mut().unwrap().remove("story_type");

    for body in [short_title, short_content, bad_type, missing] {
        let (status, resp) = app.send(Method::POST, "/api/stories", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", resp);
        assert!(resp["message"].is_string());
    }

    let filter = StoryFilter {
        author_id: Some(user_id),
        ..StoryFilter::default()
    };
    assert!(app.state.storage.list_stories(&filter).unwrap().is_empty());
}

#[tokio::test]
async fn each_read_counts_one_view() {
    let app = TestApp::new();
    let (token, _) = app.register("maya").await;
    let id = app.publish(&token, "The summer I left").await;
    let uri = format!("/api/stories/{}", id);

    let (_, first) = app.send(Method::GET, &uri, None, None).await;
    let (_, second) = app.send(Method::GET, &uri, None, None).await;
    let (status, third) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);

    let views: Vec<i64> = [first, second, third]
        .iter()
        .map(|b| b["story"]["view_count"].as_i64().unwrap())
        .collect();
    assert_eq!(views[1], views[0] + 1);
    assert_eq!(views[2], views[1] + 1);
}

#[tokio::test]
async fn drafts_are_private() {
    let app = TestApp::new();
    let (author, _) = app.register("maya").await;
    let (reader, _) = app.register("leo").await;

    let mut draft = story_body("Not ready for anyone yet");
    draft["status"] = json!("draft");
    let (status, body) = app.send(Method::POST, "/api/stories", Some(&author), Some(draft)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["story"]["id"].as_i64().unwrap();
    let uri = format!("/api/stories/{}", id);

    let (status, body) = app.send(Method::GET, &uri, Some(&author), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["story"]["view_count"], 0);

    let (status, _) = app.send(Method::GET, &uri, Some(&reader), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, drafts) = app.send(Method::GET, "/api/stories/drafts", Some(&author), None).await;
    assert_eq!(drafts["total"], 1);
    let (_, feed) = app.send(Method::GET, "/api/stories", None, None).await;
    assert_eq!(feed["total"], 0);
}

#[tokio::test]
async fn deleted_story_is_gone() {
    let app = TestApp::new();
    let (token, _) = app.register("maya").await;
    let mut draft = story_body("A draft I will throw away");
    draft["status"] = json!("draft");
    let (_, body) = app.send(Method::POST, "/api/stories", Some(&token), Some(draft)).await;
    let id = body["story"]["id"].as_i64().unwrap();
    let uri = format!("/api/stories/{}", id);

    let (status, body) = app.send(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Story deleted successfully");

    let (status, _) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, drafts) = app.send(Method::GET, "/api/stories/drafts", Some(&token), None).await;
    assert_eq!(drafts["total"], 0);
}

#[tokio::test]
async fn only_the_author_can_edit() {
    let app = TestApp::new();
    let (author, _) = app.register("maya").await;
    let (other, _) = app.register("leo").await;
    let id = app.publish(&author, "The summer I left").await;
    let uri = format!("/api/stories/{}", id);

    let (status, body) = app
        .send(Method::PUT, &uri, Some(&other), Some(story_body("Taken over by someone else")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You can only edit your own stories");

    let (status, _) = app.send(Method::DELETE, &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::PUT, &uri, Some(&author), Some(story_body("The summer I came back")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["story"]["title"], "The summer I came back");
}

#[tokio::test]
async fn toggling_a_reaction_twice_restores_the_count() {
    let app = TestApp::new();
    let (author, _) = app.register("maya").await;
    let (reader, _) = app.register("leo").await;
    let id = app.publish(&author, "The summer I left").await;
    let uri = format!("/api/stories/{}/toggle-react", id);
    let hug = json!({ "reaction_type": "hug" });

    let (_, before) = app.send(Method::GET, &format!("/api/stories/{}", id), None, None).await;
    let original = before["story"]["support_count"].as_i64().unwrap();

    let (status, added) = app.send(Method::POST, &uri, Some(&reader), Some(hug.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(added["action"], "added");
    assert_eq!(added["support_count"], original + 1);
    assert_eq!(added["user_reaction"], "hug");

    let (_, removed) = app.send(Method::POST, &uri, Some(&reader), Some(hug)).await;
    assert_eq!(removed["action"], "removed");
    assert_eq!(removed["support_count"], original);
    assert!(removed["user_reaction"].is_null());
}

#[tokio::test]
async fn like_toggles_a_heart() {
    let app = TestApp::new();
    let (author, _) = app.register("maya").await;
    let (reader, _) = app.register("leo").await;
    let id = app.publish(&author, "The summer I left").await;
    let like = format!("/api/stories/{}/like", id);
    let status_uri = format!("/api/stories/{}/like-status", id);

    let (_, body) = app.send(Method::POST, &like, Some(&reader), None).await;
    assert_eq!(body["liked"], true);
    assert_eq!(body["like_count"], 1);

    let (_, body) = app.send(Method::GET, &status_uri, Some(&reader), None).await;
    assert_eq!(body["has_liked"], true);

    let (_, body) = app.send(Method::POST, &like, Some(&reader), None).await;
    assert_eq!(body["liked"], false);
    assert_eq!(body["like_count"], 0);
}

#[tokio::test]
async fn comments_update_the_story_counter() {
    let app = TestApp::new();
    let (author, _) = app.register("maya").await;
    let (reader, _) = app.register("leo").await;
    let id = app.publish(&author, "The summer I left").await;
    let uri = format!("/api/stories/{}/comments", id);

    let (status, body) = app
        .send(
            Method::POST,
            &uri,
            Some(&reader),
            Some(json!({ "content": "This made me call my mother.", "is_anonymous": false })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = body["comment"]["id"].as_i64().unwrap();

    let (_, list) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["comments"][0]["author"]["username"], "leo");

    let delete_uri = format!("/api/comments/{}", comment_id);
    let (status, _) = app.send(Method::DELETE, &delete_uri, Some(&author), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send(Method::DELETE, &delete_uri, Some(&reader), None).await;
    assert_eq!(status, StatusCode::OK);

    let story = app.state.storage.get_story(id).unwrap().unwrap();
    assert_eq!(story.comment_count, 0);
}

#[tokio::test]
async fn bookmarks_show_up_in_the_bookmark_list() {
    let app = TestApp::new();
    let (author, _) = app.register("maya").await;
    let (reader, _) = app.register("leo").await;
    let id = app.publish(&author, "The summer I left").await;

    let (_, body) = app
        .send(Method::POST, &format!("/api/stories/{}/bookmark", id), Some(&reader), None)
        .await;
    assert_eq!(body["is_bookmarked"], true);
    assert_eq!(body["save_count"], 1);

    let (_, list) = app.send(Method::GET, "/api/stories/bookmarks", Some(&reader), None).await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["stories"][0]["id"], id);
}

#[tokio::test]
async fn follow_is_a_toggle_and_not_for_yourself() {
    let app = TestApp::new();
    let (maya, maya_id) = app.register("maya").await;
    let (_, leo_id) = app.register("leo").await;

    let (status, _) = app
        .send(Method::POST, &format!("/api/users/{}/follow", maya_id), Some(&maya), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let follow = format!("/api/users/{}/follow", leo_id);
    let (_, body) = app.send(Method::POST, &follow, Some(&maya), None).await;
    assert_eq!(body["following"], true);
    assert_eq!(body["followers"], 1);

    let (_, followers) = app
        .send(Method::GET, &format!("/api/users/{}/followers", leo_id), None, None)
        .await;
    assert_eq!(followers["followers"][0]["username"], "maya");

    let (_, body) = app.send(Method::POST, &follow, Some(&maya), None).await;
    assert_eq!(body["following"], false);
    assert_eq!(body["followers"], 0);
}

#[tokio::test]
async fn search_needs_two_characters() {
    let app = TestApp::new();
    let (token, _) = app.register("maya").await;
    app.publish(&token, "The summer I left").await;

    let (status, _) = app.send(Method::GET, "/api/stories/search?q=a", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.send(Method::GET, "/api/stories/search?q=SUMMER", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["query"], "SUMMER");
}

#[tokio::test]
async fn first_publish_unlocks_an_achievement() {
    let app = TestApp::new();
    let (token, user_id) = app.register("maya").await;
    app.publish(&token, "The summer I left").await;

    let (_, body) = app
        .send(Method::GET, &format!("/api/users/{}/achievements", user_id), None, None)
        .await;
    let kinds: Vec<&str> = body["achievements"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["first_story"]);
}

#[tokio::test]
async fn tips_reject_small_amounts_and_self_tips() {
    let app = TestApp::new();
    let (author, _) = app.register("maya").await;
    let (reader, _) = app.register("leo").await;
    let id = app.publish(&author, "The summer I left").await;

    let (status, _) = app
        .send(Method::POST, "/api/tips", Some(&reader), Some(json!({ "story_id": id, "amount": 50 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .send(Method::POST, "/api/tips", Some(&author), Some(json!({ "story_id": id, "amount": 500 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(Method::POST, "/api/tips", Some(&reader), Some(json!({ "story_id": id, "amount": 500 })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, body) = app.send(Method::GET, &format!("/api/stories/{}/tips", id), None, None).await;
    assert_eq!(body["total_amount"], 500);
}

#[tokio::test]
async fn unconfigured_integrations_are_unavailable() {
    let app = TestApp::new();
    let (author, _) = app.register("maya").await;
    let (reader, _) = app.register("leo").await;
    let id = app.publish(&author, "The summer I left").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/create-payment-intent",
            Some(&reader),
            Some(json!({ "story_id": id, "amount": 500 })),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = app
        .send(Method::POST, "/api/ai/story-ideas", Some(&reader), Some(json!({ "prompt": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Prompt is required");

    let (status, _) = app
        .send(Method::POST, "/api/ai/story-ideas", Some(&reader), Some(json!({ "prompt": "lighthouses" })))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// -- Moderation --

#[tokio::test]
async fn admin_routes_are_staff_only() {
    let app = TestApp::new();
    let (reader, _) = app.register("reader").await;
    let (status, body) = app.send(Method::GET, "/api/admin/dashboard", Some(&reader), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Admin access required");

    let (status, _) = app.send(Method::GET, "/api/admin/dashboard", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (moderator, _) = app.staff("mod", UserRole::Moderator).await;
    let (status, _) = app.send(Method::GET, "/api/admin/dashboard", Some(&moderator), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn dashboard_counts_users_and_stories() {
    let app = TestApp::new();
    let (admin, _) = app.staff("admin", UserRole::Admin).await;
    let (writer, _) = app.register("writer").await;
    let flagged = app.publish(&writer, "A story that gets flagged").await;
    app.publish(&writer, "A story that stays up").await;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/admin/stories/{}/moderate", flagged),
            Some(&admin),
            Some(json!({ "action": "flag" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send(Method::GET, "/api/admin/dashboard?days=7", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"]["total"], 2);
    assert_eq!(body["users"]["new"], 2);
    assert_eq!(body["users"]["active"], 2);
    assert_eq!(body["stories"]["total"], 2);
    assert_eq!(body["stories"]["published"], 1);
    assert_eq!(body["stories"]["flagged"], 1);
    assert_eq!(body["period_days"], 7);

    let (status, _) = app.send(Method::GET, "/api/admin/dashboard?days=0", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn featuring_a_story_puts_it_on_the_shelf() {
    let app = TestApp::new();
    let (admin, _) = app.staff("admin", UserRole::Admin).await;
    let (writer, _) = app.register("writer").await;
    let id = app.publish(&writer, "A story worth featuring").await;

    let (status, body) = app
        .send(Method::POST, &format!("/api/admin/stories/{}/feature", id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Story featured");

    let (_, body) = app.send(Method::GET, "/api/stories/featured", None, None).await;
    let featured = body["featured_stories"].as_array().unwrap();
    assert_eq!(featured.len(), 1);
    assert_eq!(featured[0]["id"], id);

    // Second call takes it back off
    let (_, body) = app
        .send(Method::POST, &format!("/api/admin/stories/{}/feature", id), Some(&admin), None)
        .await;
    assert_eq!(body["message"], "Story unfeatured");
    let (_, body) = app.send(Method::GET, "/api/stories/featured", None, None).await;
    assert!(body["featured_stories"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn moderation_hides_and_restores_stories() {
    let app = TestApp::new();
    let (moderator, _) = app.staff("mod", UserRole::Moderator).await;
    let (writer, _) = app.register("writer").await;
    let (reader, _) = app.register("reader").await;
    let id = app.publish(&writer, "A story under review").await;
    let moderate = format!("/api/admin/stories/{}/moderate", id);
    let story = format!("/api/stories/{}", id);

    let (status, body) = app
        .send(Method::POST, &moderate, Some(&moderator), Some(json!({ "action": "flag" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Story flagged successfully");

    let (_, body) = app.send(Method::GET, "/api/admin/stories/flagged", Some(&moderator), None).await;
    assert_eq!(body["stories"][0]["id"], id);
    assert_eq!(body["pagination"]["total"], 1);

    app.send(Method::POST, &moderate, Some(&moderator), Some(json!({ "action": "remove" })))
        .await;
    let (status, _) = app.send(Method::GET, &story, Some(&reader), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The author cannot republish a removed story
    let (status, _) = app
        .send(Method::PUT, &story, Some(&writer), Some(story_body("A story under review")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.send(Method::POST, &moderate, Some(&moderator), Some(json!({ "action": "approve" })))
        .await;
    let (status, _) = app.send(Method::GET, &story, Some(&reader), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(Method::POST, &moderate, Some(&moderator), Some(json!({ "action": "delete" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn authors_cannot_set_moderation_statuses() {
    let app = TestApp::new();
    let (writer, _) = app.register("writer").await;
    let mut body = story_body("Trying to remove my own story");
    body["status"] = json!("removed");

    let (status, body) = app.send(Method::POST, "/api/stories", Some(&writer), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Status must be draft or published");
}

#[tokio::test]
async fn suspension_locks_the_account_out() {
    let app = TestApp::new();
    let (admin, admin_id) = app.staff("admin", UserRole::Admin).await;
    let (token, user_id) = app.register("maya").await;
    let suspend = format!("/api/admin/users/{}/suspend", user_id);

    let (status, body) = app.send(Method::PUT, &suspend, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User suspended");
    assert_eq!(body["user"]["is_active"], false);

    let (status, body) = app.send(Method::GET, "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Account is deactivated");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "maya@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Account is deactivated");
    assert!(app.state.storage.get_user(user_id).unwrap().unwrap().last_login.is_none());

    let (_, body) = app.send(Method::PUT, &suspend, Some(&admin), None).await;
    assert_eq!(body["message"], "User activated");
    let (status, _) = app.send(Method::GET, "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(Method::PUT, &format!("/api/admin/users/{}/suspend", admin_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn moderators_cannot_touch_roles_or_admins() {
    let app = TestApp::new();
    let (admin, admin_id) = app.staff("admin", UserRole::Admin).await;
    let (moderator, _) = app.staff("mod", UserRole::Moderator).await;
    let (_, user_id) = app.register("maya").await;
    let role = format!("/api/admin/users/{}/role", user_id);

    let (status, body) = app
        .send(Method::PUT, &role, Some(&moderator), Some(json!({ "role": "admin" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only admins can change roles");

    let (status, _) = app
        .send(Method::PUT, &format!("/api/admin/users/{}/suspend", admin_id), Some(&moderator), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::PUT, &role, Some(&admin), Some(json!({ "role": "author" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "author");

    let (status, _) = app
        .send(Method::PUT, &role, Some(&admin), Some(json!({ "role": "owner" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_user_listing_and_detail() {
    let app = TestApp::new();
    let (admin, _) = app.staff("admin", UserRole::Admin).await;
    let (writer, writer_id) = app.register("writer").await;
    app.publish(&writer, "One story for the stats").await;

    let (status, body) = app.send(Method::GET, "/api/admin/users?per_page=1", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["pages"], 2);

    let (status, body) = app
        .send(Method::GET, &format!("/api/admin/users/{}", writer_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "writer");
    assert_eq!(body["stats"]["story_count"], 1);
    assert_eq!(body["stats"]["reaction_count"], 0);

    let (status, _) = app.send(Method::GET, "/api/admin/users/9999", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn staff_can_delete_any_comment() {
    let app = TestApp::new();
    let (moderator, _) = app.staff("mod", UserRole::Moderator).await;
    let (writer, _) = app.register("writer").await;
    let id = app.publish(&writer, "A story with a rude comment").await;
    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/stories/{}/comments", id),
            Some(&writer),
            Some(json!({ "content": "Something nobody should read" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let comment_id = body["comment"]["id"].as_i64().unwrap();

    let uri = format!("/api/admin/comments/{}", comment_id);
    let (status, _) = app.send(Method::DELETE, &uri, Some(&moderator), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(Method::DELETE, &uri, Some(&moderator), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bootstrap_admin_emails_register_as_admin() {
    let app = TestApp::with_admin_emails(&["Founder@Example.com"]);
    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "founder", "email": "founder@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["user"]["role"], "admin");

    let token = body["access_token"].as_str().unwrap();
    let (status, _) = app.send(Method::GET, "/api/admin/dashboard", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "maya", "email": "maya@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(body["user"]["role"], "user");
}
