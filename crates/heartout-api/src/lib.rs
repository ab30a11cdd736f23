//! REST handlers for HeartOut and the router that mounts them under `/api`.

pub mod admin;
pub mod ai;
pub mod analytics;
pub mod auth;
pub mod challenges;
pub mod comments;
pub mod error;
pub mod follows;
pub mod middleware;
pub mod payments;
pub mod ranking;
pub mod reactions;
pub mod reviews;
pub mod state;
pub mod stories;
pub mod tips;
pub mod validation;
pub mod views;

use axum::{
    Json, Router,
    routing::{delete, get, patch, post, put},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner, JwtSettings};

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "heartout-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Every REST route, nested under `/api`. Routes in the protected half
/// require a valid access token; `/admin` routes also require a staff role.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/user/{user_id}", get(auth::public_profile))
        // Stories
        .route("/stories", get(stories::list_stories))
        .route("/stories/featured", get(stories::featured))
        .route("/stories/search", get(stories::search))
        .route("/stories/category/{story_type}", get(stories::by_category))
        .route("/stories/user/{user_id}", get(stories::by_user))
        .route("/stories/{id}", get(stories::get_story))
        .route("/stories/{id}/comments", get(comments::list_comments))
        .route("/stories/{id}/read-progress", post(stories::read_progress))
        .route("/stories/{id}/tips", get(tips::story_tips))
        // Users
        .route("/users/{user_id}", get(auth::public_profile))
        .route("/users/{user_id}/followers", get(follows::followers))
        .route("/users/{user_id}/following", get(follows::following))
        .route("/users/{user_id}/achievements", get(analytics::achievements))
        // Challenges
        .route("/challenges", get(challenges::list_challenges))
        .route("/challenges/active", get(challenges::active_challenge))
        .route("/challenges/{id}/submissions", get(challenges::submissions))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{user_id}", get(admin::user_detail))
        .route("/admin/users/{user_id}/role", put(admin::update_role))
        .route("/admin/users/{user_id}/suspend", put(admin::toggle_suspension))
        .route("/admin/stories/flagged", get(admin::flagged_stories))
        .route("/admin/stories/{id}/moderate", post(admin::moderate_story))
        .route("/admin/stories/{id}/feature", post(admin::toggle_feature))
        .route("/admin/comments/{id}", delete(admin::delete_comment))
        .route_layer(axum::middleware::from_fn(middleware::require_staff));

    let protected_routes = Router::new()
        // Auth
        .route("/auth/logout", post(auth::logout))
        .route("/auth/profile", get(auth::get_profile).put(auth::update_profile))
        .route("/auth/change-password", post(auth::change_password))
        .route("/auth/account", delete(auth::delete_account))
        .route("/auth/stats", get(auth::stats))
        // Stories
        .route("/stories", post(stories::create_story))
        .route("/stories/drafts", get(stories::drafts))
        .route("/stories/bookmarks", get(stories::bookmarks))
        .route("/stories/{id}", put(stories::update_story).delete(stories::delete_story))
        .route("/stories/{id}/comments", post(comments::add_comment))
        .route("/comments/{id}", delete(comments::delete_comment))
        // Reactions and bookmarks
        .route("/stories/{id}/react", post(reactions::react))
        .route("/stories/{id}/toggle-react", post(reactions::toggle_react))
        .route("/stories/{id}/my-reaction", get(reactions::my_reaction))
        .route("/stories/{id}/like", post(reactions::like))
        .route("/stories/{id}/like-status", get(reactions::like_status))
        .route(
            "/stories/{id}/bookmark",
            post(reactions::toggle_bookmark).get(reactions::bookmark_status),
        )
        // Users
        .route("/users/{user_id}/follow", post(follows::toggle_follow))
        .route("/users/{user_id}/follow-status", get(follows::follow_status))
        .route("/users/{user_id}/analytics", get(analytics::analytics))
        // Challenges
        .route("/challenges", post(challenges::create_challenge))
        .route("/challenges/{id}/submissions", post(challenges::submit_story))
        // Reviews
        .route("/reviews", post(reviews::create_review))
        .route("/reviews/mine", get(reviews::my_reviews))
        .route("/reviews/pending", get(reviews::pending_reviews))
        .route("/reviews/{id}", patch(reviews::update_review))
        // Money
        .route("/tips", post(tips::send_tip))
        .route("/create-payment-intent", post(payments::create_payment_intent))
        // Writing assistant
        .route("/ai/story-ideas", post(ai::story_ideas))
        .route("/ai/writing-suggestions", post(ai::writing_suggestions))
        .route("/ai/grammar-check", post(ai::grammar_check))
        .route("/ai/character", post(ai::character))
        .route("/ai/mood-analysis", post(ai::mood_analysis))
        .route("/ai/outline", post(ai::outline))
        .merge(admin_routes)
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new().nest("/api", public_routes.merge(protected_routes))
}
