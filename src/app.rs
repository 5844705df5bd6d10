use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/assets/style.css", get(handlers::stylesheet))
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/register", post(handlers::register))
        .route("/logout", post(handlers::logout))
        .route("/dashboard", get(handlers::dashboard_page))
        .route("/api/dashboard", get(handlers::dashboard_data))
        .route("/monitoring", get(handlers::monitoring_page))
        .route("/api/monitoring", get(handlers::monitoring_data))
        .route("/api/emissions/calculate", get(handlers::calculate_emission))
        .route("/monitoring/emissions", post(handlers::record_emission))
        .route("/monitoring/sources", post(handlers::create_source))
        .route("/monitoring/sources/:id/update", post(handlers::update_source))
        .route("/monitoring/sources/:id/delete", post(handlers::delete_source))
        .route("/tokenization", get(handlers::tokenization_page))
        .route("/api/tokenization", get(handlers::tokenization_data))
        .route("/tokenization/export.csv", get(handlers::export_token_history))
        .route("/tokenization/projects", post(handlers::create_project))
        .route("/tokenization/issue", post(handlers::issue_tokens))
        .route("/tokenization/buy", post(handlers::buy_tokens))
        .route("/compensation", get(handlers::compensation_page).post(handlers::compensate))
        .route("/api/compensation", get(handlers::compensation_data))
        .route("/compensation/export.csv", get(handlers::export_compensations))
        .route("/registry", get(handlers::registry_page))
        .route("/registry/check", post(handlers::check_hash))
        .route("/registry/verify-all", post(handlers::verify_all_records))
        .route("/registry/:hash/verify", post(handlers::verify_record))
        .route("/notifications", get(handlers::notifications_page))
        .route("/notifications/read-all", post(handlers::mark_all_read))
        .route("/notifications/clear", post(handlers::clear_notifications))
        .route("/notifications/:id/read", post(handlers::mark_read))
        .route("/notifications/:id/unread", post(handlers::mark_unread))
        .route("/notifications/:id/delete", post(handlers::delete_notification))
        .route("/profile", get(handlers::profile_page).post(handlers::update_profile))
        .route("/profile/password", post(handlers::change_password))
        .route("/profile/wallet", post(handlers::connect_wallet))
        .with_state(state)
}
