use crate::handlers::{accounts, health, location, pages, payments, webhook, ws};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let tracking_routes = Router::new()
        .route("/update-location/", post(location::update_location))
        .route("/ws/admin/tracking/", get(ws::admin_tracking));

    let payment_routes = Router::new()
        .route("/create-payment/", post(payments::create_payment))
        .route("/transfer-payment/", post(payments::transfer_payment))
        .route("/transfer/", post(payments::transfer))
        .route(
            "/connect-account/",
            post(accounts::create_connect_account).get(accounts::get_connect_account),
        )
        .route("/connect-account/sync/", post(accounts::sync_connect_account))
        .route("/onboarding-link/", post(accounts::onboarding_link))
        .route("/login-link/", post(accounts::login_link))
        .route("/webhook/", post(webhook::stripe_webhook))
        .route("/api/payments/", get(payments::list_payments))
        .route("/success/", get(pages::success))
        .route("/cancel/", get(pages::cancel))
        .route("/connect-success/", get(pages::connect_success))
        .route("/connect-refresh/", get(pages::connect_refresh));

    Router::new()
        .merge(tracking_routes)
        .merge(payment_routes)
        .route("/health", get(health::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
