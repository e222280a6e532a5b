mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum_auth::AuthBearer;
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::sighting_handler,
        api::whitelist_handler,
        api::user_whitelist_handler,
        api::info_handler,
        api::similar_handler,
        api::stat_handler,
        api::export_handler,
    ),
    components(schemas(types::SightingForm, types::WhitelistRequest, types::UserWhitelistRequest)),
    modifiers(&SecurityAddon),
    security(("token" = []))
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "token",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

async fn auth(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if token != state.token {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/sighting", post(api::sighting_handler))
        .route("/whitelist", post(api::whitelist_handler))
        .route("/user_whitelist", post(api::user_whitelist_handler))
        .route("/info", get(api::info_handler))
        .route("/similar", get(api::similar_handler))
        .route("/stat", get(api::stat_handler))
        .route("/export", get(api::export_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth));

    Router::new()
        .merge(api)
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 上传限制：10M
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
        .with_state(state)
}
