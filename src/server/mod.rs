mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(api::feed_handler, api::record_handler, api::similar_handler),
    components(schemas(types::FeedResponse, types::SimilarResponse))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/feed", get(api::feed_handler))
        .route("/api/records/{collection}/{id}", get(api::record_handler))
        .route("/api/faces/{id}/similar", get(api::similar_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // 只读接口，请求体限制给个小值即可
        .layer(RequestBodyLimitLayer::new(1024 * 64))
        .with_state(state)
}
