use axum::Router;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::routing::{get, post};
use axum::response::IntoResponse;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::net::{self, error};
use crate::state::ArcShared;

mod handle;

async fn serve_file(
    State(state): State<ArcShared>,
    method: Method,
    uri: Uri
) -> error::Result<impl IntoResponse> {
    if method != Method::GET {
        return Err(error::Error::new()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .message("invalid method"));
    }

    let parts = uri.path().split('/');
    let mut working = state.assets().to_owned();

    for part in parts {
        if part == ".." || part == "." {
            return Err(error::Error::new()
                .status(StatusCode::BAD_REQUEST)
                .message("invalid uri path"));
        } else {
            working.push(part);
        }
    }

    if !working.try_exists()? {
        return Err(error::Error::new()
            .status(StatusCode::NOT_FOUND)
            .message("not found"));
    }

    if !working.is_file() {
        return Err(error::Error::new()
            .status(StatusCode::NOT_FOUND)
            .message("not found"));
    }

    net::fs::stream_file(working).await
}

pub fn routes(state: &ArcShared) -> Router {
    Router::new()
        .route(
            "/",
            get(handle::get)
        )
        .route(
            "/auth/login",
            get(handle::auth::login)
                .post(handle::auth::submit_login)
        )
        .route(
            "/auth/register",
            get(handle::auth::register)
                .post(handle::auth::submit_register)
        )
        .route(
            "/auth/totp",
            get(handle::auth::totp)
                .post(handle::auth::submit_totp)
        )
        .route(
            "/auth/verify",
            get(handle::auth::verify)
                .post(handle::auth::submit_verify)
        )
        .route(
            "/auth/logout",
            get(handle::auth::logout)
        )
        .route(
            "/patients",
            get(handle::patients::list)
        )
        .route(
            "/patients/dashboard",
            get(handle::patients::dashboard)
        )
        .route(
            "/patients/add",
            get(handle::patients::add)
                .post(handle::patients::submit_add)
        )
        .route(
            "/patients/:id",
            get(handle::patients::detail)
        )
        .route(
            "/patients/:id/edit",
            get(handle::patients::edit)
                .post(handle::patients::submit_edit)
        )
        .route(
            "/patients/:id/delete",
            post(handle::patients::delete)
        )
        .fallback(serve_file)
        .layer(ServiceBuilder::new()
            .layer(TraceLayer::new_for_http()))
        .with_state(state.clone())
}
