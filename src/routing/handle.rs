use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect};
use serde::Serialize;

use crate::net::{self, error};
use crate::sec::authn::initiator;
use crate::state::ArcShared;

pub mod auth;
pub mod patients;

#[derive(Serialize)]
pub struct RootContext {}

pub async fn get(
    State(state): State<ArcShared>,
    headers: HeaderMap
) -> error::Result<impl IntoResponse> {
    let lookup = initiator::lookup_header_map(
        state.auth(),
        state.sessions(),
        state.store().as_ref(),
        &headers
    ).await;

    if lookup.is_ok() {
        return Ok(Redirect::to("/patients/dashboard").into_response());
    }

    let context = RootContext {};

    Ok(net::html::render_page(state.templates(), "pages/root", &context)?
        .into_response())
}
