use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};

use crate::net::cookie::{self, SetCookie};
use crate::net::{self, error};
use crate::sec::authn::flow::{AuthError, LoginOutcome};
use crate::sec::authn::initiator::{self, Initiator, LookupError};
use crate::sec::authn::session;
use crate::state::ArcShared;

#[derive(Deserialize)]
pub struct CredentialsForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct CodeForm {
    code: String,
}

#[derive(Serialize)]
struct FormContext {
    error: Option<String>,
}

#[derive(Serialize)]
struct TotpContext {
    secret: String,
    provisioning_uri: String,
    error: Option<String>,
}

/// recoverable auth failures become a message above the re-rendered
/// form, anything else bubbles up as a server error
fn recover(err: AuthError) -> error::Result<String> {
    match err {
        AuthError::DuplicateEmail |
        AuthError::InvalidEmail |
        AuthError::InvalidCredentials |
        AuthError::InvalidTotpCode |
        AuthError::SessionExpired |
        AuthError::TotpNotConfigured |
        AuthError::AlreadyEnrolled => Ok(err.to_string()),
        err => Err(err.into()),
    }
}

fn redirect_with_cookie(to: &str, cookie: &SetCookie) -> error::Result<Response> {
    let value = HeaderValue::try_from(cookie)?;

    let mut response = Redirect::to(to).into_response();
    response.headers_mut().append(header::SET_COOKIE, value);

    Ok(response)
}

async fn lookup(
    state: &ArcShared,
    headers: &HeaderMap,
) -> Result<Initiator, LookupError> {
    initiator::lookup_header_map(
        state.auth(),
        state.sessions(),
        state.store().as_ref(),
        headers
    ).await
}

pub async fn login(
    State(state): State<ArcShared>,
    headers: HeaderMap
) -> error::Result<Response> {
    match lookup(&state, &headers).await {
        Ok(_) => Ok(Redirect::to("/patients/dashboard").into_response()),
        Err(LookupError::SessionUnverified(pending)) => {
            // coming back to the login page abandons the half-finished
            // login. the marker is gone, the password step starts over
            state.sessions().drop_token(&pending.token);

            let expire = session::expire_session_cookie(state.auth());
            let context = FormContext { error: None };

            let mut response = net::html::render_page(state.templates(), "pages/login", &context)?
                .into_response();
            response.headers_mut().append(header::SET_COOKIE, HeaderValue::try_from(&expire)?);

            Ok(response)
        }
        Err(_) => {
            let context = FormContext { error: None };

            Ok(net::html::render_page(state.templates(), "pages/login", &context)?
                .into_response())
        }
    }
}

pub async fn submit_login(
    State(state): State<ArcShared>,
    axum::Form(form): axum::Form<CredentialsForm>,
) -> error::Result<Response> {
    let flow = state.auth_flow();

    match flow.submit_password(&form.email, &form.password).await {
        Ok(LoginOutcome::Complete { session, needs_enrollment }) => {
            let cookie = session::create_session_cookie(state.auth(), &session);

            let to = if needs_enrollment {
                "/auth/totp"
            } else {
                "/patients/dashboard"
            };

            redirect_with_cookie(to, &cookie)
        }
        Ok(LoginOutcome::TotpRequired { session }) => {
            let cookie = session::create_session_cookie(state.auth(), &session);

            redirect_with_cookie("/auth/verify", &cookie)
        }
        Err(err) => {
            let context = FormContext {
                error: Some(recover(err)?),
            };

            Ok(net::html::render_page(state.templates(), "pages/login", &context)?
                .into_response())
        }
    }
}

pub async fn register(
    State(state): State<ArcShared>,
    headers: HeaderMap
) -> error::Result<Response> {
    if lookup(&state, &headers).await.is_ok() {
        return Ok(Redirect::to("/patients/dashboard").into_response());
    }

    let context = FormContext { error: None };

    Ok(net::html::render_page(state.templates(), "pages/register", &context)?
        .into_response())
}

pub async fn submit_register(
    State(state): State<ArcShared>,
    axum::Form(form): axum::Form<CredentialsForm>,
) -> error::Result<Response> {
    let flow = state.auth_flow();

    match flow.register(&form.email, &form.password).await {
        Ok(created) => {
            let cookie = session::create_session_cookie(state.auth(), &created);

            redirect_with_cookie("/auth/totp", &cookie)
        }
        Err(err) => {
            let context = FormContext {
                error: Some(recover(err)?),
            };

            Ok(net::html::render_page(state.templates(), "pages/register", &context)?
                .into_response())
        }
    }
}

async fn totp_page(
    state: &ArcShared,
    initiator: &Initiator,
    error: Option<String>,
) -> error::Result<Response> {
    let flow = state.auth_flow();

    match flow.begin_enrollment(initiator.account().id).await {
        Ok(enrollment) => {
            let context = TotpContext {
                secret: enrollment.secret_base32,
                provisioning_uri: enrollment.provisioning_uri,
                error,
            };

            Ok(net::html::render_page(state.templates(), "pages/totp", &context)?
                .into_response())
        }
        Err(AuthError::AlreadyEnrolled) => {
            Ok(Redirect::to("/patients/dashboard").into_response())
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn totp(
    State(state): State<ArcShared>,
    initiator: Initiator,
) -> error::Result<Response> {
    totp_page(&state, &initiator, None).await
}

pub async fn submit_totp(
    State(state): State<ArcShared>,
    initiator: Initiator,
    axum::Form(form): axum::Form<CodeForm>,
) -> error::Result<Response> {
    let flow = state.auth_flow();

    match flow.confirm_enrollment(initiator.account().id, &form.code).await {
        Ok(()) => Ok(Redirect::to("/patients/dashboard").into_response()),
        Err(err) => {
            let message = recover(err)?;

            totp_page(&state, &initiator, Some(message)).await
        }
    }
}

pub async fn verify(
    State(state): State<ArcShared>,
    headers: HeaderMap
) -> error::Result<Response> {
    match lookup(&state, &headers).await {
        Ok(_) => Ok(Redirect::to("/patients/dashboard").into_response()),
        Err(LookupError::SessionUnverified(_)) => {
            let context = FormContext { error: None };

            Ok(net::html::render_page(state.templates(), "pages/verify", &context)?
                .into_response())
        }
        Err(_) => Ok(Redirect::to("/auth/login").into_response()),
    }
}

pub async fn submit_verify(
    State(state): State<ArcShared>,
    headers: HeaderMap,
    axum::Form(form): axum::Form<CodeForm>,
) -> error::Result<Response> {
    let pending = match lookup(&state, &headers).await {
        Ok(_) => return Ok(Redirect::to("/patients/dashboard").into_response()),
        Err(LookupError::SessionUnverified(session)) => session,
        Err(_) => return Ok(Redirect::to("/auth/login").into_response()),
    };

    let flow = state.auth_flow();

    match flow.verify_pending(&pending, &form.code).await {
        Ok(verified) => {
            let cookie = session::create_session_cookie(state.auth(), &verified);

            redirect_with_cookie("/patients/dashboard", &cookie)
        }
        Err(AuthError::InvalidTotpCode) => {
            let context = FormContext {
                error: Some(AuthError::InvalidTotpCode.to_string()),
            };

            Ok(net::html::render_page(state.templates(), "pages/verify", &context)?
                .into_response())
        }
        Err(AuthError::TotpNotConfigured) |
        Err(AuthError::SessionExpired) => {
            let cookie = session::expire_session_cookie(state.auth());

            redirect_with_cookie("/auth/login", &cookie)
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn logout(
    State(state): State<ArcShared>,
    headers: HeaderMap
) -> error::Result<Response> {
    if let Some(found) = cookie::find_cookie_value(&headers, session::SESSION_COOKIE) {
        if let Ok(token) = session::decode_base64(state.auth(), found.as_bytes()) {
            state.auth_flow().logout(&token);
        }
    }

    let cookie = session::expire_session_cookie(state.auth());

    redirect_with_cookie("/", &cookie)
}
