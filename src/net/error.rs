use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::Level;

type BoxDynError = Box<dyn std::error::Error + Send + Sync>;

/// web facing error
///
/// the status and message are sent to the client. the source is only ever
/// logged so internal details never end up in a response body
#[derive(Debug)]
pub struct Error {
    status: StatusCode,
    kind: String,
    msg: Option<String>,
    src: Option<BoxDynError>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new() -> Self {
        Error {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: String::from("InternalFailure"),
            msg: None,
            src: None,
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn kind<K>(mut self, kind: K) -> Self
    where
        K: Into<String>
    {
        self.kind = kind.into();
        self
    }

    pub fn message<M>(mut self, msg: M) -> Self
    where
        M: Into<String>
    {
        self.msg = Some(msg.into());
        self
    }

    pub fn source<S>(mut self, src: S) -> Self
    where
        S: Into<BoxDynError>
    {
        self.src = Some(src.into());
        self
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, self.msg.as_ref(), self.src.as_ref()) {
            (kind, Some(msg), Some(err)) => {
                write!(f, "{kind}: {msg}\n{err}")
            },
            (kind, Some(msg), None) => {
                write!(f, "{kind}: {msg}")
            },
            (kind, None, Some(err)) => {
                write!(f, "{kind}: {err}")
            },
            (kind, None, None) => {
                write!(f, "{kind}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.src.as_ref().map(|v| & **v as _)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if let Some(err) = self.src.as_ref() {
            tracing::event!(
                Level::ERROR,
                "unhandled error when processing request: {:#?}",
                err
            );
        }

        let msg = self.msg.unwrap_or_else(|| String::from("there was a problem handling the request"));

        let body = format!(
            "<!DOCTYPE html>\n<html><head><title>{status}</title></head>\
            <body><h1>{status}</h1><p>{msg}</p></body></html>",
            status = self.status,
        );

        (
            self.status,
            [("content-type", "text/html")],
            body
        ).into_response()
    }
}

macro_rules! simple_from {
    ($e:path) => {
        impl From<$e> for Error {
            fn from(err: $e) -> Self {
                Error::new()
                    .source(err)
            }
        }
    };
    ($e:path, $k:expr) => {
        impl From<$e> for Error {
            fn from(err: $e) -> Self {
                Error::new()
                    .kind($k)
                    .source(err)
            }
        }
    };
}

simple_from!(std::io::Error);
simple_from!(std::fmt::Error);

simple_from!(axum::Error);
simple_from!(axum::http::Error);
simple_from!(
    axum::http::header::InvalidHeaderValue,
    "InvalidHeaderValue"
);

simple_from!(handlebars::RenderError);

simple_from!(tokio_postgres::Error);
simple_from!(deadpool_postgres::PoolError);

simple_from!(serde_json::Error);

simple_from!(rand::Error);

simple_from!(argon2::Error);
