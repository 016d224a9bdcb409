use axum::http::StatusCode;
use axum::response::Response;

use crate::net::error;
use crate::template::Templates;

#[inline]
pub fn html_response(contents: String) -> error::Result<Response<String>> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/html")
        .header("content-length", contents.len())
        .body(contents)?)
}

/// renders a registered template into a full html response
pub fn render_page<T>(templates: &Templates, name: &str, data: &T) -> error::Result<Response<String>>
where
    T: serde::Serialize,
{
    if !templates.has_template(name) {
        return Err(error::Error::new()
            .kind("TemplateNotFound")
            .source(format!("template \"{name}\" is not registered")));
    }

    html_response(templates.render(name, data)?)
}
