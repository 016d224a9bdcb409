use std::fmt::Write;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use axum::http::header::InvalidHeaderValue;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

#[derive(Debug)]
pub struct SetCookie {
    name: String,
    value: String,
    expires: Option<DateTime<Utc>>,
    max_age: Option<Duration>,
    path: Option<String>,
    domain: Option<String>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl SetCookie {
    pub fn new<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        SetCookie {
            name: name.into(),
            value: value.into(),
            expires: None,
            max_age: None,
            path: None,
            domain: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_path<P>(mut self, path: P) -> Self
    where
        P: Into<String>
    {
        self.path = Some(path.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    #[allow(dead_code)]
    pub fn set_domain<D>(&mut self, domain: D)
    where
        D: Into<String>
    {
        self.domain = Some(domain.into());
    }
}

impl std::fmt::Display for SetCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;

        if let Some(expires) = self.expires.as_ref() {
            write!(f, "; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        }

        if let Some(max_age) = self.max_age.as_ref() {
            write!(f, "; Max-Age={}", max_age.as_secs())?;
        }

        if let Some(domain) = self.domain.as_ref() {
            write!(f, "; Domain={domain}")?;
        }

        if let Some(path) = self.path.as_ref() {
            write!(f, "; Path={path}")?;
        }

        if self.secure {
            f.write_str("; Secure")?;
        }

        if self.http_only {
            f.write_str("; HttpOnly")?;
        }

        if let Some(same_site) = self.same_site.as_ref() {
            write!(f, "; SameSite={}", same_site.as_str())?;
        }

        Ok(())
    }
}

impl TryFrom<&SetCookie> for HeaderValue {
    type Error = InvalidHeaderValue;

    fn try_from(cookie: &SetCookie) -> Result<HeaderValue, Self::Error> {
        let mut rendered = String::new();

        // writing into a String cannot fail
        let _ = write!(&mut rendered, "{cookie}");

        HeaderValue::from_str(&rendered)
    }
}

/// scans "cookie" headers for the named cookie value
pub fn find_cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for value in headers.get_all("cookie") {
        let Ok(value_str) = value.to_str() else {
            continue;
        };

        for pair in value_str.split("; ") {
            if let Some((key, value)) = pair.split_once('=') {
                if key == name {
                    return Some(value);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn render_set_cookie() {
        let cookie = SetCookie::new("session_id", "abc123")
            .with_path("/")
            .with_http_only(true)
            .with_same_site(SameSite::Strict);

        assert_eq!(
            cookie.to_string(),
            "session_id=abc123; Path=/; HttpOnly; SameSite=Strict"
        );
    }

    #[test]
    fn find_cookie_in_headers() {
        let mut headers = HeaderMap::new();
        headers.append("cookie", HeaderValue::from_static("theme=dark; session_id=abc123"));

        assert_eq!(find_cookie_value(&headers, "session_id"), Some("abc123"));
        assert_eq!(find_cookie_value(&headers, "missing"), None);
    }
}
