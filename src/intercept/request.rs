//! Intercepted request model.

use bytes::Bytes;
use url::Url;

use crate::cache::entry::RequestKey;

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` value.
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(RequestMode::Navigate),
            "same-origin" => Some(RequestMode::SameOrigin),
            "no-cors" => Some(RequestMode::NoCors),
            "cors" => Some(RequestMode::Cors),
            _ => None,
        }
    }
}

/// What the response will be used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Image,
    Font,
    Script,
    Style,
    Manifest,
    #[default]
    Empty,
    Other,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` value.
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Destination::Document,
            "image" => Destination::Image,
            "font" => Destination::Font,
            "script" => Destination::Script,
            "style" => Destination::Style,
            "manifest" => Destination::Manifest,
            "empty" | "" => Destination::Empty,
            _ => Destination::Other,
        }
    }
}

/// A request as seen by the engine.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            mode: RequestMode::default(),
            destination: Destination::default(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// A plain `GET` for `url`.
    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new("GET", Url::parse(url)?))
    }

    /// A `GET` navigation to `url`.
    pub fn navigate(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::get(url)?
            .with_mode(RequestMode::Navigate)
            .with_destination(Destination::Document))
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Only `GET` responses are stored or matched.
    pub fn is_cacheable(&self) -> bool {
        self.method == "GET"
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parsing() {
        assert_eq!(RequestMode::from_header("navigate"), Some(RequestMode::Navigate));
        assert_eq!(RequestMode::from_header("NO-CORS"), Some(RequestMode::NoCors));
        assert_eq!(RequestMode::from_header("websocket"), None);
        assert_eq!(Destination::from_header("image"), Destination::Image);
        assert_eq!(Destination::from_header("audio"), Destination::Other);
    }

    #[test]
    fn test_request_key_and_cacheability() {
        let req = Request::navigate("https://app.test/articles").unwrap();
        assert!(req.is_navigation());
        assert!(req.is_cacheable());
        assert_eq!(req.key(), RequestKey::get("https://app.test/articles"));

        let post = Request::new("post", Url::parse("https://app.test/api/x").unwrap());
        assert_eq!(post.method, "POST");
        assert!(!post.is_cacheable());
    }
}
