use std::fmt;

/// HTTP request methods accepted by the server.
///
/// Anything outside this set is rejected by the parser with
/// [`ParseError::UnsupportedMethod`](crate::http::parser::ParseError::UnsupportedMethod).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HEAD - Like GET but without the response body
    HEAD,
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// DELETE - Delete a resource
    DELETE,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of the method (case-sensitive, uppercase)
    ///
    /// # Returns
    ///
    /// `Some(Method)` if the string matches a supported method, `None` otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use vesper::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// assert_eq!(Method::from_str("OPTIONS"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "HEAD" => Some(Method::HEAD),
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "PATCH" => Some(Method::PATCH),
            "DELETE" => Some(Method::DELETE),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::HEAD => "HEAD",
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
        }
    }

    /// Whether requests with this method carry a framed body
    /// (`Content-Length` and `Content-Type` are required).
    pub fn expects_body(&self) -> bool {
        matches!(
            self,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol versions accepted on the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    Http11,
    Http10,
    /// The bare `HTTP/1` token some clients send.
    Http1,
    Http09,
}

impl Version {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "HTTP/1.1" => Some(Version::Http11),
            "HTTP/1.0" => Some(Version::Http10),
            "HTTP/1" => Some(Version::Http1),
            "HTTP/0.9" => Some(Version::Http09),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http11 => "HTTP/1.1",
            Version::Http10 => "HTTP/1.0",
            Version::Http1 => "HTTP/1",
            Version::Http09 => "HTTP/0.9",
        }
    }

    /// Connections default to keep-alive only on HTTP/1.1.
    pub fn keeps_alive_by_default(&self) -> bool {
        matches!(self, Version::Http11)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the body of a request is framed, decided from its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    /// The method carries no body.
    #[default]
    None,
    /// `application/x-www-form-urlencoded`
    UrlEncoded,
    /// `multipart/form-data`
    Multipart,
    /// Any other content type, stored as one opaque record.
    Free,
}

impl BodyKind {
    pub const URL_ENCODED: &'static str = "application/x-www-form-urlencoded";
    pub const MULTIPART: &'static str = "multipart/form-data";

    pub fn classify(content_type: &str) -> Self {
        if content_type.eq_ignore_ascii_case(Self::MULTIPART) {
            BodyKind::Multipart
        } else if content_type.eq_ignore_ascii_case(Self::URL_ENCODED) {
            BodyKind::UrlEncoded
        } else {
            BodyKind::Free
        }
    }
}
