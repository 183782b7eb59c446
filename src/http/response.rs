use std::fmt;

/// HTTP status codes the server can emit or recognise.
///
/// The common ones used by the connection state machine:
/// - `Ok` (200): Request successful
/// - `BadRequest` (400): Malformed request or missing `Host`
/// - `NotFound` (404): Unknown virtual host
/// - `RequestTimeout` (408): Peer did not finish sending in time
/// - `LengthRequired` (411): Body method without `Content-Length`
/// - `PayloadTooLarge` (413): Request exceeded the configured ceiling
/// - `InternalServerError` (500): Routing, handler or serialization failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Continue,
    SwitchingProtocols,
    Ok,
    Created,
    Accepted,
    NoContent,
    PartialContent,
    MultipleChoices,
    MovedPermanently,
    Found,
    SeeOther,
    NotModified,
    UseProxy,
    TemporaryRedirect,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    ProxyAuthenticationRequired,
    RequestTimeout,
    Conflict,
    Gone,
    LengthRequired,
    PreconditionFailed,
    PayloadTooLarge,
    UriTooLong,
    UnsupportedMediaType,
    RangeNotSatisfiable,
    ExpectationFailed,
    ImATeapot,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
}

const TABLE: &[(StatusCode, u16, &str)] = &[
    (StatusCode::Continue, 100, "Continue"),
    (StatusCode::SwitchingProtocols, 101, "Switching Protocols"),
    (StatusCode::Ok, 200, "OK"),
    (StatusCode::Created, 201, "Created"),
    (StatusCode::Accepted, 202, "Accepted"),
    (StatusCode::NoContent, 204, "No Content"),
    (StatusCode::PartialContent, 206, "Partial Content"),
    (StatusCode::MultipleChoices, 300, "Multiple Choices"),
    (StatusCode::MovedPermanently, 301, "Moved Permanently"),
    (StatusCode::Found, 302, "Found"),
    (StatusCode::SeeOther, 303, "See Other"),
    (StatusCode::NotModified, 304, "Not Modified"),
    (StatusCode::UseProxy, 305, "Use Proxy"),
    (StatusCode::TemporaryRedirect, 307, "Temporary Redirect"),
    (StatusCode::BadRequest, 400, "Bad Request"),
    (StatusCode::Unauthorized, 401, "Unauthorized"),
    (StatusCode::Forbidden, 403, "Forbidden"),
    (StatusCode::NotFound, 404, "Not Found"),
    (StatusCode::MethodNotAllowed, 405, "Method Not Allowed"),
    (StatusCode::NotAcceptable, 406, "Not Acceptable"),
    (StatusCode::ProxyAuthenticationRequired, 407, "Proxy Authentication Required"),
    (StatusCode::RequestTimeout, 408, "Request Timeout"),
    (StatusCode::Conflict, 409, "Conflict"),
    (StatusCode::Gone, 410, "Gone"),
    (StatusCode::LengthRequired, 411, "Length Required"),
    (StatusCode::PreconditionFailed, 412, "Precondition Failed"),
    (StatusCode::PayloadTooLarge, 413, "Request Entity Too Large"),
    (StatusCode::UriTooLong, 414, "Request URI Too Long"),
    (StatusCode::UnsupportedMediaType, 415, "Unsupported Media Type"),
    (StatusCode::RangeNotSatisfiable, 416, "Requested Range Not Satisfiable"),
    (StatusCode::ExpectationFailed, 417, "Expectation Failed"),
    (StatusCode::ImATeapot, 418, "I'm a teapot"),
    (StatusCode::InternalServerError, 500, "Internal Server Error"),
    (StatusCode::NotImplemented, 501, "Not Implemented"),
    (StatusCode::BadGateway, 502, "Bad Gateway"),
    (StatusCode::ServiceUnavailable, 503, "Service Unavailable"),
    (StatusCode::GatewayTimeout, 504, "Gateway Timeout"),
];

impl StatusCode {
    fn entry(&self) -> &'static (StatusCode, u16, &'static str) {
        // Every variant has exactly one row.
        TABLE
            .iter()
            .find(|(code, _, _)| code == self)
            .unwrap_or(&TABLE[0])
    }

    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use vesper::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::RequestTimeout.as_u16(), 408);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.entry().1
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use vesper::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        self.entry().2
    }

    /// Looks a numeric code up in the status table.
    pub fn from_u16(code: u16) -> Option<Self> {
        TABLE
            .iter()
            .find(|(_, n, _)| *n == code)
            .map(|(status, _, _)| *status)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    pub fn is_server_error(&self) -> bool {
        self.as_u16() >= 500
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// Content type used for the short error pages the server generates itself.
pub const ERROR_CONTENT_TYPE: &str = "text/html";

/// Renders the body of a generated error response.
pub fn error_page(status: StatusCode, message: &str) -> String {
    format!("<h2>{}</h2>\n<p>{}</p>\n", status, message)
}
