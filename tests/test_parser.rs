use vesper::http::parser::{ParseError, parse_request, split_multipart};
use vesper::http::request::{BodyKind, Method, Version};

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let parsed = parse_request(req).unwrap();

    assert_eq!(parsed.method, Some(Method::GET));
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, Some(Version::Http11));
    assert_eq!(parsed.header("Host"), Some("example.com"));
    assert_eq!(parsed.host.as_deref(), Some("example.com"));
    assert_eq!(parsed.port, None);
    assert_eq!(parsed.len(), req.len());
    assert!(parsed.body.is_empty());
}

#[test]
fn test_parse_query_string_records() {
    let req = b"GET /?a=1&b=2 HTTP/1.1\r\nHost: x\r\n\r\n";
    let parsed = parse_request(req).unwrap();

    let url: Vec<(&str, &[u8])> = parsed
        .url
        .iter()
        .map(|r| (r.name.as_str(), &r.value[..]))
        .collect();
    assert_eq!(url, vec![("a", &b"1"[..]), ("b", &b"2"[..])]);
    assert!(parsed.body.is_empty());
    assert_eq!(parsed.path, "/?a=1&b=2");
    assert_eq!(parsed.route(), "/");
}

#[test]
fn test_parse_query_string_empty_value() {
    let req = b"GET /search?q=&page=2 HTTP/1.1\r\nHost: x\r\n\r\n";
    let parsed = parse_request(req).unwrap();

    assert_eq!(parsed.url.len(), 2);
    assert_eq!(parsed.url_param("q").unwrap().size(), 0);
    assert_eq!(parsed.url_param("page").unwrap().value_str(), Some("2"));
}

#[test]
fn test_parse_query_string_without_equals_is_invalid() {
    let req = b"GET /search?rust HTTP/1.1\r\nHost: x\r\n\r\n";
    assert_eq!(parse_request(req), Err(ParseError::InvalidQueryString));

    let req = b"GET /search?=rust HTTP/1.1\r\nHost: x\r\n\r\n";
    assert_eq!(parse_request(req), Err(ParseError::InvalidQueryString));
}

#[test]
fn test_parse_post_url_encoded_body() {
    let req = b"POST /form HTTP/1.1\r\nHost: x\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 7\r\n\r\na=1&b=2";
    let parsed = parse_request(req).unwrap();

    assert_eq!(parsed.body_kind, BodyKind::UrlEncoded);
    assert_eq!(parsed.content_length, 7);
    let body: Vec<(&str, &str)> = parsed
        .body
        .iter()
        .map(|r| (r.name.as_str(), r.value_str().unwrap()))
        .collect();
    assert_eq!(body, vec![("a", "1"), ("b", "2")]);
}

#[test]
fn test_parse_url_encoded_rejects_structural_lead() {
    for lead in ["&", "=", "+", "[", "]", "{", "}", "*"] {
        let body = format!("{}a=1", lead);
        let req = format!(
            "POST / HTTP/1.1\r\nHost: x\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        assert_eq!(
            parse_request(req.as_bytes()),
            Err(ParseError::MalformedFormData),
            "leading {:?}",
            lead
        );
    }
}

#[test]
fn test_parse_free_form_body_is_single_record() {
    let req = b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"key\": true}";
    let parsed = parse_request(req).unwrap();

    assert_eq!(parsed.body_kind, BodyKind::Free);
    assert_eq!(parsed.content_type.as_deref(), Some("application/json"));
    assert_eq!(parsed.body.len(), 1);
    assert_eq!(parsed.body[0].name, "body");
    assert_eq!(&parsed.body[0].value[..], b"{\"key\": true}");
}

#[test]
fn test_parse_body_length_matches_content_length() {
    for n in [1usize, 2, 17, 512, 4096] {
        let body = vec![b'z'; n];
        let mut req = format!(
            "PUT /blob HTTP/1.1\r\nHost: x\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
            n
        )
        .into_bytes();
        req.extend_from_slice(&body);

        let parsed = parse_request(&req).unwrap();
        assert_eq!(parsed.body_size(), n);
    }
}

#[test]
fn test_parse_binary_body() {
    let req = b"POST /upload HTTP/1.1\r\nContent-Type: application/octet-stream\r\nContent-Length: 4\r\n\r\n\x00\x01\x02\x03";
    let parsed = parse_request(req).unwrap();

    assert_eq!(&parsed.body[0].value[..], &[0, 1, 2, 3]);
    assert_eq!(parsed.body[0].value_str(), Some("\u{0}\u{1}\u{2}\u{3}"));
}

#[test]
fn test_parse_empty_body_has_no_records() {
    let req = b"POST /api HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 0\r\n\r\n";
    let parsed = parse_request(req).unwrap();

    assert!(parsed.body.is_empty());
    assert_eq!(parsed.content_length, 0);
}

#[test]
fn test_parse_multipart_body() {
    let body = "--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
hello\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
line one\r\nline two\r\n\
--XyZ--\r\n";
    let req = format!(
        "POST /upload HTTP/1.1\r\nHost: x\r\nContent-Type: multipart/form-data; boundary=XyZ\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let parsed = parse_request(req.as_bytes()).unwrap();

    assert_eq!(parsed.body_kind, BodyKind::Multipart);
    assert_eq!(parsed.boundary.as_deref(), Some("XyZ"));
    assert_eq!(parsed.body.len(), 2);

    let title = parsed.body_field("title").unwrap();
    assert_eq!(title.value_str(), Some("hello"));
    let part = title.part.as_ref().unwrap();
    assert_eq!(part.disposition.as_deref(), Some("form-data"));
    assert_eq!(part.filename, None);

    let file = parsed.body_field("file").unwrap();
    assert_eq!(file.value_str(), Some("line one\r\nline two"));
    let part = file.part.as_ref().unwrap();
    assert_eq!(part.filename.as_deref(), Some("a.txt"));
    assert_eq!(part.content_type.as_deref(), Some("text/plain"));
}

#[test]
fn test_multipart_split_reconstructs_body() {
    let bodies: [&[u8]; 3] = [
        b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--B--\r\n",
        b"preamble--B\r\n\r\nx\r\n--B\r\n\r\ny\r\n--B--",
        b"no delimiter at all",
    ];
    for body in bodies {
        let pieces = split_multipart(body, "B");
        assert_eq!(pieces.join(&b"--B"[..]), body.to_vec());
    }
}

#[test]
fn test_parse_multipart_without_boundary_is_malformed() {
    let req = b"POST / HTTP/1.1\r\nContent-Type: multipart/form-data\r\nContent-Length: 3\r\n\r\nabc";
    assert_eq!(parse_request(req), Err(ParseError::MalformedFormData));
}

#[test]
fn test_parse_multiple_headers() {
    let req = b"GET /path HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nAccept: */*\r\n\r\n";
    let parsed = parse_request(req).unwrap();

    assert_eq!(parsed.headers.len(), 3);
    assert_eq!(parsed.header("host"), Some("example.com"));
    assert_eq!(parsed.header("User-Agent"), Some("test-client"));
    assert_eq!(parsed.header("Accept"), Some("*/*"));
}

#[test]
fn test_parse_host_with_port() {
    let req = b"GET / HTTP/1.0\r\nhost: example.com:8080\r\n\r\n";
    let parsed = parse_request(req).unwrap();

    assert_eq!(parsed.host.as_deref(), Some("example.com"));
    assert_eq!(parsed.port, Some(8080));
    assert_eq!(parsed.version, Some(Version::Http10));
}

#[test]
fn test_parse_host_ipv6_literal() {
    let parsed = parse_request(b"GET / HTTP/1.1\r\nHost: [::1]:2000\r\n\r\n").unwrap();
    assert_eq!(parsed.host.as_deref(), Some("[::1]"));
    assert_eq!(parsed.port, Some(2000));

    let parsed = parse_request(b"GET / HTTP/1.1\r\nHost: [fe80::1]\r\n\r\n").unwrap();
    assert_eq!(parsed.host.as_deref(), Some("[fe80::1]"));
    assert_eq!(parsed.port, None);
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    let result = parse_request(req);

    assert_eq!(result, Err(ParseError::AwaitingHeader));
    assert!(result.unwrap_err().is_recoverable());
}

#[test]
fn test_parse_incomplete_request_partial_body() {
    let req = b"POST /api HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 10\r\n\r\nhello";
    let err = parse_request(req).unwrap_err();

    assert_eq!(
        err,
        ParseError::AwaitingBody {
            expected: 10,
            received: 5
        }
    );
    assert!(err.is_recoverable());
    assert!(!err.is_fatal());
}

#[test]
fn test_parse_split_reads_match_single_read() {
    let req: &[u8] = b"POST /f?x=9 HTTP/1.1\r\nHost: x\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 7\r\n\r\na=1&b=2";
    let whole = parse_request(req).unwrap();

    let cuts = [10, 40, req.len() - 3];
    let mut buf = Vec::new();
    let mut start = 0;
    for cut in cuts {
        buf.extend_from_slice(&req[start..cut]);
        assert!(parse_request(&buf).unwrap_err().is_recoverable());
        start = cut;
    }
    buf.extend_from_slice(&req[start..]);

    assert_eq!(parse_request(&buf).unwrap(), whole);
}

#[test]
fn test_parse_unsupported_methods() {
    for method in ["OPTIONS", "TRACE", "CONNECT", "get", "FOO", "\u{1F600}"] {
        let req = format!("{} / HTTP/1.1\r\nHost: x\r\n\r\n", method);
        let err = parse_request(req.as_bytes()).unwrap_err();

        assert!(err.is_fatal());
        assert!(err.rejects_request_line());
        if method.is_ascii() {
            assert_eq!(err, ParseError::UnsupportedMethod(method.to_string()));
        }
    }
}

#[test]
fn test_parse_unsupported_protocol() {
    let req = b"GET / HTTP/2.0\r\n\r\n";
    assert_eq!(
        parse_request(req),
        Err(ParseError::UnsupportedProtocol("HTTP/2.0".to_string()))
    );
}

#[test]
fn test_parse_malformed_first_line() {
    for line in ["GET /", "GET", "GET / HTTP/1.1 extra"] {
        let req = format!("{}\r\n\r\n", line);
        assert_eq!(parse_request(req.as_bytes()), Err(ParseError::MalformedFirstLine));
    }
}

#[test]
fn test_parse_malformed_header() {
    let req = b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n";
    let result = parse_request(req);

    assert_eq!(result, Err(ParseError::InvalidHeader));
}

#[test]
fn test_parse_various_http_methods() {
    let methods = vec![("GET", Method::GET), ("HEAD", Method::HEAD)];

    for (method_str, expected_method) in methods {
        let req = format!("{} / HTTP/1.1\r\n\r\n", method_str);
        let parsed = parse_request(req.as_bytes()).unwrap();
        assert_eq!(parsed.method, Some(expected_method));
    }

    for (method_str, expected_method) in [
        ("POST", Method::POST),
        ("PUT", Method::PUT),
        ("PATCH", Method::PATCH),
        ("DELETE", Method::DELETE),
    ] {
        let req = format!(
            "{} / HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 0\r\n\r\n",
            method_str
        );
        let parsed = parse_request(req.as_bytes()).unwrap();
        assert_eq!(parsed.method, Some(expected_method));
    }
}

#[test]
fn test_parse_body_method_requires_content_length() {
    let req = b"POST /api HTTP/1.1\r\nContent-Type: text/plain\r\n\r\n";
    let err = parse_request(req).unwrap_err();

    assert_eq!(err, ParseError::MissingContentLength);
    assert_eq!(err.status().as_u16(), 411);
}

#[test]
fn test_parse_invalid_content_length() {
    for value in ["abc", "-5", "1.5", "", "99999999999999999999999999"] {
        let req = format!(
            "POST / HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n",
            value
        );
        assert_eq!(
            parse_request(req.as_bytes()),
            Err(ParseError::InvalidContentLength),
            "value {:?}",
            value
        );
    }
}

#[test]
fn test_parse_body_method_without_content_type() {
    let req = b"DELETE /item HTTP/1.1\r\nContent-Length: 0\r\n\r\n";
    let err = parse_request(req).unwrap_err();

    assert_eq!(err, ParseError::IncompleteHeader("Content-Type"));
    assert!(!err.is_recoverable());
    assert!(!err.is_fatal());
}

#[test]
fn test_parse_get_ignores_content_length() {
    let req = b"GET / HTTP/1.1\r\nContent-Length: 5\r\n\r\n";
    let parsed = parse_request(req).unwrap();

    assert_eq!(parsed.content_length, 0);
    assert_eq!(parsed.body_kind, BodyKind::None);
    assert_eq!(parsed.len(), req.len());
}

#[test]
fn test_parse_header_case_preservation() {
    let req = b"GET / HTTP/1.1\r\nContent-Type: application/json\r\n\r\n";
    let parsed = parse_request(req).unwrap();

    // Names are stored as sent; lookups ignore case.
    assert_eq!(parsed.headers[0].name, "Content-Type");
    assert_eq!(parsed.header("content-type"), Some("application/json"));
}

#[test]
fn test_parse_header_len_within_total() {
    let req = b"POST / HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 3\r\n\r\nabcEXTRA";
    let parsed = parse_request(req).unwrap();

    assert!(parsed.header_len <= parsed.len());
    assert_eq!(parsed.len(), req.len() - "EXTRA".len());
}
