// ABOUTME: Splits CGI-style script output into status, headers and body
// ABOUTME: Output without a well-formed header block is returned verbatim as the body

use http::StatusCode;
use tracing::debug;

pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiResponse {
    pub status: StatusCode,
    /// Lower-cased header names in the order the script emitted them
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CgiResponse {
    /// First value of a header, by lower-case name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Parse script stdout.
///
/// The header block ends at the first `\r\n\r\n` or `\n\n`. If there is no
/// such separator, or any line before it is not a `name: value` header, the
/// entire output is treated as body. A body that legitimately begins with a
/// colon-bearing line followed by a blank line is therefore misread as
/// headers; this ambiguity is inherent to the format and kept as is.
pub fn parse_cgi_output(stdout: &[u8]) -> CgiResponse {
    let Some((head, body)) = split_header_block(stdout).and_then(|(head, body)| {
        parse_headers(head).map(|headers| (headers, body))
    }) else {
        debug!("No CGI header block, treating {} bytes as body", stdout.len());
        return finish(StatusCode::OK, Vec::new(), stdout.to_vec());
    };

    let mut status = None;
    let mut headers = Vec::with_capacity(head.len());
    for (key, value) in head {
        match key.as_str() {
            "status" => match parse_status(&value) {
                Some(code) => status = Some(code),
                None => debug!("Ignoring malformed CGI status '{}'", value),
            },
            "content-disposition" => {}
            _ => headers.push((key, value)),
        }
    }

    let status = status.unwrap_or_else(|| {
        if headers.iter().any(|(key, _)| key == "location") {
            StatusCode::FOUND
        } else {
            StatusCode::OK
        }
    });
    finish(status, headers, body.to_vec())
}

fn finish(status: StatusCode, mut headers: Vec<(String, String)>, body: Vec<u8>) -> CgiResponse {
    if !headers.iter().any(|(key, _)| key == "content-type") {
        headers.push(("content-type".to_string(), DEFAULT_CONTENT_TYPE.to_string()));
    }
    CgiResponse {
        status,
        headers,
        body,
    }
}

fn split_header_block(output: &[u8]) -> Option<(&[u8], &[u8])> {
    let crlf = find(output, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(output, b"\n\n").map(|i| (i, 2));
    let (index, len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&output[..index], &output[index + len..]))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_headers(block: &[u8]) -> Option<Vec<(String, String)>> {
    let text = std::str::from_utf8(block).ok()?;
    let mut headers = Vec::new();
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':')?;
        if !is_header_name(name) {
            return None;
        }
        headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
    }
    Some(headers)
}

fn is_header_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

fn parse_status(value: &str) -> Option<StatusCode> {
    let code = value.split_whitespace().next()?;
    let code: u16 = code.parse().ok()?;
    StatusCode::from_u16(code).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_block_is_split() {
        let response = parse_cgi_output(b"Content-Type: text/plain\n\nhello");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.body, b"hello");
    }

    #[test]
    fn test_crlf_separator() {
        let response = parse_cgi_output(b"X-Powered-By: PHP\r\nContent-type: text/html; charset=UTF-8\r\n\r\n<p>hi</p>\n\nmore");
        assert_eq!(response.header("x-powered-by"), Some("PHP"));
        assert_eq!(response.header("content-type"), Some("text/html; charset=UTF-8"));
        assert_eq!(response.body, b"<p>hi</p>\n\nmore");
    }

    #[test]
    fn test_content_disposition_is_stripped() {
        let response = parse_cgi_output(
            b"Content-Disposition: attachment; filename=x.exe\nContent-Type: text/plain\n\nbody",
        );
        assert_eq!(response.header("content-disposition"), None);
        assert_eq!(response.body, b"body");
    }

    #[test]
    fn test_status_header() {
        let response = parse_cgi_output(b"Status: 404 Not Found\n\nmissing");
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.header("status"), None);
        assert_eq!(response.header("content-type"), Some(DEFAULT_CONTENT_TYPE));
    }

    #[test]
    fn test_location_implies_redirect() {
        let response = parse_cgi_output(b"Location: /login\n\n");
        assert_eq!(response.status, StatusCode::FOUND);
        assert_eq!(response.header("location"), Some("/login"));
        assert!(response.body.is_empty());

        let response = parse_cgi_output(b"Status: 301\nLocation: /new\n\n");
        assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn test_output_without_separator_is_body() {
        let response = parse_cgi_output(b"just text: no headers");
        assert_eq!(response.body, b"just text: no headers");
        assert_eq!(response.header("content-type"), Some(DEFAULT_CONTENT_TYPE));
    }

    #[test]
    fn test_invalid_header_line_means_whole_output_is_body() {
        let output = b"<html>\n<body>\n\n</body>";
        let response = parse_cgi_output(output);
        assert_eq!(response.body, output);
        assert_eq!(response.status, StatusCode::OK);
    }

    #[test]
    fn test_body_bytes_are_untouched() {
        let output = b"Content-Type: application/octet-stream\n\n\x00\xff\r\n\r\n";
        let response = parse_cgi_output(output);
        assert_eq!(response.body, b"\x00\xff\r\n\r\n");
    }

    #[test]
    fn test_repeated_headers_are_kept() {
        let response = parse_cgi_output(b"Set-Cookie: a=1\nSet-Cookie: b=2\n\n");
        let cookies: Vec<_> = response
            .headers
            .iter()
            .filter(|(k, _)| k == "set-cookie")
            .collect();
        assert_eq!(cookies.len(), 2);
    }
}
