use crate::net::buffer::Buffer;
use hashbrown::HashMap;
use percent_encoding::percent_decode_str;
use serde_json::Value as Json;

/// Upper bound on one request (head + body) in the connection accumulator.
pub const MAX_REQUEST_SIZE: usize = 1024 * 1024;

const HEAD_BOUNDARY: &[u8] = b"\r\n\r\n";

/// One parsed HTTP/1.1 request. Header keys are lowercased; the query string
/// is percent-decoded; `json` is populated when the content type says so.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub json: Option<Json>,
}

/// Result of advancing the parse over the connection buffer.
#[derive(Debug)]
pub enum ParseOutcome {
    /// Not enough bytes yet; poll again on a later tick.
    Incomplete,
    /// Protocol-level failure the transport reports as HTTP 400.
    BadRequest(String),
    Complete(Request),
}

/// Attempts to cut one complete request off the front of the buffer. The
/// head boundary is located in the raw bytes, and the body cutoff counts
/// bytes, not code points, so multi-byte content lengths stay correct.
pub fn try_parse(buffer: &mut Buffer) -> ParseOutcome {
    let data = buffer.as_slice();

    let head_len = match find_boundary(data) {
        Some(pos) => pos,
        None => return ParseOutcome::Incomplete,
    };

    let head = match std::str::from_utf8(&data[..head_len]) {
        Ok(head) => head,
        Err(_) => return ParseOutcome::BadRequest("Malformed request head".into()),
    };

    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();

    let method = match parts.next() {
        Some(method) => method.to_ascii_uppercase(),
        None => return ParseOutcome::BadRequest("Empty request line".into()),
    };
    let target = match parts.next() {
        Some(target) => target,
        None => return ParseOutcome::BadRequest("Missing request target".into()),
    };
    if parts.next().map(|v| v.starts_with("HTTP/")) != Some(true) {
        return ParseOutcome::BadRequest("Missing HTTP version".into());
    }

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        match line.find(':') {
            Some(split) => {
                let key = line[..split].trim().to_ascii_lowercase();
                let value = line[split + 1..].trim().to_string();
                headers.insert(key, value);
            }
            None => return ParseOutcome::BadRequest("Malformed header line".into()),
        }
    }

    let content_length = match headers.get("content-length") {
        Some(raw) => match raw.parse::<usize>() {
            Ok(len) if len <= MAX_REQUEST_SIZE => len,
            Ok(_) => return ParseOutcome::BadRequest("Request body too large".into()),
            Err(_) => return ParseOutcome::BadRequest("Malformed Content-Length".into()),
        },
        None => 0,
    };

    let body_start = head_len + HEAD_BOUNDARY.len();
    if data.len() < body_start + content_length {
        return ParseOutcome::Incomplete;
    }

    let body = data[body_start..body_start + content_length].to_vec();

    let (path, query) = split_target(target);

    let is_json = headers
        .get("content-type")
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);

    let json = if is_json && !body.is_empty() {
        match serde_json::from_slice::<Json>(&body) {
            Ok(value) => Some(value),
            Err(_) if method == "POST" => {
                buffer.consume(body_start + content_length);
                return ParseOutcome::BadRequest("Invalid JSON in request body".into());
            }
            Err(_) => None,
        }
    } else {
        None
    };

    buffer.consume(body_start + content_length);

    ParseOutcome::Complete(Request {
        method,
        path,
        query,
        headers,
        body,
        json,
    })
}

/// Locates the `\r\n\r\n` head terminator in the raw byte buffer.
fn find_boundary(data: &[u8]) -> Option<usize> {
    data.windows(HEAD_BOUNDARY.len())
        .position(|window| window == HEAD_BOUNDARY)
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    let mut query = HashMap::new();

    let (path, raw_query) = match target.find('?') {
        Some(pos) => (&target[..pos], &target[pos + 1..]),
        None => (target, ""),
    };

    for pair in raw_query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.find('=') {
            Some(pos) => (&pair[..pos], &pair[pos + 1..]),
            None => (pair, ""),
        };
        query.insert(url_decode(key), url_decode(value));
    }

    (url_decode(path), query)
}

fn url_decode(raw: &str) -> String {
    let plus_folded = raw.replace('+', " ");
    percent_decode_str(&plus_folded).decode_utf8_lossy().into_owned()
}

impl Request {
    /// Looks a parameter up in the query string first, then in the JSON body.
    /// Scalars in the body are stringified so query and body forms stay
    /// interchangeable.
    pub fn param(&self, name: &str) -> Option<String> {
        if let Some(value) = self.query.get(name) {
            return Some(value.clone());
        }

        match self.body_field(name)? {
            Json::String(value) => Some(value.clone()),
            Json::Number(value) => Some(value.to_string()),
            Json::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }

    /// Raw JSON body field, for parameters that must keep their structure.
    pub fn body_field(&self, name: &str) -> Option<&Json> {
        self.json.as_ref()?.as_object()?.get(name)
    }

    pub fn f64_param(&self, name: &str) -> Option<f64> {
        if let Some(Json::Number(value)) = self.body_field(name) {
            return value.as_f64();
        }
        self.query.get(name)?.parse().ok()
    }

    pub fn i64_param(&self, name: &str) -> Option<i64> {
        if let Some(Json::Number(value)) = self.body_field(name) {
            return value.as_i64();
        }
        self.query.get(name)?.parse().ok()
    }

    pub fn bool_param(&self, name: &str) -> Option<bool> {
        if let Some(Json::Bool(value)) = self.body_field(name) {
            return Some(*value);
        }
        match self.query.get(name)?.as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        }
    }

    /// A parameter that is present but empty counts as absent.
    pub fn nonempty_param(&self, name: &str) -> Option<String> {
        self.param(name).filter(|value| !value.is_empty())
    }
}

/// A fully materialized response, ready for the egress buffer.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    #[inline]
    pub fn json(status: u16, value: &Json) -> Response {
        Response {
            status,
            content_type: "application/json",
            body: serde_json::to_vec(value).expect("JSON encoding cannot fail"),
        }
    }

    #[inline]
    pub fn text(body: String) -> Response {
        Response {
            status: 200,
            content_type: "text/plain; charset=utf-8",
            body: body.into_bytes(),
        }
    }

    #[inline]
    pub fn bytes(body: Vec<u8>) -> Response {
        Response {
            status: 200,
            content_type: "application/octet-stream",
            body,
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "OK",
        }
    }

    /// Serializes status line, headers and body. Every response closes the
    /// connection and allows any origin.
    pub fn encode(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len()
        );

        let mut encoded = head.into_bytes();
        encoded.extend_from_slice(&self.body);
        encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(raw: &[u8]) -> ParseOutcome {
        let mut buffer = Buffer::new(MAX_REQUEST_SIZE);
        buffer.extend(raw);
        try_parse(&mut buffer)
    }

    #[test]
    fn test_parse_get_with_query() {
        let outcome = feed(b"GET /snapshot?root=Level%2FPlayer&depth=3&note=a+b HTTP/1.1\r\nHost: x\r\n\r\n");

        let request = match outcome {
            ParseOutcome::Complete(request) => request,
            other => panic!("Unexpected outcome {:?}", other),
        };

        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/snapshot");
        assert_eq!(request.query["root"], "Level/Player");
        assert_eq!(request.query["depth"], "3");
        assert_eq!(request.query["note"], "a b");
        assert_eq!(request.headers["host"], "x");
    }

    #[test]
    fn test_parse_incomplete_head() {
        let mut buffer = Buffer::new(MAX_REQUEST_SIZE);
        buffer.extend(b"GET / HTTP/1.1\r\nHost:");

        match try_parse(&mut buffer) {
            ParseOutcome::Incomplete => (),
            other => panic!("Unexpected outcome {:?}", other),
        }
        assert_eq!(buffer.len(), 21);
    }

    #[test]
    fn test_parse_body_split_across_feeds() {
        let mut buffer = Buffer::new(MAX_REQUEST_SIZE);
        buffer.extend(b"POST /click HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 15\r\n\r\n{\"x\":1,");

        match try_parse(&mut buffer) {
            ParseOutcome::Incomplete => (),
            other => panic!("Unexpected outcome {:?}", other),
        }

        buffer.extend(b"\"y\":250}");
        let request = match try_parse(&mut buffer) {
            ParseOutcome::Complete(request) => request,
            other => panic!("Unexpected outcome {:?}", other),
        };

        assert_eq!(request.json, Some(json!({"x": 1, "y": 250})));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_parse_body_length_in_bytes() {
        // Two-byte UTF-8 sequence inside the body; Content-Length counts bytes.
        let body = "{\"s\":\"é\"}";
        let raw = format!(
            "POST /x HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );

        let request = match feed(raw.as_bytes()) {
            ParseOutcome::Complete(request) => request,
            other => panic!("Unexpected outcome {:?}", other),
        };

        assert_eq!(request.json, Some(json!({"s": "é"})));
    }

    #[test]
    fn test_parse_malformed_json_post() {
        let outcome = feed(b"POST /click HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 1\r\n\r\n{");

        match outcome {
            ParseOutcome::BadRequest(message) => assert_eq!(message, "Invalid JSON in request body"),
            other => panic!("Unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_parse_two_pipelined_requests() {
        let mut buffer = Buffer::new(MAX_REQUEST_SIZE);
        buffer.extend(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n");

        match try_parse(&mut buffer) {
            ParseOutcome::Complete(request) => assert_eq!(request.path, "/a"),
            other => panic!("Unexpected outcome {:?}", other),
        }
        match try_parse(&mut buffer) {
            ParseOutcome::Complete(request) => assert_eq!(request.path, "/b"),
            other => panic!("Unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_param_precedence_and_stringify() {
        let mut buffer = Buffer::new(MAX_REQUEST_SIZE);
        let body = r#"{"ref":"Cha7","x":42,"double":true}"#;
        buffer.extend(
            format!(
                "POST /click_node?ref=Lab9 HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            )
            .as_bytes(),
        );

        let request = match try_parse(&mut buffer) {
            ParseOutcome::Complete(request) => request,
            other => panic!("Unexpected outcome {:?}", other),
        };

        // Query wins over body.
        assert_eq!(request.param("ref").as_deref(), Some("Lab9"));
        assert_eq!(request.param("x").as_deref(), Some("42"));
        assert_eq!(request.bool_param("double"), Some(true));
        assert_eq!(request.f64_param("x"), Some(42.0));
    }

    #[test]
    fn test_response_encode() {
        let response = Response::json(200, &json!({"ok": true}));
        let encoded = String::from_utf8(response.encode()).unwrap();

        assert!(encoded.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(encoded.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(encoded.contains("Connection: close\r\n"));
        assert!(encoded.contains("Content-Length: 11\r\n"));
        assert!(encoded.ends_with("{\"ok\":true}"));
    }
}
