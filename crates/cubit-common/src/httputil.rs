// httputil.rs — minimal HTTP header-block parsing
//
// Two consumers: the WebSocket upgrade sniff (request headers) and the
// heartbeat exchange (response status + body). Neither needs a real HTTP
// client; both peers speak plain HTTP/1.1 over a single buffer.

pub struct HttpHeaders {
    entries: Vec<(String, String)>,
}

impl HttpHeaders {
    /// Parse `Key: Value` lines out of a header block. The request line
    /// (or status line) and anything after the blank line are ignored.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();

        for line in text.lines() {
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                entries.push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        Self { entries }
    }

    /// Case-insensitive lookup of the first header with the given name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct HttpResponse {
    pub code: u32,
    pub headers: HttpHeaders,
    pub body: String,
}

impl HttpResponse {
    /// Parse a raw HTTP/1.x response. Returns None when the status line is
    /// not recognisable.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.splitn(2, "\r\n\r\n");
        let head = parts.next()?;
        let body = parts.next().unwrap_or("").to_string();

        let status_line = head.lines().next()?;
        if !status_line.starts_with("HTTP/") {
            return None;
        }
        let code = status_line.split_whitespace().nth(1)?.parse().ok()?;

        let header_block = head.split_once("\r\n").map(|(_, rest)| rest).unwrap_or("");

        Some(Self {
            code,
            headers: HttpHeaders::parse(header_block),
            body,
        })
    }
}
