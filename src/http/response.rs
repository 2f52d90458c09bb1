use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body_len: usize,
    pub body: Vec<u8>,
    /// Network round-trip only; rate-limiter waits are excluded.
    pub elapsed: Duration,
    pub final_url: String,
    /// e.g. `HTTP/1.1`
    pub protocol: String,
}

impl HttpResponse {
    pub fn from_parts(status: u16, body: Vec<u8>, elapsed: Duration) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body_len: body.len(),
            body,
            elapsed,
            final_url: String::new(),
            protocol: String::new(),
        }
    }

    /// Get body as UTF-8 string (lossy conversion)
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}
