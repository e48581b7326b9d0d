//! HTTP headers abstraction for [`HttpRequest`](crate::http::request::HttpRequest) and
//! response assembly in [`response_operation`](crate::response_operation).
//!
//! Headers are stored as an ordered list of `(name, value)` pairs rather than
//! a map: the wire format allows the same header name to appear more than
//! once (`Range`-adjacent cases aside, this matters for things like repeated
//! `Accept-Encoding` tokens sent as separate header lines), and callers are
//! entitled to see them back in the order and multiplicity they arrived in.
//! Lookups are case-insensitive, per RFC 7230 ž3.2.
//!
//! This abstraction does not enforce any HTTP semantics or constraints.
//! Higher-level types apply their own rules by wrapping or constraining
//! access to this structure. Semantic validation lives in
//! [`validator`](crate::http::validator).

pub struct HttpHeaders {
    headers: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Appends a header, preserving any prior occurrence of the same name.
    pub fn append_raw(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Sets a header, overwriting any prior occurrence of the same name.
    /// Used for response headers, which the server controls and never
    /// intends to duplicate.
    pub fn set_raw(&mut self, name: &str, value: &str) {
        if let Some(entry) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            entry.1 = value.to_string();
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    /// Returns the first value stored under `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn stringify(&self) -> String {
        let mut result = String::new();
        for (name, value) in &self.headers {
            result.push_str(name);
            result.push_str(": ");
            result.push_str(value);
            result.push_str("\r\n");
        }
        result
    }
}

impl Default for HttpHeaders {
    fn default() -> Self {
        Self::new()
    }
}
