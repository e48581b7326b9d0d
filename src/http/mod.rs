pub mod headers;
pub mod mime;
pub mod parser;
pub mod range;
pub mod request;
pub mod status;
pub mod validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Options,
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
    Patch,
    Unknown,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Unknown => "UNKNOWN",
        }
    }
}

pub fn http_method_from_str(method: &str) -> HttpMethod {
    match method {
        "OPTIONS" => HttpMethod::Options,
        "GET" => HttpMethod::Get,
        "HEAD" => HttpMethod::Head,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        "TRACE" => HttpMethod::Trace,
        "CONNECT" => HttpMethod::Connect,
        "PATCH" => HttpMethod::Patch,
        _ => HttpMethod::Unknown,
    }
}

/// HTTP/1.x version, as `(major, minor)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HttpVersion(pub u8, pub u8);

impl HttpVersion {
    pub const V1_0: HttpVersion = HttpVersion(1, 0);
    pub const V1_1: HttpVersion = HttpVersion(1, 1);

    /// Accepts only the versions this server understands how to speak.
    pub fn is_valid(v: (u8, u8)) -> Result<HttpVersion, ()> {
        match v {
            (1, 0) => Ok(HttpVersion::V1_0),
            (1, 1) => Ok(HttpVersion::V1_1),
            _ => Err(()),
        }
    }

    pub fn supports_keep_alive_by_default(self) -> bool {
        self >= HttpVersion::V1_1
    }
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP/{}.{}", self.0, self.1)
    }
}

impl<'de> serde::Deserialize<'de> for HttpVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let (maj, min) = s
            .strip_prefix("HTTP/")
            .unwrap_or(&s)
            .split_once('.')
            .ok_or_else(|| serde::de::Error::custom("expected MAJOR.MINOR"))?;
        let maj: u8 = maj.parse().map_err(serde::de::Error::custom)?;
        let min: u8 = min.parse().map_err(serde::de::Error::custom)?;
        HttpVersion::is_valid((maj, min))
            .map_err(|_| serde::de::Error::custom("unsupported HTTP version"))
    }
}
