//! Authentication material forwarded to the upstream platform.

use std::fmt;

/// Per-request upstream credentials.
///
/// Carries the caller's session cookie, if any. Never logged: `Debug` only
/// reports whether a cookie is present.
#[derive(Clone, Default)]
pub struct UpstreamAuth {
    cookie: Option<String>,
}

impl UpstreamAuth {
    /// No upstream credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Credentials from a raw `Cookie` header value. Blank values count as absent.
    pub fn from_cookie_header(value: Option<&str>) -> Self {
        let cookie = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Self { cookie }
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn has_cookie(&self) -> bool {
        self.cookie.is_some()
    }
}

impl fmt::Debug for UpstreamAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamAuth")
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
