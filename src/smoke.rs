//! HTTP smoke probes run against a deployed target.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// One probe: request `path` relative to the target base URL and compare
/// the response against `expect` and `contains`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    #[serde(default)]
    pub method: Method,
    pub path: String,
    #[serde(default = "default_expect")]
    pub expect: Vec<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
}

fn default_expect() -> Vec<u16> {
    vec![200]
}

impl Check {
    fn new(name: &str, method: Method, path: &str, expect: u16) -> Self {
        Self {
            name: name.to_string(),
            method,
            path: path.to_string(),
            expect: vec![expect],
            contains: None,
            json: None,
        }
    }
}

/// Health probe plus the unauthenticated-access probes for the protected API.
pub fn default_checks() -> Vec<Check> {
    let mut health = Check::new("health", Method::Get, "/api/health.php", 200);
    health.contains = Some("healthy".to_string());

    let mut role_change = Check::new("users-role-change", Method::Patch, "/api/users.php", 401);
    role_change.json = Some(serde_json::json!({ "userId": 1, "newRole": "Admin" }));

    vec![
        health,
        Check::new("time-entries", Method::Get, "/api/time-entries.php", 401),
        Check::new("users", Method::Get, "/api/users.php", 401),
        Check::new("approvals", Method::Get, "/api/approvals.php", 401),
        Check::new("history", Method::Get, "/api/history.php", 401),
        role_change,
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    Pass { status: u16 },
    Fail { status: u16, reason: String },
    Error { message: String },
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub method: Method,
    pub url: String,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmokeReport {
    pub timestamp: DateTime<Local>,
    pub base_url: String,
    pub summary: Summary,
    pub results: Vec<CheckResult>,
}

impl SmokeReport {
    pub fn is_success(&self) -> bool {
        self.summary.failed == 0
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize smoke report")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}

pub fn build_client(timeout: Duration, insecure: bool) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure)
        .user_agent(concat!("azedeploy/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

pub fn check_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub fn run_checks(client: &Client, base_url: &str, checks: &[Check]) -> SmokeReport {
    let results: Vec<CheckResult> = checks.iter().map(|c| run_check(client, base_url, c)).collect();
    let passed = results.iter().filter(|r| r.outcome.is_pass()).count();
    SmokeReport {
        timestamp: Local::now(),
        base_url: base_url.to_string(),
        summary: Summary {
            total: results.len(),
            passed,
            failed: results.len() - passed,
        },
        results,
    }
}

fn run_check(client: &Client, base_url: &str, check: &Check) -> CheckResult {
    let url = check_url(base_url, &check.path);
    debug!("{} {}", check.method.as_str(), url);

    let started = Instant::now();
    let mut request = client.request(check.method.as_reqwest(), &url);
    if let Some(body) = &check.json {
        request = request.json(body);
    }
    let outcome = match request.send() {
        Ok(resp) => {
            let status = resp.status().as_u16();
            match resp.text() {
                Ok(body) => evaluate(check, status, &body),
                Err(e) => Outcome::Error {
                    message: format!("failed to read body: {e}"),
                },
            }
        }
        Err(e) => Outcome::Error {
            message: e.to_string(),
        },
    };

    CheckResult {
        name: check.name.clone(),
        method: check.method,
        url,
        elapsed_ms: started.elapsed().as_millis() as u64,
        outcome,
    }
}

fn evaluate(check: &Check, status: u16, body: &str) -> Outcome {
    if !check.expect.contains(&status) {
        let expected: Vec<String> = check.expect.iter().map(u16::to_string).collect();
        return Outcome::Fail {
            status,
            reason: format!("expected {}, got {status}", expected.join("/")),
        };
    }
    if let Some(needle) = &check.contains
        && !body.contains(needle.as_str())
    {
        return Outcome::Fail {
            status,
            reason: format!("body does not contain {needle:?}"),
        };
    }
    Outcome::Pass { status }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0_u8; 4096];
        loop {
            let n = stream.read(&mut buf).expect("read failed");
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= head_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    /// Serves `count` requests; `/api/health.php` is healthy, everything
    /// else answers 401 except PATCH which leaks a 200.
    fn spawn_server(count: usize) -> (String, mpsc::Receiver<String>, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
        let addr = listener.local_addr().expect("no local addr");
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            for _ in 0..count {
                let (mut stream, _) = listener.accept().expect("accept failed");
                let req = read_request(&mut stream);
                let (status, body) = if req.starts_with("GET /api/health.php") {
                    ("200 OK", r#"{"status":"healthy"}"#)
                } else if req.starts_with("PATCH ") {
                    ("200 OK", r#"{"ok":true}"#)
                } else {
                    ("401 Unauthorized", r#"{"error":"unauthorized"}"#)
                };
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).expect("write failed");
                tx.send(req).expect("send failed");
            }
        });
        (format!("http://{addr}"), rx, handle)
    }

    #[test]
    fn default_checks_cover_health_and_protected_endpoints() {
        let checks = default_checks();
        assert_eq!(checks.len(), 6);
        assert_eq!(checks[0].name, "health");
        assert_eq!(checks[0].contains.as_deref(), Some("healthy"));
        assert!(checks[1..].iter().all(|c| c.expect == vec![401]));
        assert_eq!(checks[5].method, Method::Patch);
    }

    #[test]
    fn method_names_match_the_wire_verbs() {
        for m in [
            Method::Get,
            Method::Head,
            Method::Post,
            Method::Patch,
            Method::Put,
            Method::Delete,
        ] {
            assert_eq!(m.as_str(), m.as_reqwest().as_str());
        }
        assert_eq!(Method::default().as_str(), "GET");
    }

    #[test]
    fn runs_checks_against_live_server() {
        let checks = default_checks();
        let (base, rx, server) = spawn_server(checks.len());
        let client = build_client(Duration::from_secs(5), false).unwrap();

        let report = run_checks(&client, &format!("{base}/"), &checks);
        server.join().expect("server thread failed");

        assert_eq!(report.summary.total, 6);
        assert_eq!(report.summary.passed, 5);
        assert!(!report.is_success());
        let patch = &report.results[5];
        assert_eq!(
            patch.outcome,
            Outcome::Fail {
                status: 200,
                reason: "expected 401, got 200".into()
            }
        );
        assert!(patch.url.ends_with("/api/users.php"));

        let requests: Vec<String> = rx.try_iter().collect();
        let patch_req = requests
            .iter()
            .find(|r| r.starts_with("PATCH "))
            .expect("PATCH request missing");
        assert!(patch_req.contains(r#""newRole":"Admin""#));
    }

    #[test]
    fn unreachable_host_is_an_error_outcome() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = build_client(Duration::from_secs(2), false).unwrap();
        let report = run_checks(&client, &format!("http://{addr}"), &default_checks()[..1]);
        assert!(matches!(report.results[0].outcome, Outcome::Error { .. }));
        assert_eq!(report.summary.failed, 1);
    }

    #[test]
    fn body_must_contain_marker() {
        let check = &default_checks()[0];
        assert!(evaluate(check, 200, "all healthy").is_pass());
        assert!(matches!(
            evaluate(check, 200, "degraded"),
            Outcome::Fail { status: 200, .. }
        ));
        assert!(matches!(
            evaluate(check, 500, "healthy"),
            Outcome::Fail { status: 500, .. }
        ));
    }

    #[test]
    fn report_serializes_summary_and_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let report = SmokeReport {
            timestamp: Local::now(),
            base_url: "https://example.net".into(),
            summary: Summary {
                total: 1,
                passed: 1,
                failed: 0,
            },
            results: vec![CheckResult {
                name: "health".into(),
                method: Method::Get,
                url: "https://example.net/api/health.php".into(),
                elapsed_ms: 12,
                outcome: Outcome::Pass { status: 200 },
            }],
        };
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["passed"], 1);
        assert_eq!(value["results"][0]["outcome"], "pass");
        assert_eq!(value["results"][0]["method"], "GET");
    }

    #[test]
    fn checks_parse_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            checks: Vec<Check>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
[[checks]]
name = "login"
method = "POST"
path = "api/login.php"
expect = [400, 401]
json = { username = "nobody" }
"#,
        )
        .unwrap();
        let check = &parsed.checks[0];
        assert_eq!(check.method, Method::Post);
        assert_eq!(check.expect, vec![400, 401]);
        assert_eq!(check.json.as_ref().unwrap()["username"], "nobody");
        assert_eq!(check_url("https://x.net/app/", &check.path), "https://x.net/app/api/login.php");
    }
}
