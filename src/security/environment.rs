//! Execution-context classification.
//!
//! Each signal is scored independently: positive weights push towards "production",
//! negative towards "development". The sum is clamped into `[0, 1]` and reported as the
//! production likelihood, so a missing or spoofed signal shifts the score instead of
//! deciding the outcome on its own.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

use crate::core::config::ProductionConfig;
use crate::host::HostPage;

/// Variables carrying an explicit environment name, in precedence order.
pub const ENV_FLAGS: &[&str] = &["HEADLESS_WALLET_ENV", "APP_ENV", "NODE_ENV"];

/// Variables set by common CI runners and browser-test harnesses.
pub const CI_MARKERS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "CIRCLECI",
    "JENKINS_URL",
    "TRAVIS",
    "TF_BUILD",
    "PLAYWRIGHT_TEST_BASE_URL",
    "CYPRESS",
];

const WEIGHT_ENV_PRODUCTION: f64 = 0.45;
const WEIGHT_ENV_DEVELOPMENT: f64 = -0.3;
const WEIGHT_HOST_PRODUCTION: f64 = 0.35;
const WEIGHT_HOST_DEVELOPMENT: f64 = -0.3;
const WEIGHT_SECURE_PROTOCOL: f64 = 0.1;
const WEIGHT_INSECURE_PROTOCOL: f64 = -0.1;
const WEIGHT_CI: f64 = -0.2;

static DEV_HOST_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^localhost$",
        r"^127(\.\d{1,3}){3}$",
        r"^0\.0\.0\.0$",
        r"^\[?::1\]?$",
        r"^10(\.\d{1,3}){3}$",
        r"^192\.168(\.\d{1,3}){2}$",
        r"^172\.(1[6-9]|2\d|3[01])(\.\d{1,3}){2}$",
        r"\.(local|localhost|test|internal|example|invalid)$",
        r"^(dev|development|staging|stage|preview|local|qa|uat)[.-]",
        r"\.(ngrok\.io|ngrok-free\.app|ngrok\.app|loca\.lt|trycloudflare\.com)$",
        r"-git-[a-z0-9-]+\.vercel\.app$",
        r"^deploy-preview-\d+--",
        r"\.gitpod\.io$",
        r"\.app\.github\.dev$",
        r"\.csb\.app$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalKind {
    EnvironmentFlag,
    Hostname,
    Protocol,
    CiMarker,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub weight: f64,
    pub detail: String,
}

impl Signal {
    pub fn is_production(&self) -> bool {
        self.weight > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentCheck {
    /// `true` when the production likelihood stays under the confirm threshold.
    pub is_valid: bool,
    /// Production likelihood in `[0, 1]`.
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub signals: Vec<Signal>,
}

impl EnvironmentCheck {
    pub fn has_production_signal(&self) -> bool {
        self.signals.iter().any(Signal::is_production)
    }
}

/// Snapshot of the inputs the classifier looks at.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub hostname: String,
    pub protocol: String,
    pub env: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn from_host(page: &HostPage) -> Self {
        let location = page.location();
        Self { hostname: location.hostname, protocol: location.protocol, env: page.env_markers() }
    }
}

pub struct EnvironmentClassifier {
    allowed_hosts: Vec<String>,
    production_hosts: Vec<String>,
    confirm_threshold: f64,
}

impl EnvironmentClassifier {
    pub fn new(config: &ProductionConfig) -> Self {
        Self {
            allowed_hosts: lowercase(&config.allowed_hosts),
            production_hosts: lowercase(&config.production_hosts),
            confirm_threshold: config.confirm_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn confirm_threshold(&self) -> f64 {
        self.confirm_threshold
    }

    pub fn classify(&self, ctx: &ExecutionContext) -> EnvironmentCheck {
        let mut signals = Vec::new();
        let host = ctx.hostname.to_ascii_lowercase();
        let dev_host = self.is_development_host(&host);

        if let Some((name, value)) = ENV_FLAGS
            .iter()
            .find_map(|name| ctx.env.get(*name).map(|value| (*name, value.to_ascii_lowercase())))
        {
            match value.as_str() {
                "production" | "prod" => signals.push(Signal {
                    kind: SignalKind::EnvironmentFlag,
                    weight: WEIGHT_ENV_PRODUCTION,
                    detail: format!("{}={} declares a production build", name, value),
                }),
                "development" | "dev" | "test" | "testing" | "local" => signals.push(Signal {
                    kind: SignalKind::EnvironmentFlag,
                    weight: WEIGHT_ENV_DEVELOPMENT,
                    detail: format!("{}={} declares a development build", name, value),
                }),
                _ => {}
            }
        }

        if dev_host {
            signals.push(Signal {
                kind: SignalKind::Hostname,
                weight: WEIGHT_HOST_DEVELOPMENT,
                detail: format!("host '{}' matches a development pattern", display_host(&host)),
            });
        } else if self.is_production_host(&host) {
            signals.push(Signal {
                kind: SignalKind::Hostname,
                weight: WEIGHT_HOST_PRODUCTION,
                detail: format!("host '{}' looks like a production deployment", host),
            });
        }

        match ctx.protocol.as_str() {
            "https:" if !dev_host => signals.push(Signal {
                kind: SignalKind::Protocol,
                weight: WEIGHT_SECURE_PROTOCOL,
                detail: "served over https from a public host".into(),
            }),
            "http:" | "file:" => signals.push(Signal {
                kind: SignalKind::Protocol,
                weight: WEIGHT_INSECURE_PROTOCOL,
                detail: format!("served over {}", ctx.protocol),
            }),
            _ => {}
        }

        let ci: Vec<&str> = CI_MARKERS
            .iter()
            .copied()
            .filter(|marker| ctx.env.get(*marker).map(|v| !v.is_empty() && v != "false").unwrap_or(false))
            .collect();
        if !ci.is_empty() {
            signals.push(Signal {
                kind: SignalKind::CiMarker,
                weight: WEIGHT_CI,
                detail: format!("CI markers present: {}", ci.join(", ")),
            });
        }

        let confidence = signals.iter().map(|s| s.weight).sum::<f64>().clamp(0.0, 1.0);
        let reasons = signals.iter().map(|s| s.detail.clone()).collect();
        EnvironmentCheck { is_valid: confidence < self.confirm_threshold, confidence, reasons, signals }
    }

    fn is_development_host(&self, host: &str) -> bool {
        if host.is_empty() {
            return true;
        }
        if self.allowed_hosts.iter().any(|pattern| host_matches(pattern, host)) {
            return true;
        }
        DEV_HOST_PATTERNS.iter().any(|re| re.is_match(host))
    }

    fn is_production_host(&self, host: &str) -> bool {
        if self.production_hosts.is_empty() {
            // Any public-looking name (contains a dot and is not an IP literal).
            return host.contains('.') && !host.chars().all(|c| c.is_ascii_digit() || c == '.');
        }
        self.production_hosts.iter().any(|pattern| host_matches(pattern, host))
    }
}

/// Exact match, or `*.suffix` matching the suffix and any subdomain of it.
fn host_matches(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => host == suffix || host.ends_with(&format!(".{}", suffix)),
        None => host == pattern,
    }
}

fn lowercase(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.trim().to_ascii_lowercase()).collect()
}

fn display_host(host: &str) -> &str {
    if host.is_empty() {
        "<none>"
    } else {
        host
    }
}
