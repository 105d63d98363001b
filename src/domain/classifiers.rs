use super::config::PollConfig;
use super::session::Classification;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Status vocabularies used by the booking platform's polling flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusProfile {
    /// PayOS payment links: `PAID`, `CANCELLED`, `EXPIRED`, ...
    Payment,
    /// Bank account and eKYC checks: `verified`, `failed`, `pending`.
    Verification,
}

impl StatusProfile {
    pub fn classify(self, status: &str) -> Classification {
        match self {
            StatusProfile::Payment => classify_payment(status),
            StatusProfile::Verification => classify_verification(status),
        }
    }

    pub fn config(self) -> PollConfig {
        match self {
            StatusProfile::Payment => PollConfig::payment(),
            StatusProfile::Verification => PollConfig::verification(),
        }
    }

    /// Builds a classifier reading the string at `field` of a JSON payload.
    ///
    /// A missing or non-string field counts as pending.
    pub fn classifier(
        self,
        field: String,
    ) -> impl Fn(&Value) -> Classification + Send + Sync + 'static {
        move |payload: &Value| match payload.get(field.as_str()).and_then(Value::as_str) {
            Some(status) => self.classify(status),
            None => {
                tracing::debug!(field = %field, "status field missing from payload");
                Classification::Pending
            }
        }
    }
}

impl fmt::Display for StatusProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusProfile::Payment => f.write_str("payment"),
            StatusProfile::Verification => f.write_str("verification"),
        }
    }
}

impl FromStr for StatusProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "payment" => Ok(StatusProfile::Payment),
            "verification" => Ok(StatusProfile::Verification),
            other => Err(format!(
                "unknown status profile '{other}' (expected payment or verification)"
            )),
        }
    }
}

pub fn classify_payment(status: &str) -> Classification {
    let status = status.trim();
    if status.eq_ignore_ascii_case("PAID") {
        Classification::Succeeded
    } else if status.eq_ignore_ascii_case("CANCELLED") || status.eq_ignore_ascii_case("EXPIRED") {
        Classification::Failed
    } else {
        Classification::Pending
    }
}

pub fn classify_verification(status: &str) -> Classification {
    let status = status.trim();
    if status.eq_ignore_ascii_case("verified") {
        Classification::Succeeded
    } else if status.eq_ignore_ascii_case("failed") {
        Classification::Failed
    } else {
        Classification::Pending
    }
}
