use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extraction::SignatureRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    /// The proxy came up, traffic went through and extraction ran
    Success,
    /// The proxy under test misbehaved (build, health or all traffic failed)
    Failed,
    /// The pipeline itself could not complete the trial
    Error,
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrialStatus::Success => "success",
            TrialStatus::Failed => "failed",
            TrialStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Outcome of one (proxy, version) trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub proxy_id: String,
    pub version: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    pub status: TrialStatus,
    #[serde(default)]
    pub ja4_signatures: Vec<SignatureRecord>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl TestResult {
    pub fn new(proxy_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            proxy_id: proxy_id.into(),
            version: version.into(),
            timestamp: Utc::now(),
            status: TrialStatus::Success,
            ja4_signatures: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TrialStatus::Success
    }
}

/// Accepts RFC 3339 text or seconds since the Unix epoch (integer or fractional)
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(DateTime<Utc>),
        Epoch(f64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Text(ts) => Ok(ts),
            Raw::Epoch(secs) => from_epoch(secs)
                .ok_or_else(|| D::Error::custom(format!("epoch timestamp out of range: {secs}"))),
        }
    }

    fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
        if !secs.is_finite() {
            return None;
        }
        let whole = secs.floor();
        let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
        DateTime::from_timestamp(whole as i64, nanos)
    }
}
