use std::fmt;

/// Steps of a single (proxy, version) trial, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrialPhase {
    Building,
    Starting,
    HealthChecking,
    Capturing,
    ServingTraffic,
    Extracting,
    Stopping,
}

impl TrialPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialPhase::Building => "building",
            TrialPhase::Starting => "starting",
            TrialPhase::HealthChecking => "health-checking",
            TrialPhase::Capturing => "capturing",
            TrialPhase::ServingTraffic => "serving-traffic",
            TrialPhase::Extracting => "extracting",
            TrialPhase::Stopping => "stopping",
        }
    }

    /// Prefix `reason` with the phase name, the format used in trial error lists
    pub fn annotate(&self, reason: impl fmt::Display) -> String {
        format!("{}: {reason}", self.as_str())
    }
}

impl fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
