/// How loudly a failed request is reported. Client mistakes and lost
/// concurrency races stay at `Info`; refused credentials and permissions
/// are `Warn`; store and configuration failures are `Error`; anything the
/// gateway did not anticipate is `Critical`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    /// Whether the gateway, not the caller, is at fault.
    pub const fn is_server_fault(self) -> bool {
        matches!(self, Severity::Error | Severity::Critical)
    }
}
