#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    Auth,
    PolicyDeny,
    Request,
    Identifier,
    Precondition,
    Conflict,
    NotFound,
    Storage,
    Config,
    Unknown,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Auth => "Auth",
            ErrorKind::PolicyDeny => "PolicyDeny",
            ErrorKind::Request => "Request",
            ErrorKind::Identifier => "Identifier",
            ErrorKind::Precondition => "Precondition",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Storage => "Storage",
            ErrorKind::Config => "Config",
            ErrorKind::Unknown => "Unknown",
        }
    }
}
