use std::fmt;

/// What kind of failure a notice reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Session provider misconfigured or credentials rejected.
    SessionConfiguration,
    /// Remote store refused access or could not be reached.
    RemoteAccess,
    /// A backup file could not be imported.
    InvalidImport,
}

/// The single user-visible message slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
