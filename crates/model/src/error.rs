use std::fmt::{self, Display};

/// The classification of an inference failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The response could not be understood.
    MalformedResponse,
    /// The request was cancelled before the response completed.
    Cancelled,
    /// Any other errors, including transport failures.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Moderated => "moderated",
            ErrorKind::RateLimitExceeded => "rate limit exceeded",
            ErrorKind::MalformedResponse => "malformed response",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}
