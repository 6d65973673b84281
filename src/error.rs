use std::{error::Error as StdError, fmt, io};

use http::StatusCode;

/// Which configured ceiling a request ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Bytes of a single field value.
    Field,
    /// Cumulative bytes across every file part.
    File,
    /// Raw bytes of the whole request body.
    Total,
    /// Number of field (non-file) parts.
    FieldCount,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LimitKind::Field => f.write_str("field size"),
            LimitKind::File => f.write_str("file size"),
            LimitKind::Total => f.write_str("total size"),
            LimitKind::FieldCount => f.write_str("field count"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    /// The request carried no Content-Type header.
    ContentTypeMissing,
    NotMultipart,
    InvalidMimeType(mime::FromStrError),
    BoundaryMissing,
    InvalidBoundary(String),
    /// A part's header block was corrupt or lacked a usable Content-Disposition.
    MalformedHeader(String),
    LimitExceeded {
        kind: LimitKind,
        limit: u64,
        actual: u64,
    },
    /// The body ended before the terminal boundary.
    UnexpectedEndOfStream,
    /// Writing an upload to storage failed.
    SinkWrite(io::Error),
    InnerStream(String),
}

impl Error {
    pub(crate) fn malformed<S: Into<String>>(msg: S) -> Self {
        Error::MalformedHeader(msg.into())
    }

    pub(crate) fn inner<E: fmt::Display>(e: E) -> Self {
        Error::InnerStream(format!("{}", e))
    }

    pub(crate) fn limit(kind: LimitKind, limit: u64, actual: u64) -> Self {
        Error::LimitExceeded {
            kind,
            limit,
            actual,
        }
    }

    /// The HTTP status a server should answer with when parsing fails this way.
    pub fn status(&self) -> StatusCode {
        match *self {
            Error::LimitExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::SinkWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotMultipart | Error::ContentTypeMissing | Error::InvalidMimeType(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn limit_kind(&self) -> Option<LimitKind> {
        match *self {
            Error::LimitExceeded { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ContentTypeMissing => write!(f, "Content Type header missing from request"),
            Error::NotMultipart => write!(f, "Cannot handle a non multipart request as multipart."),
            Error::InvalidMimeType(ref e) => write!(f, "Content-Type value invalid: {}", e),
            Error::BoundaryMissing => write!(f, "mime param boundary missing"),
            Error::InvalidBoundary(ref msg) => write!(f, "Invalid boundary: {}", msg),
            Error::MalformedHeader(ref msg) => write!(f, "Malformed part header: {}", msg),
            Error::LimitExceeded {
                kind,
                limit,
                actual,
            } => write!(f, "{} limit of {} exceeded, got {}", kind, limit, actual),
            Error::UnexpectedEndOfStream => {
                write!(f, "Body ended before the terminal boundary was found")
            }
            Error::SinkWrite(ref e) => write!(f, "Failed to write upload: {}", e),
            Error::InnerStream(ref e) => write!(f, "InnerStream: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::InvalidMimeType(ref e) => Some(e),
            Error::SinkWrite(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(inner: io::Error) -> Self {
        Error::SinkWrite(inner)
    }
}

impl From<hyper::Error> for Error {
    fn from(inner: hyper::Error) -> Self {
        Error::InnerStream(format!("Hyper error: {}", inner))
    }
}
