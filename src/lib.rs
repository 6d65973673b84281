//! Streaming multipart/form-data parsing.
//!
//! Bodies are parsed chunk by chunk: field values are collected in memory,
//! file uploads are written straight to disk, and size limits are checked as
//! the bytes arrive.

mod error;
pub use error::{Error, LimitKind};

mod multipart;
pub use multipart::{Multipart, MultipartRequest};

mod part;
pub use part::{Entry, FileDescriptor};

pub mod parser;
pub use parser::{Event, Parser};

mod header_map;
pub use header_map::{boundary, HeaderMap, MAX_BOUNDARY_LEN};

mod headers;
pub use headers::PartHeaders;

mod options;
pub use options::{
    encoding_for_label, FieldSizePolicy, Options, DEFAULT_BUFFER_CAP, DEFAULT_MAX_FIELDS_SIZE,
    DEFAULT_MAX_FILES_SIZE, DEFAULT_MAX_HEADER_SIZE,
};

mod form;
pub use form::{Form, ResultMap, Value};

mod limits;
mod scanner;
mod sink;

use futures::Stream;

pub fn from_headers<S, I, E>(
    headers: impl HeaderMap,
    s: S,
    options: Options,
) -> Result<Multipart<S>, Error>
where
    S: Stream<Item = Result<I, E>> + Unpin,
    I: AsRef<[u8]>,
    E: std::fmt::Display,
{
    Multipart::from_headers(&headers, s, options)
}
