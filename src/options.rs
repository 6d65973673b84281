use std::{env, path::PathBuf};

use encoding_rs::Encoding;

/// Default cap for a single field value (2 MiB).
pub const DEFAULT_MAX_FIELDS_SIZE: u64 = 2 * 1024 * 1024;

/// Default cap for all uploaded files combined.
pub const DEFAULT_MAX_FILES_SIZE: u64 = 100_000_000;

/// Default cap for one part's header block.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;

/// Default initial buffer capacity
pub const DEFAULT_BUFFER_CAP: usize = 35000;

/// What to do with a field value that outgrows `max_fields_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSizePolicy {
    /// Fail the whole request.
    Reject,
    /// Keep the first `max_fields_size` bytes and drop the rest.
    Truncate,
}

/// Looks up a WHATWG encoding label such as `utf-8`, `latin1` or
/// `windows-1252`.
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Options for parsing multipart/form-data.
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory uploaded files are written to. It should exist before parsing.
    pub upload_dir: PathBuf,
    /// The max number of bytes of one field value.
    pub max_fields_size: u64,
    /// The max number of bytes of all files together.
    pub max_files_size: u64,
    /// The max number of raw body bytes, if any.
    pub max_total_size: Option<u64>,
    /// The max number of field parts, if any.
    pub max_fields: Option<usize>,
    pub max_header_size: usize,
    pub field_size_policy: FieldSizePolicy,
    /// Charset used to decode field values. Invalid sequences become U+FFFD.
    pub encoding: &'static Encoding,
    /// Give stored files the extension of the original filename.
    pub keep_extensions: bool,
    pub buffer_capacity: usize,
}

impl Options {
    /// Create a default `Options` instance.
    #[inline]
    pub fn new() -> Options {
        Options {
            upload_dir: env::temp_dir(),
            max_fields_size: DEFAULT_MAX_FIELDS_SIZE,
            max_files_size: DEFAULT_MAX_FILES_SIZE,
            max_total_size: None,
            max_fields: None,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            field_size_policy: FieldSizePolicy::Reject,
            encoding: encoding_rs::UTF_8,
            keep_extensions: false,
            buffer_capacity: DEFAULT_BUFFER_CAP,
        }
    }

    /// Create an `Options` instance storing uploads below `upload_dir`.
    #[inline]
    pub fn with_upload_dir<P: Into<PathBuf>>(upload_dir: P) -> Options {
        Options {
            upload_dir: upload_dir.into(),
            ..Options::new()
        }
    }
}

impl Default for Options {
    #[inline]
    fn default() -> Self {
        Options::new()
    }
}
