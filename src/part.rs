use std::path::{Path, PathBuf};

use bytes::BytesMut;

use crate::{
    headers::PartHeaders, limits::LimitEnforcer, options::Options, sink::FileSink, Error,
};

/// Metadata of an upload that was written to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDescriptor {
    pub field_name: String,
    pub original_filename: String,
    pub content_type: Option<String>,
    pub size: u64,
    pub path: PathBuf,
}

impl FileDescriptor {
    /// Extension of the original filename, if it has one.
    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.original_filename)
    }
}

/// A part that has been fully read.
#[derive(Debug)]
pub enum Entry {
    /// A plain form field, decoded with the configured encoding.
    Field { name: String, value: String },
    File { name: String, file: FileDescriptor },
}

enum Body {
    Field(BytesMut),
    File(FileSink),
}

/// The part currently being read, routing its body to memory or disk.
pub(crate) struct PartStream {
    headers: PartHeaders,
    body: Body,
}

impl PartStream {
    /// Classifies the part and, for files, opens the storage sink right away.
    ///
    /// `uploads` numbers the files stored by one parser.
    pub fn open(
        headers: PartHeaders,
        options: &Options,
        limits: &mut LimitEnforcer,
        uploads: &mut u64,
    ) -> Result<Self, Error> {
        let body = if headers.is_file() {
            let ext = if options.keep_extensions {
                headers.filename.as_deref().and_then(extension_of)
            } else {
                None
            };
            Body::File(FileSink::create(&options.upload_dir, ext, uploads)?)
        } else {
            limits.open_field()?;
            Body::Field(BytesMut::new())
        };

        log::debug!(
            "Opened {} part {:?}",
            if headers.is_file() { "file" } else { "field" },
            headers.name
        );

        Ok(PartStream { headers, body })
    }

    pub fn name(&self) -> &str {
        &self.headers.name
    }

    pub fn write(&mut self, bytes: &[u8], limits: &mut LimitEnforcer) -> Result<(), Error> {
        if bytes.is_empty() {
            return Ok(());
        }

        match self.body {
            Body::Field(ref mut acc) => {
                let keep = limits.check_field_bytes(bytes.len())?;
                acc.extend_from_slice(&bytes[..keep]);
            }
            Body::File(ref mut sink) => {
                limits.check_file_bytes(bytes.len())?;
                sink.write(bytes)?;
            }
        }

        Ok(())
    }

    pub fn close(self, options: &Options) -> Result<Entry, Error> {
        let PartStream { headers, body } = self;

        match body {
            Body::Field(acc) => {
                let (value, _, malformed) = options.encoding.decode(&acc);
                if malformed {
                    log::debug!(
                        "Field {:?} is not valid {}",
                        headers.name,
                        options.encoding.name()
                    );
                }

                Ok(Entry::Field {
                    value: value.into_owned(),
                    name: headers.name,
                })
            }
            Body::File(sink) => {
                let (path, size) = sink.finish()?;
                log::debug!(
                    "Stored {} bytes of {:?} at {}",
                    size,
                    headers.name,
                    path.display()
                );

                Ok(Entry::File {
                    file: FileDescriptor {
                        field_name: headers.name.clone(),
                        original_filename: headers.filename.unwrap_or_default(),
                        content_type: headers.content_type,
                        size,
                        path,
                    },
                    name: headers.name,
                })
            }
        }
    }

    /// Drops the part, deleting any partial file.
    pub fn abort(self) {
        if let Body::File(sink) = self.body {
            log::debug!(
                "Aborting upload {:?} after {} bytes",
                self.headers.name,
                sink.written()
            );
            sink.abort();
        }
    }

    #[cfg(test)]
    pub fn sink_path(&self) -> Option<&Path> {
        match self.body {
            Body::File(ref sink) => Some(sink.path()),
            Body::Field(_) => None,
        }
    }
}

fn extension_of(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
}
