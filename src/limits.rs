use crate::{
    error::LimitKind,
    options::{FieldSizePolicy, Options},
    Error,
};

/// Per-request byte and count bookkeeping.
#[derive(Debug)]
pub(crate) struct LimitEnforcer {
    max_field_bytes: u64,
    max_file_bytes: u64,
    max_total_bytes: Option<u64>,
    max_fields: Option<usize>,
    policy: FieldSizePolicy,

    field_bytes: u64,
    file_bytes: u64,
    total_bytes: u64,
    fields: usize,
}

impl LimitEnforcer {
    pub fn new(options: &Options) -> Self {
        Self {
            max_field_bytes: options.max_fields_size,
            max_file_bytes: options.max_files_size,
            max_total_bytes: options.max_total_size,
            max_fields: options.max_fields,
            policy: options.field_size_policy,
            field_bytes: 0,
            file_bytes: 0,
            total_bytes: 0,
            fields: 0,
        }
    }

    /// Accounts for `n` more bytes of the current field.
    ///
    /// Returns how many of them may be kept. Under `Truncate` this can be
    /// fewer than `n`; under `Reject` running over is an error.
    pub fn check_field_bytes(&mut self, n: usize) -> Result<usize, Error> {
        let actual = self.field_bytes.saturating_add(n as u64);

        if actual > self.max_field_bytes {
            match self.policy {
                FieldSizePolicy::Reject => {
                    log::debug!("Field of {} bytes over limit {}", actual, self.max_field_bytes);
                    return Err(Error::limit(LimitKind::Field, self.max_field_bytes, actual));
                }
                FieldSizePolicy::Truncate => {
                    let room = self.max_field_bytes.saturating_sub(self.field_bytes) as usize;
                    if room < n {
                        log::warn!("Truncating field value at {} bytes", self.max_field_bytes);
                    }
                    self.field_bytes = self.max_field_bytes;
                    return Ok(room.min(n));
                }
            }
        }

        self.field_bytes = actual;
        Ok(n)
    }

    /// Accounts for `n` more bytes of file data, across every file of the request.
    pub fn check_file_bytes(&mut self, n: usize) -> Result<(), Error> {
        let actual = self.file_bytes.saturating_add(n as u64);

        if actual > self.max_file_bytes {
            log::debug!("Files of {} bytes over limit {}", actual, self.max_file_bytes);
            return Err(Error::limit(LimitKind::File, self.max_file_bytes, actual));
        }

        self.file_bytes = actual;
        Ok(())
    }

    /// Accounts for `n` more raw bytes of the request body.
    pub fn check_total_bytes(&mut self, n: usize) -> Result<(), Error> {
        let actual = self.total_bytes.saturating_add(n as u64);
        self.total_bytes = actual;

        match self.max_total_bytes {
            Some(limit) if actual > limit => {
                log::debug!("Request of {} bytes over limit {}", actual, limit);
                Err(Error::limit(LimitKind::Total, limit, actual))
            }
            _ => Ok(()),
        }
    }

    /// Registers a new field part and resets the per-field counter.
    pub fn open_field(&mut self) -> Result<(), Error> {
        self.fields += 1;
        self.field_bytes = 0;

        match self.max_fields {
            Some(limit) if self.fields > limit => Err(Error::limit(
                LimitKind::FieldCount,
                limit as u64,
                self.fields as u64,
            )),
            _ => Ok(()),
        }
    }

    pub fn file_bytes(&self) -> u64 {
        self.file_bytes
    }
}
