use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Disk destination of one file part.
///
/// The file is deleted again unless `finish` is called, so a sink dropped
/// mid-upload leaves nothing behind.
#[derive(Debug)]
pub(crate) struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl FileSink {
    /// Creates a fresh file below `dir`. `seq` is the owner's upload counter
    /// and is bumped for every name tried.
    pub fn create(dir: &Path, extension: Option<&str>, seq: &mut u64) -> io::Result<Self> {
        for _ in 0..32 {
            let ts_nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();
            *seq += 1;

            let mut name = format!("upload_{}_{}_{}", std::process::id(), ts_nanos, seq);
            if let Some(ext) = extension {
                name.push('.');
                name.push_str(ext);
            }
            let candidate = dir.join(name);

            match OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&candidate)
            {
                Ok(file) => {
                    log::debug!("Opened upload sink {}", candidate.display());
                    return Ok(Self {
                        path: candidate,
                        writer: Some(BufWriter::new(file)),
                        written: 0,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "failed to allocate unique upload file",
        ))
    }

    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "upload sink is closed"))?;

        writer.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and closes the file, keeping it on disk.
    pub fn finish(mut self) -> io::Result<(PathBuf, u64)> {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.into_inner().map_err(|e| e.into_error()) {
                try_delete(&self.path);
                return Err(err);
            }
        }

        let path = std::mem::take(&mut self.path);
        Ok((path, self.written))
    }

    /// Closes and deletes the partial file.
    pub fn abort(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        // Drop the handle before unlinking.
        self.writer = None;
        if !self.path.as_os_str().is_empty() {
            log::debug!("Deleting partial upload {}", self.path.display());
            try_delete(&self.path);
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            self.discard();
        }
    }
}

#[inline]
pub(crate) fn try_delete<P: AsRef<Path>>(path: P) {
    match fs::remove_file(path.as_ref()) {
        Ok(()) => (),
        Err(err) if err.kind() == io::ErrorKind::NotFound => (),
        Err(err) => log::warn!("Failed to delete {}: {}", path.as_ref().display(), err),
    }
}
