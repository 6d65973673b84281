use std::{collections::VecDeque, path::PathBuf};

use crate::{
    header_map::validate_boundary,
    headers::PartHeaders,
    limits::LimitEnforcer,
    options::Options,
    part::{Entry, FileDescriptor, PartStream},
    scanner::{ByteScanner, Scan},
    sink::try_delete,
    Error,
};

/// Something the parser has to report, in input order.
#[derive(Debug)]
pub enum Event {
    Field { name: String, value: String },
    File { name: String, file: FileDescriptor },
    /// Terminal: parsing failed. Every file of the request, including those
    /// already reported, is deleted by then.
    Error(Error),
    /// Terminal: the closing boundary was read.
    Complete,
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Error(_) | Event::Complete)
    }
}

impl From<Entry> for Event {
    fn from(entry: Entry) -> Self {
        match entry {
            Entry::Field { name, value } => Event::Field { name, value },
            Entry::File { name, file } => Event::File { name, file },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingBoundary,
    ParsingHeaders,
    StreamingBody,
    Done,
    Errored,
}

/// Push parser for a multipart/form-data body.
///
/// Feed it chunks as they arrive and pull events with `next_event`. The
/// chunking of the input never changes the events produced. Exactly one
/// terminal event is emitted; after it every further call is a no-op.
///
/// Stored files belong to the caller once the body completes. If parsing
/// fails first, the parser deletes them.
pub struct Parser {
    options: Options,
    scanner: ByteScanner,
    limits: LimitEnforcer,
    state: State,
    part: Option<PartStream>,
    stored: Vec<PathBuf>,
    uploads: u64,
    events: VecDeque<Event>,
}

impl Parser {
    pub fn new<S: AsRef<str>>(boundary: S, options: Options) -> Result<Self, Error> {
        validate_boundary(boundary.as_ref())?;

        log::debug!("Creating Parser");

        Ok(Self {
            scanner: ByteScanner::with_capacity(boundary, options.buffer_capacity),
            limits: LimitEnforcer::new(&options),
            options,
            state: State::AwaitingBoundary,
            part: None,
            stored: Vec::new(),
            uploads: 0,
            events: VecDeque::new(),
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Whether the terminal event has been queued.
    pub fn is_terminated(&self) -> bool {
        self.state == State::Done || self.state == State::Errored
    }

    pub fn feed<T: AsRef<[u8]>>(&mut self, chunk: T) {
        if self.is_terminated() {
            log::trace!("Ignoring input after {:?}", self.state);
            return;
        }

        let chunk = chunk.as_ref();
        if let Err(e) = self.limits.check_total_bytes(chunk.len()) {
            return self.fail(e);
        }

        self.scanner.feed(chunk);
        if let Err(e) = self.advance() {
            self.fail(e);
        }
    }

    /// Signals the end of input. Anything but a completed body is an error.
    pub fn finish(&mut self) {
        if self.is_terminated() {
            return;
        }

        log::debug!(
            "Input ended in {:?} with {} bytes buffered",
            self.state,
            self.scanner.buffered()
        );
        self.fail(Error::UnexpectedEndOfStream);
    }

    /// Stops parsing because the input itself failed or was cancelled.
    pub fn abort(&mut self, cause: Error) {
        if self.is_terminated() {
            return;
        }
        self.fail(cause);
    }

    pub fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Drains the events queued so far.
    pub fn events(&mut self) -> impl Iterator<Item = Event> + '_ {
        std::iter::from_fn(move || self.next_event())
    }

    fn advance(&mut self) -> Result<(), Error> {
        loop {
            match self.state {
                State::AwaitingBoundary => match self.scanner.scan() {
                    Scan::NeedMore => return Ok(()),
                    Scan::Body(preamble) => {
                        log::trace!("Discarding {} bytes of preamble", preamble.len());
                    }
                    Scan::Boundary { terminal: true, .. } => {
                        self.complete();
                        return Ok(());
                    }
                    Scan::Boundary { .. } => self.state = State::ParsingHeaders,
                },

                State::ParsingHeaders => {
                    let max = self.options.max_header_size;
                    let block = match self.scanner.take_header_block(max)? {
                        Some(block) => block,
                        None => return Ok(()),
                    };

                    let headers = PartHeaders::parse(&block)?;
                    self.part = Some(PartStream::open(
                        headers,
                        &self.options,
                        &mut self.limits,
                        &mut self.uploads,
                    )?);
                    self.state = State::StreamingBody;
                }

                State::StreamingBody => match self.scanner.scan() {
                    Scan::NeedMore => return Ok(()),
                    Scan::Body(bytes) => self.write_part(&bytes)?,
                    Scan::Boundary { body, terminal } => {
                        self.write_part(&body)?;
                        self.close_part()?;

                        if terminal {
                            self.complete();
                            return Ok(());
                        }
                        self.state = State::ParsingHeaders;
                    }
                },

                State::Done | State::Errored => return Ok(()),
            }
        }
    }

    fn write_part(&mut self, bytes: &[u8]) -> Result<(), Error> {
        match self.part {
            Some(ref mut part) => part.write(bytes, &mut self.limits),
            None => Ok(()),
        }
    }

    fn close_part(&mut self) -> Result<(), Error> {
        if let Some(part) = self.part.take() {
            log::trace!("Closing part {:?}", part.name());
            let entry = part.close(&self.options)?;
            if let Entry::File { ref file, .. } = entry {
                self.stored.push(file.path.clone());
            }
            self.events.push_back(entry.into());
        }
        Ok(())
    }

    fn complete(&mut self) {
        log::debug!(
            "Multipart body complete, {} bytes of files stored",
            self.limits.file_bytes()
        );
        self.stored.clear();
        self.state = State::Done;
        self.events.push_back(Event::Complete);
    }

    fn fail(&mut self, err: Error) {
        log::debug!("Multipart parsing failed: {}", err);

        if let Some(part) = self.part.take() {
            part.abort();
        }
        for path in self.stored.drain(..) {
            log::debug!("Deleting stored upload {}", path.display());
            try_delete(&path);
        }
        self.state = State::Errored;
        self.events.push_back(Event::Error(err));
    }
}
