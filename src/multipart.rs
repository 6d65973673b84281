use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;

use crate::{
    header_map,
    options::Options,
    parser::{Event, Parser},
    part::Entry,
    Error,
};

/// Turns a request with a multipart body into a stream of entries.
pub trait MultipartRequest<B>
where
    Self: Sized,
{
    fn into_multipart_with_options(self, options: Options) -> Result<Multipart<B>, Error>;

    fn into_multipart(self) -> Result<Multipart<B>, Error> {
        self.into_multipart_with_options(Options::default())
    }
}

impl<B, I, E> MultipartRequest<B> for http::Request<B>
where
    B: Stream<Item = Result<I, E>> + Unpin,
    I: AsRef<[u8]>,
    E: fmt::Display,
{
    fn into_multipart_with_options(self, options: Options) -> Result<Multipart<B>, Error> {
        let (parts, body) = self.into_parts();
        Multipart::from_headers(&parts.headers, body, options)
    }
}

/// Async adapter driving a [`Parser`] from a stream of body chunks.
///
/// Yields every field and file in order, then ends. A failure is yielded once
/// as `Err` and ends the stream. Every upload of the request, including files
/// already yielded, is deleted by then.
pub struct Multipart<S> {
    inner: S,
    parser: Parser,
    finished: bool,
}

impl<S, I, E> Multipart<S>
where
    S: Stream<Item = Result<I, E>> + Unpin,
    I: AsRef<[u8]>,
    E: fmt::Display,
{
    pub fn new<B: AsRef<str>>(inner: S, boundary: B, options: Options) -> Result<Self, Error> {
        Ok(Self {
            inner,
            parser: Parser::new(boundary, options)?,
            finished: false,
        })
    }

    /// Reads the boundary from the Content-Type in `headers`.
    pub fn from_headers(
        headers: &impl header_map::HeaderMap,
        inner: S,
        options: Options,
    ) -> Result<Self, Error> {
        let boundary = header_map::boundary(headers)?;
        Self::new(inner, boundary, options)
    }
}

impl<S> Multipart<S> {
    pub fn parser(&self) -> &Parser {
        &self.parser
    }
}

impl<S, I, E> Stream for Multipart<S>
where
    S: Stream<Item = Result<I, E>> + Unpin,
    I: AsRef<[u8]>,
    E: fmt::Display,
{
    type Item = Result<Entry, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match this.parser.next_event() {
                Some(Event::Field { name, value }) => {
                    return Poll::Ready(Some(Ok(Entry::Field { name, value })))
                }
                Some(Event::File { name, file }) => {
                    return Poll::Ready(Some(Ok(Entry::File { name, file })))
                }
                Some(Event::Error(e)) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Some(Event::Complete) => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                None if this.finished => return Poll::Ready(None),
                None => (),
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    // Chunk read. Feed it and look for events once more.
                    this.parser.feed(chunk);
                }

                Poll::Ready(Some(Err(e))) => {
                    log::debug!("Body stream failed: {}", e);
                    this.parser.abort(Error::inner(e));
                }

                Poll::Ready(None) => {
                    log::debug!("Body stream ended");
                    this.parser.finish();
                }

                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
