use std::fmt;

use futures::{Stream, StreamExt};
use indexmap::{map, IndexMap};

use crate::{
    multipart::Multipart,
    options::Options,
    parser::{Event, Parser},
    part::{Entry, FileDescriptor},
    sink::try_delete,
    Error,
};

/// A form value: one occurrence, or every occurrence once a name repeats.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<T> {
    Scalar(T),
    List(Vec<T>),
}

impl<T> Value<T> {
    fn push(&mut self, value: T) {
        let previous = std::mem::replace(self, Value::List(Vec::new()));
        *self = match previous {
            Value::Scalar(first) => Value::List(vec![first, value]),
            Value::List(mut values) => {
                values.push(value);
                Value::List(values)
            }
        };
    }

    /// The first value sent under this name.
    pub fn first(&self) -> Option<&T> {
        self.as_slice().first()
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Value::Scalar(v) => std::slice::from_ref(v),
            Value::List(values) => values,
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Value::Scalar(v) => vec![v],
            Value::List(values) => values,
        }
    }
}

/// Name to value(s), iterated in the order names were first seen.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMap<T> {
    map: IndexMap<String, Value<T>>,
}

impl<T> ResultMap<T> {
    pub fn new() -> Self {
        ResultMap {
            map: IndexMap::new(),
        }
    }

    /// Stores `value`, turning an existing scalar into a list on repeats.
    pub fn insert(&mut self, name: String, value: T) {
        match self.map.entry(name) {
            map::Entry::Occupied(mut e) => e.get_mut().push(value),
            map::Entry::Vacant(e) => {
                e.insert(Value::Scalar(value));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value<T>> {
        self.map.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value<T>)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.map.values().flat_map(Value::as_slice)
    }
}

impl<T> Default for ResultMap<T> {
    fn default() -> Self {
        ResultMap::new()
    }
}

impl<T> IntoIterator for ResultMap<T> {
    type Item = (String, Value<T>);
    type IntoIter = map::IntoIter<String, Value<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.into_iter()
    }
}

/// Parsed multipart/form-data.
///
/// Bracketed names such as `user[name]` are kept flat; expanding them is up to
/// the caller.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Form {
    pub fields: ResultMap<String>,
    pub files: ResultMap<FileDescriptor>,
}

impl Form {
    pub fn new() -> Self {
        Form::default()
    }

    pub fn push(&mut self, entry: Entry) {
        match entry {
            Entry::Field { name, value } => self.fields.insert(name, value),
            Entry::File { name, file } => self.files.insert(name, file),
        }
    }

    /// Assembles a form from parser events.
    ///
    /// On an error event, or if the events stop before a terminal one, every
    /// file collected so far is deleted before the error is returned.
    pub fn collect<I>(events: I) -> Result<Form, Error>
    where
        I: IntoIterator<Item = Event>,
    {
        let mut form = Form::new();

        for event in events {
            match event {
                Event::Field { name, value } => form.fields.insert(name, value),
                Event::File { name, file } => form.files.insert(name, file),
                Event::Complete => return Ok(form),
                Event::Error(e) => return Err(form.discard(e)),
            }
        }

        Err(form.discard(Error::UnexpectedEndOfStream))
    }

    /// Feeds a whole in-memory body through a fresh parser.
    pub fn from_bytes<B: AsRef<str>>(
        boundary: B,
        body: &[u8],
        options: Options,
    ) -> Result<Form, Error> {
        let mut parser = Parser::new(boundary, options)?;
        parser.feed(body);
        parser.finish();

        let events: Vec<Event> = parser.events().collect();
        Form::collect(events)
    }

    /// Drains `multipart` into a form.
    pub async fn parse<S, I, E>(mut multipart: Multipart<S>) -> Result<Form, Error>
    where
        S: Stream<Item = Result<I, E>> + Unpin,
        I: AsRef<[u8]>,
        E: fmt::Display,
    {
        let mut form = Form::new();

        while let Some(entry) = multipart.next().await {
            match entry {
                Ok(entry) => form.push(entry),
                Err(e) => return Err(form.discard(e)),
            }
        }

        if multipart.parser().is_terminated() {
            Ok(form)
        } else {
            Err(form.discard(Error::UnexpectedEndOfStream))
        }
    }

    /// Deletes every stored upload and passes `err` through.
    fn discard(self, err: Error) -> Error {
        let count = self.files.values().count();
        if count > 0 {
            log::debug!("Deleting {} stored uploads after: {}", count, err);
        }

        for file in self.files.values() {
            try_delete(&file.path);
        }
        err
    }
}
