//! Purpose: Group a record stream into fixed-size batches and filter them.
//! Exports: `Batches`, `FilterBatches`, `age_above`.
//! Role: Chunked processing over any fallible record iterator.
//! Invariants: At most one group is buffered at a time.
//! Invariants: Groups preserve source order; only the final group may be short.
//! Invariants: A source error ends the sequence; the partial group is discarded.
use crate::core::error::{Error, ErrorKind};
use crate::core::record::User;

// Upper bound on up-front allocation; larger groups grow on demand.
const MAX_PREALLOC: usize = 1024;

#[derive(Debug)]
pub struct Batches<I> {
    source: I,
    size: usize,
    done: bool,
}

impl<I> Batches<I> {
    pub fn new(source: I, size: usize) -> Result<Self, Error> {
        check_batch_size(size)?;
        Ok(Self {
            source,
            size,
            done: false,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.size
    }
}

pub(crate) fn check_batch_size(size: usize) -> Result<(), Error> {
    if size == 0 {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message("batch size must be positive")
            .with_hint("Pass a batch size of 1 or more."));
    }
    Ok(())
}

impl<I, T> Iterator for Batches<I>
where
    I: Iterator<Item = Result<T, Error>>,
{
    type Item = Result<Vec<T>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut group = Vec::with_capacity(self.size.min(MAX_PREALLOC));
        while group.len() < self.size {
            match self.source.next() {
                Some(Ok(record)) => group.push(record),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if group.is_empty() {
            None
        } else {
            Some(Ok(group))
        }
    }
}

/// Yields the records of each batch that satisfy `predicate`, in order.
/// The outer level walks batches; the inner level walks one batch.
pub struct FilterBatches<B, T, F> {
    batches: B,
    current: std::vec::IntoIter<T>,
    predicate: F,
}

impl<B, T, F> FilterBatches<B, T, F> {
    pub fn new(batches: B, predicate: F) -> Self {
        Self {
            batches,
            current: Vec::new().into_iter(),
            predicate,
        }
    }
}

impl<B, T, F> Iterator for FilterBatches<B, T, F>
where
    B: Iterator<Item = Result<Vec<T>, Error>>,
    F: FnMut(&T) -> bool,
{
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.current.find(|record| (self.predicate)(record)) {
                return Some(Ok(record));
            }
            match self.batches.next()? {
                Ok(group) => self.current = group.into_iter(),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Predicate keeping users strictly older than `min_age`.
pub fn age_above(min_age: u32) -> impl Fn(&User) -> bool + Copy {
    move |user| user.age > min_age
}
