// Constant-memory running aggregates over streamed values.
use crate::core::error::{Error, ErrorKind};

/// Running total and count; the mean is computed client-side, never by storage.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunningMean {
    total: u128,
    count: u64,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: u64) {
        self.total += u128::from(value);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> u128 {
        self.total
    }

    pub fn finish(&self) -> Result<f64, Error> {
        if self.count == 0 {
            return Err(Error::new(ErrorKind::EmptyAggregate)
                .with_message("no data: mean of an empty sequence is undefined"));
        }
        Ok(self.total as f64 / self.count as f64)
    }
}

/// Streams `values` once, stopping at the first error.
pub fn accumulate<I, V>(values: I) -> Result<RunningMean, Error>
where
    I: IntoIterator<Item = Result<V, Error>>,
    V: Into<u64>,
{
    let mut acc = RunningMean::new();
    for value in values {
        acc.push(value?.into());
    }
    Ok(acc)
}

pub fn mean<I, V>(values: I) -> Result<f64, Error>
where
    I: IntoIterator<Item = Result<V, Error>>,
    V: Into<u64>,
{
    accumulate(values)?.finish()
}
