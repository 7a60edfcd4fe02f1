use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Worker count request.
///
/// Positive values are taken literally, zero means every available core and
/// negative values mean "all cores minus |n|". The request is resolved once,
/// at batch start, into a concrete positive count.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(transparent)]
pub struct Threads(pub i32);

impl Threads {
    pub const ALL_BUT_ONE: Threads = Threads(-1);

    pub fn resolve(self, available: usize) -> usize {
        let available = available.max(1);
        match self.0 {
            n if n > 0 => n as usize,
            0 => available,
            n => available.saturating_sub(n.unsigned_abs() as usize).max(1),
        }
    }

    /// Resolves against the cores reported by the operating system.
    pub fn resolve_available(self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.resolve(available)
    }
}

impl Default for Threads {
    fn default() -> Self {
        Threads::ALL_BUT_ONE
    }
}

impl FromStr for Threads {
    type Err = ThreadsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i32>()
            .map(Threads)
            .map_err(|_| ThreadsParseError(s.to_string()))
    }
}

#[derive(Debug)]
pub struct ThreadsParseError(pub String);

impl fmt::Display for ThreadsParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid thread count: '{}'", self.0)
    }
}

impl std::error::Error for ThreadsParseError {}
