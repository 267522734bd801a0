//! Opaque watch-resumption markers.

use std::fmt;

use runtime_core::{Error, Result};

/// An opaque marker identifying a position in a single kind's watch history.
///
/// The only operations a caller is entitled to rely on are round-tripping it
/// through [`Bookmark::encode`]/[`Bookmark::decode`] and passing it back to
/// `StartFromBookmark`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bookmark(u64);

impl Bookmark {
    pub(crate) fn from_seq(seq: u64) -> Self {
        Bookmark(seq)
    }

    pub(crate) fn seq(self) -> u64 {
        self.0
    }

    /// Render this bookmark as an opaque string suitable for storage or
    /// wire transmission.
    #[must_use]
    pub fn encode(self) -> String {
        self.0.to_string()
    }

    /// Parse a bookmark previously produced by [`Bookmark::encode`].
    ///
    /// Returns [`Error::InvalidBookmark`] for malformed input; whether the
    /// bookmark still refers to retained history is checked separately by
    /// the store at resume time.
    pub fn decode(raw: &str) -> Result<Self> {
        raw.parse()
            .map(Bookmark)
            .map_err(|_| Error::InvalidBookmark(format!("malformed bookmark: {raw:?}")))
    }
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let b = Bookmark::from_seq(42);
        assert_eq!(Bookmark::decode(&b.encode()).unwrap(), b);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Bookmark::decode("not-a-bookmark").is_err());
    }
}
