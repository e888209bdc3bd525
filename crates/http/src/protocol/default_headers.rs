use crate::protocol::Header;

/// Headers every response built by the engine starts with.
///
/// Assembled once at startup and shared read only (behind an `Arc`) by every
/// connection, so no locking is needed to read it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultHeaders {
    headers: Vec<Header>,
}

impl DefaultHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header::new(name, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.headers.iter()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for DefaultHeaders {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self { headers: iter.into_iter().map(|(name, value)| Header::new(name, value)).collect() }
    }
}
