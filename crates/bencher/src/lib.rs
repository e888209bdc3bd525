//! Fixtures shared by the decoder benchmarks.

/// One request fixture, fed to the decoder whole or in fixed size fragments.
#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    file: TestFile,
    fragment: Option<usize>,
}

impl TestCase {
    pub fn whole(name: &'static str, file: TestFile) -> Self {
        Self { name, file, fragment: None }
    }

    /// Delivers the request `fragment` bytes at a time, like a slow peer.
    pub fn fragmented(name: &'static str, file: TestFile, fragment: usize) -> Self {
        Self { name, file, fragment: Some(fragment.max(1)) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    pub fn fragments(&self) -> Vec<&'static [u8]> {
        let content = self.file.content().as_bytes();
        match self.fragment {
            Some(size) => content.chunks(size).collect(),
            None => vec![content],
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const fn new(file_name: &'static str, content: &'static str) -> Self {
        Self { file_name, content }
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}
