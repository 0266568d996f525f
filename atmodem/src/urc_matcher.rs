/// One registered unsolicited result code.
///
/// `chunk_count` is the number of lines making up one notification,
/// including the line carrying the prefix. `+CMT` for example is followed by
/// a PDU line and therefore spans two chunks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UrcEntry {
    prefix: Vec<u8>,
    chunk_count: usize,
}

impl UrcEntry {
    /// A `chunk_count` of zero is treated as one.
    pub fn new(prefix: impl Into<Vec<u8>>, chunk_count: usize) -> Self {
        Self {
            prefix: prefix.into(),
            chunk_count: chunk_count.max(1),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn matches(&self, line: &[u8]) -> bool {
        line.starts_with(&self.prefix)
    }
}

/// Ordered list of URC prefixes for one device family.
///
/// Entries are checked in registration order and the first match wins, so a
/// longer prefix has to be registered before any shorter prefix it starts
/// with (`+CMTI` before `+CMT`).
///
/// ```
/// use atmodem::UrcRegistry;
///
/// let registry = UrcRegistry::from_iter([(&b"+CMTI"[..], 1), (&b"+CMT"[..], 2)]);
/// assert_eq!(registry.find(b"+CMTI: \"SM\",3").unwrap().chunk_count(), 1);
/// assert_eq!(registry.find(b"+CMT: ,24").unwrap().chunk_count(), 2);
/// assert!(registry.find(b"+CSQ: 16,99").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrcRegistry {
    entries: Vec<UrcEntry>,
}

impl UrcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, prefix: impl Into<Vec<u8>>, chunk_count: usize) -> Self {
        self.push(prefix, chunk_count);
        self
    }

    pub fn push(&mut self, prefix: impl Into<Vec<u8>>, chunk_count: usize) {
        self.entries.push(UrcEntry::new(prefix, chunk_count));
    }

    /// First registered entry whose prefix starts `line`.
    pub fn find(&self, line: &[u8]) -> Option<&UrcEntry> {
        self.entries.iter().find(|entry| entry.matches(line))
    }

    pub fn entries(&self) -> &[UrcEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P: Into<Vec<u8>>> FromIterator<(P, usize)> for UrcRegistry {
    fn from_iter<I: IntoIterator<Item = (P, usize)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(prefix, chunk_count)| UrcEntry::new(prefix, chunk_count))
                .collect(),
        }
    }
}
