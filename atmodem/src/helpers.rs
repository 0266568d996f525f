use core::fmt;

/// Debug adapter printing raw modem bytes as text, escaping anything that is
/// not valid UTF-8.
pub struct LossyStr<'a>(pub &'a [u8]);

impl fmt::Debug for LossyStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match core::str::from_utf8(self.0) {
            Ok(s) => write!(f, "{s:?}"),
            Err(_) => write!(f, "{:?}", String::from_utf8_lossy(self.0)),
        }
    }
}

impl fmt::Display for LossyStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.0))
    }
}

pub trait SliceExt {
    fn trim_end_matches(&self, whitespaces: &[u8]) -> &Self;
    fn find(&self, needle: &[u8]) -> Option<usize>;
}

impl SliceExt for [u8] {
    fn trim_end_matches(&self, whitespaces: &[u8]) -> &[u8] {
        let is_not_whitespace = |c| !whitespaces.contains(c);
        self.iter()
            .rposition(is_not_whitespace)
            .map_or(&[], |last| &self[..=last])
    }

    fn find(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }
        self.windows(needle.len()).position(|window| window == needle)
    }
}
