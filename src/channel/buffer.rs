//! Expect-style search buffer shared by channel implementations.

use super::Pattern;

/// Accumulates unread device output and matches it against pattern lists.
///
/// When several patterns match, the one whose match starts earliest wins;
/// ties go to the pattern listed first. Matched text and everything before
/// it is consumed.
#[derive(Debug, Default)]
pub struct ExpectBuffer {
    pending: String,
    before: String,
    after: String,
    received: u64,
}

impl ExpectBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly received text.
    pub fn push(&mut self, data: &str) {
        self.received += data.len() as u64;
        self.pending.push_str(data);
    }

    /// Tries to match `patterns` against the unread text.
    ///
    /// Returns the index of the winning pattern and updates `before`/`after`.
    pub fn try_match(&mut self, patterns: &[Pattern]) -> Option<usize> {
        let mut best: Option<(usize, usize, usize)> = None;
        for (index, pattern) in patterns.iter().enumerate() {
            if let Some(m) = pattern.as_regex().find(&self.pending) {
                let earlier = best.is_none_or(|(_, start, _)| m.start() < start);
                if earlier {
                    best = Some((index, m.start(), m.end()));
                }
            }
        }

        let (index, start, end) = best?;
        self.before = self.pending[..start].to_string();
        self.after = self.pending[start..end].to_string();
        self.pending.drain(..end);
        Some(index)
    }

    /// Records an end of stream: all unread text becomes `before`.
    pub fn mark_eof(&mut self) {
        self.before = std::mem::take(&mut self.pending);
        self.after.clear();
    }

    /// Records an expired deadline: unread text is exposed as `before` but
    /// kept for the next expect.
    pub fn mark_timeout(&mut self) {
        self.before = self.pending.clone();
        self.after.clear();
    }

    pub fn before(&self) -> &str {
        &self.before
    }

    pub fn after(&self) -> &str {
        &self.after
    }

    /// Unread text.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Returns and resets the received byte count.
    pub fn take_received(&mut self) -> u64 {
        std::mem::take(&mut self.received)
    }
}
