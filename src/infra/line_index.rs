//! Newline index with LF/CRLF-robust line/byte mapping.
//!
//! Goals
//! - Single pass over bytes to record '\n' positions.
//! - 1-based external line numbers (friendly for diagnostics).
//! - O(1) line→byte start via the index.
//!
//! Notes
//! - An empty buffer has 0 lines.
//! - A non-empty buffer without '\n' has 1 line.
//! - A trailing '\n' does not open an extra line.

#[derive(Debug, Clone)]
pub struct NewlineIndex {
    /// Byte positions of every '\n' in the buffer.
    nl_positions: Vec<usize>,
    /// Total byte length of the buffer.
    len: usize,
}

impl NewlineIndex {
    /// Build an index recording positions of '\n'.
    pub fn build(bytes: &[u8]) -> Self {
        let nl_positions: Vec<usize> = memchr::memchr_iter(b'\n', bytes).collect();
        Self {
            nl_positions,
            len: bytes.len(),
        }
    }

    /// Total number of logical lines.
    pub fn line_count(&self) -> usize {
        if self.len == 0 {
            return 0;
        }
        match self.nl_positions.last() {
            Some(&last) if last + 1 == self.len => self.nl_positions.len(),
            _ => self.nl_positions.len() + 1,
        }
    }

    /// Start byte (inclusive) of a 1-based line.
    /// Returns None if line is out of range.
    pub fn start_byte_of_line(&self, line1: usize) -> Option<usize> {
        if line1 == 0 || line1 > self.line_count() {
            return None;
        }
        if line1 == 1 {
            return Some(0);
        }
        // For line L>1, start is one past the previous '\n'.
        self.nl_positions
            .get(line1 - 2)
            .map(|&prev_nl| prev_nl + 1)
    }

    /// Start bytes of every line, in order.
    pub fn line_starts(&self) -> impl Iterator<Item = usize> + '_ {
        (1..=self.line_count()).filter_map(|l| self.start_byte_of_line(l))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_lines_with_and_without_trailing_newline() {
        assert_eq!(NewlineIndex::build(b"").line_count(), 0);
        assert_eq!(NewlineIndex::build(b"a").line_count(), 1);
        assert_eq!(NewlineIndex::build(b"a\n").line_count(), 1);
        assert_eq!(NewlineIndex::build(b"a\nb").line_count(), 2);
        assert_eq!(NewlineIndex::build(b"a\r\nb\r\n").line_count(), 2);
    }

    #[test]
    fn line_starts_skip_past_each_newline() {
        let idx = NewlineIndex::build(b"one\ntwo\n\nfour\n");
        let starts: Vec<usize> = idx.line_starts().collect();
        assert_eq!(starts, vec![0, 4, 8, 9]);
        assert_eq!(idx.start_byte_of_line(5), None);
        assert_eq!(idx.start_byte_of_line(0), None);
    }
}
