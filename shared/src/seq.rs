/// Serial-number arithmetic over u16 sequence numbers, plus the
/// receiver-side duplicate filter used by circuits.

/// Returns whether or not a wrapping sequence number is greater than another.
/// sequence_greater_than(2,1) will return true
/// sequence_greater_than(1,2) will return false
/// sequence_greater_than(1,1) will return false
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= 32768)) || ((s1 < s2) && (s2 - s1 > 32768))
}

/// Returns whether or not a wrapping sequence number is less than another.
/// sequence_less_than(1,2) will return true
/// sequence_less_than(2,1) will return false
/// sequence_less_than(1,1) will return false
pub fn sequence_less_than(s1: u16, s2: u16) -> bool {
    sequence_greater_than(s2, s1)
}

/// Retrieves the wrapping difference between 2 u16 values: how far `b` is
/// ahead of `a` on the sequence circle.
///
/// # Examples
/// ```
/// # use veldt_shared::wrapping_diff;
/// assert_eq!(wrapping_diff(1, 2), 1);
/// assert_eq!(wrapping_diff(2, 1), -1);
/// assert_eq!(wrapping_diff(65535, 0), 1);
/// assert_eq!(wrapping_diff(0, 65535), -1);
/// ```
pub fn wrapping_diff(a: u16, b: u16) -> i16 {
    b.wrapping_sub(a) as i16
}

/// Sequences older than the newest-seen by more than this many steps are
/// treated as stale and rejected.
pub const DEFAULT_WINDOW_SIZE: u16 = 256;

/// Receiver-side duplicate-sequence detection for one circuit.
///
/// At-least-once delivery means a reliable sender may transmit the same
/// sequence several times; the window accepts each sequence exactly once
/// and rejects anything that has fallen out of the bounded history.
pub struct SequenceWindow {
    newest: Option<u16>,
    window_size: u16,
    // sequences <= newest that have been accepted, as offsets back from newest
    seen: Vec<bool>,
}

impl SequenceWindow {
    pub fn new() -> Self {
        Self::with_window_size(DEFAULT_WINDOW_SIZE)
    }

    pub fn with_window_size(window_size: u16) -> Self {
        Self {
            newest: None,
            window_size,
            seen: vec![false; window_size as usize],
        }
    }

    /// Most recent sequence accepted, if any.
    pub fn newest(&self) -> Option<u16> {
        self.newest
    }

    /// Accepts or rejects an incoming sequence. Returns false for
    /// duplicates and for sequences older than the window.
    pub fn accept(&mut self, sequence: u16) -> bool {
        let Some(newest) = self.newest else {
            self.newest = Some(sequence);
            self.seen[0] = true;
            return true;
        };

        if sequence_greater_than(sequence, newest) {
            // advance the window, clearing the history slots we skip over
            let advance = sequence.wrapping_sub(newest);
            if advance >= self.window_size {
                for slot in self.seen.iter_mut() {
                    *slot = false;
                }
            } else {
                self.seen.rotate_right(advance as usize);
                for slot in self.seen.iter_mut().take(advance as usize) {
                    *slot = false;
                }
            }
            self.seen[0] = true;
            self.newest = Some(sequence);
            return true;
        }

        let age = newest.wrapping_sub(sequence);
        if age >= self.window_size {
            // too old to distinguish from a duplicate, drop it
            return false;
        }

        let slot = age as usize;
        if self.seen[slot] {
            return false;
        }
        self.seen[slot] = true;
        true
    }
}

impl Default for SequenceWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod sequence_compare_tests {
    use super::{sequence_greater_than, sequence_less_than, wrapping_diff};

    #[test]
    fn greater_is_greater() {
        assert!(sequence_greater_than(2, 1));
    }

    #[test]
    fn greater_is_not_equal() {
        assert!(!sequence_greater_than(2, 2));
    }

    #[test]
    fn greater_is_not_less() {
        assert!(!sequence_greater_than(1, 2));
    }

    #[test]
    fn less_is_less() {
        assert!(sequence_less_than(1, 2));
    }

    #[test]
    fn greater_across_wrap() {
        assert!(sequence_greater_than(2, u16::MAX));
        assert!(!sequence_greater_than(u16::MAX, 2));
    }

    #[test]
    fn diff_across_wrap() {
        assert_eq!(wrapping_diff(u16::MAX, 1), 2);
        assert_eq!(wrapping_diff(1, u16::MAX), -2);
    }
}
