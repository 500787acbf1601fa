/// Bounded sink of lines with overflow bookkeeping.
///
/// Lines are accumulated up to a maximum joined length (line bytes
/// plus one newline between lines). The first line that would push
/// the total past the ceiling is truncated to exactly fit and the
/// overflow flag is set, everything after it is dropped. An end of
/// feed marker (`None`) only sets `has_ended`.
///
/// `do_final` joins and resets, so one buffer may serve several
/// collection rounds.
#[derive(Debug)]
pub struct OutputFeedBuffer {
    lines: Vec<String>,
    len: usize,
    max_size: usize,
    max_size_exceeded: bool,
    has_ended: bool,
}

impl OutputFeedBuffer {
    pub fn new(max_size: usize) -> OutputFeedBuffer {
        OutputFeedBuffer {
            lines: Vec::new(),
            len: 0,
            max_size,
            max_size_exceeded: false,
            has_ended: false,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn max_size_exceeded(&self) -> bool {
        self.max_size_exceeded
    }

    pub fn has_ended(&self) -> bool {
        self.has_ended
    }

    /// Feeds one scanned line, `None` marks end of feed
    pub fn on_line(&mut self, line: Option<&str>) {
        let line = match line {
            Some(line) => line,
            None => {
                self.has_ended = true;
                return;
            }
        };
        if self.max_size_exceeded {
            return;
        }
        let separator = if self.lines.is_empty() { 0 } else { 1 };
        let projected = self.len + separator + line.len();
        if projected <= self.max_size {
            self.lines.push(line.to_owned());
            self.len = projected;
            return;
        }
        // Truncate to exactly fill the ceiling. When even the
        // separator does not fit the line is dropped whole.
        if self.len + separator <= self.max_size {
            let budget = self.max_size - self.len - separator;
            let cut = truncate_on_char_boundary(line, budget);
            self.len += separator + cut.len();
            self.lines.push(cut.to_owned());
        }
        self.max_size_exceeded = true;
    }

    /// Joins accumulated lines with `\n`, resets the buffer and
    /// returns the joined text
    pub fn do_final(&mut self) -> String {
        let text = self.lines.join("\n");
        self.lines.clear();
        self.len = 0;
        self.max_size_exceeded = false;
        self.has_ended = false;
        text
    }
}

fn truncate_on_char_boundary(line: &str, budget: usize) -> &str {
    if line.len() <= budget {
        return line;
    }
    let mut end = budget;
    while end > 0 && !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_within_limit() {
        let mut buffer = OutputFeedBuffer::new(20);
        buffer.on_line(Some("          "));
        buffer.on_line(Some("       "));
        assert!(!buffer.max_size_exceeded());
        assert_eq!(buffer.do_final(), "          \n       ");
    }

    #[test]
    fn overflow_line_truncated_to_fit() {
        let mut buffer = OutputFeedBuffer::new(20);
        buffer.on_line(Some("          "));
        buffer.on_line(Some("       "));
        buffer.on_line(Some("123"));
        assert!(buffer.max_size_exceeded());
        let text = buffer.do_final();
        assert_eq!(text, "          \n       \n1");
        assert_eq!(text.len(), 20);
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn lines_after_overflow_are_dropped() {
        let mut buffer = OutputFeedBuffer::new(5);
        buffer.on_line(Some("abcdefgh"));
        buffer.on_line(Some("never"));
        assert!(buffer.max_size_exceeded());
        assert_eq!(buffer.do_final(), "abcde");
    }

    #[test]
    fn exact_fit_is_not_overflow() {
        let mut buffer = OutputFeedBuffer::new(5);
        buffer.on_line(Some("abcde"));
        assert!(!buffer.max_size_exceeded());
        assert_eq!(buffer.do_final(), "abcde");
    }

    #[test]
    fn full_buffer_drops_next_line_whole() {
        let mut buffer = OutputFeedBuffer::new(5);
        buffer.on_line(Some("abcde"));
        buffer.on_line(Some("x"));
        assert!(buffer.max_size_exceeded());
        assert_eq!(buffer.do_final(), "abcde");
    }

    #[test]
    fn end_of_feed_marks_and_resets() {
        let mut buffer = OutputFeedBuffer::new(20);
        buffer.on_line(Some("line"));
        buffer.on_line(None);
        assert!(buffer.has_ended());
        let _ = buffer.do_final();
        assert!(!buffer.has_ended());
        assert!(!buffer.max_size_exceeded());
        assert_eq!(buffer.max_size(), 20);
        // reusable after reset
        buffer.on_line(Some("again"));
        assert_eq!(buffer.do_final(), "again");
    }

    #[test]
    fn end_of_feed_observed_even_after_overflow() {
        let mut buffer = OutputFeedBuffer::new(2);
        buffer.on_line(Some("long line"));
        buffer.on_line(None);
        assert!(buffer.max_size_exceeded());
        assert!(buffer.has_ended());
    }

    #[test]
    fn joined_length_never_exceeds_ceiling() {
        let mut buffer = OutputFeedBuffer::new(13);
        for line in &["short", "and", "some more lines", "tail"] {
            buffer.on_line(Some(line));
        }
        let exceeded = buffer.max_size_exceeded();
        let text = buffer.do_final();
        assert!(text.len() <= 13);
        if exceeded {
            assert_eq!(text.len(), 13);
        }
    }
}
