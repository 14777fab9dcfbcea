pub const OUTPUT_HIGH_WATER: usize = 100_000;
pub const OUTPUT_KEEP: usize = 50_000;

/// Raw terminal output, bounded by dropping the oldest half once it grows
/// past the high-water mark.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    text: String,
}

impl OutputBuffer {
    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.text.len() > OUTPUT_HIGH_WATER {
            let mut cut = self.text.len() - OUTPUT_KEEP;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Splits `partial + chunk` into complete lines and the trailing fragment.
/// Carriage returns before the newline are dropped, blank lines skipped.
pub fn consume_complete_lines(partial: &str, chunk: &str) -> (Vec<String>, String) {
    let combined = format!("{partial}{chunk}");
    let mut pieces: Vec<&str> = combined.split('\n').collect();
    let rest = pieces.pop().unwrap_or_default().to_string();

    let lines = pieces
        .into_iter()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();

    (lines, rest)
}

/// Partial-line accumulator for line-delimited protocols.
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    partial: String,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let (lines, rest) = consume_complete_lines(&self.partial, chunk);
        self.partial = rest;
        lines
    }

    /// Hands back whatever is left once the stream has ended.
    pub fn take_remainder(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.partial);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    pub fn pending(&self) -> &str {
        &self.partial
    }

    pub fn clear(&mut self) {
        self.partial.clear();
    }
}
