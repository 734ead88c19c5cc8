//! `<think>` block reclassification
//!
//! Some models inline their reasoning as a leading `<think>…</think>` block
//! in the content stream instead of sending native thinking deltas. The split
//! is recomputed from the whole raw buffer on every delta, so the tag may
//! open or close at any chunk boundary.

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Thinking and visible text at one point of the stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    pub thinking: String,
    pub content: String,
}

/// Accumulates one round of content and thinking deltas
#[derive(Debug, Clone, Default)]
pub struct ThinkSplitter {
    raw: String,
    native_thinking: String,
}

enum Tagged<'a> {
    /// No leading think block
    Plain,
    /// Raw text so far is a prefix of `<think>`
    Opening,
    /// Inside an unclosed block
    Open { thinking: &'a str },
    Closed { thinking: &'a str, rest: &'a str },
}

impl ThinkSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_content(&mut self, delta: &str) {
        self.raw.push_str(delta);
    }

    pub fn push_thinking(&mut self, delta: &str) {
        self.native_thinking.push_str(delta);
    }

    /// Split while the stream is still running
    ///
    /// A partial or unclosed opening tag hides the visible content until the
    /// block closes.
    pub fn snapshot(&self) -> Split {
        match self.classify() {
            Tagged::Plain => self.plain(),
            Tagged::Opening => Split {
                thinking: self.native_thinking.clone(),
                content: String::new(),
            },
            Tagged::Open { thinking } => Split {
                thinking: strip_partial_close(thinking).trim().to_string(),
                content: String::new(),
            },
            Tagged::Closed { thinking, rest } => self.closed(thinking, rest.trim_start()),
        }
    }

    /// Split once the round is over
    ///
    /// Only a closed block is split off. A dangling partial tag or a block
    /// that never closed (a reply cut short) stays as ordinary text.
    pub fn finish(&self) -> Split {
        match self.classify() {
            Tagged::Plain | Tagged::Opening | Tagged::Open { .. } => self.plain(),
            Tagged::Closed { thinking, rest } => self.closed(thinking, rest.trim()),
        }
    }

    fn plain(&self) -> Split {
        Split {
            thinking: self.native_thinking.clone(),
            content: self.raw.clone(),
        }
    }

    fn closed(&self, thinking: &str, rest: &str) -> Split {
        let thinking = thinking.trim();
        Split {
            // An empty block leaves native thinking in place
            thinking: if thinking.is_empty() {
                self.native_thinking.clone()
            } else {
                thinking.to_string()
            },
            content: rest.to_string(),
        }
    }

    fn classify(&self) -> Tagged<'_> {
        let text = self.raw.trim_start();
        if text.is_empty() {
            return Tagged::Plain;
        }
        if let Some(body) = text.strip_prefix(OPEN_TAG) {
            return match body.find(CLOSE_TAG) {
                Some(end) => Tagged::Closed {
                    thinking: &body[..end],
                    rest: &body[end + CLOSE_TAG.len()..],
                },
                None => Tagged::Open { thinking: body },
            };
        }
        if OPEN_TAG.starts_with(text) {
            return Tagged::Opening;
        }
        Tagged::Plain
    }
}

/// Drop a trailing partial `</think>` still being streamed
fn strip_partial_close(thinking: &str) -> &str {
    (1..CLOSE_TAG.len())
        .rev()
        .find(|&n| thinking.ends_with(&CLOSE_TAG[..n]))
        .map_or(thinking, |n| &thinking[..thinking.len() - n])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parts: &[&str]) -> ThinkSplitter {
        let mut splitter = ThinkSplitter::new();
        for part in parts {
            splitter.push_content(part);
        }
        splitter
    }

    #[test]
    fn test_plain_content_untouched() {
        let split = feed(&["Hello", " world "]).finish();
        assert_eq!(split.content, "Hello world ");
        assert_eq!(split.thinking, "");
    }

    #[test]
    fn test_think_block_any_boundary() {
        let raw = "<think>reasoning</think>visible text";
        for cut in 1..raw.len() {
            let split = feed(&[&raw[..cut], &raw[cut..]]).finish();
            assert_eq!(split.thinking, "reasoning", "cut at {}", cut);
            assert_eq!(split.content, "visible text", "cut at {}", cut);
        }
        // One byte at a time
        let bytes: Vec<String> = raw.chars().map(|c| c.to_string()).collect();
        let refs: Vec<&str> = bytes.iter().map(String::as_str).collect();
        let split = feed(&refs).finish();
        assert_eq!(split.thinking, "reasoning");
        assert_eq!(split.content, "visible text");
    }

    #[test]
    fn test_snapshot_hides_content_while_open() {
        let mut splitter = feed(&["<thi"]);
        assert_eq!(splitter.snapshot().content, "");

        splitter.push_content("nk>step one");
        let split = splitter.snapshot();
        assert_eq!(split.thinking, "step one");
        assert_eq!(split.content, "");

        splitter.push_content("</think>\n\nAnswer");
        let split = splitter.snapshot();
        assert_eq!(split.thinking, "step one");
        assert_eq!(split.content, "Answer");
    }

    #[test]
    fn test_dangling_partial_tag_is_text() {
        let split = feed(&["<"]).finish();
        assert_eq!(split.content, "<");
    }

    #[test]
    fn test_tag_thinking_overrides_native() {
        let mut splitter = ThinkSplitter::new();
        splitter.push_thinking("native");
        assert_eq!(splitter.snapshot().thinking, "native");

        splitter.push_content("<think>tagged</think>ok");
        let split = splitter.finish();
        assert_eq!(split.thinking, "tagged");
        assert_eq!(split.content, "ok");
    }

    #[test]
    fn test_unclosed_block_stays_content() {
        let splitter = feed(&["<think>I should answer 42. The answer is 42"]);
        assert_eq!(splitter.snapshot().thinking, "I should answer 42. The answer is 42");

        let split = splitter.finish();
        assert_eq!(split.content, "<think>I should answer 42. The answer is 42");
        assert_eq!(split.thinking, "");
    }

    #[test]
    fn test_snapshot_hides_partial_close_tag() {
        for partial in ["<", "</", "</th", "</think"] {
            let split = feed(&["<think>reasoning", partial]).snapshot();
            assert_eq!(split.thinking, "reasoning", "partial {:?}", partial);
            assert_eq!(split.content, "");
        }
        // A lone '<' inside the reasoning is not a tag prefix once followed by text
        let split = feed(&["<think>a < b"]).snapshot();
        assert_eq!(split.thinking, "a < b");
    }

    #[test]
    fn test_tag_not_at_start_is_content() {
        let split = feed(&["Answer <think>x</think>"]).finish();
        assert_eq!(split.content, "Answer <think>x</think>");
        assert_eq!(split.thinking, "");
    }
}
