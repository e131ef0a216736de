//! Lyric text cleanup.
//!
//! Lyrics arrive either as plain text or in LRC format:
//! [mm:ss.xx] Lyrics line here
//!
//! Detection only cares about the sung words, so timestamps, metadata tags
//! like [ar:Artist] and section headers like [Chorus] are dropped.

/// Reduce raw lyrics to sung lines joined by newlines.
pub fn plain_text(content: &str) -> String {
    let mut lines = Vec::new();

    for line in content.lines() {
        let line = strip_leading_tags(line.trim());
        if !line.is_empty() {
            lines.push(line);
        }
    }

    lines.join("\n")
}

/// Remove every leading `[...]` group. An unterminated bracket is kept.
fn strip_leading_tags(mut line: &str) -> &str {
    while let Some(rest) = line.strip_prefix('[') {
        match rest.find(']') {
            Some(end) => line = rest[end + 1..].trim_start(),
            None => break,
        }
    }
    line.trim_end()
}
