//! Pulling a runnable snippet out of a message body.

use std::sync::LazyLock;

use regex::Regex;

/// First fenced block. A multi-line fence may carry a language tag on its
/// opening line; a one-line fence (```` ```print(1)``` ````) has none.
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:[^\n`]*\n)?(.*?)```").unwrap());

/// Extract code from a body. Empty when nothing looks like code.
///
/// A fenced block wins. Without one, collect from the first line starting
/// with `import ` or `from ` up to (not including) the next blank line.
pub fn extract_code(body: &str) -> String {
    if let Some(block) = FENCED_BLOCK.captures(body).and_then(|caps| caps.get(1)) {
        return block.as_str().trim().to_string();
    }

    let mut lines = Vec::new();
    let mut in_code = false;
    for line in body.lines() {
        let trimmed = line.trim();
        if !in_code && (trimmed.starts_with("import ") || trimmed.starts_with("from ")) {
            in_code = true;
        } else if in_code && trimmed.is_empty() {
            break;
        }
        if in_code {
            lines.push(line);
        }
    }
    lines.join("\n").trim().to_string()
}
