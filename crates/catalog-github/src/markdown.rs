//! The demo-block normalization applied before markdown is submitted
//! for rendering (§4.3): fenced demo blocks wrapped in an HTML comment
//! (a pattern some source repos use so the demo renders on the
//! platform's own markdown preview but not in this pipeline's) are
//! unwrapped before the body is sent upstream.

/// Strips `<!--` / `-->` around a fenced code block whose info string
/// starts with `demo`, leaving the fence itself intact. Only the
/// comment markers immediately surrounding a `demo`-tagged fence are
/// removed; unrelated HTML comments are left alone.
pub fn unwrap_demo_blocks(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut lines = markdown.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed == "<!--" {
            if let Some(next) = lines.peek() {
                if next.trim_start().starts_with("```demo") {
                    // swallow the opening comment marker, scan to its
                    // matching closing marker around the fence's end.
                    let mut body = Vec::new();
                    let mut closed = false;
                    for inner in lines.by_ref() {
                        if inner.trim() == "-->" {
                            closed = true;
                            break;
                        }
                        body.push(inner);
                    }
                    if closed {
                        for b in body {
                            out.push_str(b);
                            out.push('\n');
                        }
                        continue;
                    }
                    // no matching close found: restore what we consumed verbatim.
                    out.push_str(line);
                    out.push('\n');
                    for b in body {
                        out.push_str(b);
                        out.push('\n');
                    }
                    continue;
                }
            }
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}
