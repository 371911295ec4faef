// SPDX-License-Identifier: MIT

//! Lenient JSON handling for model output
//!
//! Models wrap JSON in markdown fences, leave trailing commas, quote with
//! single quotes, or stop mid-object when streaming. [`repair_json`]
//! normalizes those cases into text `serde_json` accepts.

use serde_json::Value;

/// Strip a surrounding markdown code fence (```` ```json ````, ```` ```ts ````, or bare)
pub fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();
    for fence in ["```json", "```ts", "```"] {
        if let Some(rest) = s.strip_prefix(fence) {
            s = rest;
            break;
        }
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Normalize almost-JSON into valid JSON text.
///
/// Leading prose before the first `{`/`[` and trailing prose after the
/// top-level value are dropped. Unterminated strings and containers are
/// closed.
pub fn repair_json(text: &str) -> String {
    let s = strip_code_fences(text);
    let start = match s.find(|c: char| c == '{' || c == '[') {
        Some(i) => i,
        None => return s.to_string(),
    };

    let mut out = String::with_capacity(s.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in s[start..].chars() {
        if let Some(q) = quote {
            if escaped {
                out.push(c);
                escaped = false;
            } else if c == '\\' {
                out.push(c);
                escaped = true;
            } else if c == q {
                out.push('"');
                quote = None;
            } else if c == '"' {
                // Only reachable inside a single-quoted string
                out.push_str("\\\"");
            } else if c == '\n' {
                out.push_str("\\n");
            } else {
                out.push(c);
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                out.push('"');
                quote = Some(c);
            }
            '{' => {
                closers.push('}');
                out.push(c);
            }
            '[' => {
                closers.push(']');
                out.push(c);
            }
            '}' | ']' => {
                trim_trailing_comma(&mut out);
                if closers.last() == Some(&c) {
                    closers.pop();
                    out.push(c);
                    if closers.is_empty() {
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }

    if quote.is_some() {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    if out.ends_with(':') {
        out.push_str("null");
    }
    while let Some(closer) = closers.pop() {
        trim_trailing_comma(&mut out);
        out.push(closer);
    }

    out
}

fn trim_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    if out.ends_with(',') {
        out.pop();
    }
}

/// Parse JSON strictly, then after repair. `None` if neither succeeds.
pub fn parse_lenient(text: &str) -> Option<Value> {
    let stripped = strip_code_fences(text);
    if let Ok(v) = serde_json::from_str(stripped) {
        return Some(v);
    }
    let repaired = repair_json(stripped);
    match serde_json::from_str(&repaired) {
        Ok(v) => Some(v),
        Err(e) => {
            log::debug!("JSON repair failed: {} (repaired: {})", e, repaired);
            None
        }
    }
}
