//! Source-line index for RAML documents.
//!
//! serde_yaml does not expose source positions, so spans come from a
//! line-oriented scan of the raw text: every block-mapping key is recorded
//! under its key path with a start line and the last content line of its
//! block. Block scalars (`|`/`>`) are skipped wholesale so JSON embedded in
//! schema values cannot masquerade as keys. Flow collections are not
//! indexed; block style is the practical entirety of RAML.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct LineIndex {
    spans: HashMap<String, (u32, u32)>,
}

impl LineIndex {
    pub(crate) fn build(text: &str) -> LineIndex {
        let mut spans = HashMap::new();
        // (indent, key, start line)
        let mut stack: Vec<(usize, String, u32)> = Vec::new();
        let mut previous_content_line = 0u32;
        let mut scalar_deeper_than: Option<usize> = None;

        for (i, raw) in text.lines().enumerate() {
            let line_no = (i + 1) as u32;
            let mut line = raw.trim_start();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut indent = raw.len() - line.len();
            if let Some(limit) = scalar_deeper_than {
                if indent > limit {
                    previous_content_line = line_no;
                    continue;
                }
                scalar_deeper_than = None;
            }
            // a sequence dash opening a mapping counts as indentation
            while let Some(rest) = line.strip_prefix("- ") {
                indent += 2;
                line = rest;
            }
            if let Some((key, rest)) = block_key(line) {
                while stack.last().map_or(false, |(depth, _, _)| *depth >= indent) {
                    close_top(&mut spans, &mut stack, previous_content_line);
                }
                stack.push((indent, key, line_no));
                if matches!(rest.trim(), "|" | ">" | "|-" | ">-" | "|+" | ">+") {
                    scalar_deeper_than = Some(indent);
                }
            }
            previous_content_line = line_no;
        }
        while !stack.is_empty() {
            close_top(&mut spans, &mut stack, previous_content_line);
        }

        LineIndex { spans }
    }

    pub(crate) fn span(&self, path: &[&str]) -> Option<(u32, u32)> {
        self.spans.get(&join(path)).copied()
    }
}

fn close_top(
    spans: &mut HashMap<String, (u32, u32)>,
    stack: &mut Vec<(usize, String, u32)>,
    end: u32,
) {
    if let Some((_, key, start)) = stack.pop() {
        let mut path: Vec<&str> = stack.iter().map(|(_, key, _)| key.as_str()).collect();
        path.push(&key);
        spans.insert(join(&path), (start, end));
    }
}

fn join(path: &[&str]) -> String {
    path.join("\u{0}")
}

/// Extract a block-mapping key from one trimmed line, returning the key and
/// the remainder after the colon.
fn block_key(line: &str) -> Option<(String, &str)> {
    if line.starts_with('{') || line.starts_with('[') {
        return None;
    }
    for quote in ['"', '\''] {
        if let Some(inner) = line.strip_prefix(quote) {
            let close = inner.find(quote)?;
            let rest = inner[close + 1..].strip_prefix(':')?;
            if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') {
                return Some((inner[..close].to_string(), rest));
            }
            return None;
        }
    }
    for (idx, ch) in line.char_indices() {
        if ch != ':' {
            continue;
        }
        let rest = &line[idx + 1..];
        if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') {
            let key = line[..idx].trim();
            if key.is_empty() {
                return None;
            }
            return Some((key.to_string(), rest));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
#%RAML 0.8
title: Example
/users:
  get:
    responses:
      200:
        body:
          application/json:
            schema: user
  post:
    responses:
      201:
/users/{id}:
  get:
";

    #[test]
    fn resource_spans_cover_their_blocks() {
        let index = LineIndex::build(DOC);
        assert_eq!(index.span(&["/users"]), Some((3, 12)));
        assert_eq!(index.span(&["/users", "get"]), Some((4, 9)));
        assert_eq!(index.span(&["/users", "post"]), Some((10, 12)));
        assert_eq!(index.span(&["/users/{id}", "get"]), Some((14, 14)));
    }

    #[test]
    fn nested_status_and_body_keys_resolve() {
        let index = LineIndex::build(DOC);
        assert_eq!(
            index.span(&["/users", "get", "responses", "200"]),
            Some((6, 9))
        );
        assert_eq!(
            index.span(&["/users", "get", "responses", "200", "body", "application/json"]),
            Some((8, 9))
        );
    }

    #[test]
    fn block_scalar_content_is_not_indexed() {
        let doc = "\
schemas:
  - user: |
      {
        \"type\": \"object\"
      }
/ping:
  get:
";
        let index = LineIndex::build(doc);
        assert_eq!(index.span(&["schemas", "user"]), Some((2, 5)));
        assert_eq!(index.span(&["/ping"]), Some((6, 7)));
        assert!(index.span(&["schemas", "user", "\"type\""]).is_none());
    }

    #[test]
    fn quoted_keys_lose_their_quotes() {
        let index = LineIndex::build("\"/a b\":\n  get:\n");
        assert_eq!(index.span(&["/a b", "get"]), Some((2, 2)));
    }
}
