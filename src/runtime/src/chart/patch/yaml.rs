//! Line-level edits of block-style YAML.
//!
//! The document is re-read after every operation into a light outline of
//! block mappings and sequences that records which lines each node spans.
//! Edits splice rendered lines into place, so comments, key order and
//! formatting outside the touched node are kept byte for byte.
//!
//! Anything the outline does not model (flow collections being walked
//! into, anchors and tags, multi-line plain scalars, several documents)
//! is reported as [`EditError::Unsupported`] and the caller falls back to
//! a structural rewrite.

use serde_json::Value;

#[derive(Debug)]
pub(super) enum EditError {
    /// The document uses YAML the line editor does not handle
    Unsupported(String),
    /// The operation itself is invalid for this document
    Invalid(String),
}

/// One operation, with its pointer already split into tokens.
pub(super) enum Edit<'a> {
    Add(Vec<String>, &'a Value),
    Replace(Vec<String>, &'a Value),
    Remove(Vec<String>),
}

/// Apply `edits` in order and return the edited text.
pub(super) fn apply(text: &str, edits: &[Edit<'_>]) -> Result<String, EditError> {
    let mut doc = Document::new(text)?;
    for edit in edits {
        doc.apply(edit)?;
    }
    Ok(doc.render())
}

#[derive(Debug)]
enum Node {
    Null,
    Scalar,
    Flow,
    Map(Vec<Entry>, usize),
    Seq(Vec<Item>, usize),
}

#[derive(Debug)]
struct Entry {
    key: String,
    line: usize,
    col: usize,
    /// Byte offset of the `:` in the key line
    colon: usize,
    value: Node,
    /// One past the last content line of the entry
    end: usize,
}

#[derive(Debug)]
struct Item {
    line: usize,
    /// Column of the `-`
    col: usize,
    value: Node,
    end: usize,
}

enum Slot<'n> {
    Root(&'n Node),
    Entry(&'n Entry),
    Item(&'n Item),
}

impl<'n> Slot<'n> {
    fn node(&self) -> &'n Node {
        match self {
            Slot::Root(node) => node,
            Slot::Entry(entry) => &entry.value,
            Slot::Item(item) => &item.value,
        }
    }
}

struct Splice {
    start: usize,
    end: usize,
    lines: Vec<String>,
}

struct Document {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl Document {
    fn new(text: &str) -> Result<Self, EditError> {
        if text.contains('\r') {
            return Err(EditError::Unsupported("CRLF line endings".to_string()));
        }
        let trailing_newline = text.ends_with('\n');
        let body = text.strip_suffix('\n').unwrap_or(text);
        let lines = if text.is_empty() {
            Vec::new()
        } else {
            body.split('\n').map(str::to_string).collect()
        };
        Ok(Self {
            lines,
            trailing_newline,
        })
    }

    fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }

    /// First line of the document body (after an optional `---`).
    fn body_start(&self) -> Result<usize, EditError> {
        let mut start = 0;
        let mut seen_content = false;
        for (idx, line) in self.lines.iter().enumerate() {
            let trimmed = line.trim_end();
            if trimmed.starts_with('%') && !seen_content {
                return Err(EditError::Unsupported("YAML directives".to_string()));
            }
            if trimmed == "---" || trimmed.starts_with("--- ") {
                if seen_content || trimmed != "---" {
                    return Err(EditError::Unsupported("multiple documents".to_string()));
                }
                start = idx + 1;
                seen_content = true;
                continue;
            }
            if trimmed == "..." {
                return Err(EditError::Unsupported("document end marker".to_string()));
            }
            if is_content(line) {
                seen_content = true;
            }
        }
        Ok(start)
    }

    fn first_content(&self) -> Result<Option<usize>, EditError> {
        let start = self.body_start()?;
        Ok((start..self.lines.len()).find(|&l| is_content(&self.lines[l])))
    }

    fn parse_root(&self) -> Result<Node, EditError> {
        match self.first_content()? {
            Some(line) => self.parse_node(line, indent_of(&self.lines[line]), self.lines.len()),
            None => Ok(Node::Null),
        }
    }

    /// Content rows of a region: the first starts at `col`, the rest at
    /// their own indentation.
    fn rows(&self, line: usize, col: usize, end: usize) -> Vec<(usize, usize)> {
        let mut rows = vec![(line, col)];
        for l in line + 1..end {
            if is_content(&self.lines[l]) {
                rows.push((l, indent_of(&self.lines[l])));
            }
        }
        rows
    }

    fn parse_node(&self, line: usize, col: usize, end: usize) -> Result<Node, EditError> {
        let text = &self.lines[line][col..];
        if is_dash(text) {
            return self.parse_seq(line, col, end);
        }
        if parse_key(text).is_some() {
            return self.parse_map(line, col, end);
        }
        let (value, _) = split_comment(text);
        classify_inline(value.trim(), self.rows(line, col, end).len() > 1)
    }

    fn parse_map(&self, line: usize, col: usize, end: usize) -> Result<Node, EditError> {
        let rows = self.rows(line, col, end);
        let mut entries = Vec::new();
        let mut i = 0;

        while i < rows.len() {
            let (l, ind) = rows[i];
            if ind != col {
                return Err(EditError::Unsupported(format!(
                    "unexpected indentation at line {}",
                    l + 1
                )));
            }
            let (key, colon) = parse_key(&self.lines[l][ind..]).ok_or_else(|| {
                EditError::Unsupported(format!("expected a mapping key at line {}", l + 1))
            })?;
            let colon = ind + colon;
            let (inline, _) = split_comment(&self.lines[l][colon + 1..]);
            let inline = inline.trim();

            let mut j = i + 1;
            while j < rows.len() {
                let (cl, cind) = rows[j];
                let nested = cind > col
                    || (cind == col && inline.is_empty() && is_dash(&self.lines[cl][cind..]));
                if !nested {
                    break;
                }
                j += 1;
            }
            let entry_end = rows[j - 1].0 + 1;

            let value = if inline.is_empty() {
                if j > i + 1 {
                    self.parse_node(rows[i + 1].0, rows[i + 1].1, entry_end)?
                } else {
                    Node::Null
                }
            } else {
                classify_inline(inline, j > i + 1)?
            };

            entries.push(Entry {
                key,
                line: l,
                col: ind,
                colon,
                value,
                end: entry_end,
            });
            i = j;
        }

        Ok(Node::Map(entries, col))
    }

    fn parse_seq(&self, line: usize, col: usize, end: usize) -> Result<Node, EditError> {
        let rows = self.rows(line, col, end);
        let mut items = Vec::new();
        let mut i = 0;

        while i < rows.len() {
            let (l, ind) = rows[i];
            let text = &self.lines[l][ind..];
            if ind != col || !is_dash(text) {
                return Err(EditError::Unsupported(format!(
                    "expected a sequence item at line {}",
                    l + 1
                )));
            }
            let after = &self.lines[l][ind + 1..];
            let content_col = ind + 1 + (after.len() - after.trim_start_matches(' ').len());
            let (inline, _) = split_comment(&self.lines[l][content_col..]);
            let inline = inline.trim();

            let mut j = i + 1;
            while j < rows.len() && rows[j].1 > col {
                j += 1;
            }
            let item_end = rows[j - 1].0 + 1;

            let value = if inline.is_empty() {
                if j > i + 1 {
                    self.parse_node(rows[i + 1].0, rows[i + 1].1, item_end)?
                } else {
                    Node::Null
                }
            } else {
                self.parse_node(l, content_col, item_end)?
            };

            items.push(Item {
                line: l,
                col: ind,
                value,
                end: item_end,
            });
            i = j;
        }

        Ok(Node::Seq(items, col))
    }

    fn starts_mid_line(&self, line: usize, col: usize) -> bool {
        indent_of(&self.lines[line]) != col
    }

    fn apply(&mut self, edit: &Edit<'_>) -> Result<(), EditError> {
        let splice = {
            let root = self.parse_root()?;
            match edit {
                Edit::Replace(tokens, value) => {
                    let chain = locate(&root, tokens)?;
                    self.rewrite(&chain[chain.len() - 1], value)?
                }
                Edit::Add(tokens, value) => self.add(&root, tokens, value)?,
                Edit::Remove(tokens) => self.remove(&root, tokens)?,
            }
        };
        self.lines.splice(splice.start..splice.end, splice.lines);
        Ok(())
    }

    fn add(&self, root: &Node, tokens: &[String], value: &Value) -> Result<Splice, EditError> {
        let Some((last, parent_tokens)) = tokens.split_last() else {
            return self.rewrite(&Slot::Root(root), value);
        };
        let chain = locate(root, parent_tokens)?;

        match chain[chain.len() - 1].node() {
            Node::Map(entries, indent) => {
                if let Some(entry) = entries.iter().find(|e| e.key == *last) {
                    return self.rewrite(&Slot::Entry(entry), value);
                }
                let at = entries.last().map(|e| e.end).ok_or_else(|| {
                    EditError::Invalid("empty mapping".to_string())
                })?;
                Ok(Splice {
                    start: at,
                    end: at,
                    lines: render_entry(*indent, last, value)?,
                })
            }
            Node::Seq(items, indent) => {
                let idx = parse_index(last, items.len(), true)?;
                let at = match items.get(idx) {
                    Some(item) if self.starts_mid_line(item.line, item.col) => {
                        return Err(EditError::Unsupported(
                            "insert before an inline sequence item".to_string(),
                        ))
                    }
                    Some(item) => item.line,
                    None => items.last().map(|i| i.end).ok_or_else(|| {
                        EditError::Invalid("empty sequence".to_string())
                    })?,
                };
                Ok(Splice {
                    start: at,
                    end: at,
                    lines: render_item(*indent, value)?,
                })
            }
            Node::Flow => Err(EditError::Unsupported("flow collection".to_string())),
            Node::Null | Node::Scalar => Err(EditError::Invalid(format!(
                "parent of '{}' is not a mapping or sequence",
                last
            ))),
        }
    }

    fn remove(&self, root: &Node, tokens: &[String]) -> Result<Splice, EditError> {
        if tokens.is_empty() {
            return Err(EditError::Invalid(
                "cannot remove the document root".to_string(),
            ));
        }
        let chain = locate(root, tokens)?;
        let parent = &chain[chain.len() - 2];

        let (siblings, empty) = match parent.node() {
            Node::Map(entries, _) => (entries.len(), Value::Object(Default::default())),
            Node::Seq(items, _) => (items.len(), Value::Array(Vec::new())),
            _ => return Err(EditError::Invalid("parent is not a collection".to_string())),
        };
        if siblings == 1 {
            return self.rewrite(parent, &empty);
        }

        let (line, col, end) = match &chain[chain.len() - 1] {
            Slot::Entry(e) => (e.line, e.col, e.end),
            Slot::Item(i) => (i.line, i.col, i.end),
            Slot::Root(_) => return Err(EditError::Invalid("cannot remove the document root".to_string())),
        };
        if self.starts_mid_line(line, col) {
            return Err(EditError::Unsupported(
                "remove of an inline first key".to_string(),
            ));
        }
        Ok(Splice {
            start: line,
            end,
            lines: Vec::new(),
        })
    }

    /// Replace the value held by `slot`, keeping its key and line comment.
    fn rewrite(&self, slot: &Slot<'_>, value: &Value) -> Result<Splice, EditError> {
        match slot {
            Slot::Root(_) => {
                let start = match self.first_content()? {
                    Some(line) => line,
                    None => self.body_start()?,
                };
                let lines = if is_block(value) {
                    block_lines(value, 0)?
                } else {
                    vec![render_scalar(value)]
                };
                Ok(Splice {
                    start,
                    end: self.lines.len(),
                    lines,
                })
            }
            Slot::Entry(entry) => {
                let line = &self.lines[entry.line];
                let head = &line[..entry.colon + 1];
                let (_, comment) = split_comment(&line[entry.colon + 1..]);
                let lines = if is_block(value) {
                    let mut lines = vec![format!("{}{}", head, comment)];
                    lines.extend(block_lines(value, entry.col + 2)?);
                    lines
                } else {
                    vec![format!("{} {}{}", head, render_scalar(value), comment)]
                };
                Ok(Splice {
                    start: entry.line,
                    end: entry.end,
                    lines,
                })
            }
            Slot::Item(item) => {
                let line = &self.lines[item.line];
                let head = &line[..item.col + 1];
                let (inline, comment) = split_comment(&line[item.col + 1..]);
                let comment = match item.value {
                    Node::Map(..) | Node::Seq(..) if !inline.trim().is_empty() => "",
                    _ => comment,
                };
                let lines = if is_block(value) {
                    let block = block_lines(value, item.col + 2)?;
                    if comment.is_empty() {
                        merge_first(head, block)
                    } else {
                        let mut lines = vec![format!("{}{}", head, comment)];
                        lines.extend(block);
                        lines
                    }
                } else {
                    vec![format!("{} {}{}", head, render_scalar(value), comment)]
                };
                Ok(Splice {
                    start: item.line,
                    end: item.end,
                    lines,
                })
            }
        }
    }
}

fn locate<'n>(root: &'n Node, tokens: &[String]) -> Result<Vec<Slot<'n>>, EditError> {
    let mut chain = vec![Slot::Root(root)];
    for token in tokens {
        let next = child(chain[chain.len() - 1].node(), token)?;
        chain.push(next);
    }
    Ok(chain)
}

fn child<'n>(node: &'n Node, token: &str) -> Result<Slot<'n>, EditError> {
    match node {
        Node::Map(entries, _) => entries
            .iter()
            .find(|e| e.key == token)
            .map(Slot::Entry)
            .ok_or_else(|| EditError::Invalid(format!("path segment '{}' not found", token))),
        Node::Seq(items, _) => {
            let idx = parse_index(token, items.len(), false)?;
            Ok(Slot::Item(&items[idx]))
        }
        Node::Flow => Err(EditError::Unsupported("flow collection".to_string())),
        Node::Null | Node::Scalar => Err(EditError::Invalid(format!(
            "cannot address '{}' inside a scalar",
            token
        ))),
    }
}

fn parse_index(token: &str, len: usize, allow_end: bool) -> Result<usize, EditError> {
    if token == "-" && allow_end {
        return Ok(len);
    }
    let valid = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    let idx = if valid { token.parse::<usize>().ok() } else { None };
    match idx {
        Some(idx) if idx < len || (allow_end && idx == len) => Ok(idx),
        _ => Err(EditError::Invalid(format!("invalid sequence index '{}'", token))),
    }
}

fn classify_inline(value: &str, has_children: bool) -> Result<Node, EditError> {
    if value.starts_with(['|', '>']) {
        return Ok(Node::Scalar);
    }
    if value.starts_with(['&', '*', '!']) {
        return Err(EditError::Unsupported(format!(
            "anchors, aliases and tags ({})",
            value
        )));
    }
    if value.starts_with(['{', '[']) {
        return Ok(Node::Flow);
    }
    if has_children {
        return Err(EditError::Unsupported("multi-line scalar".to_string()));
    }
    Ok(Node::Scalar)
}

fn is_content(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_dash(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

/// Parse a block mapping key; returns the key and the offset of its `:`.
fn parse_key(text: &str) -> Option<(String, usize)> {
    let (key, after_key) = match text.as_bytes().first().copied()? {
        b'"' => {
            let close = closing_double(text)?;
            let key: String = serde_json::from_str(&text[..=close]).ok()?;
            (key, close + 1)
        }
        b'\'' => {
            let close = closing_single(text)?;
            (text[1..close].replace("''", "'"), close + 1)
        }
        b'[' | b'{' | b'#' | b'&' | b'*' | b'!' | b'|' | b'>' | b'?' | b'%' | b'@' | b'`' => {
            return None
        }
        _ if is_dash(text) => return None,
        _ => {
            let mut prev_space = false;
            for (idx, ch) in text.char_indices() {
                if ch == '#' && prev_space {
                    return None;
                }
                if ch == ':' && text[idx + 1..].chars().next().map_or(true, |c| c == ' ') {
                    let key = text[..idx].trim_end();
                    if key.is_empty() {
                        return None;
                    }
                    return Some((key.to_string(), idx));
                }
                prev_space = ch == ' ';
            }
            return None;
        }
    };

    let rest = &text[after_key..];
    let pad = rest.len() - rest.trim_start_matches(' ').len();
    let after = &rest[pad..];
    if after.starts_with(':') && after[1..].chars().next().map_or(true, |c| c == ' ') {
        Some((key, after_key + pad))
    } else {
        None
    }
}

fn closing_double(text: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, b) in text.bytes().enumerate().skip(1) {
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b'"' {
            return Some(idx);
        }
    }
    None
}

fn closing_single(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut idx = 1;
    while idx < bytes.len() {
        if bytes[idx] == b'\'' {
            if bytes.get(idx + 1) == Some(&b'\'') {
                idx += 2;
                continue;
            }
            return Some(idx);
        }
        idx += 1;
    }
    None
}

/// Split a value from its trailing comment. The comment keeps the
/// whitespace that separated it from the value.
fn split_comment(s: &str) -> (&str, &str) {
    let lead = s.len() - s.trim_start().len();
    let body = &s[lead..];
    let scan_from = match body.as_bytes().first().copied() {
        Some(b'"') => closing_double(body).map(|c| lead + c + 1),
        Some(b'\'') => closing_single(body).map(|c| lead + c + 1),
        _ => Some(lead),
    }
    .unwrap_or(s.len());

    let bytes = s.as_bytes();
    for idx in scan_from..bytes.len() {
        if bytes[idx] == b'#' && (idx == 0 || bytes[idx - 1] == b' ' || bytes[idx - 1] == b'\t') {
            let value = s[..idx].trim_end();
            return (value, &s[value.len()..]);
        }
    }
    (s.trim_end(), "")
}

fn is_block(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

/// Render a value that fits on one line.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => render_string(s),
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Array(items) if items.is_empty() => "[]".to_string(),
        // JSON flow syntax is valid YAML
        other => other.to_string(),
    }
}

/// Plain style when the text reads back as the same string, otherwise
/// a double-quoted (JSON) string.
fn render_string(s: &str) -> String {
    const INDICATORS: &[char] = &[
        ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@', '`',
    ];
    let plain = !s.is_empty()
        && s.trim() == s
        && !s.contains('\n')
        && !s.starts_with(INDICATORS)
        && !matches!(s, "-" | "?" | ":")
        && !s.starts_with("- ")
        && !s.starts_with("? ")
        && !s.starts_with(": ")
        && !s.contains(": ")
        && !s.contains(" #")
        && !s.ends_with(':')
        && !is_yaml11_scalar(s)
        && matches!(
            serde_yaml::from_str::<serde_yaml::Value>(s),
            Ok(serde_yaml::Value::String(ref parsed)) if parsed == s
        );
    if plain {
        s.to_string()
    } else {
        Value::String(s.to_string()).to_string()
    }
}

/// Plain text a YAML 1.1 reader (Helm's) resolves to a bool, null or
/// number even though YAML 1.2 keeps it a string.
fn is_yaml11_scalar(s: &str) -> bool {
    const WORDS: &[&str] = &["y", "n", "yes", "no", "on", "off", "true", "false", "null", "~"];
    if WORDS.iter().any(|word| s.eq_ignore_ascii_case(word)) {
        return true;
    }

    let digits = |text: &str, radix: u32| {
        text.chars().any(|c| c.is_digit(radix))
            && text.chars().all(|c| c == '_' || c.is_digit(radix))
    };
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    let lower = unsigned.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("0b") {
        return digits(rest, 2);
    }
    if let Some(rest) = lower.strip_prefix("0o") {
        return digits(rest, 8);
    }
    if let Some(rest) = lower.strip_prefix("0x") {
        return digits(rest, 16);
    }
    // Decimal and leading-zero octal, with `_` separators
    if unsigned.starts_with(|c: char| c.is_ascii_digit()) && digits(unsigned, 10) {
        return true;
    }
    // Sexagesimal, e.g. 1:30 or 190:20:30.15
    let mut parts = unsigned.split(':');
    let head = parts.next().unwrap_or_default();
    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return false;
    };
    let (last, fraction) = last.split_once('.').unwrap_or((*last, ""));
    let base60 = |part: &str| part.len() <= 2 && digits(part, 10);
    head.starts_with(|c: char| c.is_ascii_digit())
        && digits(head, 10)
        && middle.iter().all(|part| base60(part))
        && base60(last)
        && (fraction.is_empty() || digits(fraction, 10))
}

/// Render a non-empty collection as block YAML indented by `indent`.
fn block_lines(value: &Value, indent: usize) -> Result<Vec<String>, EditError> {
    let rendered = serde_yaml::to_string(value)
        .map_err(|e| EditError::Invalid(format!("cannot render value: {}", e)))?;
    let rendered = rendered.strip_prefix("---\n").unwrap_or(&rendered);
    let pad = " ".repeat(indent);
    Ok(rendered
        .lines()
        .map(|l| {
            if l.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, l)
            }
        })
        .collect())
}

/// `- ` followed by the first block line; the rest stay as rendered.
fn merge_first(head: &str, block: Vec<String>) -> Vec<String> {
    let mut lines = Vec::with_capacity(block.len());
    let mut iter = block.into_iter();
    if let Some(first) = iter.next() {
        lines.push(format!("{} {}", head, first.trim_start()));
    }
    lines.extend(iter);
    lines
}

fn render_entry(indent: usize, key: &str, value: &Value) -> Result<Vec<String>, EditError> {
    let head = format!("{}{}:", " ".repeat(indent), render_string(key));
    if is_block(value) {
        let mut lines = vec![head];
        lines.extend(block_lines(value, indent + 2)?);
        Ok(lines)
    } else {
        Ok(vec![format!("{} {}", head, render_scalar(value))])
    }
}

fn render_item(indent: usize, value: &Value) -> Result<Vec<String>, EditError> {
    let head = format!("{}-", " ".repeat(indent));
    if is_block(value) {
        Ok(merge_first(&head, block_lines(value, indent + 2)?))
    } else {
        Ok(vec![format!("{} {}", head, render_scalar(value))])
    }
}
