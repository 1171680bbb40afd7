//! Context paths such as `$.attachments[0].type`.
//!
//! The leading `$` is optional; `$` alone is the context root.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path '{path}': {reason}")]
    Syntax { path: String, reason: String },

    #[error("cannot write '{path}': {reason}")]
    Write { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed context path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPath {
    raw: String,
    segments: Vec<Segment>,
}

impl ContextPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let syntax = |reason: &str| PathError::Syntax {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        let rest = if trimmed == "$" {
            ""
        } else if let Some(r) = trimmed.strip_prefix("$.") {
            r
        } else if trimmed.starts_with("$[") {
            &trimmed[1..]
        } else if trimmed.starts_with('$') {
            return Err(syntax("'$' must be followed by '.' or '['"));
        } else if trimmed.is_empty() {
            return Err(syntax("empty path"));
        } else {
            trimmed
        };

        let mut segments = Vec::new();
        let mut key = String::new();
        let mut after_index = false;
        let mut chars = rest.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if key.is_empty() && !after_index {
                        return Err(syntax("empty segment"));
                    }
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    if matches!(chars.peek(), None | Some('.') | Some('[')) {
                        return Err(syntax("empty segment"));
                    }
                    after_index = false;
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            Some(_) => return Err(syntax("index must be a non-negative integer")),
                            None => return Err(syntax("unclosed '['")),
                        }
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| syntax("index must be a non-negative integer"))?;
                    segments.push(Segment::Index(index));
                    if !matches!(chars.peek(), None | Some('.') | Some('[')) {
                        return Err(syntax("unexpected character after ']'"));
                    }
                    after_index = true;
                }
                ']' => return Err(syntax("unmatched ']'")),
                other => {
                    key.push(other);
                    after_index = false;
                }
            }
        }

        if !key.is_empty() {
            segments.push(Segment::Key(key));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Resolve the path against a value.
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key)?,
                (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Write `value` at the path, creating intermediate objects.
    ///
    /// Array indices must already exist, or be exactly one past the end.
    pub fn set(&self, root: &mut Value, value: Value) -> Result<(), PathError> {
        let write_err = |reason: String| PathError::Write {
            path: self.raw.clone(),
            reason,
        };

        let mut current = root;
        for segment in &self.segments {
            current = match segment {
                Segment::Key(key) => {
                    if current.is_null() {
                        *current = Value::Object(serde_json::Map::new());
                    }
                    match current {
                        Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                        other => {
                            return Err(write_err(format!(
                                "'{}' is not an object ({})",
                                key,
                                type_name(other)
                            )))
                        }
                    }
                }
                Segment::Index(index) => match current {
                    Value::Array(items) => {
                        if *index == items.len() {
                            items.push(Value::Null);
                        }
                        let len = items.len();
                        items.get_mut(*index).ok_or_else(|| {
                            write_err(format!("index {} out of range (len {})", index, len))
                        })?
                    }
                    other => {
                        return Err(write_err(format!(
                            "[{}] applied to {}",
                            index,
                            type_name(other)
                        )))
                    }
                },
            };
        }

        *current = value;
        Ok(())
    }
}

impl std::fmt::Display for ContextPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segments() {
        let path = ContextPath::parse("$.attachments[0].type").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("attachments".to_string()),
                Segment::Index(0),
                Segment::Key("type".to_string())
            ]
        );

        let bare = ContextPath::parse("attachments[0].type").unwrap();
        assert_eq!(bare.segments(), path.segments());

        assert!(ContextPath::parse("$").unwrap().is_root());
        assert_eq!(ContextPath::parse("$[2]").unwrap().segments(), &[Segment::Index(2)]);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "$x", "a..b", ".a", "a.", "a[", "a[x]", "a[]", "a]", "a[0]b"] {
            assert!(ContextPath::parse(bad).is_err(), "expected error for {:?}", bad);
        }
    }

    #[test]
    fn test_get() {
        let ctx = json!({
            "subjectFlag": false,
            "attachments": [{"type": "pdf", "filename": "a.pdf"}]
        });

        let get = |p: &str| ContextPath::parse(p).unwrap().get(&ctx).cloned();
        assert_eq!(get("$.subjectFlag"), Some(json!(false)));
        assert_eq!(get("$.attachments[0].type"), Some(json!("pdf")));
        assert_eq!(get("$.attachments[1]"), None);
        assert_eq!(get("$.subjectFlag.nested"), None);
        assert_eq!(get("$"), Some(ctx.clone()));
    }

    #[test]
    fn test_set_creates_objects() {
        let mut ctx = json!({"messageId": "m-1"});
        ContextPath::parse("$.analysis.job.status")
            .unwrap()
            .set(&mut ctx, json!("SUCCEEDED"))
            .unwrap();
        assert_eq!(ctx["analysis"]["job"]["status"], "SUCCEEDED");
        assert_eq!(ctx["messageId"], "m-1");
    }

    #[test]
    fn test_set_array_index() {
        let mut ctx = json!({"items": [1, 2]});
        let path = ContextPath::parse("$.items[2]").unwrap();
        path.set(&mut ctx, json!(3)).unwrap();
        assert_eq!(ctx["items"], json!([1, 2, 3]));

        let far = ContextPath::parse("$.items[7]").unwrap();
        assert!(far.set(&mut ctx, json!(0)).is_err());
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut ctx = json!({"messageId": "m-1"});
        let err = ContextPath::parse("$.messageId.part")
            .unwrap()
            .set(&mut ctx, json!(1))
            .unwrap_err();
        assert!(err.to_string().contains("is not an object"));
    }

    #[test]
    fn test_set_root() {
        let mut ctx = json!({"a": 1});
        ContextPath::parse("$").unwrap().set(&mut ctx, json!({"b": 2})).unwrap();
        assert_eq!(ctx, json!({"b": 2}));
    }
}
