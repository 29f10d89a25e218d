//! Dotted/indexed field paths
//!
//! A field declares where its value lives in the resource document:
//! `profile.name`, `tags[2].label`, `matrix[0][1]`.

use crate::error::PathError;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Largest array index a path may address
pub const MAX_INDEX: usize = 9_999;

/// One step of a field path
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Segment {
    /// Object member
    Key(String),
    /// Array element
    Index(usize),
}

/// Parsed field path
///
/// Most paths are shallow, so segments live inline.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(SmallVec<[Segment; 4]>);

impl FieldPath {
    /// Parse dotted/indexed notation
    pub fn parse(input: &str) -> Result<Self, PathError> {
        if input.is_empty() {
            return Err(PathError::Empty);
        }

        let bytes = input.as_bytes();
        let mut segments = SmallVec::new();
        let mut i = 0;
        let mut after_dot = false;

        while i < bytes.len() {
            match bytes[i] {
                b'[' if after_dot => {
                    return Err(PathError::EmptySegment {
                        path: input.to_string(),
                        offset: i,
                    });
                }
                b'[' => {
                    let close = input[i + 1..].find(']').ok_or_else(|| {
                        PathError::UnterminatedIndex {
                            path: input.to_string(),
                        }
                    })?;
                    let raw = &input[i + 1..i + 1 + close];
                    segments.push(Segment::Index(parse_index(input, raw)?));
                    i += close + 2;

                    match bytes.get(i) {
                        None | Some(b'[') => {}
                        Some(b'.') => {
                            i += 1;
                            after_dot = true;
                            if i == bytes.len() {
                                return Err(PathError::EmptySegment {
                                    path: input.to_string(),
                                    offset: i,
                                });
                            }
                        }
                        Some(_) => return Err(unexpected(input, i)),
                    }
                }
                b'.' => {
                    return Err(PathError::EmptySegment {
                        path: input.to_string(),
                        offset: i,
                    });
                }
                b']' => return Err(unexpected(input, i)),
                _ => {
                    let end = input[i..]
                        .find(['.', '[', ']'])
                        .map(|pos| i + pos)
                        .unwrap_or(bytes.len());
                    segments.push(Segment::Key(input[i..end].to_string()));
                    i = end;
                    after_dot = false;

                    if bytes.get(i) == Some(&b'.') {
                        i += 1;
                        after_dot = true;
                        if i == bytes.len() {
                            return Err(PathError::EmptySegment {
                                path: input.to_string(),
                                offset: i,
                            });
                        }
                    }
                }
            }
        }

        Ok(Self(segments))
    }

    /// Build a path from already-split segments
    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Result<Self, PathError> {
        let path = Self(segments.into_iter().collect());
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        for segment in path.segments() {
            if let Segment::Index(index) = segment {
                if *index > MAX_INDEX {
                    return Err(PathError::IndexTooLarge {
                        path: path.to_string(),
                        index: index.to_string(),
                        max: MAX_INDEX,
                    });
                }
            }
        }
        Ok(path)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Parsed paths always hold at least one segment
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `prefix` names this path or one of its ancestors
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// True if one path addresses a subtree of the other
    pub fn overlaps(&self, other: &FieldPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// True if the paths need different container types at their shared prefix
    ///
    /// `tags.first` wants `tags` to be an object, `tags[0]` wants an array;
    /// both cannot live in one patch.
    pub fn diverges_in_shape(&self, other: &FieldPath) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .find(|(a, b)| a != b)
            .map_or(false, |pair| {
                matches!(
                    pair,
                    (Segment::Key(_), Segment::Index(_)) | (Segment::Index(_), Segment::Key(_))
                )
            })
    }
}

fn parse_index(path: &str, raw: &str) -> Result<usize, PathError> {
    let invalid = || PathError::InvalidIndex {
        path: path.to_string(),
        index: raw.to_string(),
    };
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let too_large = || PathError::IndexTooLarge {
        path: path.to_string(),
        index: raw.to_string(),
        max: MAX_INDEX,
    };
    // Digits only, so a parse failure here is overflow
    let index: usize = raw.parse().map_err(|_| too_large())?;
    if index > MAX_INDEX {
        return Err(too_large());
    }
    Ok(index)
}

fn unexpected(path: &str, offset: usize) -> PathError {
    PathError::UnexpectedChar {
        path: path.to_string(),
        offset,
        found: path[offset..].chars().next().unwrap_or('\0'),
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => f.write_str(key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldPath({})", self)
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}
