//! Identity atoms.
//!
//! `ObjectId`: address of an object in the content-addressed store. A bug's
//! identity is the `ObjectId` of its root commit.
//! `Author`: attribution for an operation.
//! `Label`: a free-form tag attached to a bug.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Full object ids are 40 lowercase hex characters.
pub const ID_LENGTH: usize = 40;

/// Ids shown to humans are truncated to this many characters.
pub const HUMAN_ID_LENGTH: usize = 7;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("object id `{raw}` is invalid: {reason}")]
pub struct InvalidObjectId {
    pub raw: String,
    pub reason: String,
}

/// Address of a blob, tree or commit in the store; 40 lowercase hex
/// characters. Also the identity of a bug (the hash of its root commit).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidObjectId> {
        let s = s.into();
        if s.len() != ID_LENGTH {
            return Err(InvalidObjectId {
                reason: format!("expected {ID_LENGTH} characters, got {}", s.len()),
                raw: s,
            });
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            return Err(InvalidObjectId {
                raw: s,
                reason: "expected lowercase hex".into(),
            });
        }
        Ok(Self(s))
    }

    /// Only for ids produced by a store backend, which are well-formed by
    /// construction.
    pub(crate) fn new_unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The truncated form shown to humans, e.g. in listings.
    pub fn short(&self) -> &str {
        &self.0[..HUMAN_ID_LENGTH]
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = InvalidObjectId;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        ObjectId::new(s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> String {
        id.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("author `{raw}` is invalid: {reason}")]
pub struct InvalidAuthor {
    pub raw: String,
    pub reason: String,
}

/// Operation attribution. Non-empty after trimming; authors name themselves,
/// identity management is out of scope here.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Author(String);

impl Author {
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidAuthor> {
        let s = s.into();
        if s.trim().is_empty() {
            Err(InvalidAuthor {
                raw: s,
                reason: "empty".into(),
            })
        } else {
            Ok(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Author({:?})", self.0)
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Author {
    type Error = InvalidAuthor;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Author::new(s)
    }
}

impl From<Author> for String {
    fn from(author: Author) -> String {
        author.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("label `{raw}` is invalid: {reason}")]
pub struct InvalidLabel {
    pub raw: String,
    pub reason: String,
}

/// A bug label. Non-empty, no surrounding whitespace.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(String);

impl Label {
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidLabel> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidLabel {
                raw: s,
                reason: "empty".into(),
            });
        }
        if s.trim() != s {
            return Err(InvalidLabel {
                raw: s,
                reason: "leading or trailing whitespace".into(),
            });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({:?})", self.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Label {
    type Error = InvalidLabel;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Label::new(s)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> String {
        label.0
    }
}
