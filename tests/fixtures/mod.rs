//! Shared builders for the integration suites.

#![allow(dead_code)]

use burr::{
    AddCommentOp, Author, ChangeLabelsOp, CreateOp, Label, ObjectId, Operation, SetStatusOp,
    SetTitleOp, Status,
};

pub fn author(name: &str) -> Author {
    Author::new(name).unwrap()
}

pub fn create(by: &str, unix_time: i64, title: &str) -> Operation {
    Operation::Create(CreateOp {
        author: author(by),
        unix_time,
        title: title.to_string(),
        message: format!("{title} needs fixing"),
        files: vec![],
    })
}

pub fn comment(by: &str, unix_time: i64, message: &str) -> Operation {
    Operation::AddComment(AddCommentOp {
        author: author(by),
        unix_time,
        message: message.to_string(),
        files: vec![],
    })
}

pub fn comment_with_files(by: &str, unix_time: i64, message: &str, files: Vec<ObjectId>) -> Operation {
    Operation::AddComment(AddCommentOp {
        author: author(by),
        unix_time,
        message: message.to_string(),
        files,
    })
}

pub fn retitle(by: &str, unix_time: i64, title: &str, was: &str) -> Operation {
    Operation::SetTitle(SetTitleOp {
        author: author(by),
        unix_time,
        title: title.to_string(),
        was: was.to_string(),
    })
}

pub fn close(by: &str, unix_time: i64) -> Operation {
    Operation::SetStatus(SetStatusOp {
        author: author(by),
        unix_time,
        status: Status::Closed,
    })
}

pub fn add_labels(by: &str, unix_time: i64, labels: &[&str]) -> Operation {
    Operation::ChangeLabels(ChangeLabelsOp {
        author: author(by),
        unix_time,
        added: labels.iter().map(|l| Label::new(*l).unwrap()).collect(),
        removed: vec![],
    })
}

/// A synthetic 40-hex media hash for stores that don't verify blob
/// existence.
pub fn media(n: u8) -> ObjectId {
    ObjectId::new(format!("{n:040x}")).unwrap()
}
