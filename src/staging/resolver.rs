//! Lookup of a record's staged descriptor inside the staging tree.

use super::{StagedFile, StagedValue};
use crate::core::{Result, UploadError};

/// What a record's staging slot resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    NotFound,
    Single(&'a StagedFile),
    /// Descriptors supplied as a list, in submission order.
    Many(Vec<&'a StagedFile>),
}

impl<'a> Resolution<'a> {
    pub fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    /// Descriptor bound to `position` of a collection; a single descriptor
    /// only binds position zero.
    pub fn at(&self, position: usize) -> Option<&'a StagedFile> {
        match self {
            Self::NotFound => None,
            Self::Single(file) => (position == 0).then_some(*file),
            Self::Many(files) => files.get(position).copied(),
        }
    }
}

/// Walks `keys` through `staging` and returns the node at the end.
///
/// Map nodes are entered by key and list nodes by decimal position. A
/// missing key, or a leaf reached before the keys run out, yields
/// `Ok(None)`. An empty key sequence has no meaning and is rejected.
pub fn resolve<'a, S: AsRef<str>>(
    staging: &'a StagedValue,
    keys: &[S],
) -> Result<Option<&'a StagedValue>> {
    if keys.is_empty() {
        return Err(UploadError::InvalidDescriptorPath(
            "key sequence must not be empty".to_string(),
        ));
    }

    let mut current = staging;
    for key in keys {
        let key = key.as_ref();
        let next = match current {
            StagedValue::Map(entries) => entries.get(key),
            StagedValue::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            StagedValue::Scalar(_) | StagedValue::File(_) => None,
        };
        match next {
            Some(node) => current = node,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}

/// Like [`resolve`], but a missing node is an error.
pub fn require<'a, S: AsRef<str>>(staging: &'a StagedValue, keys: &[S]) -> Result<&'a StagedValue> {
    resolve(staging, keys)?.ok_or_else(|| UploadError::DescriptorNotFound(join_keys(keys)))
}

/// Resolves `keys` and interprets the node as one or many descriptors.
///
/// Submissions the transport marked as empty are skipped, so an empty file
/// input behaves exactly like an absent one.
pub fn resolve_descriptors<'a, S: AsRef<str>>(
    staging: &'a StagedValue,
    keys: &[S],
) -> Result<Resolution<'a>> {
    let Some(node) = resolve(staging, keys)? else {
        return Ok(Resolution::NotFound);
    };

    match node {
        StagedValue::File(file) if file.is_empty_submission() => Ok(Resolution::NotFound),
        StagedValue::File(file) => Ok(Resolution::Single(file)),
        StagedValue::List(items) => {
            let mut files = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    StagedValue::File(file) => files.push(file),
                    other => {
                        return Err(UploadError::MalformedDescriptor(
                            format!("{}[{}]", join_keys(keys), i),
                            format!("expected a staged file, found {}", node_name(other)),
                        ));
                    }
                }
            }
            // Empty submissions keep their position so later siblings stay aligned.
            if files.iter().all(|f| f.is_empty_submission()) {
                return Ok(Resolution::NotFound);
            }
            Ok(Resolution::Many(files))
        }
        other => Err(UploadError::MalformedDescriptor(
            join_keys(keys),
            format!("expected a staged file, found {}", node_name(other)),
        )),
    }
}

fn node_name(value: &StagedValue) -> &'static str {
    match value {
        StagedValue::Scalar(_) => "a scalar",
        StagedValue::File(_) => "a staged file",
        StagedValue::List(_) => "a list",
        StagedValue::Map(_) => "a map",
    }
}

pub(crate) fn join_keys<S: AsRef<str>>(keys: &[S]) -> String {
    keys.iter().map(|k| k.as_ref()).collect::<Vec<_>>().join(".")
}
