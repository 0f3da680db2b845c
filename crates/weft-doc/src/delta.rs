//! Externally observable changes.

use crate::path::Path;
use serde::{Deserialize, Serialize};
use weft_core::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaKind {
    Created,
    Updated,
    Deleted,
}

/// One change at one path. `value` is the new materialized value, absent
/// for deletions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub kind: DeltaKind,
    pub path: Path,
    pub value: Option<Value>,
}

impl Delta {
    pub fn created(path: Path, value: Value) -> Self {
        Self {
            kind: DeltaKind::Created,
            path,
            value: Some(value),
        }
    }

    pub fn updated(path: Path, value: Value) -> Self {
        Self {
            kind: DeltaKind::Updated,
            path,
            value: Some(value),
        }
    }

    pub fn deleted(path: Path) -> Self {
        Self {
            kind: DeltaKind::Deleted,
            path,
            value: None,
        }
    }
}
