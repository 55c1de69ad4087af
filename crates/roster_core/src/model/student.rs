//! Student domain model.
//!
//! # Responsibility
//! - Define the persisted student record and its validated write shape.
//! - Own the search matching rule shared by the projection core.
//!
//! # Invariants
//! - `id` is assigned by the store and never changes afterwards.
//! - Persisted `name` and `course` are trimmed and never blank.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned row identifier.
pub type StudentId = i64;

/// Validation failures for student write input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentValidationError {
    /// `name` is empty after trimming.
    EmptyName,
    /// `course` is empty after trimming.
    EmptyCourse,
    /// Persisted `name` carries leading or trailing whitespace.
    UntrimmedName,
    /// Persisted `course` carries leading or trailing whitespace.
    UntrimmedCourse,
}

impl StudentValidationError {
    /// Field name the error refers to, for field-level UI feedback.
    pub fn field(&self) -> &'static str {
        match self {
            Self::EmptyName | Self::UntrimmedName => "name",
            Self::EmptyCourse | Self::UntrimmedCourse => "course",
        }
    }
}

impl Display for StudentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "name cannot be empty"),
            Self::EmptyCourse => write!(f, "course cannot be empty"),
            Self::UntrimmedName => write!(f, "name is not trimmed"),
            Self::UntrimmedCourse => write!(f, "course is not trimmed"),
        }
    }
}

impl Error for StudentValidationError {}

/// Canonical persisted student row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: StudentId,
    pub name: String,
    pub course: String,
}

impl StudentRecord {
    /// Re-checks the persisted-shape invariant on read paths: both fields
    /// non-blank and stored already trimmed.
    pub fn validate(&self) -> Result<(), StudentValidationError> {
        if self.name.trim().is_empty() {
            return Err(StudentValidationError::EmptyName);
        }
        if self.name.trim() != self.name {
            return Err(StudentValidationError::UntrimmedName);
        }
        if self.course.trim().is_empty() {
            return Err(StudentValidationError::EmptyCourse);
        }
        if self.course.trim() != self.course {
            return Err(StudentValidationError::UntrimmedCourse);
        }
        Ok(())
    }

    /// Case-insensitive substring match over `name` and `course`.
    ///
    /// `needle_lower` must already be lowercased; callers filtering a whole
    /// collection fold the term once instead of per record.
    pub fn matches_lowercase(&self, needle_lower: &str) -> bool {
        self.name.to_lowercase().contains(needle_lower)
            || self.course.to_lowercase().contains(needle_lower)
    }

    /// Case-insensitive substring match over `name` and `course`.
    pub fn matches(&self, term: &str) -> bool {
        self.matches_lowercase(&term.to_lowercase())
    }
}

/// Validated, trimmed write input for insert and update.
///
/// The only way to build one is [`StudentDraft::new`], so holding a draft
/// proves the fields passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentDraft {
    name: String,
    course: String,
}

impl StudentDraft {
    /// Trims both fields and rejects blanks. `name` is checked first.
    pub fn new(name: &str, course: &str) -> Result<Self, StudentValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StudentValidationError::EmptyName);
        }
        let course = course.trim();
        if course.is_empty() {
            return Err(StudentValidationError::EmptyCourse);
        }
        Ok(Self {
            name: name.to_string(),
            course: course.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn course(&self) -> &str {
        &self.course
    }
}
