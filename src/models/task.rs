//! Task model
//!
//! A task is a capacity-bounded unit of collaboration. Its participant list is
//! owned by the task registry and only grows through the join operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of descriptive tags on a task
pub const MAX_TAGS: usize = 5;

/// Longest accepted title, in characters (`VARCHAR(255)`)
pub const MAX_TITLE_LEN: usize = 255;

/// Longest accepted description, in characters. Four-byte characters still
/// fit a MySQL `TEXT` column at this length.
pub const MAX_DESCRIPTION_LEN: usize = 16_000;

/// Longest accepted single tag, in characters
pub const MAX_TAG_LEN: usize = 64;

/// Largest capacity the `INT` column can hold
pub const MAX_CAPACITY: u32 = i32::MAX as u32;

/// Task entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Descriptive tags, at most [`MAX_TAGS`]
    pub tags: Vec<String>,
    /// Maximum number of participants (always positive)
    pub capacity: u32,
    /// User who published the task
    pub creator_id: Uuid,
    /// Participants in join order
    pub participants: Vec<Uuid>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task with no participants.
    ///
    /// The creator is not implicitly a participant.
    pub fn new(input: CreateTaskInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            tags: input.tags,
            capacity: input.capacity,
            creator_id: input.creator_id,
            participants: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn remaining_slots(&self) -> u32 {
        let taken = u32::try_from(self.participants.len()).unwrap_or(u32::MAX);
        self.capacity.saturating_sub(taken)
    }
}

/// Input for creating a task
#[derive(Debug, Clone)]
pub struct CreateTaskInput {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub capacity: u32,
    pub creator_id: Uuid,
}

/// Normalize a tag list: trim each tag, drop empty ones and remove duplicates
/// while keeping the first occurrence.
///
/// The result is not truncated; callers decide whether an oversized list is an
/// error or should be cut to [`MAX_TAGS`].
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if tag.is_empty() || normalized.iter().any(|t| t == tag) {
            continue;
        }
        normalized.push(tag.to_string());
    }
    normalized
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn normalized_tags_are_trimmed_unique_and_non_empty(
            tags in prop::collection::vec("[ a-z]{0,8}", 0..12)
        ) {
            let normalized = normalize_tags(&tags);
            for (i, tag) in normalized.iter().enumerate() {
                prop_assert!(!tag.is_empty());
                prop_assert_eq!(tag.trim(), tag.as_str());
                prop_assert!(!normalized[..i].contains(tag));
            }
            prop_assert!(normalized.len() <= tags.len());
        }
    }
}
