//! Traffic classes and numeric priorities.
//!
//! Every dispatcher belongs to one traffic class. The class maps to a base
//! priority and callers add a free-form offset for ordering inside the class:
//!
//! ```
//! use volley_core::{Priority, compute_priority};
//!
//! assert_eq!(compute_priority(Priority::UserInitiated, 0), 100);
//! assert_eq!(compute_priority(Priority::Background, 5), 25);
//! assert_eq!(Priority::Speculative.with_offset(-3), 7);
//! ```
//!
//! Higher values are admitted first by the default operation queue.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Base traffic classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Requests scheduled explicitly by the caller with its own offset.
    Explicit,
    /// Prefetching of data the user may or may not look at later.
    Speculative,
    /// Work initiated in the background.
    Background,
    /// Requests triggered by a user action, such as clicking an item.
    #[default]
    UserInitiated,
}

impl Priority {
    /// Returns the base priority of the class.
    pub const fn base(self) -> i32 {
        match self {
            Priority::Explicit => 0,
            Priority::Speculative => 10,
            Priority::Background => 20,
            Priority::UserInitiated => 100,
        }
    }

    /// Returns the base priority shifted by `offset`.
    pub const fn with_offset(self, offset: i32) -> i32 {
        self.base().saturating_add(offset)
    }

    /// Returns the class name as used in configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::Explicit => "explicit",
            Priority::Speculative => "speculative",
            Priority::Background => "background",
            Priority::UserInitiated => "user_initiated",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes the numeric priority for a traffic class and offset.
pub const fn compute_priority(class: Priority, offset: i32) -> i32 {
    class.with_offset(offset)
}
