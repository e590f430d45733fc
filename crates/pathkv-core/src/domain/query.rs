//! Query modifiers shared by the GET and PEEK engine calls.

use super::key::Pattern;

/// Timestamp column a time window filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeColumn {
    Created,
    Updated,
}

impl TimeColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeColumn::Created => "created",
            TimeColumn::Updated => "updated",
        }
    }
}

/// Closed window `[from, to]` over one timestamp column.
///
/// Bounds are already encoded as timezone-naive text; engines compare them
/// against their naive columns and never see raw integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub column: TimeColumn,
    pub from: String,
    pub to: String,
}

/// A GET/PEEK request: pattern plus optional window and row limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub pattern: Pattern,
    pub window: Option<TimeWindow>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            window: None,
            limit: None,
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
