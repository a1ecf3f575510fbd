use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw limit/offset as an outer caller sends them. Signed so that negative
/// input can be rejected instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }

    /// Validated `(limit, offset)`, with the limit clamped to [`MAX_PAGE_SIZE`].
    pub fn check(&self) -> Result<(u64, u64), String> {
        if self.limit <= 0 {
            return Err(format!("limit must be positive, got {}", self.limit));
        }
        if self.offset < 0 {
            return Err(format!("offset must not be negative, got {}", self.offset));
        }
        Ok((self.limit.min(MAX_PAGE_SIZE) as u64, self.offset as u64))
    }
}

/// 1-based page number and page count for a checked limit/offset.
pub fn page_info(total: u64, limit: u64, offset: u64) -> (u64, u64) {
    if limit == 0 {
        return (1, 0);
    }
    (offset / limit + 1, total.div_ceil(limit))
}
