//! Listing parameters: pagination, ordering and filters.
//!
//! Sort columns are resolved against a per-entity allow-list at parse time,
//! so the repository can splice them into SQL as static identifiers.

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("unknown sort column: {0}")]
    UnknownSortColumn(String),

    #[error("sort column listed twice: {0}")]
    DuplicateSortColumn(String),

    #[error("limit must be greater than zero")]
    ZeroLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    limit: u64,
    offset: u64,
}

impl Pagination {
    /// Applies the default limit when absent and clamps it to [`MAX_LIMIT`].
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> Result<Self, QueryError> {
        let limit = match limit {
            Some(0) => return Err(QueryError::ZeroLimit),
            Some(limit) => limit.min(MAX_LIMIT),
            None => DEFAULT_LIMIT,
        };
        Ok(Self {
            limit,
            offset: offset.unwrap_or(0),
        })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub column: &'static str,
    pub direction: Direction,
}

/// Ordered list of sort keys; earlier keys take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sorts(Vec<Sort>);

impl Sorts {
    /// Parses `name,-created_at` style input. A leading `-` sorts descending,
    /// an optional leading `+` ascending.
    pub fn parse(raw: &str, allowed: &[&'static str]) -> Result<Self, QueryError> {
        let mut sorts: Vec<Sort> = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (direction, name) = match part.strip_prefix('-') {
                Some(name) => (Direction::Desc, name),
                None => (Direction::Asc, part.strip_prefix('+').unwrap_or(part)),
            };
            let column = allowed
                .iter()
                .copied()
                .find(|c| *c == name)
                .ok_or_else(|| QueryError::UnknownSortColumn(name.to_string()))?;
            if sorts.iter().any(|s| s.column == column) {
                return Err(QueryError::DuplicateSortColumn(name.to_string()));
            }
            sorts.push(Sort { column, direction });
        }
        Ok(Self(sorts))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sort> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameter {
    pub sorts: Sorts,
    pub pagination: Pagination,
}

/// Contact listing filter. `phone_number` matches as a substring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFilter {
    pub phone_number: Option<String>,
}
