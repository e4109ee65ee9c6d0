use std::cmp::Ordering;
use std::str::FromStr;
use regex::{Regex, RegexBuilder};
use crate::entities::{Post, TagId};

pub const DEFAULT_SORT: &str = "-createdAt";
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

// largest integer a JSON number carries without loss
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
const KEYWORD_SIZE_LIMIT: usize = 1 << 20;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("\"{0}\" is not allowed")]
    UnknownField(String),
    #[error("\"{0}\" is not allowed to be empty")]
    Empty(&'static str),
    #[error("\"{0}\" must be a string")]
    NotAString(&'static str),
    #[error("\"{0}\" must be a number")]
    NotANumber(&'static str),
    #[error("\"{0}\" must be an integer")]
    NotAnInteger(&'static str),
    #[error("\"{0}\" must be a safe number")]
    UnsafeNumber(&'static str),
    #[error("\"{0}\" must be greater than or equal to 1")]
    LessThanOne(&'static str),
    #[error("\"keyword\" is not a valid pattern: {0}")]
    InvalidKeyword(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortField {
    Id,
    Title,
    Desc,
    Image,
    Tags,
    CreatedAt,
    UpdatedAt,
    /// A field posts do not have. Every post compares equal on it.
    Missing(String),
}

impl From<&str> for SortField {
    fn from(s: &str) -> Self {
        match s {
            "id" | "_id" => SortField::Id,
            "title" => SortField::Title,
            "desc" => SortField::Desc,
            "image" => SortField::Image,
            "tags" => SortField::Tags,
            "createdAt" => SortField::CreatedAt,
            "updatedAt" => SortField::UpdatedAt,
            _ => SortField::Missing(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    fn compare(&self, a: &Post, b: &Post) -> Ordering {
        let ordering = match self.field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::Title => a.title.cmp(&b.title),
            SortField::Desc => a.desc.cmp(&b.desc),
            SortField::Image => a.image.cmp(&b.image),
            SortField::Tags => a.tags.cmp(&b.tags),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::Missing(_) => Ordering::Equal,
        };
        if self.descending { ordering.reverse() } else { ordering }
    }
}

/// Space-separated sort keys, `-` prefix for descending, e.g. `"title -createdAt"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder(Vec<SortKey>);

impl SortOrder {
    /// Orders two posts by the sort keys, falling back to their insertion
    /// positions in the direction of the last key.
    pub fn compare(&self, a: (usize, &Post), b: (usize, &Post)) -> Ordering {
        let ordering = self.0.iter()
            .map(|key| key.compare(a.1, b.1))
            .find(|x| x.is_ne())
            .unwrap_or(Ordering::Equal);
        let descending = self.0.last().map(|x| x.descending).unwrap_or(false);
        ordering.then_with(|| {
            let by_position = a.0.cmp(&b.0);
            if descending { by_position.reverse() } else { by_position }
        })
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self(vec![SortKey { field: SortField::CreatedAt, descending: true }])
    }
}

impl FromStr for SortOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let keys: Vec<SortKey> = s.split_whitespace()
            .map(|token| match token.strip_prefix('-') {
                Some(field) => SortKey { field: field.into(), descending: true },
                None => SortKey { field: token.into(), descending: false },
            })
            .collect();
        if keys.is_empty() {
            return Err(QueryError::Empty("sort"));
        }
        Ok(Self(keys))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagFilter {
    #[default]
    Any,
    Only(TagId),
    /// The requested tag does not exist, so no post can match.
    Nothing,
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    keyword: Option<Regex>,
    tag: TagFilter,
}

impl PostFilter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_keyword(mut self, keyword: &str) -> Result<Self, QueryError> {
        let regex = RegexBuilder::new(keyword)
            .case_insensitive(true)
            .size_limit(KEYWORD_SIZE_LIMIT)
            .build()
            .map_err(|e| QueryError::InvalidKeyword(e.to_string()))?;
        self.keyword = Some(regex);
        Ok(self)
    }

    pub fn with_tag(mut self, tag: TagFilter) -> Self {
        self.tag = tag;
        self
    }

    pub fn matches(&self, post: &Post) -> bool {
        let keyword_matches = match &self.keyword {
            Some(regex) => regex.is_match(&post.title) || regex.is_match(&post.desc),
            None => true,
        };
        let tag_matches = match &self.tag {
            TagFilter::Any => true,
            TagFilter::Only(tag_id) => post.tags.contains(tag_id),
            TagFilter::Nothing => false,
        };
        keyword_matches && tag_matches
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPostsQuery {
    pub sort: SortOrder,
    pub page: u64,
    pub limit: u64,
    pub keyword: Option<String>,
    pub tag: Option<String>,
}

impl Default for ListPostsQuery {
    fn default() -> Self {
        Self {
            sort: SortOrder::default(),
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            keyword: None,
            tag: None,
        }
    }
}

impl ListPostsQuery {
    /// Validates raw query pairs. Unknown and repeated keys are rejected.
    pub fn parse(pairs: Vec<(String, String)>) -> Result<Self, QueryError> {
        let mut query = ListPostsQuery::default();
        let mut seen: Vec<String> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let repeated = seen.contains(&key);
            match key.as_str() {
                "sort" => {
                    if repeated { return Err(QueryError::NotAString("sort")); }
                    query.sort = non_empty("sort", &value)?.parse()?;
                }
                "page" => {
                    if repeated { return Err(QueryError::NotANumber("page")); }
                    query.page = positive_integer("page", &value)?;
                }
                "limit" => {
                    if repeated { return Err(QueryError::NotANumber("limit")); }
                    query.limit = positive_integer("limit", &value)?;
                }
                "keyword" => {
                    if repeated { return Err(QueryError::NotAString("keyword")); }
                    query.keyword = Some(non_empty("keyword", &value)?.to_string());
                }
                "tag" => {
                    if repeated { return Err(QueryError::NotAString("tag")); }
                    query.tag = Some(non_empty("tag", &value)?.to_string());
                }
                _ => return Err(QueryError::UnknownField(key.clone())),
            }
            seen.push(key);
        }
        Ok(query)
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

fn non_empty<'a>(field: &'static str, value: &'a str) -> Result<&'a str, QueryError> {
    if value.is_empty() {
        return Err(QueryError::Empty(field));
    }
    Ok(value)
}

fn positive_integer(field: &'static str, value: &str) -> Result<u64, QueryError> {
    let number: f64 = value.trim().parse().map_err(|_| QueryError::NotANumber(field))?;
    if !number.is_finite() {
        return Err(QueryError::NotANumber(field));
    }
    if number.fract() != 0.0 {
        return Err(QueryError::NotAnInteger(field));
    }
    if number.abs() > MAX_SAFE_INTEGER {
        return Err(QueryError::UnsafeNumber(field));
    }
    if number < 1.0 {
        return Err(QueryError::LessThanOne(field));
    }
    Ok(number as u64)
}
