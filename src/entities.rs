use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

pub trait EntityKind: Debug + Clone + Copy + PartialEq + Eq + Hash + PartialOrd + Ord + Send + Sync + 'static {
    const NAME: &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PostKind {}

impl EntityKind for TagKind {
    const NAME: &'static str = "tag";
}

impl EntityKind for PostKind {
    const NAME: &'static str = "post";
}

/// Opaque document identifier. UUID v7, so ids sort in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<K: EntityKind> {
    uuid: Uuid,
    kind: PhantomData<K>,
}

pub type TagId = Id<TagKind>;
pub type PostId = Id<PostKind>;

#[derive(thiserror::Error, Debug)]
pub enum IdError {
    #[error("failed to parse {0} id")]
    StringParseError(&'static str),
}

impl<K: EntityKind> Id<K> {
    pub fn new() -> Self {
        Default::default()
    }
}

impl<K: EntityKind> Default for Id<K> {
    fn default() -> Self {
        Self { uuid: Uuid::now_v7(), kind: PhantomData }
    }
}

impl<K: EntityKind> FromStr for Id<K> {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(|_| IdError::StringParseError(K::NAME))?;
        Ok(Self { uuid, kind: PhantomData })
    }
}

impl<K: EntityKind> Display for Id<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uuid.as_simple())
    }
}

impl<K: EntityKind> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl<'de, K: EntityKind> Deserialize<'de> for Id<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let str: String = Deserialize::deserialize(deserializer)?;
        let id = Id::<K>::from_str(str.as_str())
            .map_err(|e| D::Error::custom(e.to_string()))?;
        Ok(id)
    }
}

pub enum InsertResult<T> {
    Existing(T),
    New(T),
}

impl<T> InsertResult<T> {
    pub fn safe_unwrap(self) -> T {
        match self {
            InsertResult::Existing(x) => x,
            InsertResult::New(x) => x,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub desc: String,
    /// Base64 image payload, stored inline.
    pub image: String,
    pub tags: Vec<TagId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Same as Post, but with tags resolved to full documents
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedPost {
    pub id: PostId,
    pub title: String,
    pub desc: String,
    pub image: String,
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub desc: String,
    pub image: String,
    pub tags: Vec<String>,
}

impl Post {
    pub fn new(title: String, desc: String, image: String, tags: Vec<TagId>) -> Self {
        let now = Utc::now();
        Self {
            id: PostId::new(),
            title,
            desc,
            image,
            tags,
            created_at: now,
            updated_at: now,
        }
    }
}
