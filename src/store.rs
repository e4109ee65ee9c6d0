use dashmap::DashMap;
use itertools::Itertools;
use tracing::{debug, info};
use crate::entities::*;
use crate::error::StoreError;
use crate::query::{PostFilter, SortOrder};
use crate::storage::{DbOperation, Storage};

/// Document store for tags and posts. Collections live in memory and every
/// mutation is appended to the operation log before it is acknowledged.
pub struct BlogStore {
    storage: Box<dyn Storage>,
    tags: Vec<Tag>,
    tag_ids_by_name: DashMap<String, TagId>,
    tag_positions: DashMap<TagId, usize>,
    posts: Vec<Post>,
}

impl BlogStore {
    pub async fn open(storage: Box<dyn Storage>) -> Result<Self, StoreError> {
        info!("Starting DB import from operation log...");
        let operations = storage.read_all().await?;
        let mut store = Self {
            storage,
            tags: Vec::new(),
            tag_ids_by_name: DashMap::new(),
            tag_positions: DashMap::new(),
            posts: Vec::new(),
        };
        for operation in operations {
            match operation {
                DbOperation::CreateTag { tag } => store.create_tag_no_wal(tag)?,
                DbOperation::CreatePost { post } => store.create_post_no_wal(post)?,
            }
        }
        info!("DB Imported! tags: {}, posts: {}", store.get_tag_count(), store.get_post_count());
        Ok(store)
    }

    pub async fn close(&mut self) -> Result<(), StoreError> {
        info!("Closing DB...");
        self.storage.close().await?;
        info!("DB closed!");
        Ok(())
    }

    pub fn get_tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn get_post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn all_tags(&self) -> Vec<Tag> {
        self.tags.clone()
    }

    pub fn find_tag_by_name(&self, name: &str) -> Option<Tag> {
        let tag_id = self.tag_ids_by_name.get(name).map(|x| *x.value())?;
        self.get_tag_by_id(&tag_id)
    }

    pub fn get_tag_by_id(&self, tag_id: &TagId) -> Option<Tag> {
        let position = self.tag_positions.get(tag_id).map(|x| *x.value())?;
        self.tags.get(position).cloned()
    }

    /// Inserts a tag unless one with the same name exists. This is the unique
    /// index on tag names.
    pub async fn insert_tag(&mut self, name: &str) -> Result<InsertResult<Tag>, StoreError> {
        if let Some(existing) = self.find_tag_by_name(name) {
            return Ok(InsertResult::Existing(existing));
        }
        let tag = Tag { id: TagId::new(), name: name.to_string() };
        self.create_tag_no_wal(tag.clone())?;
        if let Err(err) = self.write_wal(DbOperation::CreateTag { tag: tag.clone() }).await {
            self.rollback_last_tag();
            return Err(err);
        }
        Ok(InsertResult::New(tag))
    }

    pub async fn find_or_create_tag(&mut self, name: &str) -> Result<Tag, StoreError> {
        let tag = self.insert_tag(name).await?.safe_unwrap();
        Ok(tag)
    }

    /// Resolves tag names one at a time, in order, then stores the post.
    /// Tags created along the way stay if a later step fails.
    pub async fn create_post(&mut self, new_post: NewPost) -> Result<Post, StoreError> {
        let mut tag_ids = Vec::with_capacity(new_post.tags.len());
        for tag_name in &new_post.tags {
            let tag = self.find_or_create_tag(tag_name).await?;
            tag_ids.push(tag.id);
        }
        let post = Post::new(new_post.title, new_post.desc, new_post.image, tag_ids);
        self.create_post_no_wal(post.clone())?;
        if let Err(err) = self.write_wal(DbOperation::CreatePost { post: post.clone() }).await {
            self.posts.pop();
            return Err(err);
        }
        Ok(post)
    }

    pub fn count_posts(&self, filter: &PostFilter) -> usize {
        self.posts.iter().filter(|x| filter.matches(x)).count()
    }

    pub fn find_posts(&self, filter: &PostFilter, sort: &SortOrder, skip: u64, limit: u64) -> Vec<Post> {
        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        self.posts.iter()
            .enumerate()
            .filter(|(_, post)| filter.matches(post))
            .sorted_by(|a, b| sort.compare((a.0, a.1), (b.0, b.1)))
            .skip(skip)
            .take(limit)
            .map(|(_, post)| post.clone())
            .collect()
    }

    /// Joins a post's tag ids to their documents. Ids that do not resolve are
    /// skipped.
    pub fn populate(&self, post: Post) -> PopulatedPost {
        let tags = post.tags.iter()
            .filter_map(|tag_id| self.get_tag_by_id(tag_id))
            .collect();
        PopulatedPost {
            id: post.id,
            title: post.title,
            desc: post.desc,
            image: post.image,
            tags,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }

    fn create_tag_no_wal(&mut self, tag: Tag) -> Result<(), StoreError> {
        if self.tag_ids_by_name.contains_key(&tag.name) {
            return Err(StoreError::DuplicateKey(tag.name));
        }
        self.tag_ids_by_name.insert(tag.name.clone(), tag.id);
        self.tag_positions.insert(tag.id, self.tags.len());
        self.tags.push(tag);
        Ok(())
    }

    fn create_post_no_wal(&mut self, post: Post) -> Result<(), StoreError> {
        let dangling = post.tags.iter().find(|tag_id| !self.tag_positions.contains_key(*tag_id));
        if let Some(tag_id) = dangling {
            return Err(StoreError::DanglingReference {
                post_id: post.id.to_string(),
                tag_id: tag_id.to_string(),
            });
        }
        self.posts.push(post);
        Ok(())
    }

    fn rollback_last_tag(&mut self) {
        if let Some(tag) = self.tags.pop() {
            self.tag_ids_by_name.remove(&tag.name);
            self.tag_positions.remove(&tag.id);
        }
    }

    async fn write_wal(&mut self, operation: DbOperation) -> Result<(), StoreError> {
        match &operation {
            DbOperation::CreateTag { tag } => debug!("Writing to WAL: create tag {}", tag.id),
            DbOperation::CreatePost { post } => debug!("Writing to WAL: create post {}", post.id),
        }
        self.storage.write(operation).await?;
        debug!("WAL written!");
        Ok(())
    }
}
