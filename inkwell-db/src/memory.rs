//! In-process [`Storage`] used by tests and for running the server without a database.

use crate::storage::{DbError, Result, Storage};
use async_trait::async_trait;
use inkwell_common::{
    model::{
        Id, NonBlankText,
        auth::{AuthTokenHash, Authentication, PasswordHash},
        comment::{Comment, CommentMarker, CreateComment},
        feed::FeedScope,
        follow::Follow,
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{CreatePost, Post, PostContent, PostImage, PostMarker},
        user::{CreateUser, User, UserCredentials, UserMarker, Username},
    },
    pagination::PageWindow,
};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, HashMap},
};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone, Debug)]
struct UserRow {
    username: Username,
    password_hash: PasswordHash,
}

#[derive(Clone, Debug)]
struct PostRow {
    author: Id<UserMarker>,
    group: Option<Id<GroupMarker>>,
    text: NonBlankText,
    image: Option<PostImage>,
    created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
struct CommentRow {
    post: Id<PostMarker>,
    author: Id<UserMarker>,
    text: NonBlankText,
    created_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct Tables {
    last_id: i64,
    users: BTreeMap<Id<UserMarker>, UserRow>,
    authentications: HashMap<AuthTokenHash, Authentication>,
    groups: BTreeMap<Id<GroupMarker>, Group>,
    posts: BTreeMap<Id<PostMarker>, PostRow>,
    comments: BTreeMap<Id<CommentMarker>, CommentRow>,
    follows: BTreeSet<Follow>,
}

impl Tables {
    fn next_id<Marker>(&mut self) -> Id<Marker> {
        self.last_id += 1;
        Id::new(self.last_id)
    }

    fn user(&self, user_id: Id<UserMarker>) -> Option<User> {
        self.users.get(&user_id).map(|row| User {
            id: user_id,
            username: row.username.clone(),
        })
    }

    fn user_by_username(&self, username: &Username) -> Option<(Id<UserMarker>, &UserRow)> {
        self.users
            .iter()
            .find(|(_, row)| &row.username == username)
            .map(|(id, row)| (*id, row))
    }

    fn post(&self, post_id: Id<PostMarker>, row: &PostRow) -> Result<Post> {
        let author = self
            .user(row.author)
            .ok_or_else(|| DbError::MissingReference(format!("author of post {post_id}")))?;

        Ok(Post {
            id: post_id,
            author,
            group: row.group.and_then(|group_id| self.groups.get(&group_id).cloned()),
            text: row.text.clone(),
            image: row.image.clone(),
            created_at: row.created_at,
        })
    }

    fn comment(
        &self,
        comment_id: Id<CommentMarker>,
        row: &CommentRow,
    ) -> Result<Comment> {
        let author = self
            .user(row.author)
            .ok_or_else(|| DbError::MissingReference(format!("author of comment {comment_id}")))?;

        Ok(Comment {
            id: comment_id,
            post: row.post,
            author,
            text: row.text.clone(),
            created_at: row.created_at,
        })
    }

    fn in_scope(&self, scope: FeedScope, row: &PostRow) -> bool {
        match scope {
            FeedScope::All => true,
            FeedScope::Group(group_id) => row.group == Some(group_id),
            FeedScope::Author(user_id) => row.author == user_id,
            FeedScope::FollowedBy(user_id) => {
                Follow::new(user_id, row.author).is_some_and(|follow| self.follows.contains(&follow))
            }
        }
    }

    fn check_group(&self, group: Option<Id<GroupMarker>>) -> Result<()> {
        match group {
            Some(group_id) if !self.groups.contains_key(&group_id) => {
                Err(DbError::MissingReference(format!("group {group_id}")))
            }
            _ => Ok(()),
        }
    }

    fn remove_post(&mut self, post_id: Id<PostMarker>) -> bool {
        self.comments.retain(|_, comment| comment.post != post_id);
        self.posts.remove(&post_id).is_some()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.user_by_username(&user.username).is_some() {
            return Err(DbError::UsernameTaken(user.username.clone()));
        }

        let id = tables.next_id();
        tables.users.insert(
            id,
            UserRow {
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
            },
        );

        Ok(User {
            id,
            username: user.username.clone(),
        })
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        Ok(self.tables.read().await.user(user_id))
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .user_by_username(username)
            .and_then(|(id, _)| tables.user(id)))
    }

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<UserCredentials>> {
        let tables = self.tables.read().await;
        Ok(tables
            .user_by_username(username)
            .map(|(id, row)| UserCredentials {
                user: User {
                    id,
                    username: row.username.clone(),
                },
                password_hash: row.password_hash.clone(),
            }))
    }

    async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&user_id).is_none() {
            return Ok(false);
        }

        let owned_posts: Vec<_> = tables
            .posts
            .iter()
            .filter(|(_, post)| post.author == user_id)
            .map(|(id, _)| *id)
            .collect();
        debug!(%user_id, posts = owned_posts.len(), "Removing user and everything they own");
        for post_id in owned_posts {
            tables.remove_post(post_id);
        }
        tables.comments.retain(|_, comment| comment.author != user_id);
        tables
            .follows
            .retain(|follow| follow.user() != user_id && follow.author() != user_id);
        tables
            .authentications
            .retain(|_, authentication| authentication.user != user_id);

        Ok(true)
    }

    async fn create_authentication(&self, authentication: &Authentication) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&authentication.user) {
            return Err(DbError::MissingReference(format!(
                "user {}",
                authentication.user
            )));
        }

        tables
            .authentications
            .insert(authentication.token_hash.clone(), authentication.clone());
        Ok(())
    }

    async fn fetch_authentication(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<Authentication>> {
        Ok(self
            .tables
            .read()
            .await
            .authentications
            .get(token_hash)
            .cloned())
    }

    async fn create_group(&self, group: &CreateGroup) -> Result<Group> {
        let mut tables = self.tables.write().await;
        if tables.groups.values().any(|existing| existing.slug == group.slug) {
            return Err(DbError::GroupSlugTaken(group.slug.clone()));
        }

        let group = Group {
            id: tables.next_id(),
            title: group.title.clone(),
            slug: group.slug.clone(),
            description: group.description.clone(),
        };
        tables.groups.insert(group.id, group.clone());

        Ok(group)
    }

    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        Ok(self
            .tables
            .read()
            .await
            .groups
            .values()
            .find(|group| &group.slug == slug)
            .cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let mut groups: Vec<_> = self.tables.read().await.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn delete_group(&self, group_id: Id<GroupMarker>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.groups.remove(&group_id).is_none() {
            return Ok(false);
        }

        let mut ungrouped = 0_usize;
        for post in tables.posts.values_mut() {
            if post.group == Some(group_id) {
                post.group = None;
                ungrouped += 1;
            }
        }
        debug!(%group_id, ungrouped, "Removed group");
        Ok(true)
    }

    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&post.author) {
            return Err(DbError::MissingReference(format!("user {}", post.author)));
        }
        tables.check_group(post.content.group)?;

        let id = tables.next_id();
        let row = PostRow {
            author: post.author,
            group: post.content.group,
            text: post.content.text.clone(),
            image: post.content.image.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        let created = tables.post(id, &row)?;
        tables.posts.insert(id, row);

        Ok(created)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let tables = self.tables.read().await;
        tables
            .posts
            .get(&post_id)
            .map(|row| tables.post(post_id, row))
            .transpose()
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>> {
        let mut tables = self.tables.write().await;
        tables.check_group(content.group)?;

        let Some(row) = tables.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        row.group = content.group;
        row.text = content.text.clone();
        row.image = content.image.clone();

        let row = row.clone();
        tables.post(post_id, &row).map(Some)
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        Ok(self.tables.write().await.remove_post(post_id))
    }

    async fn count_posts(&self, scope: FeedScope) -> Result<u64> {
        let tables = self.tables.read().await;
        let count = tables
            .posts
            .values()
            .filter(|row| tables.in_scope(scope, row))
            .count();
        Ok(count as u64)
    }

    async fn fetch_posts(&self, scope: FeedScope, window: PageWindow) -> Result<Vec<Post>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .posts
            .iter()
            .filter(|(_, row)| tables.in_scope(scope, row))
            .collect();
        rows.sort_by_key(|(id, row)| Reverse((row.created_at, **id)));

        rows.into_iter()
            .skip(usize::try_from(window.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(window.limit()).unwrap_or(usize::MAX))
            .map(|(id, row)| tables.post(*id, row))
            .collect()
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&comment.post) {
            return Err(DbError::MissingReference(format!("post {}", comment.post)));
        }
        if !tables.users.contains_key(&comment.author) {
            return Err(DbError::MissingReference(format!("user {}", comment.author)));
        }

        let id = tables.next_id();
        let row = CommentRow {
            post: comment.post,
            author: comment.author,
            text: comment.text.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        let created = tables.comment(id, &row)?;
        tables.comments.insert(id, row);

        Ok(created)
    }

    async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .comments
            .iter()
            .filter(|(_, row)| row.post == post_id)
            .collect();
        rows.sort_by_key(|(id, row)| (row.created_at, **id));

        rows.into_iter()
            .map(|(id, row)| tables.comment(*id, row))
            .collect()
    }

    async fn follow_exists(&self, follow: Follow) -> Result<bool> {
        Ok(self.tables.read().await.follows.contains(&follow))
    }

    async fn create_follow(&self, follow: Follow) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&follow.user()) || !tables.users.contains_key(&follow.author())
        {
            return Err(DbError::MissingReference(follow.to_string()));
        }

        let created = tables.follows.insert(follow);
        if !created {
            debug!(%follow, "Follow already existed");
        }
        Ok(created)
    }

    async fn delete_follow(&self, follow: Follow) -> Result<bool> {
        Ok(self.tables.write().await.follows.remove(&follow))
    }
}
