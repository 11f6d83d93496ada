use crate::{
    record::{
        AuthenticationRecord, CommentRecord, CredentialsRecord, FullPostRecord, GroupRecord,
        UserRecord,
    },
    storage::{DbError, Result, Storage},
};
use async_trait::async_trait;
use inkwell_common::{
    model::{
        Id,
        auth::{AuthTokenHash, Authentication},
        comment::{Comment, CreateComment},
        feed::FeedScope,
        follow::Follow,
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{CreatePost, Post, PostContent, PostMarker},
        user::{CreateUser, User, UserCredentials, UserMarker, Username},
    },
    pagination::PageWindow,
};
use sqlx::{PgPool, Postgres, QueryBuilder, migrate::Migrator, postgres::PgPoolOptions};
use tracing::{debug, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const POST_COLUMNS: &str = "
    p.post_id,
    p.text,
    p.image,
    p.created_at,
    u.user_id,
    u.username,
    g.group_id,
    g.title AS group_title,
    g.slug AS group_slug,
    g.description AS group_description
";

const POST_JOINS: &str = "
    JOIN users.users AS u ON u.user_id = p.user_id
    LEFT JOIN posts.groups AS g ON g.group_id = p.group_id
";

fn unique_violation(err: sqlx::Error, conflict: impl FnOnce() -> DbError) -> DbError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => conflict(),
        _ => err.into(),
    }
}

fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: FeedScope) {
    match scope {
        FeedScope::All => {}
        FeedScope::Group(group_id) => {
            builder.push(" WHERE p.group_id = ").push_bind(group_id.get());
        }
        FeedScope::Author(user_id) => {
            builder.push(" WHERE p.user_id = ").push_bind(user_id.get());
        }
        FeedScope::FollowedBy(user_id) => {
            builder
                .push(" WHERE p.user_id IN (SELECT f.author_id FROM posts.follows AS f WHERE f.user_id = ")
                .push_bind(user_id.get())
                .push(")");
        }
    }
}

/// PostgreSQL-backed [`Storage`].
pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!(migrations = MIGRATOR.iter().count(), "Database schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl Storage for DbClient {
    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (username, password_salt, password_hash)
            VALUES ($1, $2, $3)
            RETURNING user_id, username
            ",
        )
        .bind(user.username.get())
        .bind(user.password_hash.salt())
        .bind(user.password_hash.hash())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| unique_violation(err, || DbError::UsernameTaken(user.username.clone())))?;

        Ok(User::try_from(record)?)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "
            SELECT user_id, username
            FROM users.users
            WHERE user_id = $1
            ",
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "
            SELECT user_id, username
            FROM users.users
            WHERE username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<UserCredentials>> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "
            SELECT user_id, username, password_salt, password_hash
            FROM users.users
            WHERE username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(UserCredentials::try_from).transpose()?;
        Ok(credentials)
    }

    async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users.users WHERE user_id = $1")
            .bind(user_id.get())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        debug!(%user_id, deleted, "Deleted user with their posts, comments and follows");
        Ok(deleted)
    }

    async fn create_authentication(&self, authentication: &Authentication) -> Result<()> {
        sqlx::query(
            "
            INSERT INTO users.authentications
                (token_hash, user_id, created_at, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&authentication.token_hash.0[..])
        .bind(authentication.user.get())
        .bind(authentication.created_at)
        .bind(
            authentication
                .expires_after
                .map(|duration| duration.get().whole_seconds()),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_authentication(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<Authentication>> {
        let record = sqlx::query_as::<_, AuthenticationRecord>(
            "
            SELECT user_id, token_hash, created_at, expires_after_seconds
            FROM users.authentications
            WHERE token_hash = $1
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }

    async fn create_group(&self, group: &CreateGroup) -> Result<Group> {
        let record = sqlx::query_as::<_, GroupRecord>(
            "
            INSERT INTO posts.groups (title, slug, description)
            VALUES ($1, $2, $3)
            RETURNING group_id, title, slug, description
            ",
        )
        .bind(&group.title)
        .bind(group.slug.get())
        .bind(&group.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| unique_violation(err, || DbError::GroupSlugTaken(group.slug.clone())))?;

        Ok(Group::try_from(record)?)
    }

    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        let record = sqlx::query_as::<_, GroupRecord>(
            "
            SELECT group_id, title, slug, description
            FROM posts.groups
            WHERE slug = $1
            ",
        )
        .bind(slug.get())
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let records = sqlx::query_as::<_, GroupRecord>(
            "
            SELECT group_id, title, slug, description
            FROM posts.groups
            ORDER BY title, group_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let groups = records
            .into_iter()
            .map(Group::try_from)
            .collect::<Result<_, _>>()?;
        Ok(groups)
    }

    async fn delete_group(&self, group_id: Id<GroupMarker>) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts.groups WHERE group_id = $1")
            .bind(group_id.get())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        debug!(%group_id, deleted, "Deleted group; its posts are now ungrouped");
        Ok(deleted)
    }

    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let record = sqlx::query_as::<_, FullPostRecord>(&format!(
            "
            WITH p AS (
                INSERT INTO posts.posts (user_id, group_id, text, image)
                VALUES ($1, $2, $3, $4)
                RETURNING *
            )
            SELECT {POST_COLUMNS}
            FROM p {POST_JOINS}
            "
        ))
        .bind(post.author.get())
        .bind(post.content.group.map(Id::get))
        .bind(post.content.text.get())
        .bind(post.content.image.as_ref().map(|image| image.get()))
        .fetch_one(&self.pool)
        .await?;

        Ok(Post::try_from(record)?)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = sqlx::query_as::<_, FullPostRecord>(&format!(
            "
            SELECT {POST_COLUMNS}
            FROM posts.posts AS p {POST_JOINS}
            WHERE p.post_id = $1
            "
        ))
        .bind(post_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>> {
        let record = sqlx::query_as::<_, FullPostRecord>(&format!(
            "
            WITH p AS (
                UPDATE posts.posts
                SET group_id = $2, text = $3, image = $4
                WHERE post_id = $1
                RETURNING *
            )
            SELECT {POST_COLUMNS}
            FROM p {POST_JOINS}
            "
        ))
        .bind(post_id.get())
        .bind(content.group.map(Id::get))
        .bind(content.text.get())
        .bind(content.image.as_ref().map(|image| image.get()))
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts.posts WHERE post_id = $1")
            .bind(post_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_posts(&self, scope: FeedScope) -> Result<u64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM posts.posts AS p");
        push_scope(&mut builder, scope);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(count.cast_unsigned())
    }

    async fn fetch_posts(&self, scope: FeedScope, window: PageWindow) -> Result<Vec<Post>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {POST_COLUMNS} FROM posts.posts AS p {POST_JOINS}"
        ));
        push_scope(&mut builder, scope);
        builder
            .push(" ORDER BY p.created_at DESC, p.post_id DESC LIMIT ")
            .push_bind(window.limit().cast_signed())
            .push(" OFFSET ")
            .push_bind(window.offset().cast_signed());

        let records = builder
            .build_query_as::<FullPostRecord>()
            .fetch_all(&self.pool)
            .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let record = sqlx::query_as::<_, CommentRecord>(
            "
            WITH c AS (
                INSERT INTO posts.comments (post_id, user_id, text)
                VALUES ($1, $2, $3)
                RETURNING *
            )
            SELECT c.comment_id, c.post_id, c.text, c.created_at, u.user_id, u.username
            FROM c JOIN users.users AS u ON u.user_id = c.user_id
            ",
        )
        .bind(comment.post.get())
        .bind(comment.author.get())
        .bind(comment.text.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(Comment::try_from(record)?)
    }

    async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = sqlx::query_as::<_, CommentRecord>(
            "
            SELECT c.comment_id, c.post_id, c.text, c.created_at, u.user_id, u.username
            FROM posts.comments AS c JOIN users.users AS u ON u.user_id = c.user_id
            WHERE c.post_id = $1
            ORDER BY c.created_at, c.comment_id
            ",
        )
        .bind(post_id.get())
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    async fn follow_exists(&self, follow: Follow) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "
            SELECT EXISTS (
                SELECT 1 FROM posts.follows WHERE user_id = $1 AND author_id = $2
            )
            ",
        )
        .bind(follow.user().get())
        .bind(follow.author().get())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn create_follow(&self, follow: Follow) -> Result<bool> {
        let result = sqlx::query(
            "
            INSERT INTO posts.follows (user_id, author_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(follow.user().get())
        .bind(follow.author().get())
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        if !created {
            debug!(%follow, "Follow already existed");
        }
        Ok(created)
    }

    async fn delete_follow(&self, follow: Follow) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts.follows WHERE user_id = $1 AND author_id = $2")
            .bind(follow.user().get())
            .bind(follow.author().get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
