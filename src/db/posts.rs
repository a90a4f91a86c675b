use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::models::{Post, PostCategory};
use super::{new_id, DbPool, Result};

const POST_COLUMNS: &str =
    "id, title, content, excerpt, author, category, image_url, published, created_at, updated_at";

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        excerpt: row.get("excerpt")?,
        author: row.get("author")?,
        category: row.get("category")?,
        image_url: row.get("image_url")?,
        published: row.get("published")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct PostFields {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub author: String,
    pub category: PostCategory,
    pub image_url: Option<String>,
    pub published: bool,
}

pub async fn create_post(pool: &DbPool, fields: PostFields) -> Result<Post> {
    let conn = pool.get()?;
    let now = Utc::now();
    let post = Post {
        id: new_id(),
        title: fields.title,
        content: fields.content,
        excerpt: fields.excerpt,
        author: fields.author,
        category: fields.category,
        image_url: fields.image_url,
        published: fields.published,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO posts (id, title, content, excerpt, author, category, image_url, published,
                            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            post.id,
            post.title,
            post.content,
            post.excerpt,
            post.author,
            post.category,
            post.image_url,
            post.published,
            post.created_at,
            post.updated_at
        ],
    )?;
    Ok(post)
}

pub async fn find_post(pool: &DbPool, id: &str) -> Result<Option<Post>> {
    let conn = pool.get()?;
    let sql = format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS);
    let post = conn.query_row(&sql, params![id], map_post).optional()?;
    Ok(post)
}

/// Published posts, newest first.
pub async fn list_published(pool: &DbPool, category: Option<PostCategory>) -> Result<Vec<Post>> {
    let conn = pool.get()?;
    let sql = format!(
        "SELECT {} FROM posts
         WHERE published = 1 AND (?1 IS NULL OR category = ?1)
         ORDER BY created_at DESC",
        POST_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(params![category], map_post)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(posts)
}

pub async fn update_post(pool: &DbPool, id: &str, fields: PostFields) -> Result<Option<Post>> {
    let changed = {
        let conn = pool.get()?;
        conn.execute(
            "UPDATE posts
             SET title = ?2, content = ?3, excerpt = ?4, author = ?5, category = ?6,
                 image_url = ?7, published = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                id,
                fields.title,
                fields.content,
                fields.excerpt,
                fields.author,
                fields.category,
                fields.image_url,
                fields.published,
                Utc::now()
            ],
        )?
    };
    if changed == 0 {
        return Ok(None);
    }
    find_post(pool, id).await
}

pub async fn delete_post(pool: &DbPool, id: &str) -> Result<bool> {
    let conn = pool.get()?;
    let changed = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(changed == 1)
}
