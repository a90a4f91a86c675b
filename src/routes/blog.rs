use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::auth::AdminUser;
use crate::db::models::{Post, PostCategory};
use crate::db::posts::PostFields;
use crate::error::AppError;
use crate::routes::{created, listing, ok, ok_message, ApiResult};
use crate::validation::{ensure_id, is_http_url, Checks, Payload};
use crate::{db, AppState};

#[derive(Deserialize)]
pub struct ListQuery {
    category: Option<String>,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult {
    // Unknown categories fall back to the full feed.
    let category = query.category.as_deref().and_then(|c| c.parse::<PostCategory>().ok());
    let posts = db::posts::list_published(&state.db, category).await?;
    Ok(listing(posts))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    ensure_id(&id)?;
    let post = db::posts::find_post(&state.db, &id)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?;
    Ok(ok(post))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRequest {
    title: Option<String>,
    content: Option<String>,
    excerpt: Option<String>,
    author: Option<String>,
    category: Option<PostCategory>,
    #[serde(rename = "imageURL", alias = "imageUrl")]
    image_url: Option<String>,
    published: Option<bool>,
}

impl PostRequest {
    /// Overlays the request on `base` (a fresh post when creating).
    fn merge(self, base: PostFields) -> PostFields {
        let trimmed = |v: Option<String>, fallback: String| {
            v.map(|s| s.trim().to_string()).unwrap_or(fallback)
        };
        PostFields {
            title: trimmed(self.title, base.title),
            content: trimmed(self.content, base.content),
            excerpt: trimmed(self.excerpt, base.excerpt),
            author: trimmed(self.author, base.author),
            category: self.category.unwrap_or(base.category),
            image_url: match self.image_url {
                Some(url) if url.trim().is_empty() => None,
                Some(url) => Some(url.trim().to_string()),
                None => base.image_url,
            },
            published: self.published.unwrap_or(base.published),
        }
    }
}

fn check_post(fields: &PostFields) -> Result<(), AppError> {
    let mut checks = Checks::new();
    checks
        .require(!fields.title.is_empty(), "title", "Title is required")
        .char_len(&fields.title, "title", 1, 200)
        .require(!fields.content.is_empty(), "content", "Content is required")
        .require(!fields.excerpt.is_empty(), "excerpt", "Excerpt is required")
        .char_len(&fields.excerpt, "excerpt", 1, 500)
        .require(!fields.author.is_empty(), "author", "Author is required");
    if let Some(url) = &fields.image_url {
        checks.require(is_http_url(url), "imageURL", "Image URL must be a valid URL");
    }
    checks.finish()
}

fn fields_of(post: Post) -> PostFields {
    PostFields {
        title: post.title,
        content: post.content,
        excerpt: post.excerpt,
        author: post.author,
        category: post.category,
        image_url: post.image_url,
        published: post.published,
    }
}

pub async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Payload(req): Payload<PostRequest>,
) -> ApiResult {
    let fields = req.merge(PostFields {
        title: String::new(),
        content: String::new(),
        excerpt: String::new(),
        author: String::new(),
        category: PostCategory::Blog,
        image_url: None,
        published: true,
    });
    check_post(&fields)?;

    let post = db::posts::create_post(&state.db, fields).await?;
    tracing::info!(post_id = %post.id, admin_id = %admin.id, "Post created");
    Ok(created(post, "Post created successfully"))
}

pub async fn update(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<PostRequest>,
) -> ApiResult {
    ensure_id(&id)?;
    let existing = db::posts::find_post(&state.db, &id)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?;

    let fields = req.merge(fields_of(existing));
    check_post(&fields)?;

    let post = db::posts::update_post(&state.db, &id, fields)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?;
    tracing::info!(post_id = %post.id, admin_id = %admin.id, "Post updated");
    Ok(ok_message(post, "Post updated successfully"))
}

pub async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    ensure_id(&id)?;
    if !db::posts::delete_post(&state.db, &id).await? {
        return Err(AppError::not_found("Post"));
    }
    tracing::info!(post_id = %id, admin_id = %admin.id, "Post deleted");
    Ok(ok_message(serde_json::json!({ "id": id }), "Post deleted successfully"))
}
