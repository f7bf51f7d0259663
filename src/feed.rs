//! Denormalized post listing: every post joined with its owner, its comments
//! and each comment's author.
//!
//! The whole collection is read on every call; there is no pagination.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::db::Db;
use crate::models::models::{Post, UserSummary};

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FeedComment {
    pub id: String,
    pub comment: String,
    pub commented_by: Option<UserSummary>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FeedPost {
    pub id: String,
    pub content: String,
    pub image: Option<String>,
    pub owner: Option<UserSummary>,
    pub comments: Vec<FeedComment>,
    pub comments_count: usize,
    pub likes: Vec<String>,
    pub likes_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Memoizes user lookups for the duration of one aggregation.
struct Authors<'a> {
    db: &'a Db,
    seen: HashMap<String, Option<UserSummary>>,
}

impl<'a> Authors<'a> {
    fn new(db: &'a Db) -> Self {
        Self {
            db,
            seen: HashMap::new(),
        }
    }

    fn resolve(&mut self, id: &str) -> anyhow::Result<Option<UserSummary>> {
        if let Some(cached) = self.seen.get(id) {
            return Ok(cached.clone());
        }
        let summary = self.db.get_user(id)?.as_ref().map(UserSummary::from);
        self.seen.insert(id.to_string(), summary.clone());
        Ok(summary)
    }
}

fn expand(db: &Db, authors: &mut Authors<'_>, post: Post) -> anyhow::Result<FeedPost> {
    let mut comments = Vec::with_capacity(post.comments.len());
    for comment_id in &post.comments {
        if let Some(comment) = db.get_comment(comment_id)? {
            comments.push(FeedComment {
                commented_by: authors.resolve(&comment.commented_by)?,
                id: comment.id,
                comment: comment.comment,
                created_at: comment.created_at,
            });
        }
    }

    Ok(FeedPost {
        owner: authors.resolve(&post.owner)?,
        comments_count: comments.len(),
        comments,
        likes_count: post.likes.len(),
        likes: post.likes.into_iter().collect(),
        id: post.id,
        content: post.content,
        image: post.image,
        created_at: post.created_at,
        updated_at: post.updated_at,
    })
}

/// Builds the feed newest-first, optionally restricted to one owner.
pub fn aggregate_posts(db: &Db, owner: Option<&str>) -> anyhow::Result<Vec<FeedPost>> {
    let mut authors = Authors::new(db);
    let mut feed = Vec::new();

    for post in db.all_posts()? {
        if owner.is_some_and(|owner| owner != post.owner) {
            continue;
        }
        feed.push(expand(db, &mut authors, post)?);
    }

    feed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(feed)
}
