//! Publisher
//!
//! Writes a post and its outbox event in one transaction. No fan-out
//! happens in-band: the caller gets the post ID back as soon as the two
//! rows commit, and the worker pool picks the event up from the outbox.

use crate::error::Result;
use fanline_core::{new_id, now_ms, OutboxEvent, Post};
use fanline_store::PostStore;
use std::sync::Arc;

pub struct Publisher {
    posts: Arc<dyn PostStore>,
}

impl Publisher {
    pub fn new(posts: Arc<dyn PostStore>) -> Self {
        Self { posts }
    }

    /// Persist the post together with its `pending` outbox event.
    /// Either both rows commit or neither does.
    pub async fn publish(&self, author_id: &str, payload: &str) -> Result<String> {
        let now = now_ms();
        let post = Post {
            id: new_id(),
            author_id: author_id.to_string(),
            payload: payload.to_string(),
            created_at: now,
        };
        let event = OutboxEvent::pending(&post.id, author_id, now);

        self.posts.insert_with_event(&post, &event).await?;
        Ok(post.id)
    }
}
