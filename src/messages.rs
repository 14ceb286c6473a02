//! Item comments and their single level of replies.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    errors::ClientError,
    orders::{ItemId, UserId},
};

pub type MessageId = i64;

/// A comment on an item. `parent_id` is `None` for root messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: MessageId,
    pub item_id: ItemId,
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "parent_ref")]
    pub parent_id: Option<MessageId>,
    #[serde(default, alias = "createTime")]
    pub reply_time: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub replies: Vec<Message>,
}

impl Message {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

// `0` and `null` both mean "no parent"
fn parent_ref<'de, D>(deserializer: D) -> Result<Option<MessageId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<MessageId>::deserialize(deserializer)?.filter(|id| *id != 0))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Message>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Message>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A root message and every reply under it, oldest reply first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub root: Message,
    pub replies: Vec<Message>,
}

/// Groups messages into one-level threads.
///
/// Nested `replies` are flattened first. Replies to replies are attached to
/// their root ancestor; replies whose root is missing are dropped. Roots keep
/// their input order.
pub fn build_threads(messages: Vec<Message>) -> Vec<Thread> {
    let mut flat = Vec::new();
    let mut stack: Vec<Message> = messages.into_iter().rev().collect();
    while let Some(mut m) = stack.pop() {
        let nested = std::mem::take(&mut m.replies);
        flat.push(m);
        stack.extend(nested.into_iter().rev());
    }

    let mut parents: HashMap<MessageId, Option<MessageId>> = HashMap::new();
    for m in &flat {
        parents.entry(m.message_id).or_insert(m.parent_id);
    }
    let root_of = |mut id: MessageId| -> Option<MessageId> {
        // bounded walk so a parent cycle cannot loop
        for _ in 0..=parents.len() {
            match parents.get(&id)? {
                None => return Some(id),
                Some(parent) => id = *parent,
            }
        }
        None
    };

    let mut threads: Vec<Thread> = Vec::new();
    let mut index: HashMap<MessageId, usize> = HashMap::new();
    let mut pending = Vec::new();
    for m in flat {
        if m.is_root() {
            if !index.contains_key(&m.message_id) {
                index.insert(m.message_id, threads.len());
                threads.push(Thread {
                    root: m,
                    replies: Vec::new(),
                });
            }
        } else {
            pending.push(m);
        }
    }
    for reply in pending {
        let Some(&slot) = reply.parent_id.and_then(root_of).and_then(|r| index.get(&r)) else {
            continue;
        };
        let thread = &mut threads[slot];
        if thread.replies.iter().all(|r| r.message_id != reply.message_id) {
            thread.replies.push(reply);
        }
    }
    for thread in &mut threads {
        thread
            .replies
            .sort_by(|a, b| (a.reply_time, a.message_id).cmp(&(b.reply_time, b.message_id)));
    }
    threads
}

pub fn find_message(threads: &[Thread], message_id: MessageId) -> Option<&Message> {
    threads.iter().find_map(|t| {
        std::iter::once(&t.root)
            .chain(t.replies.iter())
            .find(|m| m.message_id == message_id)
    })
}

/// Removes a deleted message locally; deleting a root drops its thread.
pub fn remove_message(threads: &mut Vec<Thread>, message_id: MessageId) -> bool {
    let before = threads.len();
    threads.retain(|t| t.root.message_id != message_id);
    if threads.len() != before {
        return true;
    }
    for thread in threads.iter_mut() {
        let n = thread.replies.len();
        thread.replies.retain(|r| r.message_id != message_id);
        if thread.replies.len() != n {
            return true;
        }
    }
    false
}

/// Body of a new comment. `parent_id` is `0` for a root message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub item_id: ItemId,
    pub content: String,
    pub parent_id: MessageId,
}

impl NewMessage {
    pub fn root(item_id: ItemId, content: &str) -> Result<Self, ClientError> {
        Ok(NewMessage {
            item_id,
            content: non_empty(content)?,
            parent_id: 0,
        })
    }

    /// A reply to `to`; replying to a reply answers its root.
    pub fn reply(to: &Message, content: &str) -> Result<Self, ClientError> {
        Ok(NewMessage {
            item_id: to.item_id,
            content: non_empty(content)?,
            parent_id: to.parent_id.unwrap_or(to.message_id),
        })
    }
}

fn non_empty(content: &str) -> Result<String, ClientError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ClientError::Validation("message content cannot be empty".into()));
    }
    Ok(trimmed.to_string())
}
