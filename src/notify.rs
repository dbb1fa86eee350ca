//! Notifications produced as a side effect of posting answers and comments.
//!
//! Building the batch is pure; delivery is a detached task whose failures are
//! only logged.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Answer, Comment, Id, NewNotification, NotificationKind, Question};
use crate::repo::{Repo, RepoError};

static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^\w@])@([A-Za-z0-9_]{1,50})").expect("mention pattern is valid"));

/// Distinct `@handle` mentions in order of first appearance.
pub fn mentions(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for cap in MENTION.captures_iter(text) {
        let handle = &cap[1];
        if !out.iter().any(|h| h == handle) {
            out.push(handle.to_string());
        }
    }
    out
}

fn mention_batch(text: &str, actor: &str, related_id: Id, skip: &[&str]) -> Vec<NewNotification> {
    mentions(text)
        .into_iter()
        .filter(|h| h != actor && !skip.contains(&h.as_str()))
        .map(|h| NewNotification {
            message: Some(format!("{actor} mentioned you")),
            user_id: h,
            kind: NotificationKind::Mention,
            related_id: Some(related_id),
        })
        .collect()
}

/// The question author always hears about a new answer; anyone mentioned in
/// the answer gets a mention unless they are the author or the question's owner.
pub fn answer_posted(question: &Question, answer: &Answer) -> Vec<NewNotification> {
    let mut batch = vec![NewNotification {
        user_id: question.user.clone(),
        kind: NotificationKind::Answer,
        related_id: Some(question.id),
        message: Some("Someone answered your question".into()),
    }];
    batch.extend(mention_batch(&answer.content, &answer.user, question.id, &[question.user.as_str()]));
    batch
}

/// The answer author hears about comments by other people.
pub fn comment_posted(answer: &Answer, comment: &Comment) -> Vec<NewNotification> {
    let mut batch = Vec::new();
    if answer.user != comment.user {
        batch.push(NewNotification {
            user_id: answer.user.clone(),
            kind: NotificationKind::Comment,
            related_id: Some(answer.id),
            message: Some("Someone commented on your answer".into()),
        });
    }
    batch.extend(mention_batch(&comment.content, &comment.user, answer.id, &[answer.user.as_str()]));
    batch
}

/// Records each notification in order. Mentions of handles with no account
/// are skipped; other failures are logged and do not stop the batch.
pub async fn deliver(repo: &dyn Repo, batch: Vec<NewNotification>) {
    for n in batch {
        let recipient = n.user_id.clone();
        if n.kind == NotificationKind::Mention {
            match repo.find_user_by_username(&recipient).await {
                Ok(_) => {}
                Err(RepoError::NotFound(_)) => {
                    tracing::debug!(%recipient, "mention of unknown handle");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(%recipient, error = %e, "dropping mention");
                    continue;
                }
            }
        }
        if let Err(e) = repo.create_notification(n).await {
            tracing::warn!(%recipient, error = %e, "dropping notification");
        }
    }
}

/// Fire and forget: delivers the batch on the server runtime.
pub fn dispatch(repo: Arc<dyn Repo>, batch: Vec<NewNotification>) {
    if batch.is_empty() {
        return;
    }
    actix_web::rt::spawn(async move { deliver(repo.as_ref(), batch).await });
}
