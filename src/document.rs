//! In-place mutations of a question document and its embedded answers and
//! comments. Every storage backend loads a [`Question`], applies one of these,
//! and saves the whole document back.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{Answer, Comment, Id, Question, VoteDirection, VoteTarget};
use crate::repo::{RepoError, RepoResult};

impl Question {
    pub fn create(title: String, description: String, tags: Vec<String>, user: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            description,
            tags,
            user,
            created_at: now,
            updated_at: now,
            answers: Vec::new(),
        }
    }

    pub fn answer(&self, answer_id: Id) -> Option<&Answer> {
        self.answers.iter().find(|a| a.id == answer_id)
    }

    fn answer_mut(&mut self, answer_id: Id) -> RepoResult<&mut Answer> {
        self.answers
            .iter_mut()
            .find(|a| a.id == answer_id)
            .ok_or(RepoError::NotFound("Answer"))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Appends an answer at the end of the list.
    pub fn push_answer(&mut self, answer: Answer) -> &Answer {
        self.touch();
        self.answers.push(answer);
        &self.answers[self.answers.len() - 1]
    }

    /// Appends a comment at the end of the given answer's comment list.
    pub fn push_comment(&mut self, answer_id: Id, comment: Comment) -> RepoResult<&Comment> {
        self.touch();
        let answer = self.answer_mut(answer_id)?;
        answer.comments.push(comment);
        Ok(&answer.comments[answer.comments.len() - 1])
    }

    /// Moves the target's counter by one in `dir` and returns the new tally.
    /// There is no floor: counters go negative.
    pub fn apply_vote(&mut self, target: VoteTarget, dir: VoteDirection) -> RepoResult<i64> {
        let votes = match target {
            VoteTarget::Answer { answer_id } => {
                let answer = self.answer_mut(answer_id)?;
                answer.votes += dir.delta();
                answer.votes
            }
            VoteTarget::Comment { answer_id, comment_id } => {
                let comment = self
                    .answer_mut(answer_id)?
                    .comments
                    .iter_mut()
                    .find(|c| c.id == comment_id)
                    .ok_or(RepoError::NotFound("Comment"))?;
                comment.votes += dir.delta();
                comment.votes
            }
        };
        self.touch();
        Ok(votes)
    }

    /// Current counter of a vote target, if it resolves.
    pub fn tally(&self, target: VoteTarget) -> Option<i64> {
        match target {
            VoteTarget::Answer { answer_id } => self.answer(answer_id).map(|a| a.votes),
            VoteTarget::Comment { answer_id, comment_id } => self
                .answer(answer_id)?
                .comments
                .iter()
                .find(|c| c.id == comment_id)
                .map(|c| c.votes),
        }
    }

    /// Marks one answer accepted; at most one answer per question carries the flag.
    pub fn accept_answer(&mut self, answer_id: Id) -> RepoResult<&Answer> {
        if self.answer(answer_id).is_none() {
            return Err(RepoError::NotFound("Answer"));
        }
        for a in self.answers.iter_mut() {
            a.is_accepted = a.id == answer_id;
        }
        self.touch();
        self.answer(answer_id).ok_or(RepoError::NotFound("Answer"))
    }
}

impl Answer {
    pub fn new(content: String, user: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            user,
            votes: 0,
            is_accepted: false,
            created_at: Utc::now(),
            comments: Vec::new(),
        }
    }
}

impl Comment {
    pub fn new(content: String, user: String) -> Self {
        Self { id: Uuid::new_v4(), content, user, votes: 0, created_at: Utc::now() }
    }
}
