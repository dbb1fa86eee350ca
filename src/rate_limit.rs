use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Sliding window in-memory rate limiter (process local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// A posting action with its own budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Question,
    Answer,
    Comment,
    Vote,
}

impl Action {
    fn key(self) -> &'static str {
        match self {
            Action::Question => "question",
            Action::Answer => "answer",
            Action::Comment => "comment",
            Action::Vote => "vote",
        }
    }
}

/// Per-action budgets, read from the environment.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub question_limit: usize,
    pub question_window: Duration,
    pub answer_limit: usize,
    pub answer_window: Duration,
    pub comment_limit: usize,
    pub comment_window: Duration,
    pub vote_limit: usize,
    pub vote_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize { std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default) }
        fn dur_env(name: &str, default: u64) -> Duration { Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)) }
        Self {
            question_limit: usize_env("RL_QUESTION_LIMIT", 5),
            question_window: dur_env("RL_QUESTION_WINDOW", 300),
            answer_limit: usize_env("RL_ANSWER_LIMIT", 10),
            answer_window: dur_env("RL_ANSWER_WINDOW", 60),
            comment_limit: usize_env("RL_COMMENT_LIMIT", 20),
            comment_window: dur_env("RL_COMMENT_WINDOW", 60),
            vote_limit: usize_env("RL_VOTE_LIMIT", 60),
            vote_window: dur_env("RL_VOTE_WINDOW", 60),
        }
    }

    fn budget(&self, action: Action) -> (usize, Duration) {
        match action {
            Action::Question => (self.question_limit, self.question_window),
            Action::Answer => (self.answer_limit, self.answer_window),
            Action::Comment => (self.comment_limit, self.comment_window),
            Action::Vote => (self.vote_limit, self.vote_window),
        }
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }

    /// `None` unless `RATE_LIMIT_ENABLED` is `1`/`true`.
    pub fn from_env() -> Option<Self> {
        let enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        enabled.then(|| Self::new(InMemoryRateLimiter::new(true), RateLimitConfig::from_env()))
    }

    pub fn allow(&self, action: Action, client: &str) -> bool {
        let (limit, window) = self.cfg.budget(action);
        self.limiter.check(&format!("{}:{client}", action.key()), limit, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_basic() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(50);
        for _ in 0..3 { assert!(rl.check("k", 3, window)); }
        assert!(!rl.check("k", 3, window));
    }

    #[test]
    fn actions_have_separate_budgets() {
        let cfg = RateLimitConfig {
            question_limit: 1, question_window: Duration::from_secs(60),
            answer_limit: 1, answer_window: Duration::from_secs(60),
            comment_limit: 1, comment_window: Duration::from_secs(60),
            vote_limit: 2, vote_window: Duration::from_secs(60),
        };
        let rl = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);
        assert!(rl.allow(Action::Answer, "1.2.3.4"));
        assert!(!rl.allow(Action::Answer, "1.2.3.4"));
        assert!(rl.allow(Action::Answer, "5.6.7.8"));
        assert!(rl.allow(Action::Vote, "1.2.3.4"));
        assert!(rl.allow(Action::Vote, "1.2.3.4"));
        assert!(!rl.allow(Action::Vote, "1.2.3.4"));
    }
}
