//! Core data structures shared by the orchestrator, the site client and the
//! deletion pipeline.

use std::fmt;

/// Category of user content listed in the gallog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostType {
    Posting,
    Comment,
}

impl PostType {
    /// Path segment used by the gallog URLs.
    pub fn path(&self) -> &'static str {
        match self {
            PostType::Posting => "posting",
            PostType::Comment => "comment",
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Gallery the user has content in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginResult {
    Success,
    /// The handshake completed but the site did not recognise the account.
    InvalidCredentials,
    Error(String),
}

/// Result of one deletion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    Success,
    CaptchaRequired,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptchaState {
    #[default]
    None,
    Required,
    Solving,
    Solved,
    Failed,
}

/// Immutable snapshot emitted by the deletion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub message: String,
    pub captcha_state: CaptchaState,
    pub success_count: usize,
    pub fail_count: usize,
    /// Set on the last event of a run.
    pub finished: bool,
}

impl Progress {
    pub fn new(current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            captcha_state: CaptchaState::None,
            success_count: 0,
            fail_count: 0,
            finished: false,
        }
    }

    pub fn with_counts(mut self, success_count: usize, fail_count: usize) -> Self {
        self.success_count = success_count;
        self.fail_count = fail_count;
        self
    }

    pub fn with_captcha_state(mut self, state: CaptchaState) -> Self {
        self.captcha_state = state;
        self
    }

    pub fn finished(mut self) -> Self {
        self.finished = true;
        self
    }

    /// Terminal check usable by consumers that ignore the `finished` flag.
    pub fn is_complete(&self) -> bool {
        self.finished || (self.total > 0 && self.current >= self.total)
    }
}
