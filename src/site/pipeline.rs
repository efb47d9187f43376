//! Deletion pipeline.
//!
//! Enumerates every item of one category, then deletes them one at a time
//! while reporting [`Progress`] snapshots over a bounded channel. CAPTCHA
//! escalation and the two hard stops live in [`RunState::apply`]; the async
//! loop around it only sequences requests, pacing and cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::core::{CaptchaState, DeletionOutcome, PostType, Progress};
use super::gallog::{DeletionAttempt, GallogSite};
use crate::external_deps::captcha::CaptchaProvider;

/// Caller side of a running pipeline.
pub struct PipelineHandle {
    events: mpsc::Receiver<Progress>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    /// A handle whose only event is `progress`; used when a run cannot start.
    pub(crate) fn finished_with(progress: Progress) -> Self {
        let (tx, events) = mpsc::channel(1);
        let _ = tx.try_send(progress.finished());
        Self {
            events,
            cancel: CancellationToken::new(),
            task: tokio::spawn(async {}),
        }
    }

    /// Next progress snapshot, or `None` once the run has ended.
    pub async fn next(&mut self) -> Option<Progress> {
        self.events.recv().await
    }

    /// Request a stop. Takes effect at the next item boundary; an in-flight
    /// request is allowed to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Drain every remaining event and wait for the worker to exit.
    pub async fn collect(mut self) -> Vec<Progress> {
        let mut events = Vec::new();
        while let Some(progress) = self.events.recv().await {
            events.push(progress);
        }
        if let Err(err) = self.task.await {
            log::warn!("deletion pipeline task ended abnormally: {err}");
        }
        events
    }

    pub fn into_parts(self) -> (mpsc::Receiver<Progress>, CancellationToken, JoinHandle<()>) {
        (self.events, self.cancel, self.task)
    }
}

/// One deletion run for a user, category and optional gallery filter.
pub struct DeletionPipeline {
    site: Arc<GallogSite>,
    user_id: String,
    post_type: PostType,
    gallery_id: Option<String>,
    solver: Option<Arc<dyn CaptchaProvider>>,
    item_delay: Duration,
    max_captcha_failures: u32,
    buffer: usize,
}

impl DeletionPipeline {
    pub fn new(
        site: Arc<GallogSite>,
        user_id: impl Into<String>,
        post_type: PostType,
        gallery_id: Option<String>,
        solver: Option<Arc<dyn CaptchaProvider>>,
    ) -> Self {
        let config = site.config();
        let item_delay = config.item_delay;
        let max_captcha_failures = config.max_consecutive_captcha_failures.max(1);
        let buffer = config.progress_buffer.max(1);

        Self {
            site,
            user_id: user_id.into(),
            post_type,
            gallery_id,
            solver,
            item_delay,
            max_captcha_failures,
            buffer,
        }
    }

    /// Override the configured pause between items for this run only.
    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }

    /// Start the run on the current Tokio runtime.
    pub fn spawn(self) -> PipelineHandle {
        let (tx, events) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(tx, token).await });

        PipelineHandle {
            events,
            cancel,
            task,
        }
    }

    async fn run(self, tx: mpsc::Sender<Progress>, cancel: CancellationToken) {
        log::info!(
            "deletion pipeline started for {} ({}, gallery {:?})",
            self.user_id,
            self.post_type,
            self.gallery_id
        );

        if !emit(&tx, Progress::new(0, 0, "collecting items")).await {
            return;
        }

        let Some(queue) = self.collect_queue(&cancel).await else {
            let _ = emit(&tx, stopped(&RunState::default(), 0, 0)).await;
            return;
        };

        let total = queue.len();
        if total == 0 {
            log::info!("nothing to delete for {}", self.user_id);
            let _ = emit(&tx, Progress::new(0, 0, "nothing to delete").finished()).await;
            return;
        }

        let started = Progress::new(0, total, format!("{total} items found, starting deletion"));
        if !emit(&tx, started).await {
            return;
        }

        let mut state = RunState::default();
        for (index, post_no) in queue.iter().enumerate() {
            if cancel.is_cancelled() {
                let _ = emit(&tx, stopped(&state, index, total)).await;
                return;
            }

            let solver = if state.needs_captcha {
                self.solver.as_deref()
            } else {
                None
            };
            let attempt = self
                .site
                .delete_post(&self.user_id, self.post_type, post_no, solver)
                .await;

            let step = state.apply(
                index + 1,
                total,
                post_no,
                &attempt,
                self.solver.is_some(),
                self.max_captcha_failures,
            );
            match step {
                Step::Stop(progress) => {
                    log::warn!("deletion pipeline stopped: {}", progress.message);
                    let _ = emit(&tx, progress.finished()).await;
                    return;
                }
                Step::Continue(progress) => {
                    if !emit(&tx, progress).await {
                        return;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = emit(&tx, stopped(&state, index + 1, total)).await;
                    return;
                }
                _ = sleep(self.item_delay) => {}
            }
        }

        log::info!(
            "deletion pipeline finished: {} deleted, {} failed",
            state.success,
            state.failed
        );
        let summary = Progress::new(
            total,
            total,
            format!("done: {} deleted, {} failed", state.success, state.failed),
        )
        .with_counts(state.success, state.failed)
        .finished();
        let _ = emit(&tx, summary).await;
    }

    /// Walk listing pages from 1 until an empty page or a failed fetch.
    /// Returns `None` when cancelled.
    async fn collect_queue(&self, cancel: &CancellationToken) -> Option<Vec<String>> {
        let mut queue = Vec::new();
        let mut page = 1;

        loop {
            if cancel.is_cancelled() {
                return None;
            }

            match self
                .site
                .post_ids(
                    &self.user_id,
                    self.post_type,
                    self.gallery_id.as_deref(),
                    page,
                )
                .await
            {
                Ok(ids) if ids.is_empty() => break,
                Ok(ids) => {
                    log::debug!("page {page}: {} items", ids.len());
                    queue.extend(ids);
                }
                Err(err) => {
                    log::warn!("listing page {page} failed, ending enumeration: {err}");
                    break;
                }
            }
            page += 1;
        }

        Some(queue)
    }
}

async fn emit(tx: &mpsc::Sender<Progress>, progress: Progress) -> bool {
    if tx.send(progress).await.is_err() {
        log::debug!("progress receiver dropped, stopping pipeline");
        return false;
    }
    true
}

fn stopped(state: &RunState, current: usize, total: usize) -> Progress {
    log::info!("deletion pipeline cancelled after {current} of {total} items");
    Progress::new(current, total, "stopped")
        .with_counts(state.success, state.failed)
        .finished()
}

enum Step {
    Continue(Progress),
    Stop(Progress),
}

/// Counters carried across items.
#[derive(Debug, Default)]
struct RunState {
    success: usize,
    failed: usize,
    needs_captcha: bool,
    consecutive_captcha: u32,
}

impl RunState {
    fn apply(
        &mut self,
        current: usize,
        total: usize,
        post_no: &str,
        attempt: &DeletionAttempt,
        has_solver: bool,
        max_captcha_failures: u32,
    ) -> Step {
        match &attempt.outcome {
            DeletionOutcome::Success => {
                self.success += 1;
                self.needs_captcha = false;
                self.consecutive_captcha = 0;
                let state = if attempt.captcha_solved {
                    CaptchaState::Solved
                } else {
                    CaptchaState::None
                };
                Step::Continue(
                    self.progress(current, total, format!("deleted {post_no}"))
                        .with_captcha_state(state),
                )
            }
            DeletionOutcome::CaptchaRequired if !has_solver => Step::Stop(
                self.progress(current, total, "CAPTCHA required, provide an API key")
                    .with_captcha_state(CaptchaState::Required),
            ),
            DeletionOutcome::CaptchaRequired => {
                self.needs_captcha = true;
                self.failed += 1;
                self.consecutive_captcha += 1;

                if self.consecutive_captcha >= max_captcha_failures {
                    Step::Stop(
                        self.progress(current, total, "too many consecutive CAPTCHA failures")
                            .with_captcha_state(CaptchaState::Failed),
                    )
                } else {
                    Step::Continue(
                        self.progress(
                            current,
                            total,
                            format!("CAPTCHA detected on {post_no}, will solve on next attempt"),
                        )
                        .with_captcha_state(CaptchaState::Solving),
                    )
                }
            }
            DeletionOutcome::Failed(reason) => {
                self.failed += 1;
                self.consecutive_captcha = 0;
                Step::Continue(self.progress(
                    current,
                    total,
                    format!("failed to delete {post_no}: {reason}"),
                ))
            }
        }
    }

    fn progress(&self, current: usize, total: usize, message: impl Into<String>) -> Progress {
        Progress::new(current, total, message).with_counts(self.success, self.failed)
    }
}
