//! # Progress Composition
//!
//! The user-visible 0-100 value is a pure function of fixed phase weights
//! and sub-progress — no stateful callback chaining. Orchestrators compute
//! the composite value and hand it to a [`ProgressReporter`].
//!
//! Per-server weighting: action replay and the two reconciliation passes
//! each take a small fixed slice; retrieval takes the remainder, divided
//! evenly across job items, and each item subdivided again across media
//! transfer, images, subtitles, and the acknowledgement call.

/// Weight of the offline-action replay phase.
pub const ACTION_REPLAY_WEIGHT: f64 = 4.0;

/// Weight of each of the two reconciliation passes.
pub const RECONCILE_PASS_WEIGHT: f64 = 3.0;

/// Weight of the retrieval phase: whatever the lead-in phases leave.
pub const RETRIEVAL_WEIGHT: f64 =
    100.0 - ACTION_REPLAY_WEIGHT - 2.0 * RECONCILE_PASS_WEIGHT;

/// Fraction of one item's share earned by the media transfer.
pub const ITEM_MEDIA_SHARE: f64 = 0.92;

/// Fraction of one item's share earned by image retrieval.
pub const ITEM_IMAGES_SHARE: f64 = 0.03;

/// Fraction of one item's share earned by subtitle retrieval.
pub const ITEM_SUBTITLES_SHARE: f64 = 0.04;

/// Fraction of one item's share earned by the acknowledgement call.
pub const ITEM_ACK_SHARE: f64 = 0.01;

/// Share of one server's slice spent on content upload during a fleet sync.
pub const SERVER_UPLOAD_SHARE: f64 = 0.10;

/// Share of one server's slice spent on the media sync sequence.
pub const SERVER_SYNC_SHARE: f64 = 1.0 - SERVER_UPLOAD_SHARE;

/// Value once the action replay phase is complete.
pub fn action_replay_complete() -> f64 {
    ACTION_REPLAY_WEIGHT
}

/// Value once reconciliation pass `pass` (1 or 2) is complete.
pub fn reconcile_pass_complete(pass: u32) -> f64 {
    ACTION_REPLAY_WEIGHT + RECONCILE_PASS_WEIGHT * f64::from(pass)
}

/// Value during retrieval: `items_done` whole items plus `item_fraction` of
/// the current one, out of `item_count` equally weighted items.
///
/// With nothing to retrieve the sequence is complete.
pub fn retrieval(item_count: usize, items_done: usize, item_fraction: f64) -> f64 {
    if item_count == 0 {
        return 100.0;
    }
    let base = reconcile_pass_complete(2);
    let per_item = RETRIEVAL_WEIGHT / item_count as f64;
    let done = items_done.min(item_count) as f64 + item_fraction.clamp(0.0, 1.0);
    (base + per_item * done).min(100.0)
}

/// Cumulative fraction of one item's share after each completed sub-step.
pub fn item_fraction(media: bool, images: bool, subtitles: bool, acked: bool) -> f64 {
    let mut fraction = 0.0;
    if media {
        fraction += ITEM_MEDIA_SHARE;
    }
    if images {
        fraction += ITEM_IMAGES_SHARE;
    }
    if subtitles {
        fraction += ITEM_SUBTITLES_SHARE;
    }
    if acked {
        fraction += ITEM_ACK_SHARE;
    }
    fraction
}

/// Aggregate fleet value: `servers_done` complete servers plus
/// `server_progress` (0-100) of the current one, with every server weighted
/// `1/server_count`.
pub fn fleet(server_count: usize, servers_done: usize, server_progress: f64) -> f64 {
    if server_count == 0 {
        return 100.0;
    }
    let per_server = 100.0 / server_count as f64;
    let done = servers_done.min(server_count) as f64;
    (per_server * done + per_server * (server_progress.clamp(0.0, 100.0) / 100.0)).min(100.0)
}

/// Receives the composite 0-100 value.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, percent: f64);
}

/// Reporter that drops every value.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _percent: f64) {}
}

/// Adapter for plain closures.
pub struct FnProgress<F>(F);

impl<F: Fn(f64) + Send + Sync> FnProgress<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F: Fn(f64) + Send + Sync> ProgressReporter for FnProgress<F> {
    fn report(&self, percent: f64) {
        (self.0)(percent)
    }
}

/// Maps an inner 0-100 range onto `[base, base + span]` of an outer
/// reporter. Used to fold one server's progress into the fleet aggregate.
pub struct ScaledProgress<'a> {
    inner: &'a dyn ProgressReporter,
    base: f64,
    span: f64,
}

impl<'a> ScaledProgress<'a> {
    pub fn new(inner: &'a dyn ProgressReporter, base: f64, span: f64) -> Self {
        Self { inner, base, span }
    }
}

impl ProgressReporter for ScaledProgress<'_> {
    fn report(&self, percent: f64) {
        self.inner
            .report(self.base + self.span * (percent.clamp(0.0, 100.0) / 100.0));
    }
}
