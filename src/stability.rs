//! Motion stability: an element is stable once its bounding rect is
//! identical across consecutive rendering frames.

use serde::Serialize;
use tokio::time::{sleep, Duration};

use crate::dom::{Document, NodeId, Rect};

/// Frames delivered closer together than this are under-throttled
/// duplicates (observed on WebKit) and are not sampled.
pub const MIN_FRAME_INTERVAL_MS: f64 = 15.0;

pub const DEFAULT_STABILITY_TIMEOUT_MS: f64 = 5_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityOptions {
    /// Consecutive identical samples required.
    pub frame_count: u32,
    pub timeout_ms: f64,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        Self {
            frame_count: 2,
            timeout_ms: DEFAULT_STABILITY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityFailure {
    Disconnected,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilityResult {
    pub stable: bool,
    pub reason: Option<StabilityFailure>,
}

impl StabilityResult {
    pub fn stable() -> Self {
        Self {
            stable: true,
            reason: None,
        }
    }

    pub fn failed(reason: StabilityFailure) -> Self {
        Self {
            stable: false,
            reason: Some(reason),
        }
    }
}

/// Source of animation-frame timestamps (milliseconds). The checker
/// measures both frame spacing and its deadline on this timeline, so
/// scripted clocks make tests fully deterministic.
#[allow(async_fn_in_trait)]
pub trait FrameClock {
    async fn next_frame(&mut self) -> f64;
}

/// Production clock: ~60 Hz off the tokio timer.
pub struct IntervalClock {
    now_ms: f64,
    frame_ms: f64,
}

impl IntervalClock {
    pub fn new() -> Self {
        Self {
            now_ms: 0.0,
            frame_ms: 16.7,
        }
    }
}

impl Default for IntervalClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock for IntervalClock {
    async fn next_frame(&mut self) -> f64 {
        sleep(Duration::from_micros(16_700)).await;
        self.now_ms += self.frame_ms;
        self.now_ms
    }
}

/// Sample the element's bounding rect on each animation frame until
/// `frame_count` consecutive qualifying frames agree byte-for-byte, the
/// element disconnects, or the deadline passes.
pub async fn check_element_stability<C: FrameClock>(
    doc: &Document,
    el: NodeId,
    clock: &mut C,
    opts: StabilityOptions,
) -> StabilityResult {
    let mut deadline: Option<f64> = None;
    let mut last_sample_ms: Option<f64> = None;
    let mut previous: Option<Rect> = None;
    let mut streak = 0u32;
    loop {
        let now = clock.next_frame().await;
        let deadline = *deadline.get_or_insert(now + opts.timeout_ms);
        if now > deadline {
            return StabilityResult::failed(StabilityFailure::Timeout);
        }
        if !doc.is_connected(el) {
            return StabilityResult::failed(StabilityFailure::Disconnected);
        }
        if let Some(last) = last_sample_ms {
            if now - last < MIN_FRAME_INTERVAL_MS {
                continue;
            }
        }
        last_sample_ms = Some(now);
        let rect = doc.bounding_client_rect(el);
        if previous == Some(rect) {
            streak += 1;
        } else {
            streak = 1;
        }
        previous = Some(rect);
        if streak >= opts.frame_count.max(1) {
            return StabilityResult::stable();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Clock that replays fixed timestamps and runs a per-frame action, so
    /// tests can move or detach the element between frames.
    struct ScriptedClock<F: FnMut(usize)> {
        times: Vec<f64>,
        index: Cell<usize>,
        on_frame: F,
    }

    impl<F: FnMut(usize)> ScriptedClock<F> {
        fn new(times: Vec<f64>, on_frame: F) -> Self {
            Self {
                times,
                index: Cell::new(0),
                on_frame,
            }
        }
    }

    impl<F: FnMut(usize)> FrameClock for ScriptedClock<F> {
        async fn next_frame(&mut self) -> f64 {
            let i = self.index.get();
            self.index.set(i + 1);
            (self.on_frame)(i);
            self.times
                .get(i)
                .copied()
                .unwrap_or_else(|| self.times.last().copied().unwrap_or(0.0) + 16.0 * i as f64)
        }
    }

    fn fixed_rect_doc() -> (Document, NodeId) {
        let doc = Document::parse_fragment("<div>x</div>");
        let div = doc.child_elements(doc.root())[0];
        doc.set_bounds(div, Rect::new(10.0, 10.0, 50.0, 20.0));
        (doc, div)
    }

    #[tokio::test]
    async fn non_moving_element_is_stable_in_two_frames() {
        let (doc, div) = fixed_rect_doc();
        let mut clock = ScriptedClock::new(vec![0.0, 16.0, 32.0], |_| {});
        let result =
            check_element_stability(&doc, div, &mut clock, StabilityOptions::default()).await;
        assert_eq!(result, StabilityResult::stable());
        assert_eq!(clock.index.get(), 2, "stable on the second frame");
    }

    #[tokio::test]
    async fn short_frames_are_discarded() {
        let (doc, div) = fixed_rect_doc();
        // Frames at +5ms and +10ms are under the 15ms minimum and must not
        // count toward the streak.
        let mut clock = ScriptedClock::new(vec![0.0, 5.0, 10.0, 16.0], |_| {});
        let result =
            check_element_stability(&doc, div, &mut clock, StabilityOptions::default()).await;
        assert_eq!(result, StabilityResult::stable());
        assert_eq!(clock.index.get(), 4);
    }

    #[tokio::test]
    async fn moving_element_times_out() {
        let doc = Document::parse_fragment("<div>x</div>");
        let div = doc.child_elements(doc.root())[0];
        doc.set_bounds(div, Rect::new(0.0, 0.0, 50.0, 20.0));
        let times: Vec<f64> = (0..20).map(|i| i as f64 * 16.0).collect();
        let result = {
            let doc = &doc;
            let mut clock = ScriptedClock::new(times, move |i| {
                // top increments every frame
                doc.set_bounds(div, Rect::new(0.0, i as f64, 50.0, 20.0));
            });
            check_element_stability(
                doc,
                div,
                &mut clock,
                StabilityOptions {
                    frame_count: 2,
                    timeout_ms: 100.0,
                },
            )
            .await
        };
        assert_eq!(result, StabilityResult::failed(StabilityFailure::Timeout));
    }

    #[tokio::test]
    async fn disconnect_mid_check_is_reported() {
        let doc = Document::parse_fragment("<div>x</div>");
        let div = doc.child_elements(doc.root())[0];
        doc.set_bounds(div, Rect::new(0.0, 0.0, 50.0, 20.0));
        let result = {
            let doc = &doc;
            let mut clock = ScriptedClock::new(vec![0.0, 16.0, 32.0], move |i| {
                if i == 1 {
                    doc.detach(div);
                }
            });
            check_element_stability(doc, div, &mut clock, StabilityOptions::default()).await
        };
        assert_eq!(
            result,
            StabilityResult::failed(StabilityFailure::Disconnected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn interval_clock_advances_monotonically() {
        let mut clock = IntervalClock::new();
        let a = clock.next_frame().await;
        let b = clock.next_frame().await;
        assert!(b > a);
    }
}
