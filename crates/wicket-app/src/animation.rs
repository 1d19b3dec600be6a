// Draw reveal sequencer.
//
// A reveal is planned up front (pure, driven by an injected RNG) and then
// played back by a tokio task that emits one frame per tick. The task owns no
// auction state, so aborting it at any point is side-effect free.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use wicket_core::draw::{draw_next, Identifier};

/// The frames of one reveal. The last frame is always `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealPlan {
    pub target: Identifier,
    pub frames: Vec<Identifier>,
}

/// Plan a reveal of `target`: a random number of frames in `ticks`, each a
/// uniform sample from `pool`, ending on `target`. The target never shows up
/// before the final frame. With nothing else to show, the plan is just the
/// target.
pub fn plan_reveal<R: Rng + ?Sized>(
    pool: &[Identifier],
    target: Identifier,
    ticks: RangeInclusive<usize>,
    rng: &mut R,
) -> RevealPlan {
    let decoys: Vec<Identifier> = pool.iter().copied().filter(|&id| id != target).collect();
    let (lo, hi) = (*ticks.start(), *ticks.end());
    let len = if hi <= lo { lo.max(1) } else { rng.gen_range(lo.max(1)..=hi) };

    let mut frames = Vec::with_capacity(len);
    if !decoys.is_empty() {
        for _ in 1..len {
            if let Some(id) = draw_next(&decoys, rng) {
                frames.push(id);
            }
        }
    }
    frames.push(target);

    RevealPlan { target, frames }
}

/// Events emitted by a running reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealEvent {
    Frame { generation: u64, display: Identifier },
    Done { generation: u64, target: Identifier },
}

impl RevealEvent {
    pub fn generation(&self) -> u64 {
        match self {
            RevealEvent::Frame { generation, .. } | RevealEvent::Done { generation, .. } => {
                *generation
            }
        }
    }
}

/// Handle to a reveal playing in the background. Dropping the handle aborts
/// the task.
#[derive(Debug)]
pub struct RevealTask {
    generation: u64,
    target: Identifier,
    handle: JoinHandle<()>,
}

impl RevealTask {
    /// Start playing `plan`, one frame every `tick`, then a `Done` event.
    /// The first frame is emitted immediately.
    pub fn spawn(
        generation: u64,
        plan: RevealPlan,
        tick: Duration,
        tx: mpsc::Sender<RevealEvent>,
    ) -> Self {
        let target = plan.target;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for display in plan.frames {
                ticker.tick().await;
                if tx
                    .send(RevealEvent::Frame { generation, display })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            debug!("Reveal {} settled on {}", generation, plan.target);
            let _ = tx
                .send(RevealEvent::Done {
                    generation,
                    target: plan.target,
                })
                .await;
        });

        RevealTask {
            generation,
            target,
            handle,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn target(&self) -> Identifier {
        self.target
    }

    /// Stop the reveal. Frames not yet sent are never sent.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for RevealTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
