//! Frame-pipelined submission for the playground renderer.
//!
//! The CPU records frame `n + 1` while the GPU may still execute frame `n`.
//! A fixed ring of [`FRAME_COUNT`] contexts bounds how far ahead the CPU can
//! run, and a monotonically increasing completion counter (the fence) tells us
//! when a slot may be recorded into again.
//!
//! Types:
//!
//! - `SubmissionBackend` is the seam to the GPU: it hands out recorders,
//!   submits them with a signal value and reports/waits on completed values.
//!   The renderer implements it on top of a `wgpu::Queue`; tests use a fake.
//! - `FrameScheduler` owns the ring and the counter and exposes
//!   `acquire_frame`, `submit_frame` and `drain`.
//! - `Frame` is the token for one logical frame in flight on a slot.
//! - `SchedulerError` separates ring misuse from backend failures. Backend
//!   failures are not recoverable by this crate.

use std::error::Error as StdError;

/// Number of buffered frame contexts in the ring.
pub const FRAME_COUNT: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError<E>
where
    E: StdError + 'static,
{
    #[error("frame slot {0} is still recording a previous frame")]
    SlotBusy(usize),
    #[error("frame slot {0} was submitted without being acquired")]
    NotRecording(usize),
    #[error("GPU submission backend failed: {0}")]
    Backend(#[source] E),
}

/// GPU side of the scheduler.
///
/// Values passed to [`submit`](Self::submit) and [`signal`](Self::signal) are
/// strictly increasing; implementations only have to report the highest value
/// the GPU has reached.
pub trait SubmissionBackend {
    /// Command recording handle produced for one frame.
    type Recorder;
    type Error: StdError + 'static;

    /// Resets `slot` and returns a recorder ready for new commands.
    fn begin(&mut self, slot: usize) -> Result<Self::Recorder, Self::Error>;

    /// Submits the recorded work and schedules a GPU signal of `value` once it
    /// has executed.
    fn submit(
        &mut self,
        slot: usize,
        recorder: Self::Recorder,
        value: u64,
    ) -> Result<(), Self::Error>;

    /// Schedules a GPU signal of `value` behind all previously submitted work.
    fn signal(&mut self, value: u64) -> Result<(), Self::Error>;

    /// Highest value the GPU has signalled so far.
    fn completed_value(&mut self) -> u64;

    /// Blocks until the GPU has signalled at least `value`.
    fn wait_for(&mut self, value: u64) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, Default)]
struct FrameContext {
    wait_completion_value: u64,
    recording: bool,
}

/// One logical frame recording into a ring slot.
#[derive(Debug)]
pub struct Frame<R> {
    slot: usize,
    recorder: R,
}

impl<R> Frame<R> {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn recorder(&mut self) -> &mut R {
        &mut self.recorder
    }
}

pub struct FrameScheduler<B: SubmissionBackend> {
    backend: B,
    frames: [FrameContext; FRAME_COUNT],
    frame_index: usize,
    signaled: u64,
}

impl<B: SubmissionBackend> FrameScheduler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            frames: [FrameContext::default(); FRAME_COUNT],
            // The first acquire advances to slot 0.
            frame_index: FRAME_COUNT - 1,
            signaled: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Advances to the next slot, waiting for its previous GPU work if needed.
    pub fn acquire_frame(&mut self) -> Result<Frame<B::Recorder>, SchedulerError<B::Error>> {
        let slot = (self.frame_index + 1) % FRAME_COUNT;
        if self.frames[slot].recording {
            return Err(SchedulerError::SlotBusy(slot));
        }
        self.frame_index = slot;

        let wait_value = self.frames[slot].wait_completion_value;
        if wait_value != 0 && self.backend.completed_value() < wait_value {
            tracing::trace!(slot, wait_value, "waiting for frame slot to retire");
            self.backend
                .wait_for(wait_value)
                .map_err(SchedulerError::Backend)?;
        }

        let recorder = self.backend.begin(slot).map_err(SchedulerError::Backend)?;
        self.frames[slot].recording = true;
        Ok(Frame { slot, recorder })
    }

    /// Submits a frame and returns the completion value it will signal.
    pub fn submit_frame(
        &mut self,
        frame: Frame<B::Recorder>,
    ) -> Result<u64, SchedulerError<B::Error>> {
        let Frame { slot, recorder } = frame;
        if !self.frames[slot].recording {
            return Err(SchedulerError::NotRecording(slot));
        }
        self.frames[slot].recording = false;

        let value = self.signaled + 1;
        self.backend
            .submit(slot, recorder, value)
            .map_err(SchedulerError::Backend)?;
        self.signaled = value;
        self.frames[slot].wait_completion_value = value;
        Ok(value)
    }

    /// Blocks until every submitted frame has completed on the GPU.
    pub fn drain(&mut self) -> Result<(), SchedulerError<B::Error>> {
        let value = self.signaled + 1;
        self.backend.signal(value).map_err(SchedulerError::Backend)?;
        self.signaled = value;
        if self.backend.completed_value() < value {
            self.backend
                .wait_for(value)
                .map_err(SchedulerError::Backend)?;
        }
        tracing::trace!(value, "frame ring drained");
        Ok(())
    }

    /// Highest value submitted by the CPU.
    pub fn signaled_value(&self) -> u64 {
        self.signaled
    }

    pub fn completed_value(&mut self) -> u64 {
        self.backend.completed_value()
    }

    /// Slot of the most recently acquired frame.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Number of submitted frames the GPU has not retired yet.
    pub fn frames_in_flight(&mut self) -> usize {
        let completed = self.backend.completed_value();
        self.frames
            .iter()
            .filter(|frame| frame.wait_completion_value > completed)
            .count()
    }
}
