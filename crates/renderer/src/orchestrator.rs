//! Per-frame decision of whether the active program has to be rebuilt.
//!
//! Each frame `update` checks two triggers, in order:
//!
//! 1. the files behind the active program changed on disk, so the current
//!    selection is rebuilt;
//! 2. the requested selection differs from the one the active program was
//!    built for, so the new selection is built.
//!
//! A rebuild drains the GPU before building so the superseded program can be
//! dropped safely. A failed rebuild keeps the previous program running, opens
//! the error window and snaps the request back to the active selection, so a
//! broken program is not retried every frame. The next source edit retries it.
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::gpu::graph::BuildError;
use crate::types::Selection;

/// What the orchestrator needs to know about a running program.
pub trait ActiveProgram {
    fn selection(&self) -> Selection;
    fn id(&self) -> u64;
}

/// Produces programs for the orchestrator.
pub trait ProgramBuilder {
    type Program: ActiveProgram;

    /// Whether any file the active program was built from changed.
    fn sources_changed(&mut self) -> bool;

    /// Blocks until the GPU no longer uses the active program.
    fn drain(&mut self) -> Result<()>;

    fn build(&mut self, selection: Selection) -> Result<Self::Program, BuildError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Unchanged,
    Rebuilt { program_id: u64 },
    Failed,
}

pub struct Orchestrator<P> {
    active: P,
    requested: Selection,
    error_display: Duration,
    error_until: Option<Instant>,
    last_error: Option<BuildError>,
    epoch: Instant,
    persistent_clear: bool,
}

impl<P: ActiveProgram> Orchestrator<P> {
    /// Builds the initial program. There is nothing to fall back to, so a
    /// failure here is returned to the caller.
    pub fn new<B>(
        builder: &mut B,
        selection: Selection,
        error_display: Duration,
        now: Instant,
    ) -> Result<Self>
    where
        B: ProgramBuilder<Program = P>,
    {
        let active = builder
            .build(selection)
            .context("failed to build the initial program")?;
        Ok(Self {
            active,
            requested: selection,
            error_display,
            error_until: None,
            last_error: None,
            epoch: now,
            persistent_clear: true,
        })
    }

    /// Runs once per frame before recording. Errors are fatal GPU failures;
    /// build failures are reported through the outcome and the error window.
    pub fn update<B>(&mut self, builder: &mut B, now: Instant) -> Result<UpdateOutcome>
    where
        B: ProgramBuilder<Program = P>,
    {
        let target = if builder.sources_changed() {
            tracing::info!("program sources changed on disk; rebuilding");
            self.requested
        } else if self.requested != self.active.selection() {
            self.requested
        } else {
            return Ok(UpdateOutcome::Unchanged);
        };

        builder.drain()?;
        match builder.build(target) {
            Ok(program) => {
                self.active = program;
                self.requested = target;
                self.error_until = None;
                self.last_error = None;
                self.epoch = now;
                self.persistent_clear = true;
                Ok(UpdateOutcome::Rebuilt {
                    program_id: self.active.id(),
                })
            }
            Err(err) => {
                tracing::error!(
                    program = target.program_index,
                    alternate = target.use_alternate,
                    "program rebuild failed; keeping the previous program\n{err}"
                );
                self.requested = self.active.selection();
                self.error_until = Some(now + self.error_display);
                self.last_error = Some(err);
                Ok(UpdateOutcome::Failed)
            }
        }
    }

    pub fn active(&self) -> &P {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut P {
        &mut self.active
    }

    pub fn requested(&self) -> Selection {
        self.requested
    }

    /// Asks for `selection` to be built on the next `update`.
    pub fn request(&mut self, selection: Selection) {
        self.requested = selection;
    }

    pub fn error_visible(&self, now: Instant) -> bool {
        self.error_until.is_some_and(|until| now <= until)
    }

    /// Time since the active program was built.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.epoch)
    }

    /// True once after start-up and after every successful rebuild.
    pub fn take_persistent_clear(&mut self) -> bool {
        std::mem::take(&mut self.persistent_clear)
    }

    pub fn last_error(&self) -> Option<&BuildError> {
        self.last_error.as_ref()
    }
}
