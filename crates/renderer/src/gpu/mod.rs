//! GPU side of the playground.
//!
//! - `context` owns wgpu instance/device/surface wiring and knows how to
//!   rebuild swapchain state when the window resizes.
//! - `frames` implements the scheduler's `SubmissionBackend` on a queue.
//! - `resources` holds the group 0 bindings every program shares.
//! - `graph` compiles a catalog selection into a dispatchable compute program.
//! - `blit` presents the render target.
//! - `uniforms` mirrors the `Constants` block programs read.
//! - `state` glues everything together and exposes the `GpuState` API used by
//!   `window`.

mod blit;
mod context;
pub mod frames;
pub mod graph;
mod resources;
mod state;
mod uniforms;

pub(crate) use state::{GpuState, RenderError};
