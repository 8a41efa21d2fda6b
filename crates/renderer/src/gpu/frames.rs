//! `SubmissionBackend` on top of a `wgpu::Queue`.
//!
//! wgpu has no user-visible timeline semaphore, so the completion counter is
//! emulated: every submission registers an `on_submitted_work_done` callback
//! that sends its value over a channel, and blocking waits poll the device for
//! the matching `SubmissionIndex`.
use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender};
use scheduler::SubmissionBackend;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("GPU stopped at completion value {completed} while waiting for {value}")]
    Stalled { value: u64, completed: u64 },
}

pub struct QueueBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    sender: Sender<u64>,
    receiver: Receiver<u64>,
    completed: u64,
    pending: VecDeque<(u64, wgpu::SubmissionIndex)>,
}

impl QueueBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            device,
            queue,
            sender,
            receiver,
            completed: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn track(&mut self, value: u64, index: wgpu::SubmissionIndex) {
        let sender = self.sender.clone();
        self.queue.on_submitted_work_done(move || {
            // The receiver only goes away with the backend itself.
            let _ = sender.send(value);
        });
        self.pending.push_back((value, index));
    }

    fn collect(&mut self) {
        for value in self.receiver.try_iter() {
            self.completed = self.completed.max(value);
        }
        let completed = self.completed;
        self.pending.retain(|(value, _)| *value > completed);
    }
}

impl SubmissionBackend for QueueBackend {
    type Recorder = wgpu::CommandEncoder;
    type Error = FrameError;

    fn begin(&mut self, slot: usize) -> Result<Self::Recorder, Self::Error> {
        let label = format!("frame slot {slot}");
        Ok(self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&label),
            }))
    }

    fn submit(
        &mut self,
        _slot: usize,
        recorder: Self::Recorder,
        value: u64,
    ) -> Result<(), Self::Error> {
        let index = self.queue.submit(Some(recorder.finish()));
        self.track(value, index);
        Ok(())
    }

    fn signal(&mut self, value: u64) -> Result<(), Self::Error> {
        let index = self.queue.submit(std::iter::empty());
        self.track(value, index);
        Ok(())
    }

    fn completed_value(&mut self) -> u64 {
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            tracing::warn!(error = %err, "non-blocking device poll failed");
        }
        self.collect();
        self.completed
    }

    fn wait_for(&mut self, value: u64) -> Result<(), Self::Error> {
        self.collect();
        if self.completed >= value {
            return Ok(());
        }
        let index = self
            .pending
            .iter()
            .find(|(pending, _)| *pending >= value)
            .map(|(_, index)| index.clone());
        match index {
            Some(index) => {
                self.device
                    .poll(wgpu::PollType::WaitForSubmissionIndex(index))?;
            }
            None => {
                self.device.poll(wgpu::PollType::Wait)?;
            }
        }
        self.collect();
        if self.completed < value {
            return Err(FrameError::Stalled {
                value,
                completed: self.completed,
            });
        }
        Ok(())
    }
}
