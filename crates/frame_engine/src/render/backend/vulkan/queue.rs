//! Graphics queue submission

use ash::{vk, Device};

use super::fence::TimelineFence;
use super::recorder::VulkanCommandList;
use crate::render::backend::{BackendError, BackendResult, CommandQueue};

/// Graphics queue the frame queue submits to
pub struct VulkanQueue {
    device: Device,
    queue: vk::Queue,
}

impl VulkanQueue {
    /// Wrap a queue of `device`
    pub fn new(device: Device, queue: vk::Queue) -> Self {
        Self { device, queue }
    }

    /// Get the queue handle
    pub fn handle(&self) -> vk::Queue {
        self.queue
    }
}

impl CommandQueue for VulkanQueue {
    type Recorder = VulkanCommandList;
    type Fence = TimelineFence;

    fn execute(&mut self, recorders: &[&VulkanCommandList]) -> BackendResult<()> {
        if recorders.iter().any(|recorder| recorder.is_recording()) {
            return Err(BackendError::RecorderState("still recording at submission"));
        }

        let command_buffers: Vec<_> = recorders.iter().map(|recorder| recorder.handle()).collect();
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info.build()], vk::Fence::null())?;
        }
        Ok(())
    }

    fn signal(&mut self, fence: &TimelineFence, value: u64) -> BackendResult<()> {
        let values = [value];
        let semaphores = [fence.handle()];
        let mut timeline = vk::TimelineSemaphoreSubmitInfo::builder().signal_semaphore_values(&values);
        let submit_info = vk::SubmitInfo::builder()
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline);

        // Queue order puts the signal after every batch submitted before it.
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info.build()], vk::Fence::null())?;
        }
        Ok(())
    }
}
