//! Timeline semaphore fence

use ash::{vk, Device};

use crate::render::backend::{BackendResult, GpuFence};

/// GPU timeline shared by every frame slot
///
/// Frame `n` retires when the semaphore counter reaches `n`.
pub struct TimelineFence {
    device: Device,
    semaphore: vk::Semaphore,
}

impl TimelineFence {
    /// Create a timeline semaphore starting at 0
    pub fn new(device: Device) -> BackendResult<Self> {
        let mut timeline = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::builder().push_next(&mut timeline);

        let semaphore = unsafe { device.create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl GpuFence for TimelineFence {
    fn completed_value(&self) -> u64 {
        unsafe { self.device.get_semaphore_counter_value(self.semaphore) }.unwrap_or_else(|err| {
            log::warn!("Failed to read timeline value: {err:?}");
            0
        })
    }

    fn wait_for(&self, value: u64) -> BackendResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::builder()
            .semaphores(&semaphores)
            .values(&values);

        // Unbounded; device loss comes back as an API error.
        unsafe { self.device.wait_semaphores(&wait_info, u64::MAX)? };
        Ok(())
    }
}

impl Drop for TimelineFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}
