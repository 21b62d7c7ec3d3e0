//! Persistently mapped upload buffer

use ash::vk::{self, Handle};
use ash::{Device, Instance};

use super::DeviceContext;
use crate::render::backend::{BackendError, BackendResult, BufferId, UploadMemory};

/// Host-visible, coherent uniform buffer mapped for its whole lifetime
pub struct MappedUploadBuffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: *mut u8,
    capacity: u64,
}

impl MappedUploadBuffer {
    /// Allocate and map `capacity` bytes
    pub fn new(context: &DeviceContext, capacity: u64) -> BackendResult<Self> {
        let device = context.device.clone();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(capacity.max(1))
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index = match find_memory_type(
            &context.instance,
            context.physical_device,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(index) => index,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let (memory, mapped) = unsafe {
            let memory = device.allocate_memory(&alloc_info, None).map_err(|err| {
                device.destroy_buffer(buffer, None);
                BackendError::Api(err)
            })?;
            let mapped = device
                .bind_buffer_memory(buffer, memory, 0)
                .and_then(|()| device.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty()))
                .map_err(|err| {
                    device.destroy_buffer(buffer, None);
                    device.free_memory(memory, None);
                    BackendError::Api(err)
                })?;
            (memory, mapped.cast::<u8>())
        };

        log::debug!("Mapped {capacity} byte upload buffer");
        Ok(Self {
            device,
            buffer,
            memory,
            mapped,
            capacity,
        })
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }
}

impl UploadMemory for MappedUploadBuffer {
    fn buffer(&self) -> BufferId {
        BufferId(self.buffer.as_raw())
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> BackendResult<()> {
        let out_of_bounds = BackendError::UploadOutOfBounds {
            offset,
            len: data.len(),
            capacity: self.capacity,
        };
        let end = offset.checked_add(data.len() as u64).ok_or_else(|| out_of_bounds.clone())?;
        if end > self.capacity {
            return Err(out_of_bounds);
        }
        let start = usize::try_from(offset).map_err(|_| out_of_bounds)?;

        // In bounds of the mapping, which stays valid until drop.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.mapped.add(start), data.len());
        }
        Ok(())
    }
}

impl Drop for MappedUploadBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.unmap_memory(self.memory);
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Find a memory type allowed by `type_filter` with all of `properties`
pub fn find_memory_type(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> BackendResult<u32> {
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
    memory_type_index(&memory_properties, type_filter, properties)
        .ok_or(BackendError::NoSuitableMemory("upload buffer"))
}

fn memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        (type_filter & (1 << i)) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties)
    })
}
