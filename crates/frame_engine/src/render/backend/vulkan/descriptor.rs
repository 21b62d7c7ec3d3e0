//! Bindless uniform buffer descriptor heap
//!
//! One descriptor set with a single binding: an array of `capacity`
//! uniform buffer descriptors. A heap handle is an array element, so CPU and
//! GPU handles are both plain indices with an increment of 1.

use ash::vk::{self, Handle};
use ash::Device;

use crate::render::backend::{
    BackendResult, ConstantBufferView, CpuDescriptorHandle, DescriptorDevice,
    DescriptorHeapId, DescriptorHeapLayout, GpuDescriptorHandle,
};

/// Binding of the uniform buffer array in set 0
pub const UNIFORM_ARRAY_BINDING: u32 = 0;

/// Descriptor set backing the shader descriptor heap
pub struct BindlessDescriptorDevice {
    device: Device,
    pool: vk::DescriptorPool,
    set_layout: vk::DescriptorSetLayout,
    set: vk::DescriptorSet,
    capacity: u32,
}

impl BindlessDescriptorDevice {
    /// Create a set holding `capacity` uniform buffer descriptors
    pub fn new(device: Device, capacity: u32) -> BackendResult<Self> {
        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(UNIFORM_ARRAY_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(capacity)
            .stage_flags(vk::ShaderStageFlags::ALL_GRAPHICS)
            .build()];
        // Only the descriptors a frame wrote are valid.
        let binding_flags = [vk::DescriptorBindingFlags::PARTIALLY_BOUND];
        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder().binding_flags(&binding_flags);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(&bindings)
            .push_next(&mut flags_info);
        let set_layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: capacity,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(1);
        let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(err) => {
                unsafe { device.destroy_descriptor_set_layout(set_layout, None) };
                return Err(err.into());
            }
        };

        let set_layouts = [set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);
        let set = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets.first().copied().unwrap_or_default(),
            Err(err) => {
                unsafe {
                    device.destroy_descriptor_pool(pool, None);
                    device.destroy_descriptor_set_layout(set_layout, None);
                }
                return Err(err.into());
            }
        };

        log::debug!("Created bindless descriptor set with {capacity} uniform buffers");
        Ok(Self {
            device,
            pool,
            set_layout,
            set,
            capacity,
        })
    }

    /// Layout pipeline layouts must use for set 0
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    /// Descriptor set bound as the shader heap
    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }
}

/// Push constant range carrying one table index per root slot
pub const fn table_push_constant_range(slots: u32) -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::ALL_GRAPHICS,
        offset: 0,
        size: slots * 4,
    }
}

/// Heap layout of a bindless set with `capacity` elements
pub fn bindless_layout(set: vk::DescriptorSet, capacity: u32) -> DescriptorHeapLayout {
    DescriptorHeapLayout {
        heap: DescriptorHeapId(set.as_raw()),
        cpu_base: CpuDescriptorHandle(0),
        gpu_base: GpuDescriptorHandle(0),
        increment: 1,
        capacity,
    }
}

impl DescriptorDevice for BindlessDescriptorDevice {
    fn heap_layout(&self) -> DescriptorHeapLayout {
        bindless_layout(self.set, self.capacity)
    }

    fn create_constant_buffer_view(&mut self, view: &ConstantBufferView, destination: CpuDescriptorHandle) {
        let Ok(element) = u32::try_from(destination.0) else {
            log::warn!("Descriptor {} is outside the bindless array", destination.0);
            return;
        };

        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: vk::Buffer::from_raw(view.buffer.0),
            offset: view.offset,
            range: view.size,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(self.set)
            .dst_binding(UNIFORM_ARRAY_BINDING)
            .dst_array_element(element)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info);

        unsafe {
            self.device.update_descriptor_sets(&[write.build()], &[]);
        }
    }
}

impl Drop for BindlessDescriptorDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}
