//! Binding resolution
//!
//! Turns a binding schema plus camera and object data into bound descriptor
//! tables. Persistent collections bind their precomputed table offsets;
//! dynamic collections get a fresh table from the circular heap region,
//! filled with constant buffer views over freshly uploaded constants.

use log::trace;

use crate::core::config::CONSTANT_BUFFER_ALIGNMENT;
use crate::foundation::math::{align_up, matrix_bytes, CameraData, MATRIX_SIZE};
use crate::render::backend::{CommandRecorder, ConstantBufferView, DescriptorDevice, GpuDescriptorHandle, UploadMemory};
use crate::render::error::{ConstantScope, FrameResult, SchemaError};
use crate::render::frame::descriptor_heap::{DescriptorTable, ShaderDescriptorHeap};
use crate::render::frame::upload::UploadAllocator;
use crate::render::graph::GraphicsSubpass;
use crate::render::scene::{MaterialSubpassData, ShaderSubpass};

use super::dispatch::{constant_matrix, descriptor_action, DescriptorAction, ObjectTransforms};
use super::schema::{
    CollectionIndex, ConstantBufferLayout, DescriptorCollection, DescriptorList, Persistency, RootParameterKind,
    UpdateFrequency,
};

/// Root table bindings currently set on a recorder
///
/// Re-binding a slot to the table it already holds is skipped. Must be
/// cleared whenever the root signature changes.
#[derive(Debug, Default)]
pub struct TableBindings {
    slots: Vec<Option<GpuDescriptorHandle>>,
}

impl TableBindings {
    /// Forget every binding
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Bind `table` to `slot` unless it is already bound there
    ///
    /// Returns whether a command was recorded.
    pub fn bind<R: CommandRecorder>(&mut self, recorder: &mut R, slot: u32, table: GpuDescriptorHandle) -> bool {
        let index = slot as usize;
        if self.slots.get(index).copied().flatten() == Some(table) {
            return false;
        }
        if self.slots.len() <= index {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(table);
        recorder.set_root_descriptor_table(slot, table);
        true
    }
}

/// Per-frame binding resolver
///
/// Borrows the frame queue's heap, upload arena and device for the
/// duration of one frame.
pub struct BindingResolver<'a, D, M> {
    heap: &'a mut ShaderDescriptorHeap,
    upload: &'a mut UploadAllocator<M>,
    device: &'a mut D,
    scratch: &'a mut Vec<u8>,
}

impl<'a, D: DescriptorDevice, M: UploadMemory> BindingResolver<'a, D, M> {
    /// Create a resolver over the frame's shared resources
    pub fn new(
        heap: &'a mut ShaderDescriptorHeap,
        upload: &'a mut UploadAllocator<M>,
        device: &'a mut D,
        scratch: &'a mut Vec<u8>,
    ) -> Self {
        Self {
            heap,
            upload,
            device,
            scratch,
        }
    }

    /// Descriptor heap the resolver allocates from
    pub fn heap(&self) -> &ShaderDescriptorHeap {
        self.heap
    }

    /// Bind the per-pass collections of a render subpass
    ///
    /// Only `PerPass` collections are considered; static samplers live in
    /// the root signature and are skipped.
    pub fn bind_pass_collections<R: CommandRecorder>(
        &mut self,
        recorder: &mut R,
        tables: &mut TableBindings,
        subpass: &GraphicsSubpass,
        camera: &CameraData,
    ) -> FrameResult<()> {
        for collection in &subpass.descriptors {
            if collection.index.update != UpdateFrequency::PerPass
                || collection.index.kind == RootParameterKind::StaticSampler
            {
                continue;
            }
            self.bind_collection(
                recorder,
                tables,
                collection,
                &subpass.constant_buffers,
                ConstantScope::PerPass,
                camera,
                None,
            )?;
        }
        Ok(())
    }

    /// Bind a material's collections for one draw of `shader_subpass`
    ///
    /// `object` selects the transforms of the drawn object; full-screen
    /// draws pass `None`.
    pub fn bind_instance_collections<R: CommandRecorder>(
        &mut self,
        recorder: &mut R,
        tables: &mut TableBindings,
        shader_subpass: &ShaderSubpass,
        subpass_data: &MaterialSubpassData,
        camera: &CameraData,
        object: Option<ObjectTransforms<'_>>,
    ) -> FrameResult<()> {
        for collection in &subpass_data.collections {
            if collection.index.persistency == Persistency::Dynamic
                && collection.index.update >= UpdateFrequency::PerPass
            {
                return Err(SchemaError::UpdateFrequencyTooCoarse(collection.index.update).into());
            }
            self.bind_collection(
                recorder,
                tables,
                collection,
                &shader_subpass.constant_buffers,
                ConstantScope::PerInstance,
                camera,
                object,
            )?;
        }
        Ok(())
    }

    fn bind_collection<R: CommandRecorder>(
        &mut self,
        recorder: &mut R,
        tables: &mut TableBindings,
        collection: &DescriptorCollection,
        layouts: &[ConstantBufferLayout],
        scope: ConstantScope,
        camera: &CameraData,
        object: Option<ObjectTransforms<'_>>,
    ) -> FrameResult<()> {
        if collection.index.kind != RootParameterKind::Table {
            return Err(SchemaError::UnsupportedRootParameter(collection.index.kind).into());
        }

        if let Some(list) = collection.sampler_lists.first() {
            match (scope, collection.index.persistency) {
                (ConstantScope::PerPass, _) => return Err(SchemaError::PassSamplerList { slot: list.slot }.into()),
                (_, Persistency::Dynamic) => {
                    return Err(SchemaError::DynamicSamplerList { slot: list.slot }.into())
                }
                (_, Persistency::Persistent) => {}
            }
        }

        match collection.index.persistency {
            Persistency::Persistent => {
                if scope == ConstantScope::PerPass {
                    if let Some(list) = collection.resource_view_lists.iter().find(|list| list.capacity == 0) {
                        return Err(SchemaError::ZeroCapacityList { slot: list.slot }.into());
                    }
                }
                for list in collection.resource_view_lists.iter().chain(&collection.sampler_lists) {
                    tables.bind(recorder, list.slot, list.gpu_offset);
                }
            }
            Persistency::Dynamic => {
                for list in &collection.resource_view_lists {
                    let table = self.build_dynamic_table(list, collection.index, layouts, scope, camera, object)?;
                    tables.bind(recorder, list.slot, table.gpu());
                }
            }
        }
        Ok(())
    }

    fn build_dynamic_table(
        &mut self,
        list: &DescriptorList,
        index: CollectionIndex,
        layouts: &[ConstantBufferLayout],
        scope: ConstantScope,
        camera: &CameraData,
        object: Option<ObjectTransforms<'_>>,
    ) -> FrameResult<DescriptorTable> {
        if list.ranges.is_empty() {
            return Err(SchemaError::EmptyDescriptorList { slot: list.slot }.into());
        }
        if list.capacity == 0 {
            return Err(SchemaError::ZeroCapacityList { slot: list.slot }.into());
        }

        let (table, start) = self.heap.allocate_circular(list.capacity)?;
        trace!("Slot {} {scope} table at {start} x {}", list.slot, list.capacity);

        for (position, (source, decl)) in list.declarations().enumerate() {
            let descriptor = u32::try_from(position)
                .ok()
                .filter(|&descriptor| descriptor < list.capacity)
                .ok_or(SchemaError::ListCapacityExceeded {
                    slot: list.slot,
                    capacity: list.capacity,
                })?;

            match descriptor_action(source, decl)? {
                DescriptorAction::WriteConstantBuffer => {
                    let view = self.write_constant_buffer(index, layouts, scope, camera, object)?;
                    let handle = self.heap.advance(&table, descriptor)?;
                    self.device.create_constant_buffer_view(&view, handle.cpu);
                }
                DescriptorAction::Skip => {}
            }
        }

        Ok(table)
    }

    fn write_constant_buffer(
        &mut self,
        index: CollectionIndex,
        layouts: &[ConstantBufferLayout],
        scope: ConstantScope,
        camera: &CameraData,
        object: Option<ObjectTransforms<'_>>,
    ) -> FrameResult<ConstantBufferView> {
        let layout = layouts
            .iter()
            .find(|layout| layout.index == index)
            .ok_or_else(|| SchemaError::ConstantBufferNotFound(index.to_string()))?;
        if layout.size == 0 {
            return Err(SchemaError::EmptyConstantBuffer(index.to_string()).into());
        }

        let size = align_up(u64::from(layout.size), CONSTANT_BUFFER_ALIGNMENT);
        self.scratch.clear();
        self.scratch.resize(usize::try_from(size).unwrap_or(usize::MAX), 0);

        let mut cursor = 0;
        for constant in &layout.constants {
            let matrix = constant_matrix(scope, constant, camera, object)?;
            let end = cursor + MATRIX_SIZE;
            let destination = self
                .scratch
                .get_mut(cursor..end)
                .ok_or_else(|| SchemaError::ConstantBufferOverflow {
                    constant: constant.name.clone(),
                    size,
                })?;
            destination.copy_from_slice(matrix_bytes(&matrix));
            cursor = end;
        }

        let allocation = self.upload.upload(self.scratch.as_slice(), CONSTANT_BUFFER_ALIGNMENT)?;
        Ok(ConstantBufferView {
            buffer: allocation.buffer,
            offset: allocation.offset,
            size,
        })
    }
}
