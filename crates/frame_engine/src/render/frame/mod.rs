//! Frame pipelining
//!
//! The [`FrameQueue`] keeps a small ring of frames in flight. Each frame
//! records into its own slot, allocates descriptors and upload memory from
//! its own generation, and is retired through a shared GPU fence.

pub mod descriptor_heap;
pub mod queue;
pub mod ring;
pub mod swapchain;
pub mod upload;
pub mod walker;

#[cfg(test)]
mod tests;

pub use descriptor_heap::{DescriptorHandle, DescriptorTable, ShaderDescriptorHeap};
pub use queue::{FrameQueue, FrameQueueParts};
pub use ring::{FrameHandle, FrameStage};
pub use swapchain::{StaticSwapChain, SwapChain};
pub use upload::{UploadAllocation, UploadAllocator};
pub use walker::{FrameInputs, WalkSummary};
