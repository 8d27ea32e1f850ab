//! The resource state enumeration.

use std::fmt::{Display, Formatter};

/// The mode in which the GPU is allowed to access a resource. A resource must
/// be transitioned with a barrier before it can be accessed in a different
/// state. Two states are compatible exactly when they are equal; read-only
/// states do not combine.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// The neutral state resources are created in.
    #[default]
    Common,
    /// Source of a copy operation.
    CopySource,
    /// Destination of a copy operation.
    CopyDest,
    /// Bound as a color render target.
    RenderTarget,
    /// Bound as a read-only depth target.
    DepthRead,
    /// Bound as a writable depth target.
    DepthWrite,
    /// Read through a shader resource view.
    ShaderResource,
    /// Read and written through an unordered access view.
    UnorderedAccess,
    /// Source of indirect draw or dispatch arguments.
    IndirectArgument,
    /// Ready for presentation to the swapchain.
    Present,
}

impl Display for ResourceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceState::Common => "common",
            ResourceState::CopySource => "copy-source",
            ResourceState::CopyDest => "copy-dest",
            ResourceState::RenderTarget => "render-target",
            ResourceState::DepthRead => "depth-read",
            ResourceState::DepthWrite => "depth-write",
            ResourceState::ShaderResource => "shader-resource",
            ResourceState::UnorderedAccess => "unordered-access",
            ResourceState::IndirectArgument => "indirect-argument",
            ResourceState::Present => "present",
        };
        f.write_str(name)
    }
}
