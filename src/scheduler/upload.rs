//! The implicit upload task that runs before every other task in a frame.

use anyhow::Result;

use crate::graph::task::{GraphicsTask, RenderContext, SetupContext, UsageRecord};
use crate::resource::handle::{ResourceHandle, Subresources};
use crate::resource::state::ResourceState;
use crate::scheduler::frame::UploadRequest;
use crate::sync::queue::QueueKind;

/// Copies all pending frame data from a staging buffer into the target
/// resources. Declares its targets through regular usage records so the
/// copy-dest entry transition and the post-upload exit state are handled by
/// normal barrier injection; the intermediate transition out of copy-dest is
/// recorded inside the task's own list.
#[derive(Debug)]
pub(crate) struct UploadTask {
    uploads: Vec<UploadRequest>,
    staging: ResourceHandle,
}

impl UploadTask {
    pub fn new(uploads: Vec<UploadRequest>, frame_index: u64) -> Self {
        let total: u64 = uploads.iter().map(|upload| upload.size).sum();
        let staging = ResourceHandle::new(format!("upload-staging-{frame_index}-{total}b"), 1);
        Self {
            uploads,
            staging,
        }
    }

    /// The staging buffer all uploads are sourced from. The scheduler
    /// registers it in the state table at creation, in copy-source state.
    pub fn staging(&self) -> &ResourceHandle {
        &self.staging
    }
}

impl GraphicsTask for UploadTask {
    fn name(&self) -> &str {
        "frame-upload"
    }

    fn queue_kind(&self) -> QueueKind {
        QueueKind::Graphics
    }

    fn setup(&mut self, ctx: &mut SetupContext) -> Result<()> {
        ctx.use_resource(&self.staging, Subresources::All, ResourceState::CopySource)?;
        for upload in &self.uploads {
            ctx.declare_usage(UsageRecord {
                resource: upload.target.clone(),
                subresources: upload.subresources,
                first_state: ResourceState::CopyDest,
                last_state: upload.post_state,
                multiple_use: true,
            })?;
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut RenderContext) -> Result<()> {
        let staging = self.staging.clone();
        for upload in &self.uploads {
            let list = ctx.list();
            list.set_resource_state(&upload.target, upload.subresources, ResourceState::CopyDest)?;
            list.copy_resource(&staging, &upload.target);
            if upload.post_state != ResourceState::CopyDest {
                list.set_resource_state(&upload.target, upload.subresources, upload.post_state)?;
            }
        }
        Ok(())
    }
}
