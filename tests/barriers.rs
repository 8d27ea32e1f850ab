use anyhow::Result;

use deimos::prelude::*;

mod framework;
use framework::*;

#[test]
fn single_task_single_resource() -> Result<()> {
    let mut ctx = make_context()?;
    let texture = ResourceHandle::new("texture", 1);
    ctx.scheduler.track_resource(&texture, ResourceState::Common);

    let mut pipeline = Pipeline::new();
    pipeline.add_task(usage_task(
        "draw",
        vec![write_usage(&texture, ResourceState::RenderTarget)],
    ));
    ctx.scheduler.set_pipeline(pipeline)?;
    ctx.run_frame()?;

    let transitions = all_transitions(&ctx.queues, QueueKind::Graphics);
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].resource, texture);
    assert_eq!(transitions[0].subresource, 0);
    assert_eq!(transitions[0].from, ResourceState::Common);
    assert_eq!(transitions[0].to, ResourceState::RenderTarget);

    assert_eq!(
        ctx.scheduler.resource_state(&texture, 0),
        Some(ResourceState::RenderTarget)
    );
    Ok(())
}

#[test]
fn linear_chain_transitions_once_per_hop() -> Result<()> {
    let mut ctx = make_context()?;
    let texture = ResourceHandle::new("texture", 1);
    ctx.scheduler.track_resource(&texture, ResourceState::Common);

    let mut pipeline = Pipeline::new();
    let render = pipeline.add_task(usage_task(
        "render",
        vec![write_usage(&texture, ResourceState::RenderTarget)],
    ));
    let sample = pipeline.add_task(usage_task(
        "sample",
        vec![read_usage(&texture, ResourceState::ShaderResource)],
    ));
    pipeline.add_dependency(render, sample)?;
    ctx.scheduler.set_pipeline(pipeline)?;
    ctx.run_frame()?;

    let transitions = all_transitions(&ctx.queues, QueueKind::Graphics);
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[0].from, ResourceState::Common);
    assert_eq!(transitions[0].to, ResourceState::RenderTarget);
    assert_eq!(transitions[1].from, ResourceState::RenderTarget);
    assert_eq!(transitions[1].to, ResourceState::ShaderResource);

    assert_eq!(
        ctx.scheduler.resource_state(&texture, 0),
        Some(ResourceState::ShaderResource)
    );
    Ok(())
}

#[test]
fn matching_state_emits_no_barrier() -> Result<()> {
    let mut ctx = make_context()?;
    let texture = ResourceHandle::new("texture", 1);
    ctx.scheduler
        .track_resource(&texture, ResourceState::ShaderResource);

    let mut pipeline = Pipeline::new();
    pipeline.add_task(usage_task(
        "sample",
        vec![read_usage(&texture, ResourceState::ShaderResource)],
    ));
    ctx.scheduler.set_pipeline(pipeline)?;
    ctx.run_frame()?;

    let transitions = all_transitions(&ctx.queues, QueueKind::Graphics);
    assert!(transitions.is_empty());
    // No transition ever has identical source and destination states.
    assert!(transitions.iter().all(|t| t.from != t.to));
    Ok(())
}

#[test]
fn states_persist_across_frames() -> Result<()> {
    let mut ctx = make_context()?;
    let texture = ResourceHandle::new("texture", 1);
    ctx.scheduler.track_resource(&texture, ResourceState::Common);

    let mut pipeline = Pipeline::new();
    let render = pipeline.add_task(usage_task(
        "render",
        vec![write_usage(&texture, ResourceState::RenderTarget)],
    ));
    let sample = pipeline.add_task(usage_task(
        "sample",
        vec![read_usage(&texture, ResourceState::ShaderResource)],
    ));
    pipeline.add_dependency(render, sample)?;
    ctx.scheduler.set_pipeline(pipeline)?;

    ctx.run_frame()?;
    ctx.run_frame()?;

    let transitions = all_transitions(&ctx.queues, QueueKind::Graphics);
    // Frame 1: common -> render-target -> shader-resource.
    // Frame 2: shader-resource -> render-target -> shader-resource.
    assert_eq!(transitions.len(), 4);
    assert_eq!(transitions[2].from, ResourceState::ShaderResource);
    assert_eq!(transitions[2].to, ResourceState::RenderTarget);
    assert!(transitions.iter().all(|t| t.from != t.to));
    Ok(())
}

#[test]
fn all_subresources_fan_out() -> Result<()> {
    let mut ctx = make_context()?;
    let atlas = ResourceHandle::new("atlas", 4);
    ctx.scheduler.track_resource(&atlas, ResourceState::Common);

    // First frame nudges subresource 2 out of line with the others.
    let mut pipeline = Pipeline::new();
    pipeline.add_task(usage_task(
        "touch",
        vec![UsageRecord {
            resource: atlas.clone(),
            subresources: Subresources::Index(2),
            first_state: ResourceState::RenderTarget,
            last_state: ResourceState::RenderTarget,
            multiple_use: true,
        }],
    ));
    ctx.scheduler.set_pipeline(pipeline)?;
    ctx.run_frame()?;

    // Second frame claims the whole resource as a copy destination.
    let mut pipeline = Pipeline::new();
    pipeline.add_task(usage_task(
        "upload-target",
        vec![write_usage(&atlas, ResourceState::CopyDest)],
    ));
    ctx.scheduler.set_pipeline(pipeline)?;
    ctx.run_frame()?;

    let transitions = all_transitions(&ctx.queues, QueueKind::Graphics);
    let to_copy_dest: Vec<_> = transitions
        .iter()
        .filter(|t| t.to == ResourceState::CopyDest)
        .collect();
    assert_eq!(to_copy_dest.len(), 4);
    for transition in &to_copy_dest {
        let expected_from = if transition.subresource == 2 {
            ResourceState::RenderTarget
        } else {
            ResourceState::Common
        };
        assert_eq!(transition.from, expected_from);
    }
    for subresource in 0..4 {
        assert_eq!(
            ctx.scheduler.resource_state(&atlas, subresource),
            Some(ResourceState::CopyDest)
        );
    }
    Ok(())
}

#[test]
fn unknown_resource_adopts_declared_state() -> Result<()> {
    let mut ctx = make_context()?;
    let orphan = ResourceHandle::new("orphan", 1);
    // Deliberately never tracked.

    let mut pipeline = Pipeline::new();
    pipeline.add_task(usage_task(
        "sample",
        vec![read_usage(&orphan, ResourceState::ShaderResource)],
    ));
    ctx.scheduler.set_pipeline(pipeline)?;
    ctx.run_frame()?;

    // No barrier was emitted; the declared state was adopted as-is.
    assert!(all_transitions(&ctx.queues, QueueKind::Graphics).is_empty());
    assert_eq!(
        ctx.scheduler.resource_state(&orphan, 0),
        Some(ResourceState::ShaderResource)
    );
    Ok(())
}
