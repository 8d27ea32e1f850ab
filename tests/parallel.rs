use anyhow::Result;

use deimos::prelude::*;

mod framework;
use framework::*;

#[test]
fn disjoint_resources_are_compatible() {
    let a = ResourceHandle::new("a", 1);
    let b = ResourceHandle::new("b", 1);
    let left = sorted(vec![read_usage(&a, ResourceState::ShaderResource)]);
    let right = sorted(vec![read_usage(&b, ResourceState::ShaderResource)]);
    assert!(parallel_compatible(&left, &right));
}

#[test]
fn shared_resource_same_entry_state_is_compatible() {
    let shared = ResourceHandle::new("shared", 1);
    let left = sorted(vec![read_usage(&shared, ResourceState::ShaderResource)]);
    let right = sorted(vec![read_usage(&shared, ResourceState::ShaderResource)]);
    assert!(parallel_compatible(&left, &right));
}

#[test]
fn shared_resource_different_entry_states_conflict() {
    let shared = ResourceHandle::new("shared", 1);
    let left = sorted(vec![read_usage(&shared, ResourceState::ShaderResource)]);
    let right = sorted(vec![read_usage(&shared, ResourceState::UnorderedAccess)]);
    assert!(!parallel_compatible(&left, &right));
}

#[test]
fn multiple_use_conflicts_with_any_sharing() {
    let shared = ResourceHandle::new("shared", 1);
    let left = sorted(vec![write_usage(&shared, ResourceState::ShaderResource)]);
    let right = sorted(vec![read_usage(&shared, ResourceState::ShaderResource)]);
    assert!(!parallel_compatible(&left, &right));
    assert!(!parallel_compatible(&right, &left));
}

#[test]
fn mixed_lists_walk_by_identity() {
    let a = ResourceHandle::new("a", 1);
    let b = ResourceHandle::new("b", 1);
    let c = ResourceHandle::new("c", 1);
    let left = sorted(vec![
        read_usage(&a, ResourceState::ShaderResource),
        read_usage(&b, ResourceState::ShaderResource),
    ]);
    let right = sorted(vec![
        read_usage(&b, ResourceState::ShaderResource),
        read_usage(&c, ResourceState::CopySource),
    ]);
    assert!(parallel_compatible(&left, &right));

    let right = sorted(vec![
        read_usage(&b, ResourceState::CopySource),
        read_usage(&c, ResourceState::CopySource),
    ]);
    assert!(!parallel_compatible(&left, &right));
}

#[test]
fn compatible_pair_shares_one_barrier_batch() -> Result<()> {
    let mut ctx = make_context()?;
    let texture = ResourceHandle::new("texture", 1);
    ctx.scheduler.track_resource(&texture, ResourceState::Common);

    let mut pipeline = Pipeline::new();
    pipeline.add_task(usage_task(
        "left",
        vec![read_usage(&texture, ResourceState::ShaderResource)],
    ));
    pipeline.add_task(usage_task(
        "right",
        vec![read_usage(&texture, ResourceState::ShaderResource)],
    ));
    ctx.scheduler.set_pipeline(pipeline)?;
    ctx.run_frame()?;

    // One submission: the shared barrier batch followed by both lists.
    assert_eq!(submission_count(&ctx.queues, QueueKind::Graphics), 1);
    {
        let queue = ctx.queues.get(QueueKind::Graphics);
        let queue = queue.lock().unwrap();
        assert_eq!(queue.submissions()[0].lists.len(), 3);
    }

    let transitions = all_transitions(&ctx.queues, QueueKind::Graphics);
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].to, ResourceState::ShaderResource);
    Ok(())
}

#[test]
fn incompatible_pair_is_serialized_with_a_barrier() -> Result<()> {
    let mut ctx = make_context()?;
    let texture = ResourceHandle::new("texture", 1);
    ctx.scheduler.track_resource(&texture, ResourceState::Common);

    let mut pipeline = Pipeline::new();
    pipeline.add_task(usage_task(
        "sample",
        vec![read_usage(&texture, ResourceState::ShaderResource)],
    ));
    pipeline.add_task(usage_task(
        "scatter",
        vec![read_usage(&texture, ResourceState::UnorderedAccess)],
    ));
    ctx.scheduler.set_pipeline(pipeline)?;
    ctx.run_frame()?;

    // Two submissions, with a state transition between the pair.
    assert_eq!(submission_count(&ctx.queues, QueueKind::Graphics), 2);
    let transitions = all_transitions(&ctx.queues, QueueKind::Graphics);
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[0].from, ResourceState::Common);
    assert_eq!(transitions[0].to, ResourceState::ShaderResource);
    assert_eq!(transitions[1].from, ResourceState::ShaderResource);
    assert_eq!(transitions[1].to, ResourceState::UnorderedAccess);
    Ok(())
}

#[test]
fn parallel_recording_respects_the_admission_rule() -> Result<()> {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let mut ctx = make_context()?;
    let texture = ResourceHandle::new("texture", 1);
    ctx.scheduler.track_resource(&texture, ResourceState::Common);

    // Both tasks write the same resource, so the oracle forbids concurrent
    // recording; the peak number of simultaneously running executes must be 1.
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut pipeline = Pipeline::new();
    for name in ["first", "second"] {
        let texture = texture.clone();
        let running = running.clone();
        let peak = peak.clone();
        pipeline.add_task(TaskNode::new(
            TaskBuilder::new(name)
                .setup({
                    let texture = texture.clone();
                    move |ctx| {
                        ctx.use_resource_write(
                            &texture,
                            Subresources::All,
                            ResourceState::UnorderedAccess,
                        )
                    }
                })
                .execute(move |ctx| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    ctx.list().set_resource_state(
                        &texture,
                        Subresources::All,
                        ResourceState::UnorderedAccess,
                    )?;
                    ctx.list().dispatch(8, 8, 1);
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .build(),
        ));
    }
    ctx.scheduler.set_pipeline(pipeline)?;
    ctx.run_frame()?;

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    Ok(())
}
