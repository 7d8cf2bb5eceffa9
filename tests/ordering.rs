//! Tests of the cross-context ordering queries over a real machine run.

mod common;

use wiring_analyzer::{
    loader::{Literal, MethodDescriptor, TypeInfo},
    program::VariableName,
    view::ExecutionView,
};

use crate::common::{generator, run, ScriptLoader};

/// Builds a program whose first statement calls into a helper with two
/// statements of its own, followed by a second statement in the entry.
fn nested_program() -> ScriptLoader {
    let entry = generator("entry", |emitter| {
        emitter.begin_block(Some("Helper.Prepare()".into()), None);
        emitter.call(
            MethodDescriptor::static_method(TypeInfo::new("Helper"), "Prepare"),
            None,
            vec![],
        );
        emitter.begin_block(Some("var done = true".into()), None);
        emitter.assign_literal(VariableName::new("done"), Literal::Boolean(true));
        Ok(())
    });
    let prepare = generator("Prepare", |emitter| {
        emitter.begin_block(Some("var p1 = 1".into()), None);
        emitter.assign_literal(VariableName::new("p1"), Literal::Integer(1));
        emitter.begin_block(Some("var p2 = 2".into()), None);
        emitter.assign_literal(VariableName::new("p2"), Literal::Integer(2));
        emitter.ret(None);
        Ok(())
    });

    ScriptLoader::new(entry).with_generator("Prepare", prepare)
}

#[test]
fn call_interiors_precede_caller_blocks_after_the_return() -> anyhow::Result<()> {
    let result = run(nested_program())?;
    let view = ExecutionView::new(result.clone());

    let entry_blocks: Vec<_> = result.blocks_of(result.entry_context_id()).collect();
    assert_eq!(entry_blocks.len(), 2);

    let helper = result
        .contexts()
        .iter()
        .find(|context| context.name().name() == "Prepare")
        .expect("The helper context was not created");
    let helper_blocks: Vec<_> = result.blocks_of(helper.id()).collect();
    assert!(helper_blocks.len() >= 2);

    // Every block inside the call precedes the caller block after the
    // call's return, and never the other way around.
    for block in &helper_blocks {
        assert!(view.is_before(Some(*block), entry_blocks[1]));
        assert!(!view.is_before(Some(entry_blocks[1]), *block));
    }

    Ok(())
}

#[test]
fn the_common_call_of_blocks_at_different_depths_is_the_caller() -> anyhow::Result<()> {
    let result = run(nested_program())?;
    let view = ExecutionView::new(result.clone());

    let entry_blocks: Vec<_> = result.blocks_of(result.entry_context_id()).collect();
    let helper = result
        .contexts()
        .iter()
        .find(|context| context.name().name() == "Prepare")
        .unwrap();
    let helper_blocks: Vec<_> = result.blocks_of(helper.id()).collect();

    assert_eq!(
        view.common_call(helper_blocks[0], entry_blocks[1]),
        result.entry_context_id()
    );
    assert_eq!(
        view.common_call(helper_blocks[0], helper_blocks[1]),
        helper.id()
    );

    Ok(())
}

#[test]
fn is_before_totally_orders_the_blocks_of_one_context() -> anyhow::Result<()> {
    let result = run(nested_program())?;
    let view = ExecutionView::new(result.clone());

    let helper = result
        .contexts()
        .iter()
        .find(|context| context.name().name() == "Prepare")
        .unwrap();
    let blocks: Vec<_> = result.blocks_of(helper.id()).collect();

    for earlier in 0..blocks.len() {
        for later in earlier + 1..blocks.len() {
            assert!(view.is_before(Some(blocks[earlier]), blocks[later]));
            assert!(!view.is_before(Some(blocks[later]), blocks[earlier]));
        }
    }

    Ok(())
}

#[test]
fn reductions_pick_extremes_across_call_depths() -> anyhow::Result<()> {
    let result = run(nested_program())?;
    let view = ExecutionView::new(result.clone());

    let entry_blocks: Vec<_> = result.blocks_of(result.entry_context_id()).collect();
    let helper = result
        .contexts()
        .iter()
        .find(|context| context.name().name() == "Prepare")
        .unwrap();
    let helper_blocks: Vec<_> = result.blocks_of(helper.id()).collect();

    let mixed = vec![helper_blocks[1], entry_blocks[1], helper_blocks[0]];
    assert_eq!(view.latest_block(mixed.clone()), Some(entry_blocks[1]));
    assert_eq!(view.earliest_block(mixed), Some(helper_blocks[0]));

    Ok(())
}
