//! Tests of the transactional behaviour of execution views: clone
//! lineages, copy-on-write structural edits, and the terminal-state
//! protocol.

mod common;

use wiring_analyzer::{
    error::transform,
    loader::{Literal, MethodDescriptor, TypeInfo},
    program::VariableName,
    transform::{noop, CallDescription},
    view::ExecutionView,
};

use crate::common::{applied_log, block_provider, call_provider, generator, run, ScriptLoader};

/// Builds a program of `statements` one-literal statements, each block
/// carrying a recording block provider labelled `stmt<N>`.
fn provided_statements(statements: usize) -> ScriptLoader {
    let entry = generator("entry", move |emitter| {
        for index in 0..statements {
            emitter.begin_block(
                Some(format!("var v{index} = {index}")),
                Some(block_provider(&format!("stmt{index}"))),
            );
            emitter.assign_literal(
                VariableName::new(format!("v{index}")),
                Literal::Integer(index as i64),
            );
        }
        Ok(())
    });

    ScriptLoader::new(entry)
}

#[test]
fn clones_explore_candidate_edits_independently() -> anyhow::Result<()> {
    let entry = generator("entry", |emitter| {
        emitter.begin_block(
            Some("var x = new Foo()".into()),
            Some(block_provider("stmt0")),
        );
        let _ = emitter
            .call(
                MethodDescriptor::constructor(TypeInfo::new("Foo")),
                None,
                vec![],
            )
            .with_provider(call_provider("new-foo"));
        emitter.assign_return_value(VariableName::new("x"));
        Ok(())
    });
    let loader = ScriptLoader::new(entry).with_generator(
        "Foo::new",
        generator("Foo::new", |emitter| {
            emitter.ret(None);
            Ok(())
        }),
    );
    let result = run(loader)?;

    let base = ExecutionView::new(result.clone());
    let anchor = result.entry_context().first_block().unwrap();

    // Two candidate edits explored from the same point.
    let mut accepted = base.clone_view();
    let mut rejected = base.clone_view();
    let appended = accepted
        .append_call(anchor, CallDescription::new("UseA", vec!["x".into()]))?
        .expect("The open view dropped the insertion");
    rejected
        .append_call(anchor, CallDescription::new("UseB", vec!["x".into()]))?
        .expect("The open view dropped the insertion");

    accepted.commit()?;

    // The committed candidate accumulated only its own transformation.
    assert_eq!(applied_log(&accepted), vec!["append-call:stmt0:UseA"]);
    assert_eq!(applied_log(&rejected), vec!["append-call:stmt0:UseB"]);

    // The other candidate of the lineage can no longer commit.
    let error = rejected.commit().expect_err("A second lineage commit succeeded");
    assert_eq!(error, transform::Error::LineageAlreadyCommitted);

    // The structural override is visible to the clone that made it only.
    assert_eq!(accepted.next_block(anchor), Some(appended));
    assert!(base.next_block(anchor).is_none());

    // The inserted call participates in the ordering of its view.
    assert!(accepted.is_synthetic(appended));
    assert_eq!(
        accepted.synthetic_call(appended).map(CallDescription::method),
        Some("UseA")
    );
    assert!(accepted.is_before(Some(anchor), appended));
    assert!(!accepted.is_before(Some(appended), anchor));

    Ok(())
}

#[test]
fn shifting_rewires_the_view_order_only() -> anyhow::Result<()> {
    let result = run(provided_statements(3))?;
    let mut view = ExecutionView::new(result.clone());
    let blocks: Vec<_> = result.blocks_of(result.entry_context_id()).collect();

    view.shift_behind(blocks[0], blocks[1])?;

    // The textual move was requested from the block's own provider.
    assert_eq!(applied_log(&view), vec!["shift-behind:stmt0"]);

    // In the view, the order is now b1, b0, b2.
    assert_eq!(view.previous_block(blocks[1]), None);
    assert_eq!(view.next_block(blocks[1]), Some(blocks[0]));
    assert_eq!(view.previous_block(blocks[0]), Some(blocks[1]));
    assert_eq!(view.next_block(blocks[0]), Some(blocks[2]));
    assert_eq!(view.previous_block(blocks[2]), Some(blocks[0]));
    assert!(view.is_before(Some(blocks[1]), blocks[0]));
    assert!(!view.is_before(Some(blocks[0]), blocks[1]));

    // The shared result still records the execution order.
    let shared: Vec<_> = result.blocks_of(result.entry_context_id()).collect();
    assert_eq!(shared, blocks);

    Ok(())
}

#[test]
fn shifting_without_a_provider_is_a_contract_violation() -> anyhow::Result<()> {
    let entry = generator("entry", |emitter| {
        emitter.begin_block(Some("var a = 1".into()), None);
        emitter.assign_literal(VariableName::new("a"), Literal::Integer(1));
        emitter.begin_block(Some("var b = 2".into()), None);
        emitter.assign_literal(VariableName::new("b"), Literal::Integer(2));
        Ok(())
    });
    let result = run(ScriptLoader::new(entry))?;
    let mut view = ExecutionView::new(result.clone());
    let blocks: Vec<_> = result.blocks_of(result.entry_context_id()).collect();

    let error = view
        .shift_behind(blocks[0], blocks[1])
        .expect_err("Shifting without a provider succeeded");
    assert!(matches!(error, transform::Error::MissingBlockProvider { .. }));

    Ok(())
}

#[test]
fn aborted_views_swallow_every_edit() -> anyhow::Result<()> {
    let result = run(provided_statements(2))?;
    let mut view = ExecutionView::new(result.clone());
    let blocks: Vec<_> = result.blocks_of(result.entry_context_id()).collect();

    view.abort("exploring a different candidate")?;

    // Applies, structural edits and removals all become no-ops.
    view.apply(noop())?;
    view.shift_behind(blocks[0], blocks[1])?;
    assert_eq!(
        view.append_call(blocks[0], CallDescription::new("Use", vec![]))?,
        None
    );

    assert!(applied_log(&view).is_empty());
    assert!(view.applied_transformations().is_empty());
    assert_eq!(view.next_block(blocks[0]), Some(blocks[1]));

    Ok(())
}

#[test]
fn committed_views_reject_further_mutation() -> anyhow::Result<()> {
    let result = run(provided_statements(2))?;
    let mut view = ExecutionView::new(result.clone());
    let blocks: Vec<_> = result.blocks_of(result.entry_context_id()).collect();

    view.commit()?;

    assert_eq!(
        view.apply(noop()).expect_err("Apply after commit succeeded"),
        transform::Error::MutatedAfterCommit
    );
    assert_eq!(
        view.shift_behind(blocks[0], blocks[1])
            .expect_err("Shift after commit succeeded"),
        transform::Error::MutatedAfterCommit
    );
    assert_eq!(
        view.abort("too late").expect_err("Abort after commit succeeded"),
        transform::Error::MutatedAfterCommit
    );

    Ok(())
}

#[test]
fn prepending_inserts_before_the_anchor() -> anyhow::Result<()> {
    let result = run(provided_statements(2))?;
    let mut view = ExecutionView::new(result.clone());
    let blocks: Vec<_> = result.blocks_of(result.entry_context_id()).collect();

    let inserted = view
        .prepend_call(blocks[1], CallDescription::new("Configure", vec![]))?
        .expect("The open view dropped the insertion");

    assert_eq!(applied_log(&view), vec!["prepend-call:stmt1:Configure"]);
    assert_eq!(view.next_block(blocks[0]), Some(inserted));
    assert_eq!(view.next_block(inserted), Some(blocks[1]));
    assert!(view.is_before(Some(blocks[0]), inserted));
    assert!(view.is_before(Some(inserted), blocks[1]));

    Ok(())
}
