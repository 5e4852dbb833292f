//! End-to-end propagation scenarios.
//!
//! These tests drive the full taint value the way the fixpoint driver does:
//! build a callee summary, lift it across a call site with `propagate`, and
//! check the caller-side frames attribute by attribute.

use dexflow_taint::{
    AccessPath, CanonicalName, Context, FeatureMayAlwaysSet, Frame, PathElement, Root, Taint,
};

fn call_site(context: &Context) -> (dexflow_taint::MethodId, dexflow_taint::PositionId) {
    let two = context.methods.get("LTwo;.two:()V");
    let position = context.positions.get(Some("Test.java"), 1);
    (two, position)
}

// =============================================================================
// Plain propagation
// =============================================================================

#[test]
fn test_propagate_simple() {
    let context = Context::new();
    let kind = context.kinds.get("TestSinkOne");
    let one = context.methods.get("LOne;.one:()V");
    let (two, call_position) = call_site(&context);

    let taint = Taint::from([Frame::builder(kind)
        .callee(one)
        .distance(1)
        .origins([one])
        .build()]);

    let propagated = taint.propagate(
        two,
        &AccessPath::argument(0),
        call_position,
        100,
        &FeatureMayAlwaysSet::bottom(),
        &context,
        &[],
        &[],
    );

    assert_eq!(
        propagated,
        Taint::from([Frame::builder(kind)
            .callee_port(AccessPath::argument(0))
            .callee(two)
            .call_position(call_position)
            .distance(2)
            .origins([one])
            .build()])
    );
    let frame = propagated.frames().next().unwrap();
    assert!(frame.locally_inferred_features().is_bottom());
    assert!(frame.user_features().is_empty());
}

#[test]
fn test_propagate_mixed_distances_per_kind() {
    let context = Context::new();
    let kind_one = context.kinds.get("TestSinkOne");
    let kind_two = context.kinds.get("TestSinkTwo");
    let one = context.methods.get("LOne;.one:()V");
    let (two, call_position) = call_site(&context);

    let taint = Taint::from([
        Frame::builder(kind_one)
            .callee(one)
            .distance(1)
            .origins([one])
            .build(),
        Frame::builder(kind_two)
            .callee(one)
            .origins([one])
            .build(),
    ]);

    let propagated = taint.propagate(
        two,
        &AccessPath::argument(0),
        call_position,
        100,
        &FeatureMayAlwaysSet::bottom(),
        &context,
        &[],
        &[],
    );

    assert_eq!(
        propagated,
        Taint::from([
            Frame::builder(kind_one)
                .callee_port(AccessPath::argument(0))
                .callee(two)
                .call_position(call_position)
                .distance(2)
                .origins([one])
                .build(),
            Frame::builder(kind_two)
                .callee_port(AccessPath::argument(0))
                .callee(two)
                .call_position(call_position)
                .distance(1)
                .origins([one])
                .build(),
        ])
    );
}

#[test]
fn test_propagate_drops_frames_beyond_max_distance() {
    let context = Context::new();
    let kind = context.kinds.get("TestSinkOne");
    let one = context.methods.get("LOne;.one:()V");
    let (two, call_position) = call_site(&context);

    let taint = Taint::from([Frame::builder(kind).callee(one).distance(1).build()]);

    // Propagation would produce distance 2, which exceeds the bound.
    let propagated = taint.propagate(
        two,
        &AccessPath::argument(0),
        call_position,
        1,
        &FeatureMayAlwaysSet::bottom(),
        &context,
        &[],
        &[],
    );
    assert!(propagated.is_bottom());
}

#[test]
fn test_propagate_partial_distance_drop() {
    let context = Context::new();
    let kind_one = context.kinds.get("TestSinkOne");
    let kind_two = context.kinds.get("TestSinkTwo");
    let one = context.methods.get("LOne;.one:()V");
    let (two, call_position) = call_site(&context);
    let user_feature_one = context.features.get("UserFeatureOne");
    let user_feature_two = context.features.get("UserFeatureTwo");

    let taint = Taint::from([
        Frame::builder(kind_one)
            .callee(one)
            .distance(2)
            .user_features([user_feature_one])
            .build(),
        Frame::builder(kind_two)
            .callee(one)
            .distance(1)
            .user_features([user_feature_two])
            .build(),
    ]);

    // Only the closer frame survives; its user features surface as the
    // successor's inferred features.
    let propagated = taint.propagate(
        two,
        &AccessPath::argument(0),
        call_position,
        2,
        &FeatureMayAlwaysSet::bottom(),
        &context,
        &[],
        &[],
    );
    assert_eq!(
        propagated,
        Taint::from([Frame::builder(kind_two)
            .callee_port(AccessPath::argument(0))
            .callee(two)
            .call_position(call_position)
            .distance(2)
            .inferred_features(FeatureMayAlwaysSet::make_always([user_feature_two]))
            .build()])
    );
}

#[test]
fn test_propagate_extra_features_are_locally_inferred() {
    let context = Context::new();
    let kind = context.kinds.get("TestSinkOne");
    let one = context.methods.get("LOne;.one:()V");
    let (two, call_position) = call_site(&context);
    let via_obscure = context.features.get("via-obscure");

    let taint = Taint::from([Frame::builder(kind).callee(one).distance(1).build()]);

    let propagated = taint.propagate(
        two,
        &AccessPath::argument(0),
        call_position,
        100,
        &FeatureMayAlwaysSet::make_always([via_obscure]),
        &context,
        &[],
        &[],
    );

    let frame = propagated.frames().next().unwrap();
    assert_eq!(
        frame.locally_inferred_features(),
        &FeatureMayAlwaysSet::make_always([via_obscure])
    );
    assert!(frame.inferred_features().is_bottom());
}

// =============================================================================
// Via-type-of / via-value-of materialization
// =============================================================================

#[test]
fn test_propagate_materializes_via_type_of() {
    let context = Context::new();
    let kind = context.kinds.get("TestSinkOne");
    let one = context.methods.get("LOne;.one:()V");
    let (two, call_position) = call_site(&context);
    let string_type = context.types.get("Ljava/lang/String;");

    let taint = Taint::from([Frame::builder(kind)
        .callee(one)
        .distance(1)
        .via_type_of_ports([Root::Argument(0)])
        .build()]);

    let propagated = taint.propagate(
        two,
        &AccessPath::argument(0),
        call_position,
        100,
        &FeatureMayAlwaysSet::bottom(),
        &context,
        &[Some(string_type)],
        &[],
    );

    let expected_feature = context
        .features
        .get_via_type_of_feature(Some("Ljava/lang/String;"));
    let frame = propagated.frames().next().unwrap();
    assert_eq!(
        frame.inferred_features(),
        &FeatureMayAlwaysSet::make_always([expected_feature])
    );
    // The ports were consumed by materialization.
    assert!(frame.via_type_of_ports().is_empty());
}

#[test]
fn test_propagate_skips_invalid_via_type_of_port() {
    let context = Context::new();
    let kind = context.kinds.get("TestSinkOne");
    let one = context.methods.get("LOne;.one:()V");
    let (two, call_position) = call_site(&context);

    // Argument(5) is out of range and the return root is not an argument:
    // both are skipped, the frame still propagates.
    let taint = Taint::from([Frame::builder(kind)
        .callee(one)
        .distance(1)
        .via_type_of_ports([Root::Argument(5), Root::Return])
        .build()]);

    let propagated = taint.propagate(
        two,
        &AccessPath::argument(0),
        call_position,
        100,
        &FeatureMayAlwaysSet::bottom(),
        &context,
        &[None],
        &[],
    );

    let frame = propagated.frames().next().unwrap();
    assert!(frame.inferred_features().is_bottom());
    assert_eq!(frame.distance(), 2);
}

#[test]
fn test_propagate_materializes_via_value_of() {
    let context = Context::new();
    let kind = context.kinds.get("TestSinkOne");
    let one = context.methods.get("LOne;.one:()V");
    let (two, call_position) = call_site(&context);

    let taint = Taint::from([Frame::builder(kind)
        .callee(one)
        .distance(1)
        .via_value_of_ports([Root::Argument(0), Root::Argument(1)])
        .build()]);

    let propagated = taint.propagate(
        two,
        &AccessPath::argument(0),
        call_position,
        100,
        &FeatureMayAlwaysSet::bottom(),
        &context,
        &[],
        &[Some("secret".to_string()), None],
    );

    let known = context.features.get_via_value_of_feature(Some("secret"));
    let unknown = context.features.get_via_value_of_feature(None);
    let frame = propagated.frames().next().unwrap();
    assert_eq!(
        frame.inferred_features(),
        &FeatureMayAlwaysSet::make_always([known, unknown])
    );
    assert!(frame.via_value_of_ports().is_empty());
}

// =============================================================================
// Cross-repository (CRTEX) frames
// =============================================================================

#[test]
fn test_propagate_crtex_instantiates_canonical_names() {
    let context = Context::new();
    let kind_one = context.kinds.get("TestSinkOne");
    let kind_two = context.kinds.get("TestSinkTwo");
    let one = context.methods.get("LOne;.one:()V");
    let (two, call_position) = call_site(&context);

    let taint = Taint::from([
        Frame::builder(kind_one)
            .callee_port(AccessPath::new(Root::Anchor))
            .origins([one])
            .canonical_names(
                [CanonicalName::template("%programmatic_leaf_name%")]
                    .into_iter()
                    .collect(),
            )
            .build(),
        Frame::builder(kind_two)
            .callee_port(AccessPath::new(Root::Anchor))
            .origins([one])
            .canonical_names(
                [CanonicalName::template("constant value")]
                    .into_iter()
                    .collect(),
            )
            .build(),
    ]);

    let propagated = taint.propagate(
        two,
        &AccessPath::argument(0),
        call_position,
        100,
        &FeatureMayAlwaysSet::bottom(),
        &context,
        &[],
        &[],
    );

    let expected_port =
        AccessPath::with_path(Root::Anchor, [PathElement::new("Argument(-1)")]);
    assert_eq!(
        propagated,
        Taint::from([
            Frame::builder(kind_one)
                .callee_port(expected_port.clone())
                .callee(two)
                .call_position(call_position)
                .origins([one])
                .canonical_names(
                    [CanonicalName::instantiated("LTwo;.two:()V")]
                        .into_iter()
                        .collect(),
                )
                .build(),
            Frame::builder(kind_two)
                .callee_port(expected_port)
                .callee(two)
                .call_position(call_position)
                .origins([one])
                .canonical_names(
                    [CanonicalName::instantiated("constant value")]
                        .into_iter()
                        .collect(),
                )
                .build(),
        ])
    );

    // Cross-repository frames stay leaves at export.
    for frame in propagated.frames() {
        assert_eq!(frame.distance(), 0);
    }
}

#[test]
fn test_propagate_crtex_without_canonical_names_is_dropped() {
    let context = Context::new();
    let kind = context.kinds.get("TestSinkOne");
    let one = context.methods.get("LOne;.one:()V");
    let (two, call_position) = call_site(&context);

    let taint = Taint::from([Frame::builder(kind)
        .callee_port(AccessPath::new(Root::Anchor))
        .origins([one])
        .build()]);

    let propagated = taint.propagate(
        two,
        &AccessPath::argument(0),
        call_position,
        100,
        &FeatureMayAlwaysSet::bottom(),
        &context,
        &[],
        &[],
    );
    assert!(propagated.is_bottom());
}

// =============================================================================
// Grouping and lattice boundary behavior
// =============================================================================

#[test]
fn test_join_same_kind_different_distance_merges() {
    let context = Context::new();
    let kind = context.kinds.get("TestSinkOne");
    let one = context.methods.get("LOne;.one:()V");

    let frame_one = Frame::builder(kind)
        .callee_port(AccessPath::argument(0))
        .callee(one)
        .distance(1)
        .origins([one])
        .build();
    let frame_two = Frame::builder(kind)
        .callee_port(AccessPath::argument(0))
        .callee(one)
        .distance(2)
        .origins([one])
        .build();

    let mut taint = Taint::from([frame_one.clone()]);
    taint.join_with(&Taint::from([frame_two]));

    // Same group: the frames merge and distance takes the minimum.
    assert_eq!(taint, Taint::from([frame_one]));
}

#[test]
fn test_taint_leq_and_join_consistency() {
    let context = Context::new();
    let kind_one = context.kinds.get("TestSinkOne");
    let kind_two = context.kinds.get("TestSinkTwo");
    let one = context.methods.get("LOne;.one:()V");

    let small = Taint::from([Frame::builder(kind_one)
        .callee(one)
        .distance(1)
        .origins([one])
        .build()]);
    let big = Taint::from([
        Frame::builder(kind_one)
            .callee(one)
            .distance(1)
            .origins([one])
            .build(),
        Frame::builder(kind_two)
            .callee(one)
            .distance(1)
            .origins([one])
            .build(),
    ]);

    assert!(small.leq(&big));
    assert!(!big.leq(&small));
    assert!(Taint::bottom().leq(&small));
    assert!(!small.leq(&Taint::bottom()));

    let mut joined = small.clone();
    joined.join_with(&big);
    assert_eq!(joined, big);
}

#[test]
fn test_difference() {
    let context = Context::new();
    let kind_one = context.kinds.get("TestSinkOne");
    let kind_two = context.kinds.get("TestSinkTwo");
    let one = context.methods.get("LOne;.one:()V");
    let two = context.methods.get("LTwo;.two:()V");
    let three = context.methods.get("LThree;.three:()V");
    let feature = context.features.get("FeatureOne");
    let user_feature = context.features.get("UserFeatureOne");

    // Subtracting from bottom stays bottom.
    let mut taint = Taint::bottom();
    taint.difference_with(&Taint::from([Frame::builder(kind_one).build()]));
    assert!(taint.is_bottom());

    let initial = Taint::from([Frame::builder(kind_one)
        .callee_port(AccessPath::argument(0))
        .callee(one)
        .distance(1)
        .origins([one])
        .inferred_features(FeatureMayAlwaysSet::make_always([feature]))
        .user_features([user_feature])
        .build()]);

    // Subtracting bottom is the identity.
    let mut taint = initial.clone();
    taint.difference_with(&Taint::bottom());
    assert_eq!(taint, initial);

    // Subtracting the same value yields bottom.
    let mut taint = initial.clone();
    taint.difference_with(&initial);
    assert!(taint.is_bottom());

    // The left side carries features the right side lacks: kept.
    let mut taint = initial.clone();
    taint.difference_with(&Taint::from([Frame::builder(kind_one)
        .callee_port(AccessPath::argument(0))
        .callee(one)
        .distance(1)
        .origins([one])
        .build()]));
    assert_eq!(taint, initial);

    // Mixed: one callee group subsumed, the other not.
    let kept = Frame::builder(kind_two)
        .callee_port(AccessPath::argument(0))
        .callee(three)
        .distance(1)
        .origins([three])
        .build();
    let mut taint = Taint::from([
        Frame::builder(kind_one)
            .callee_port(AccessPath::argument(0))
            .callee(one)
            .distance(1)
            .origins([one])
            .build(),
        kept.clone(),
    ]);
    taint.difference_with(&Taint::from([
        Frame::builder(kind_one)
            .callee_port(AccessPath::argument(0))
            .callee(one)
            .distance(1)
            .origins([one, two])
            .build(),
        Frame::builder(kind_two)
            .callee_port(AccessPath::argument(0))
            .callee(two)
            .distance(1)
            .origins([two])
            .build(),
    ]));
    assert_eq!(taint, Taint::from([kept]));
}

// =============================================================================
// Editors
// =============================================================================

#[test]
fn test_transform_kind_with_merge_demotes_features() {
    let context = Context::new();
    let kind_one = context.kinds.get("TestKindOne");
    let kind_two = context.kinds.get("TestKindTwo");
    let merged = context.kinds.get("TransformedTestKindOne");
    let feature_one = context.features.get("FeatureOne");
    let feature_two = context.features.get("FeatureTwo");
    let user_feature = context.features.get("UserFeatureOne");

    let taint = Taint::from([
        Frame::builder(kind_one)
            .inferred_features(FeatureMayAlwaysSet::make_always([feature_two]))
            .user_features([user_feature])
            .build(),
        Frame::builder(kind_two)
            .inferred_features(FeatureMayAlwaysSet::make_always([feature_one]))
            .user_features([user_feature])
            .build(),
    ]);

    let transformed = taint
        .transform_kind_with_features(|_| vec![merged], |_| FeatureMayAlwaysSet::bottom());

    assert_eq!(
        transformed,
        Taint::from([Frame::builder(merged)
            .inferred_features(FeatureMayAlwaysSet::make_may([feature_one, feature_two]))
            .user_features([user_feature])
            .build()])
    );
}

#[test]
fn test_filter_invalid_frames_by_kind() {
    let context = Context::new();
    let kept = context.kinds.get("TestSource");
    let artificial = context.kinds.artificial_source();
    let one = context.methods.get("LOne;.one:()V");

    let mut taint = Taint::from([
        Frame::builder(kept)
            .callee_port(AccessPath::new(Root::Argument(0)))
            .build(),
        Frame::builder(artificial)
            .callee_port(AccessPath::new(Root::Argument(0)))
            .callee(one)
            .distance(1)
            .build(),
    ]);

    taint.filter_invalid_frames(|_, _, kind| kind != artificial);
    assert_eq!(
        taint,
        Taint::from([Frame::builder(kept)
            .callee_port(AccessPath::new(Root::Argument(0)))
            .build()])
    );
    assert!(taint.contains_kind(kept));
    assert!(!taint.contains_kind(artificial));
}

#[test]
fn test_filter_invalid_frames_by_callee() {
    let context = Context::new();
    let kind = context.kinds.get("TestSource");
    let one = context.methods.get("LOne;.one:()V");

    let leaf = Frame::builder(kind).build();
    let mut taint = Taint::from([
        leaf.clone(),
        Frame::builder(kind).callee(one).distance(1).build(),
    ]);

    taint.filter_invalid_frames(|callee, _, _| callee.is_none());
    assert_eq!(taint, Taint::from([leaf]));
}

#[test]
fn test_append_callee_port_filtered() {
    let context = Context::new();
    let artificial = context.kinds.artificial_source();
    let other = context.kinds.get("TestSource");

    let mut taint = Taint::from([
        Frame::builder(artificial)
            .callee_port(AccessPath::with_path(
                Root::Argument(0),
                [PathElement::new("field1")],
            ))
            .build(),
        Frame::builder(other)
            .callee_port(AccessPath::argument(0))
            .build(),
    ]);

    taint.append_callee_port(&PathElement::new("field2"), |kind| kind == artificial);

    let artificial_frame = taint
        .frames()
        .find(|frame| frame.kind() == Some(artificial))
        .unwrap();
    assert_eq!(
        artificial_frame.callee_port().to_string(),
        "Argument(0).field1.field2"
    );
    let other_frame = taint
        .frames()
        .find(|frame| frame.kind() == Some(other))
        .unwrap();
    assert_eq!(other_frame.callee_port().to_string(), "Argument(0)");
}

#[test]
fn test_attach_position_keeps_only_leaves() {
    let context = Context::new();
    let kind = context.kinds.get("TestSource");
    let one = context.methods.get("LOne;.one:()V");
    let position = context.positions.get(Some("Test.java"), 9);
    let user_feature = context.features.get("UserFeatureOne");

    let taint = Taint::from([
        Frame::builder(kind)
            .callee_port(AccessPath::new(Root::Return))
            .user_features([user_feature])
            .build(),
        Frame::builder(kind).callee(one).distance(1).build(),
    ]);

    let attached = taint.attach_position(position);
    assert_eq!(attached.num_frames(), 1);

    let frame = attached.frames().next().unwrap();
    assert!(frame.is_leaf());
    assert_eq!(frame.call_position(), Some(position));
    assert_eq!(frame.distance(), 0);
    // Declared user features are promoted to locally inferred
    // always-features so issues surface them.
    assert!(frame.user_features().is_empty());
    assert_eq!(
        frame.locally_inferred_features(),
        &FeatureMayAlwaysSet::make_always([user_feature])
    );
}

#[test]
fn test_features_joined() {
    let context = Context::new();
    let kind_one = context.kinds.get("TestSinkOne");
    let kind_two = context.kinds.get("TestSinkTwo");
    let feature_one = context.features.get("FeatureOne");
    let feature_two = context.features.get("FeatureTwo");

    let taint = Taint::from([
        Frame::builder(kind_one)
            .inferred_features(FeatureMayAlwaysSet::make_always([feature_one]))
            .build(),
        Frame::builder(kind_two)
            .inferred_features(FeatureMayAlwaysSet::make_always([feature_two]))
            .build(),
    ]);

    // Joined across frames: each feature holds on only one of them.
    assert_eq!(
        taint.features_joined(),
        FeatureMayAlwaysSet::make_may([feature_one, feature_two])
    );
    assert!(Taint::bottom().features_joined().is_bottom());
}

#[test]
fn test_local_position_editors() {
    let context = Context::new();
    let kind_one = context.kinds.get("TestSinkOne");
    let kind_two = context.kinds.get("TestSinkTwo");
    let position_one = context.positions.get(None, 1);
    let position_two = context.positions.get(None, 2);
    let feature = context.features.get("FeatureOne");

    let mut taint = Taint::from([
        Frame::builder(kind_one)
            .local_positions([position_one])
            .build(),
        Frame::builder(kind_two)
            .local_positions([position_two])
            .build(),
    ]);
    assert_eq!(taint.local_positions(), [position_one, position_two].into());

    taint.add_local_position(position_one);
    for frame in taint.frames() {
        assert!(frame.local_positions().contains(position_one));
    }

    taint.set_local_positions(&[position_two].into());
    for frame in taint.frames() {
        assert_eq!(frame.local_positions(), &[position_two].into());
    }

    taint.add_inferred_features_and_local_position(
        &FeatureMayAlwaysSet::make_always([feature]),
        Some(position_one),
    );
    for frame in taint.frames() {
        assert!(frame.local_positions().contains(position_one));
        assert!(frame.local_positions().contains(position_two));
        assert_eq!(
            frame.locally_inferred_features(),
            &FeatureMayAlwaysSet::make_always([feature])
        );
    }
}
