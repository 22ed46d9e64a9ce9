use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use relgraph::{
    BuildComponent, BuildConfig, BuildParts, BuildState, DenseMatrix, EdgeType, EncoderRegistry,
    FeatureBinding, FeatureKind, FeatureParams, GraphBuild, NodeType, RelGraphError, SchemaDecl,
    Table, TableSet, assemble, build_graph, schema,
};
use serde_json::{Value, json};

#[test]
fn scenario_a_assigns_lexicographic_indices_and_resolves_edges() {
    let graph = build_graph(minimal_schema(), &minimal_tables(), BuildConfig::default()).unwrap();

    assert_eq!(graph.lookup("drug", "d1"), Some(0));
    assert_eq!(graph.lookup("drug", "d2"), Some(1));
    assert_eq!(graph.lookup("disease", "dis1"), Some(0));
    assert_eq!(graph.node_count("gene"), Some(1));
    assert_eq!(graph.node_count("trial"), Some(1));
    assert_eq!(graph.node_id("drug", 1), Some("d2"));

    let treats = graph.edge("treats").unwrap();
    assert_eq!(treats.index.pairs(), &[(0, 0)]);
}

#[test]
fn feature_rows_match_instance_counts() {
    let graph = build_graph(biomed_schema(), &biomed_tables(), BuildConfig::default()).unwrap();
    for node in graph.node_tables() {
        assert_eq!(node.features.rows(), node.len(), "{}", node.index.node_type());
        assert_eq!(node.temporal.len(), node.len());
    }
    for edge in graph.edge_tables() {
        assert_eq!(edge.features.rows(), edge.len(), "{}", edge.index.edge_type());
    }
    let drug = graph.node("drug").unwrap();
    // class 2 + unknown, weight 1, phase 1, approved 1, targets 3,
    // description 32, fingerprint 8, approved_at 1
    assert_eq!(drug.features.width(), 3 + 1 + 1 + 1 + 3 + 32 + 8 + 1);
    let layout: Vec<&str> = drug.features.layout.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        layout,
        vec![
            "class",
            "weight",
            "phase",
            "approved",
            "targets",
            "description",
            "fingerprint",
            "approved_at"
        ]
    );
}

#[test]
fn dangling_edges_are_dropped_and_duplicates_collapsed_by_default() {
    let graph = build_graph(biomed_schema(), &biomed_tables(), BuildConfig::default()).unwrap();
    let treats = graph.edge("treats").unwrap();
    assert_eq!(treats.len(), 4);
    assert_eq!(treats.index.dropped_rows(), 1);
    let targets = graph.edge("targets").unwrap();
    assert_eq!(targets.len(), 3);
    assert_eq!(targets.index.duplicate_rows(), 1);
}

#[test]
fn strict_config_fails_on_dangling_edge() {
    let mut build = GraphBuild::new(biomed_schema(), BuildConfig::strict());
    let failure = build.run(&biomed_tables()).unwrap_err();
    assert_eq!(failure.component, BuildComponent::EdgeResolver);
    assert!(matches!(failure.error, RelGraphError::DanglingReference(_)));
    assert!(failure.error.to_string().contains("d9"));
    assert_eq!(build.state(), BuildState::Failed);
    assert_eq!(
        failure.diagnostics.completed,
        vec![BuildComponent::SchemaRegistry, BuildComponent::IndexBuilder]
    );
    assert_eq!(failure.diagnostics.node_counts.len(), 4);
}

#[test]
fn multi_edges_kept_when_allowed() {
    let graph = build_graph(
        biomed_schema(),
        &biomed_tables(),
        BuildConfig::default().allow_multi_edges(),
    )
    .unwrap();
    assert_eq!(graph.edge("targets").unwrap().len(), 4);
}

#[test]
fn schema_errors_fail_before_any_build_work() {
    let decl = minimal_schema().edge(EdgeType::new("causes", "drug", "causes", "symptom"));
    let mut build = GraphBuild::new(decl, BuildConfig::default());
    let failure = build.run(&minimal_tables()).unwrap_err();
    assert_eq!(failure.component, BuildComponent::SchemaRegistry);
    assert!(matches!(failure.error, RelGraphError::SchemaError(_)));
    assert!(failure.diagnostics.completed.is_empty());
    assert_eq!(build.state(), BuildState::Failed);
}

#[test]
fn build_runs_once() {
    let mut build = GraphBuild::new(minimal_schema(), BuildConfig::default());
    assert_eq!(build.state(), BuildState::Unbuilt);
    build.run(&minimal_tables()).unwrap();
    assert_eq!(build.state(), BuildState::Ready);
    assert!(build.state().is_terminal());

    let again = build.run(&minimal_tables()).unwrap_err();
    assert!(matches!(again.error, RelGraphError::AssemblyError(_)));
    assert_eq!(build.state(), BuildState::Ready);
}

#[test]
fn failed_build_records_component_and_stays_failed() {
    let decl = minimal_schema().feature(
        "trial",
        FeatureBinding::new("phase", FeatureKind::Ordinal, &["phase"]).with_params(
            FeatureParams {
                order: vec!["phase1".into(), "phase2".into()],
                ..FeatureParams::default()
            },
        ),
    );
    let mut build = GraphBuild::new(decl, BuildConfig::default());
    let failure = build.run(&minimal_tables()).unwrap_err();
    assert_eq!(failure.component, BuildComponent::FeatureEncoding);
    assert!(matches!(failure.error, RelGraphError::UnknownOrdinalValue(_)));
    assert!(failure.error.to_string().contains("trial.phase"));
    assert_eq!(build.failure().map(|f| f.component), Some(BuildComponent::FeatureEncoding));
    assert!(std::error::Error::source(&failure).is_some());
}

#[test]
fn identical_inputs_give_identical_snapshot_ids() {
    let first = build_graph(biomed_schema(), &biomed_tables(), BuildConfig::default()).unwrap();
    let second = build_graph(biomed_schema(), &biomed_tables(), BuildConfig::sequential()).unwrap();
    assert_eq!(first.metadata().content_hash, second.metadata().content_hash);
    assert_eq!(first.snapshot_id(), second.snapshot_id());
    assert_eq!(first.node("drug").unwrap().features, second.node("drug").unwrap().features);
}

#[test]
fn shuffled_node_rows_do_not_change_the_snapshot() {
    let baseline = build_graph(biomed_schema(), &biomed_tables(), BuildConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..5 {
        let mut tables = biomed_tables();
        for name in ["drugs", "genes", "diseases", "trials"] {
            let mut table = tables.get(name).unwrap().clone();
            table.rows.shuffle(&mut rng);
            tables.insert(table);
        }
        let graph = build_graph(biomed_schema(), &tables, BuildConfig::default()).unwrap();
        assert_eq!(graph.snapshot_id(), baseline.snapshot_id());
    }
}

#[test]
fn shuffled_edge_rows_keep_the_same_edge_set() {
    let baseline = build_graph(biomed_schema(), &biomed_tables(), BuildConfig::default()).unwrap();
    let mut tables = biomed_tables();
    let mut treats = tables.get("treats").unwrap().clone();
    treats.rows.shuffle(&mut StdRng::seed_from_u64(7));
    tables.insert(treats);
    let graph = build_graph(biomed_schema(), &tables, BuildConfig::default()).unwrap();

    let mut expected = baseline.edge("treats").unwrap().index.pairs().to_vec();
    let mut actual = graph.edge("treats").unwrap().index.pairs().to_vec();
    expected.sort_unstable();
    actual.sort_unstable();
    assert_eq!(actual, expected);
}

#[test]
fn seed_changes_projection_but_not_shape() {
    let a = build_graph(biomed_schema(), &biomed_tables(), BuildConfig::default()).unwrap();
    let b = build_graph(
        biomed_schema(),
        &biomed_tables(),
        BuildConfig::default().with_seed(99),
    )
    .unwrap();
    let fa = a.node("drug").unwrap().features.block("fingerprint").unwrap();
    let fb = b.node("drug").unwrap().features.block("fingerprint").unwrap();
    assert_eq!(fa.shape(), fb.shape());
    assert_ne!(fa, fb);
    assert_ne!(a.metadata().content_hash, b.metadata().content_hash);
}

#[test]
fn metadata_reports_counts_and_widths() {
    let graph = build_graph(minimal_schema(), &minimal_tables(), BuildConfig::default()).unwrap();
    let meta = graph.metadata();
    assert_eq!(meta.snapshot_id.len(), 64);
    assert_eq!(meta.schema_hash, graph.schema().schema_hash());
    let counts: Vec<(&str, usize)> = meta
        .node_counts
        .iter()
        .map(|c| (c.name.as_str(), c.count))
        .collect();
    assert_eq!(counts, vec![("drug", 2), ("gene", 1), ("disease", 1), ("trial", 1)]);
    assert!(graph.summary().contains("drug=2"));
}

#[test]
fn frozen_encoders_transform_new_batches_with_same_width() {
    let graph = build_graph(biomed_schema(), &biomed_tables(), BuildConfig::default()).unwrap();
    let batch = Table::new("drugs", &DRUG_COLUMNS)
        .with_rows(vec![vec![
            json!("d7"),
            json!("peptide"),
            json!(500.0),
            json!("phase3"),
            json!(false),
            json!("EGFR|KRAS"),
            json!("novel peptide"),
            json!("0000"),
            json!("2024-05-01"),
        ]])
        .unwrap();
    let encoded = graph.transform_batch("drug", &batch).unwrap();
    let drug = graph.node("drug").unwrap();
    assert_eq!(encoded.width(), drug.features.width());
    assert_eq!(encoded.layout, drug.features.layout);
    // unseen class lands in the unknown column
    assert_eq!(encoded.block("class").unwrap().row(0), &[0.0, 0.0, 1.0]);
}

#[test]
fn assemble_rejects_missing_parts() {
    let tables = minimal_tables();
    let schema = schema::validate(&minimal_schema(), &tables).unwrap();
    let err = assemble(schema, EncoderRegistry::with_defaults(), BuildParts::default(), 0)
        .unwrap_err();
    assert!(matches!(err, RelGraphError::AssemblyError(_)));
}

#[test]
fn assemble_rejects_feature_rows_that_disagree_with_the_index() {
    let tables = minimal_tables();
    let graph = build_graph(minimal_schema(), &tables, BuildConfig::default()).unwrap();
    let parts = || BuildParts {
        node_indices: graph.node_tables().iter().map(|n| n.index.clone()).collect(),
        edge_indices: graph.edge_tables().iter().map(|e| e.index.clone()).collect(),
        node_features: graph
            .node_tables()
            .iter()
            .map(|n| (n.encoders.clone(), n.features.clone()))
            .collect(),
        edge_features: graph
            .edge_tables()
            .iter()
            .map(|e| (e.encoders.clone(), e.features.clone()))
            .collect(),
        node_temporal: graph.node_tables().iter().map(|n| n.temporal.clone()).collect(),
        edge_temporal: graph.edge_tables().iter().map(|e| e.temporal.clone()).collect(),
    };
    let schema = schema::validate(&minimal_schema(), &tables).unwrap();

    let intact = assemble(schema.clone(), EncoderRegistry::with_defaults(), parts(), 0).unwrap();
    assert_eq!(intact.node_count("drug"), Some(2));

    let mut short = parts();
    let drug = &mut short.node_features[0].1;
    drug.matrix = DenseMatrix::zeros(1, drug.width());
    let err = assemble(schema, EncoderRegistry::with_defaults(), short, 0).unwrap_err();
    match err {
        RelGraphError::AssemblyError(msg) => assert!(msg.contains("drug"), "{msg}"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn point_in_time_view_hides_future_nodes_and_their_edges() {
    let graph = build_graph(biomed_schema(), &biomed_tables(), BuildConfig::default()).unwrap();
    let cutoff = 1_640_995_200; // 2022-01-01T00:00:00Z
    let view = graph.point_in_time_view(cutoff);
    let drug_pos = graph.schema().node_position("drug").unwrap();
    let d3 = graph.lookup("drug", "d3").unwrap();
    assert!(!view.node_mask(drug_pos).unwrap().is_visible(d3));

    let treats_pos = graph.schema().edge_position("treats").unwrap();
    let visible = view.visible_pairs(&graph, treats_pos);
    let drug = graph.node("drug").unwrap();
    for (s, _) in &visible {
        assert!(drug.temporal.get(*s).is_none_or(|ts| ts <= cutoff));
    }
    let treats = graph.edge("treats").unwrap();
    for pos in view.edge_mask(treats_pos).unwrap().visible() {
        assert!(treats.temporal.get(pos).is_none_or(|ts| ts <= cutoff));
    }
    // d1->dis1 (2020) and d2->dis1 (2021) only
    assert_eq!(visible.len(), 2);
}

const DRUG_COLUMNS: [&str; 9] = [
    "drug_id",
    "class",
    "weight",
    "phase",
    "approved",
    "targets",
    "description",
    "fingerprint",
    "approved_at",
];

fn minimal_schema() -> SchemaDecl {
    SchemaDecl::new()
        .node(NodeType::new("drug", "drug_id", "drugs"))
        .node(NodeType::new("gene", "gene_id", "genes"))
        .node(NodeType::new("disease", "disease_id", "diseases"))
        .node(NodeType::new("trial", "trial_id", "trials"))
        .edge(EdgeType::new("treats", "drug", "treats", "disease"))
}

fn minimal_tables() -> TableSet {
    TableSet::new()
        .with(table("drugs", &["drug_id"], vec![vec![json!("d2")], vec![json!("d1")]]))
        .with(table("genes", &["gene_id"], vec![vec![json!("g1")]]))
        .with(table("diseases", &["disease_id"], vec![vec![json!("dis1")]]))
        .with(table(
            "trials",
            &["trial_id", "phase"],
            vec![vec![json!("t1"), json!("phase4")]],
        ))
        .with(table(
            "treats",
            &["drug", "disease"],
            vec![vec![json!("d1"), json!("dis1")]],
        ))
}

fn biomed_schema() -> SchemaDecl {
    let phases = FeatureParams {
        order: ["phase1", "phase2", "phase3", "approved"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        ..FeatureParams::default()
    };
    SchemaDecl::new()
        .node(NodeType::new("drug", "drug_id", "drugs").with_timestamp("approved_at"))
        .node(NodeType::new("gene", "gene_id", "genes"))
        .node(NodeType::new("disease", "disease_id", "diseases"))
        .node(NodeType::new("trial", "trial_id", "trials").with_timestamp("started"))
        .edge(EdgeType::new("treats", "drug", "treats", "disease").with_timestamp("since"))
        .edge(EdgeType::new("targets", "drug", "targets", "gene"))
        .edge(EdgeType::new("studies", "trial", "studies", "drug").from_table(
            "trial_drugs",
            "trial",
            "drug",
        ))
        .feature("drug", FeatureBinding::new("class", FeatureKind::Categorical, &["class"]))
        .feature("drug", FeatureBinding::new("weight", FeatureKind::Numeric, &["weight"]))
        .feature(
            "drug",
            FeatureBinding::new("phase", FeatureKind::Ordinal, &["phase"])
                .with_params(phases.clone()),
        )
        .feature("drug", FeatureBinding::new("approved", FeatureKind::Binary, &["approved"]))
        .feature("drug", FeatureBinding::new("targets", FeatureKind::MultiLabel, &["targets"]))
        .feature("drug", FeatureBinding::new("description", FeatureKind::Text, &["description"]))
        .feature(
            "drug",
            FeatureBinding::new("fingerprint", FeatureKind::HighDimFingerprint, &["fingerprint"])
                .with_params(FeatureParams {
                    width: Some(8),
                    ..FeatureParams::default()
                }),
        )
        .feature(
            "drug",
            FeatureBinding::new("approved_at", FeatureKind::Temporal, &["approved_at"]),
        )
        .feature("gene", FeatureBinding::new("family", FeatureKind::Categorical, &["family"]))
        .feature(
            "trial",
            FeatureBinding::new("phase", FeatureKind::Ordinal, &["phase"]).with_params(phases),
        )
        .feature("treats", FeatureBinding::new("since", FeatureKind::Temporal, &["since"]))
}

fn biomed_tables() -> TableSet {
    TableSet::new()
        .with(table(
            "drugs",
            &DRUG_COLUMNS,
            vec![
                vec![
                    json!("d1"),
                    json!("kinase"),
                    json!(350.0),
                    json!("phase2"),
                    json!(true),
                    json!("EGFR|HER2"),
                    json!("Oral kinase inhibitor"),
                    json!("1010"),
                    json!("2020-01-01"),
                ],
                vec![
                    json!("d2"),
                    json!("antibody"),
                    json!(150000.0),
                    json!("approved"),
                    json!("yes"),
                    json!(["PD1"]),
                    json!("Monoclonal antibody"),
                    json!("0110"),
                    json!("2021-06-01"),
                ],
                vec![
                    json!("d3"),
                    json!("kinase"),
                    Value::Null,
                    json!("phase1"),
                    json!(false),
                    json!(""),
                    json!("Kinase inhibitor, second generation"),
                    json!("1111"),
                    json!("2023-03-15"),
                ],
            ],
        ))
        .with(table(
            "genes",
            &["gene_id", "family"],
            vec![
                vec![json!("g1"), json!("kinase")],
                vec![json!("g2"), json!("receptor")],
                vec![json!("g3"), json!("receptor")],
            ],
        ))
        .with(table(
            "diseases",
            &["disease_id", "area"],
            vec![
                vec![json!("dis1"), json!("oncology")],
                vec![json!("dis2"), json!("immunology")],
            ],
        ))
        .with(table(
            "trials",
            &["trial_id", "phase", "started"],
            vec![
                vec![json!("t1"), json!("phase2"), json!("2021-01-01")],
                vec![json!("t2"), json!("phase3"), json!("2024-01-01")],
            ],
        ))
        .with(table(
            "treats",
            &["drug", "disease", "since"],
            vec![
                vec![json!("d1"), json!("dis1"), json!("2020-02-01")],
                vec![json!("d2"), json!("dis1"), json!("2021-07-01")],
                vec![json!("d2"), json!("dis2"), json!("2022-01-02")],
                vec![json!("d3"), json!("dis2"), json!("2023-04-01")],
                vec![json!("d9"), json!("dis1"), Value::Null],
            ],
        ))
        .with(table(
            "targets",
            &["drug", "gene"],
            vec![
                vec![json!("d1"), json!("g1")],
                vec![json!("d1"), json!("g2")],
                vec![json!("d3"), json!("g1")],
                vec![json!("d1"), json!("g1")],
            ],
        ))
        .with(table(
            "trial_drugs",
            &["trial", "drug"],
            vec![vec![json!("t1"), json!("d1")], vec![json!("t2"), json!("d3")]],
        ))
}

fn table(name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
    Table::new(name, columns).with_rows(rows).expect("fixture table")
}
