use std::{sync::Arc, thread, time::Duration};

use relgraph::{
    BuildConfig, CancelToken, Direction, EdgeType, ExtractOptions, FeatureBinding, FeatureKind,
    Graph, NodeType, RelGraphError, SchemaDecl, SeedRef, Subgraph, SubgraphExtractor,
    SubgraphQuery, Table, TableSet, build_graph, structural_signature,
    subgraph::extract,
};
use serde_json::{Value, json};

// Jan 1st, UTC
const Y2020: i64 = 1_577_836_800;
const Y2021: i64 = 1_609_459_200;
const Y2022: i64 = 1_640_995_200;
const Y2024: i64 = 1_704_067_200;

#[test]
fn scenario_d_one_hop_over_allowlisted_edge() {
    let graph = graph_fixture();
    let query = SubgraphQuery::new(["d1"]).with_hops(1).with_edge_types(&["treats"]);
    let subgraph = extract(&graph, &query).unwrap();

    assert_eq!(node_ids(&subgraph), vec!["drug:d1", "disease:dis1"]);
    let treats = subgraph.edge_slice("treats").unwrap();
    assert_eq!(treats.pairs, vec![(0, 0)]);
    assert!(subgraph.edge_slice("targets").unwrap().is_empty());
    assert!(!subgraph.truncated);
    assert_eq!(
        structural_signature(&subgraph),
        "N[drug:d1,disease:dis1]|E[d1->dis1:treats]"
    );
}

#[test]
fn signature_skips_pairs_outside_node_slices() {
    let graph = graph_fixture();
    let query = SubgraphQuery::new(["d1"]).with_hops(1).with_edge_types(&["treats"]);
    let mut subgraph = extract(&graph, &query).unwrap();
    let treats = subgraph.edges.iter_mut().find(|e| e.edge_type == "treats").unwrap();
    treats.pairs.push((7, 0));
    assert_eq!(
        structural_signature(&subgraph),
        "N[drug:d1,disease:dis1]|E[d1->dis1:treats]"
    );
}

#[test]
fn scenario_d_radius_zero_returns_only_seed() {
    let graph = graph_fixture();
    let query = SubgraphQuery::new(["d1"]).with_edge_types(&["treats"]);
    let subgraph = extract(&graph, &query).unwrap();
    assert_eq!(node_ids(&subgraph), vec!["drug:d1"]);
    assert_eq!(subgraph.edge_count(), 0);
}

#[test]
fn scenario_e_absent_seed_is_an_error() {
    let graph = graph_fixture();
    let err = extract(&graph, &SubgraphQuery::new(["nope"]).with_hops(2)).unwrap_err();
    assert!(matches!(err, RelGraphError::EmptySeed(_)));
}

#[test]
fn unresolved_seeds_are_listed() {
    let graph = graph_fixture();
    let subgraph = extract(&graph, &SubgraphQuery::new(["d1", "ghost"])).unwrap();
    assert_eq!(subgraph.unresolved_seeds, vec![SeedRef::any("ghost")]);
    assert_eq!(subgraph.node_count(), 1);
}

#[test]
fn typed_seed_only_matches_its_node_type() {
    let graph = graph_fixture();
    let query = SubgraphQuery::new([SeedRef::typed("gene", "dis1")]);
    assert!(matches!(
        extract(&graph, &query).unwrap_err(),
        RelGraphError::EmptySeed(_)
    ));

    let query = SubgraphQuery::new([SeedRef::typed("disease", "dis1")]).with_hops(1);
    let subgraph = extract(&graph, &query).unwrap();
    assert_eq!(node_ids(&subgraph), vec!["drug:d1", "drug:d2", "disease:dis1"]);
}

#[test]
fn relation_label_selects_edge_type() {
    let graph = graph_fixture();
    let query = SubgraphQuery::new(["d1"]).with_hops(1).with_edge_types(&["binds"]);
    let subgraph = extract(&graph, &query).unwrap();
    assert_eq!(node_ids(&subgraph), vec!["drug:d1", "gene:g1"]);
}

#[test]
fn direction_limits_traversal() {
    let graph = graph_fixture();
    let base = SubgraphQuery::new([SeedRef::typed("disease", "dis1")]).with_hops(2);

    let outgoing = extract(&graph, &base.clone().with_direction(Direction::Outgoing)).unwrap();
    assert_eq!(node_ids(&outgoing), vec!["disease:dis1"]);

    let incoming = extract(&graph, &base.clone().with_direction(Direction::Incoming)).unwrap();
    assert_eq!(node_ids(&incoming), vec!["drug:d1", "drug:d2", "disease:dis1"]);

    let both = extract(&graph, &base).unwrap();
    assert_eq!(
        node_ids(&both),
        vec!["drug:d1", "drug:d2", "disease:dis1", "gene:g1", "gene:g2"]
    );
}

#[test]
fn larger_radius_never_loses_nodes() {
    let graph = graph_fixture();
    let mut previous: Vec<String> = Vec::new();
    for hops in 0..5 {
        let subgraph = extract(&graph, &SubgraphQuery::new(["d1"]).with_hops(hops)).unwrap();
        let current = node_ids(&subgraph);
        for id in &previous {
            assert!(current.contains(id), "{id} lost at radius {hops}");
        }
        previous = current;
    }
    // d3 and dis2 form a separate component
    assert_eq!(previous.len(), 5);
}

#[test]
fn node_cap_truncates_by_ascending_global_index() {
    let graph = graph_fixture();
    let query = SubgraphQuery::new(["d1"]).with_hops(3).with_max_nodes(2);
    let subgraph = extract(&graph, &query).unwrap();
    assert!(subgraph.truncated);
    // dis1 and g1 both have global index 0 at distance 1; disease is declared first
    assert_eq!(node_ids(&subgraph), vec!["drug:d1", "disease:dis1"]);

    let exact_query = SubgraphQuery::new(["d1"]).with_hops(1).with_max_nodes(3);
    let exact = extract(&graph, &exact_query).unwrap();
    assert!(!exact.truncated);
    assert_eq!(exact.node_count(), 3);
}

#[test]
fn cutoff_hides_future_nodes_and_edges() {
    let graph = graph_fixture();
    let query = SubgraphQuery::new([SeedRef::typed("disease", "dis1")])
        .with_hops(1)
        .with_cutoff(Y2021);
    let subgraph = extract(&graph, &query).unwrap();
    assert_eq!(node_ids(&subgraph), vec!["drug:d1", "disease:dis1"]);
    assert_eq!(subgraph.edge_count(), 1);

    let future_seed = SubgraphQuery::new(["d3"]).with_cutoff(Y2021);
    assert!(matches!(
        extract(&graph, &future_seed).unwrap_err(),
        RelGraphError::EmptySeed(_)
    ));
}

#[test]
fn induced_edges_include_all_allowed_edges_between_selected_nodes() {
    let graph = graph_fixture();
    let query = SubgraphQuery::new(["d1", "d2"]).with_hops(1);
    let subgraph = extract(&graph, &query).unwrap();
    let treats = subgraph.edge_slice("treats").unwrap();
    let drugs = subgraph.node_slice("drug").unwrap();
    let diseases = subgraph.node_slice("disease").unwrap();
    let named: Vec<(&str, &str)> = treats
        .pairs
        .iter()
        .map(|&(s, t)| (drugs.identifiers[s].as_str(), diseases.identifiers[t].as_str()))
        .collect();
    assert_eq!(named, vec![("d1", "dis1"), ("d2", "dis1")]);
    assert_eq!(treats.global, vec![0, 1]);
}

#[test]
fn feature_slices_follow_local_order() {
    let graph = graph_fixture();
    let subgraph = extract(&graph, &SubgraphQuery::new(["d2", "d3"])).unwrap();
    let drugs = subgraph.node_slice("drug").unwrap();
    assert_eq!(drugs.global, vec![1, 2]);
    assert_eq!(drugs.distances, vec![0, 0]);
    let full = &graph.node("drug").unwrap().features;
    assert_eq!(drugs.features.rows(), 2);
    assert_eq!(drugs.features.matrix.row(0), full.matrix.row(1));
    assert_eq!(drugs.features.matrix.row(1), full.matrix.row(2));
    assert_eq!(drugs.features.layout, full.layout);
}

#[test]
fn cancelled_token_aborts_without_result() {
    let extractor = SubgraphExtractor::new(graph_fixture());
    let token = CancelToken::new();
    token.cancel();
    let options = ExtractOptions::default().with_cancel(token);
    let err = extractor
        .extract_with(&SubgraphQuery::new(["d1"]).with_hops(3), &options)
        .unwrap_err();
    assert!(matches!(err, RelGraphError::Cancelled(_)));
    assert!(err.is_interrupted());
}

#[test]
fn zero_timeout_reports_timeout() {
    let extractor = SubgraphExtractor::new(graph_fixture());
    let options = ExtractOptions::default().with_timeout(Duration::ZERO);
    let err = extractor
        .extract_with(&SubgraphQuery::new(["d1"]).with_hops(3), &options)
        .unwrap_err();
    assert!(matches!(err, RelGraphError::Timeout(_)));
}

#[test]
fn zero_node_cap_rejected() {
    let graph = graph_fixture();
    let err = extract(&graph, &SubgraphQuery::new(["d1"]).with_max_nodes(0)).unwrap_err();
    assert!(matches!(err, RelGraphError::InvalidInput(_)));
}

#[test]
fn extractor_is_shared_across_threads_and_deterministic() {
    let graph = graph_fixture();
    let extractor = SubgraphExtractor::new(Arc::clone(&graph));
    let query = SubgraphQuery::new(["d1"]).with_hops(2);
    let expected = structural_signature(&extract(&graph, &query).unwrap());

    thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| extractor.extract(&query).unwrap()))
            .collect();
        for handle in handles {
            let subgraph = handle.join().unwrap();
            assert_eq!(structural_signature(&subgraph), expected);
            assert_eq!(subgraph.snapshot_id, graph.snapshot_id());
        }
    });
    assert!(!extractor.cache().is_empty());
}

#[test]
fn query_parses_from_json() {
    let query: SubgraphQuery = serde_json::from_str(
        r#"{"seeds": [{"identifier": "d1"}, {"node_type": "disease", "identifier": "dis2"}],
            "hops": 1, "edge_types": ["treats"], "direction": "outgoing"}"#,
    )
    .unwrap();
    assert_eq!(query.seeds[1], SeedRef::typed("disease", "dis2"));
    assert_eq!(query.direction, Direction::Outgoing);
    assert_eq!(query.max_nodes, None);
}

fn node_ids(subgraph: &Subgraph) -> Vec<String> {
    subgraph
        .nodes
        .iter()
        .flat_map(|s| s.identifiers.iter().map(move |id| format!("{}:{id}", s.node_type)))
        .collect()
}

/// drug d1 -treats-> dis1 <-treats- d2, d3 -treats-> dis2,
/// d1 -binds-> g1, d2 -binds-> g2. Drugs are approved in 2020, 2022, 2024.
fn graph_fixture() -> Arc<Graph> {
    let decl = SchemaDecl::new()
        .node(NodeType::new("drug", "drug_id", "drugs").with_timestamp("approved_at"))
        .node(NodeType::new("disease", "disease_id", "diseases"))
        .node(NodeType::new("gene", "gene_id", "genes"))
        .edge(EdgeType::new("treats", "drug", "treats", "disease"))
        .edge(EdgeType::new("targets", "drug", "binds", "gene"))
        .feature("drug", FeatureBinding::new("weight", FeatureKind::Numeric, &["weight"]))
        .feature("drug", FeatureBinding::new("class", FeatureKind::Categorical, &["class"]));
    let tables = TableSet::new()
        .with(table(
            "drugs",
            &["drug_id", "approved_at", "weight", "class"],
            vec![
                vec![json!("d1"), json!(Y2020), json!(350.0), json!("kinase")],
                vec![json!("d2"), json!(Y2022), json!(420.5), json!("antibody")],
                vec![json!("d3"), json!(Y2024), Value::Null, json!("kinase")],
            ],
        ))
        .with(table(
            "diseases",
            &["disease_id"],
            vec![vec![json!("dis1")], vec![json!("dis2")]],
        ))
        .with(table(
            "genes",
            &["gene_id"],
            vec![vec![json!("g1")], vec![json!("g2")]],
        ))
        .with(table(
            "treats",
            &["drug", "disease"],
            vec![
                vec![json!("d1"), json!("dis1")],
                vec![json!("d2"), json!("dis1")],
                vec![json!("d3"), json!("dis2")],
            ],
        ))
        .with(table(
            "targets",
            &["drug", "gene"],
            vec![vec![json!("d1"), json!("g1")], vec![json!("d2"), json!("g2")]],
        ));
    build_graph(decl, &tables, BuildConfig::default()).expect("fixture graph")
}

fn table(name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
    Table::new(name, columns).with_rows(rows).expect("fixture table")
}
