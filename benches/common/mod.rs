use rand::{Rng, SeedableRng, rngs::StdRng};
use relgraph::{
    EdgeType, FeatureBinding, FeatureKind, NodeType, SchemaDecl, Table, TableSet,
};
use serde_json::{Value, json};

pub fn bench_scale() -> usize {
    #[cfg(feature = "bench-ci")]
    {
        2_000
    }
    #[cfg(not(feature = "bench-ci"))]
    {
        20_000
    }
}

pub fn schema() -> SchemaDecl {
    SchemaDecl::new()
        .node(NodeType::new("drug", "drug_id", "drugs").with_timestamp("approved_at"))
        .node(NodeType::new("gene", "gene_id", "genes"))
        .node(NodeType::new("disease", "disease_id", "diseases"))
        .edge(EdgeType::new("targets", "drug", "binds", "gene"))
        .edge(EdgeType::new("treats", "drug", "treats", "disease").with_timestamp("since"))
        .edge(EdgeType::new("associated", "gene", "associated_with", "disease"))
        .feature("drug", FeatureBinding::new("class", FeatureKind::Categorical, &["class"]))
        .feature("drug", FeatureBinding::new("weight", FeatureKind::Numeric, &["weight"]))
        .feature("drug", FeatureBinding::new("desc", FeatureKind::Text, &["desc"]))
        .feature("gene", FeatureBinding::new("family", FeatureKind::Categorical, &["family"]))
}

/// Drugs, a quarter as many genes and a tenth as many diseases, each drug
/// linked to a handful of random genes and diseases.
pub fn tables(drugs: usize, seed: u64) -> TableSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let genes = (drugs / 4).max(1);
    let diseases = (drugs / 10).max(1);
    let classes = ["kinase", "antibody", "enzyme", "receptor"];
    let words = ["inhibitor", "agonist", "oral", "selective", "broad", "novel"];

    let drug_rows = (0..drugs)
        .map(|i| {
            let desc = format!(
                "{} {}",
                words[rng.gen_range(0..words.len())],
                words[rng.gen_range(0..words.len())]
            );
            vec![
                json!(format!("D{i:06}")),
                json!(classes[rng.gen_range(0..classes.len())]),
                json!(rng.gen_range(100.0..900.0)),
                json!(desc),
                json!(rng.gen_range(1_000_000_000i64..1_700_000_000)),
            ]
        })
        .collect();
    let gene_rows = (0..genes)
        .map(|i| vec![json!(format!("G{i:05}")), json!(classes[i % classes.len()])])
        .collect();
    let disease_rows = (0..diseases)
        .map(|i| vec![json!(format!("DIS{i:05}"))])
        .collect();

    let mut targets = Vec::with_capacity(drugs * 3);
    let mut treats = Vec::with_capacity(drugs * 2);
    for i in 0..drugs {
        for _ in 0..3 {
            targets.push(vec![
                json!(format!("D{i:06}")),
                json!(format!("G{:05}", rng.gen_range(0..genes))),
            ]);
        }
        for _ in 0..2 {
            treats.push(vec![
                json!(format!("D{i:06}")),
                json!(format!("DIS{:05}", rng.gen_range(0..diseases))),
                json!(rng.gen_range(1_000_000_000i64..1_700_000_000)),
            ]);
        }
    }
    let associated = (0..genes)
        .map(|i| {
            vec![
                json!(format!("G{i:05}")),
                json!(format!("DIS{:05}", rng.gen_range(0..diseases))),
            ]
        })
        .collect();

    TableSet::new()
        .with(table(
            "drugs",
            &["drug_id", "class", "weight", "desc", "approved_at"],
            drug_rows,
        ))
        .with(table("genes", &["gene_id", "family"], gene_rows))
        .with(table("diseases", &["disease_id"], disease_rows))
        .with(table("targets", &["drug", "gene"], targets))
        .with(table("treats", &["drug", "disease", "since"], treats))
        .with(table("associated", &["gene", "disease"], associated))
}

fn table(name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
    Table::new(name, columns).with_rows(rows).expect("bench table")
}
