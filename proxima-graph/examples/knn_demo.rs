//! Example: building, querying and maintaining a k-NN graph
//!
//! Walks through the main surfaces of proxima-graph over a set of integers
//! with similarity 1 / (1 + |a - b|).

use proxima_graph::{
    AddParams, BruteForce, BruteParams, GraphBuilder, Item, ItemId, NnDescent, NnDescentParams,
    RemoveParams, SearchParams, Similarity,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::collections::HashSet;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔗 Proxima k-NN Graph Example\n");

    let sim: Arc<dyn Similarity<i64>> =
        Arc::new(|a: &i64, b: &i64| 1.0 / (1.0 + (a - b).abs() as f64));

    let mut rng = StdRng::seed_from_u64(7);
    let items: Vec<Item<i64>> = (0..2000)
        .map(|i| Item::new(i as ItemId, rng.random_range(0..1_000_000)))
        .collect();

    // =====================
    // 1. Exact construction
    // =====================
    println!("🧱 Building the exact graph with block-parallel brute force...");
    let brute = BruteForce::new(
        BruteParams {
            k: 10,
            ..Default::default()
        },
        Arc::clone(&sim),
    )?;
    let exact = brute.build(items.clone())?;
    println!(
        "   {} items, {} similarities evaluated",
        exact.len(),
        brute.computed_similarities()
    );

    // ==========================
    // 2. Approximate construction
    // ==========================
    println!("\n⚡ Building the same graph with NN-Descent...");
    let descent = NnDescent::new(
        NnDescentParams {
            k: 10,
            seed: Some(7),
            ..Default::default()
        },
        Arc::clone(&sim),
    )?;
    let approximate = descent.build(items.clone())?;

    let mut hits = 0usize;
    let mut total = 0usize;
    for id in exact.ids() {
        let truth: HashSet<ItemId> = exact.get(id).map(|nl| nl.ids().collect()).unwrap_or_default();
        if let Some(found) = approximate.get(id) {
            hits += found.iter().filter(|n| truth.contains(&n.id)).count();
        }
        total += truth.len();
    }
    println!(
        "   {} similarities evaluated ({:.1}% of brute force), recall {:.3}",
        descent.computed_similarities(),
        100.0 * descent.computed_similarities() as f64 / brute.computed_similarities() as f64,
        hits as f64 / total as f64
    );

    // =====================
    // 3. Budgeted search
    // =====================
    println!("\n🔍 Searching with a strict similarity budget...");
    let mut graph = approximate;
    let query = 424_242i64;
    let params = SearchParams {
        speedup: 20.0,
        ..Default::default()
    };
    let found = graph.search(&query, 3, &params)?;
    for neighbor in found.iter() {
        println!(
            "   item {} (value {}), similarity {:.6}",
            neighbor.id,
            graph.payload(neighbor.id).copied().unwrap_or_default(),
            neighbor.similarity
        );
    }
    println!(
        "   {} similarities spent, {} restarts",
        graph.stats().search_similarities(),
        graph.stats().search_restarts()
    );

    // =====================
    // 4. Online maintenance
    // =====================
    println!("\n✏️  Adding and removing items online...");
    graph.fast_add(Item::new(999_999, query), &AddParams::default())?;
    println!("   inserted item 999999 next to the previous query");
    graph.fast_remove(999_999, &RemoveParams::default())?;
    println!("   removed it again; {} items remain", graph.len());

    // =====================
    // 5. Analysis and export
    // =====================
    println!("\n📊 Analyzing the graph...");
    let components = graph.connected_components();
    println!("   {} weakly connected component(s)", components.len());

    let gexf = graph.gexf_string();
    println!("   GEXF export: {} bytes", gexf.len());

    Ok(())
}
