use bico::{Bico, BicoConfig, NnVariant};
use std::io::{self, BufRead, BufWriter, Write};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Stream comma-separated rows from stdin into BICO and print the coreset.
    //
    // Usage: csv_coreset <dimension> <coreset_size> [projections] [grid|binary] < data.csv
    //
    // Only the first `dimension` fields of each row are used, so a trailing
    // label column is ignored. Output: one line per weighted point, weight
    // first, then the coordinates.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: csv_coreset <dimension> <coreset_size> [projections] [grid|binary]");
        std::process::exit(2);
    }
    let dimension: usize = args[0].parse()?;
    let coreset_size: usize = args[1].parse()?;
    let projections: usize = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(5);
    let variant: NnVariant = args.get(3).map(|s| s.parse()).transpose()?.unwrap_or_default();

    let config = BicoConfig::new(dimension, projections, coreset_size)
        .with_nn_variant(variant)
        .with_fallback_threshold(1.0)
        .with_track_time(true);
    let mut bico = Bico::new(config)?;

    let stdin = io::stdin();
    for (lineno, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: Vec<f64> = line
            .split(',')
            .take(dimension)
            .map(|field| field.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("line {}: {e}", lineno + 1))?;
        bico.insert_point(row)?;
        if (lineno + 1) % 100_000 == 0 {
            eprintln!("read {} points", lineno + 1);
        }
    }

    let stats = bico.stats();
    eprintln!(
        "points={} summaries={} rebuilds={} threshold={}",
        stats.points_seen, stats.node_count, stats.rebuilds, stats.threshold
    );
    if let Some(times) = bico.nn_query_time() {
        for (level, t) in times.iter().enumerate() {
            eprintln!("  level {level}: {t:?} in nearest-neighbor queries");
        }
    }

    let coreset = bico.into_coreset()?;
    let mut out = BufWriter::new(io::stdout().lock());
    coreset.write_text(&mut out)?;
    out.flush()?;
    Ok(())
}
