// On-disk size benchmark: bytes per stored value for every engine and shape
//
// Prints one JSON object per run on stdout.

use anyhow::Context;
use logbench::bench::metrics::{group_by_benchmark, write_json_lines};
use logbench::bench::{MatrixConfig, Runner};

/// Values inserted per run.
const VALUE_COUNTS: [u64; 3] = [1_000, 10_000, 100_000];

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = MatrixConfig::from_env().context("reading matrix configuration")?;
    let root = config.size_root();

    let mut results = Vec::new();
    for engine in config.engines() {
        for shape in config.data_shapes() {
            for values in VALUE_COUNTS {
                match Runner::run_size_in(&root, &engine, shape, values) {
                    Ok(result) => results.push(result),
                    Err(e) => log::error!(
                        "Size run {}/{} with {} values failed: {}",
                        engine.name(),
                        shape.name(),
                        values,
                        e
                    ),
                }
            }
        }
    }

    for group in group_by_benchmark(&results) {
        for result in &group.results {
            log::info!(
                "{} {} n={}: {:.0} bytes/value",
                group.benchmark,
                result.system,
                result.values,
                result.bytes_per_value
            );
        }
    }

    write_json_lines(std::io::stdout().lock(), &results).context("writing results")?;
    Ok(())
}
