use clap::Parser;
use tracing_subscriber::EnvFilter;

use candle_tgb::benchmark::run_edgebank;
use candle_tgb::config::EdgeBankArgs;

// cargo run --release --example tgbl_edgebank -- --data tgbl-coin --mem-mode unlimited
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = EdgeBankArgs::parse();
    let result = run_edgebank(&args)?;

    println!("==========================================================");
    println!(
        "============*** {}: {}: {} ***==============",
        result.model, result.memory_mode, result.data
    );
    println!("==========================================================");
    for (split, perf) in [("val", &result.val), ("Test", &result.test)] {
        println!("INFO: {split}: Evaluation Setting: >>> ONE-VS-MANY <<< ");
        println!("\t{split}: {}: {:.4}", result.metric, perf.metric);
        println!("\t{split}: hits@{}: {:.4}", result.k_value, perf.hits);
        println!("\t{split}: Elapsed Time (s): {:.4}", perf.elapsed_secs);
    }
    println!("Overall Elapsed Time (s): {:.4}", result.total_elapsed_secs);
    Ok(())
}
