use std::path::PathBuf;

use clap::Parser;

use crate::{
    datasets::{EdgeListColumns, LinkPropPredOptions, NegativeEdgeGenerator, NegativeStrategy},
    models::MemoryMode,
};

/// EdgeBank one-vs-many evaluation on a dynamic link prediction dataset.
#[derive(Parser, Debug, Clone)]
#[command(name = "tgbl_edgebank", version, about)]
pub struct EdgeBankArgs {
    /// Dataset name; the edge list is read from `<root>/<data>/<data>_edgelist.csv`.
    #[arg(long, default_value = "tgbl-coin")]
    pub data: String,
    #[arg(long, default_value = "datasets")]
    pub root: PathBuf,
    /// Batch size.
    #[arg(long, default_value_t = 200)]
    pub bs: usize,
    /// k of hits@k, reported next to the dataset metric.
    #[arg(long, default_value_t = 10)]
    pub k_value: usize,
    /// Seed of the negative edge generator.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
    #[arg(long, value_enum, default_value_t = MemoryMode::Unlimited)]
    pub mem_mode: MemoryMode,
    /// Fraction of the training time span kept by `fixed_time_window`.
    #[arg(long, default_value_t = 0.15)]
    pub time_window_ratio: f64,

    #[arg(long, default_value = "src")]
    pub src_col: String,
    #[arg(long, default_value = "dst")]
    pub dst_col: String,
    #[arg(long, default_value = "ts")]
    pub ts_col: String,
    /// Zip archive to download when the dataset directory is missing.
    #[arg(long)]
    pub url: Option<String>,

    /// Negative destinations per positive edge when generating negative sets.
    #[arg(long, default_value_t = 100)]
    pub num_neg_e: usize,
    #[arg(long, value_enum, default_value_t = NegativeStrategy::HistoricalRandom)]
    pub neg_strategy: NegativeStrategy,

    /// Append the run's results to this JSON file.
    #[arg(long)]
    pub results: Option<PathBuf>,
    /// Hide the batch progress bars.
    #[arg(long)]
    pub no_progress: bool,
}
impl EdgeBankArgs {
    pub fn dataset_options(&self) -> LinkPropPredOptions {
        LinkPropPredOptions {
            columns: EdgeListColumns {
                src: self.src_col.clone(),
                dst: self.dst_col.clone(),
                ts: self.ts_col.clone(),
            },
            url: self.url.clone(),
            negatives: NegativeEdgeGenerator {
                strategy: self.neg_strategy,
                num_neg_e: self.num_neg_e,
                seed: self.seed,
            },
            ..Default::default()
        }
    }
}
