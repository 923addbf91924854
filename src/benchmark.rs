//! Dynamic link prediction evaluation: one positive edge against many
//! negatives, with the predictor's memory updated after every batch.

use std::{
    fs::File,
    io::BufReader,
    path::Path,
    time::Instant,
};

use anyhow::Result;
use candle_core::{Device, Tensor};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::{
    config::EdgeBankArgs,
    datasets::{
        LinkPropPredDataset, NegativeEdgeSampler, SplitMode, TemporalData, TemporalDataLoader,
        TemporalDataset,
    },
    error::TgbError,
    evaluate::{EvalInput, EvalMetric, Evaluator},
    models::{EdgeBankPredictor, LinkPredictor, MemoryMode},
    utils::write_json,
};

pub struct OneVsManyEvaluation<'a> {
    pub sampler: &'a NegativeEdgeSampler,
    pub evaluator: &'a Evaluator,
    pub metrics: &'a [EvalMetric],
    pub k_value: usize,
    pub batch_size: usize,
    pub progress: bool,
}
impl OneVsManyEvaluation<'_> {
    /// Scores the edges of `data` selected by `mask` and returns the mean of
    /// each metric over all positive edges, in the order of `self.metrics`.
    ///
    /// All edges of a batch are scored before the batch is added to the
    /// predictor's memory.
    pub fn run<P: LinkPredictor + ?Sized>(
        &self,
        data: &TemporalData,
        mask: &Tensor,
        split: SplitMode,
        predictor: &mut P,
    ) -> Result<Vec<f64>> {
        let split_data = data.index_select(mask)?;
        if split_data.is_empty() {
            return Err(TgbError::EmptySplit(split).into());
        }
        let loader = TemporalDataLoader::new(&split_data, self.batch_size)?;
        let pbar = if self.progress {
            let pbar = ProgressBar::new(loader.num_batches() as u64);
            pbar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")?
                    .progress_chars("#>-"),
            );
            pbar.set_message(format!("{split}"));
            pbar
        } else {
            ProgressBar::hidden()
        };

        let mut perf_sum = vec![0.0; self.metrics.len()];
        let mut num_queries = 0usize;
        for batch in loader {
            let batch = batch?;
            let neg_batch_list =
                self.sampler
                    .query_batch(&batch.src, &batch.dst, &batch.t, split)?;
            let pos_src = batch.src.to_vec1::<u32>()?;

            for (idx, neg_batch) in neg_batch_list.iter().enumerate() {
                let num_neg = neg_batch.elem_count();
                let query_src = Tensor::full(pos_src[idx], num_neg + 1, split_data.device())?;
                let query_dst = Tensor::cat(&[&batch.dst.narrow(0, idx, 1)?, neg_batch], 0)?;

                let y_pred = predictor.predict_link(&query_src, &query_dst)?;
                let scores = self.evaluator.eval(&EvalInput {
                    y_pred_pos: &y_pred.narrow(0, 0, 1)?,
                    y_pred_neg: &y_pred.narrow(0, 1, num_neg)?,
                    eval_metric: self.metrics,
                    k_value: self.k_value,
                })?;
                for (sum, metric) in perf_sum.iter_mut().zip(self.metrics) {
                    *sum += scores[metric];
                }
                num_queries += 1;
            }

            // update the memory only after the whole batch was scored
            predictor.update_memory(&batch.src, &batch.dst, &batch.t)?;
            pbar.inc(1);
        }
        pbar.finish_and_clear();

        Ok(perf_sum
            .into_iter()
            .map(|sum| sum / num_queries as f64)
            .collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitResult {
    pub metric: f64,
    pub hits: f64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub model: String,
    pub data: String,
    pub memory_mode: MemoryMode,
    pub time_window_ratio: f64,
    pub seed: u64,
    pub metric: String,
    pub k_value: usize,
    pub val: SplitResult,
    pub test: SplitResult,
    pub total_elapsed_secs: f64,
}

/// Appends `result` to the JSON file at `path`, which holds either a single
/// record or a list of records.
pub fn save_results<P: AsRef<Path>>(result: &BenchmarkResult, path: P) -> Result<()> {
    let path = path.as_ref();
    let record = serde_json::to_value(result)?;
    let records = if path.is_file() {
        let previous: serde_json::Value =
            serde_json::from_reader(BufReader::new(File::open(path)?))?;
        match previous {
            serde_json::Value::Array(mut records) => {
                records.push(record);
                records
            }
            previous => vec![previous, record],
        }
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        vec![record]
    };
    write_json(&records, path, true)
}

fn evaluate_split(
    dataset: &LinkPropPredDataset,
    split: SplitMode,
    edgebank: &mut EdgeBankPredictor,
    evaluator: &Evaluator,
    args: &EdgeBankArgs,
) -> Result<SplitResult> {
    let metrics = [dataset.eval_metric(), EvalMetric::Hits];
    let evaluation = OneVsManyEvaluation {
        sampler: dataset.negative_sampler(),
        evaluator,
        metrics: &metrics,
        k_value: args.k_value,
        batch_size: args.bs,
        progress: !args.no_progress,
    };
    let start = Instant::now();
    let perf = evaluation.run(dataset.full_data(), dataset.split_mask(split), split, edgebank)?;
    let result = SplitResult {
        metric: perf[0],
        hits: perf[1],
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    tracing::info!(
        %split,
        metric = %metrics[0],
        value = result.metric,
        hits = result.hits,
        elapsed_secs = result.elapsed_secs,
        "one-vs-many evaluation done"
    );
    Ok(result)
}

/// Loads the dataset, seeds EdgeBank with the training edges and evaluates
/// the validation split, then the test split.
pub fn run_edgebank(args: &EdgeBankArgs) -> Result<BenchmarkResult> {
    let start_overall = Instant::now();
    let device = Device::Cpu;

    let mut dataset = LinkPropPredDataset::new(&args.data, &args.root, args.dataset_options(), &device)?;
    let metric = dataset.eval_metric();

    // data for memory in edgebank
    let train = dataset.full_data().index_select(dataset.train_mask())?;
    let mut edgebank = EdgeBankPredictor::new(
        &train.src,
        &train.dst,
        &train.t,
        args.mem_mode,
        args.time_window_ratio,
    )?;
    tracing::info!(
        model = "EdgeBank",
        memory_mode = %args.mem_mode,
        data = %args.data,
        num_train_edges = train.len(),
        "initialised memory"
    );

    let evaluator = Evaluator;

    dataset.load_val_ns()?;
    let val = evaluate_split(&dataset, SplitMode::Val, &mut edgebank, &evaluator, args)?;

    dataset.load_test_ns()?;
    let test = evaluate_split(&dataset, SplitMode::Test, &mut edgebank, &evaluator, args)?;

    let result = BenchmarkResult {
        model: "EdgeBank".to_owned(),
        data: args.data.clone(),
        memory_mode: args.mem_mode,
        time_window_ratio: args.time_window_ratio,
        seed: args.seed,
        metric: metric.key(args.k_value),
        k_value: args.k_value,
        val,
        test,
        total_elapsed_secs: start_overall.elapsed().as_secs_f64(),
    };
    if let Some(path) = &args.results {
        save_results(&result, path)?;
        tracing::info!(path = %path.display(), "saved results");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{NegativeEdgeGenerator, NegativeSet, NegativeStrategy};

    /// Scores every negative 0 and remembers nothing.
    struct Constant;
    impl LinkPredictor for Constant {
        fn predict_link(&self, query_src: &Tensor, _query_dst: &Tensor) -> Result<Tensor> {
            Ok(query_src.zeros_like()?.to_dtype(candle_core::DType::F32)?)
        }
        fn update_memory(&mut self, _: &Tensor, _: &Tensor, _: &Tensor) -> Result<()> {
            Ok(())
        }
    }

    fn repeated_edges() -> Result<(TemporalData, Tensor, NegativeEdgeSampler)> {
        // the same edge 0 -> 1 observed at t = 0..4; edges 2 and 3 are the split
        let data = TemporalData::new(vec![0; 4], vec![1; 4], (0..4).collect(), &Device::Cpu)?;
        let mask = Tensor::new(&[0u8, 0, 1, 1], &Device::Cpu)?;
        let mut set = NegativeSet::default();
        set.insert(0, 1, 2, vec![2, 3, 4]);
        set.insert(0, 1, 3, vec![2, 3, 4]);
        let mut sampler = NegativeEdgeSampler::new();
        sampler.load_eval_set(SplitMode::Val, set);
        Ok((data, mask, sampler))
    }

    #[test]
    fn edgebank_ranks_remembered_edges_first() -> Result<()> {
        let (data, mask, sampler) = repeated_edges()?;
        let train = data.index_select(&Tensor::new(&[1u8, 1, 0, 0], &Device::Cpu)?)?;
        let mut edgebank =
            EdgeBankPredictor::new(&train.src, &train.dst, &train.t, MemoryMode::Unlimited, 0.15)?;
        let evaluator = Evaluator;
        let evaluation = OneVsManyEvaluation {
            sampler: &sampler,
            evaluator: &evaluator,
            metrics: &[EvalMetric::Mrr, EvalMetric::Hits],
            k_value: 1,
            batch_size: 1,
            progress: false,
        };
        let perf = evaluation.run(&data, &mask, SplitMode::Val, &mut edgebank)?;
        assert_eq!(perf, vec![1.0, 1.0]);
        Ok(())
    }

    #[test]
    fn memory_is_updated_after_each_batch() -> Result<()> {
        // nothing in memory: the first batch scores all ties, later ones see it
        let (data, mask, sampler) = repeated_edges()?;
        let empty = data.index_select(&Tensor::new(&[0u8, 0, 0, 0], &Device::Cpu)?)?;
        let evaluator = Evaluator;
        let run = |batch_size: usize| -> Result<f64> {
            let mut edgebank =
                EdgeBankPredictor::new(&empty.src, &empty.dst, &empty.t, MemoryMode::Unlimited, 0.15)?;
            let evaluation = OneVsManyEvaluation {
                sampler: &sampler,
                evaluator: &evaluator,
                metrics: &[EvalMetric::Mrr],
                k_value: 10,
                batch_size,
                progress: false,
            };
            Ok(evaluation.run(&data, &mask, SplitMode::Val, &mut edgebank)?[0])
        };
        // all-tie rank with 3 negatives is 2.5
        let tie = 1.0 / 2.5;
        assert!((run(1)? - (tie + 1.0) / 2.0).abs() < 1e-6);
        assert!((run(2)? - tie).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn constant_predictor_gets_the_tie_rank() -> Result<()> {
        let (data, mask, sampler) = repeated_edges()?;
        let evaluator = Evaluator;
        let evaluation = OneVsManyEvaluation {
            sampler: &sampler,
            evaluator: &evaluator,
            metrics: &[EvalMetric::Mrr],
            k_value: 10,
            batch_size: 200,
            progress: false,
        };
        let perf = evaluation.run(&data, &mask, SplitMode::Val, &mut Constant)?;
        assert!((perf[0] - 0.4).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn empty_split_and_unloaded_negatives_are_errors() -> Result<()> {
        let (data, _, sampler) = repeated_edges()?;
        let evaluator = Evaluator;
        let evaluation = OneVsManyEvaluation {
            sampler: &sampler,
            evaluator: &evaluator,
            metrics: &[EvalMetric::Mrr],
            k_value: 10,
            batch_size: 2,
            progress: false,
        };
        let none = Tensor::new(&[0u8, 0, 0, 0], &Device::Cpu)?;
        assert!(evaluation
            .run(&data, &none, SplitMode::Val, &mut Constant)
            .is_err());
        let all = Tensor::new(&[1u8, 1, 1, 1], &Device::Cpu)?;
        assert!(evaluation
            .run(&data, &all, SplitMode::Test, &mut Constant)
            .is_err());
        Ok(())
    }

    #[test]
    fn save_results_appends_records() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results").join("edgebank.json");
        let split = SplitResult {
            metric: 0.5,
            hits: 0.75,
            elapsed_secs: 1.0,
        };
        let result = BenchmarkResult {
            model: "EdgeBank".to_owned(),
            data: "tgbl-toy".to_owned(),
            memory_mode: MemoryMode::FixedTimeWindow,
            time_window_ratio: 0.15,
            seed: 1,
            metric: "mrr".to_owned(),
            k_value: 10,
            val: split.clone(),
            test: split,
            total_elapsed_secs: 2.0,
        };
        save_results(&result, &path)?;
        save_results(&result, &path)?;
        let saved: Vec<BenchmarkResult> = serde_json::from_reader(File::open(&path)?)?;
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].memory_mode, MemoryMode::FixedTimeWindow);
        assert_eq!(saved[0].val.hits, 0.75);
        Ok(())
    }

    #[test]
    fn generated_negatives_drive_a_full_split() -> Result<()> {
        let data = TemporalData::new(
            (0..30).map(|i| i % 5).collect(),
            (0..30).map(|i| 5 + i % 5).collect(),
            (0..30).collect(),
            &Device::Cpu,
        )?;
        let train_mask = Tensor::from_iter((0..30).map(|i| (i < 20) as u8), &Device::Cpu)?;
        let val_mask = Tensor::from_iter((0..30).map(|i| (i >= 20) as u8), &Device::Cpu)?;
        let train = data.index_select(&train_mask)?;
        let val = data.index_select(&val_mask)?;
        let generator = NegativeEdgeGenerator {
            strategy: NegativeStrategy::Random,
            num_neg_e: 5,
            seed: 1,
        };
        let mut sampler = NegativeEdgeSampler::new();
        sampler.load_eval_set(
            SplitMode::Val,
            generator.generate(&val, &train, &(0..10).collect::<Vec<u32>>())?,
        );
        let mut edgebank =
            EdgeBankPredictor::new(&train.src, &train.dst, &train.t, MemoryMode::Unlimited, 0.15)?;
        let evaluator = Evaluator;
        let evaluation = OneVsManyEvaluation {
            sampler: &sampler,
            evaluator: &evaluator,
            metrics: &[EvalMetric::Mrr],
            k_value: 10,
            batch_size: 4,
            progress: false,
        };
        let perf = evaluation.run(&data, &val_mask, SplitMode::Val, &mut edgebank)?;
        // every val edge repeats a training edge, negatives never do
        assert_eq!(perf, vec![1.0]);
        Ok(())
    }
}
