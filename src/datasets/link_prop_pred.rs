use std::path::{Path, PathBuf};

use anyhow::Result;
use candle_core::Tensor;
use itertools::Itertools;

use super::{
    download_and_extract, EdgeListColumns, NegativeEdgeGenerator, NegativeEdgeSampler,
    NegativeSet, SplitMode, TemporalData, TemporalDataset,
};
use crate::{error::TgbError, evaluate::EvalMetric, utils::quantile};

#[derive(Debug, Clone)]
pub struct LinkPropPredOptions {
    pub columns: EdgeListColumns,
    pub val_ratio: f64,
    pub test_ratio: f64,
    /// Zip archive fetched when `root/<name>` does not exist.
    pub url: Option<String>,
    pub negatives: NegativeEdgeGenerator,
}
impl Default for LinkPropPredOptions {
    fn default() -> Self {
        Self {
            columns: EdgeListColumns::default(),
            val_ratio: 0.15,
            test_ratio: 0.15,
            url: None,
            negatives: NegativeEdgeGenerator::default(),
        }
    }
}

/// A dynamic link property prediction dataset: one edge stream split
/// chronologically, with one-vs-many negatives for validation and test.
///
/// On disk:
/// ```text
/// root/<name>/<name>_edgelist.csv
/// root/<name>/<name>_val_ns.json   (created by `load_val_ns` if missing)
/// root/<name>/<name>_test_ns.json  (created by `load_test_ns` if missing)
/// ```
#[derive(Debug, Clone)]
pub struct LinkPropPredDataset {
    name: String,
    dir: PathBuf,
    full_data: TemporalData,
    train_mask: Tensor,
    val_mask: Tensor,
    test_mask: Tensor,
    negative_sampler: NegativeEdgeSampler,
    generator: NegativeEdgeGenerator,
}
impl LinkPropPredDataset {
    pub fn new<P: AsRef<Path>>(
        name: &str,
        root: P,
        options: LinkPropPredOptions,
        device: &candle_core::Device,
    ) -> Result<Self> {
        let dir = root.as_ref().join(name);
        if !dir.exists() {
            match &options.url {
                Some(url) => download_and_extract(url, &dir)?,
                None => {
                    return Err(TgbError::DatasetNotFound {
                        name: name.to_owned(),
                        path: dir.display().to_string(),
                    }
                    .into())
                }
            }
        }
        let full_data = TemporalData::from_csv(
            dir.join(format!("{name}_edgelist.csv")),
            &options.columns,
            device,
        )?;
        Self::from_data(name, dir, full_data, options)
    }

    /// Splits an already loaded edge stream. `dir` is where negative sets are
    /// cached.
    pub fn from_data<P: AsRef<Path>>(
        name: &str,
        dir: P,
        full_data: TemporalData,
        options: LinkPropPredOptions,
    ) -> Result<Self> {
        let t = full_data.t.to_vec1::<i64>()?;
        let val_time = quantile(&t, 1.0 - options.val_ratio - options.test_ratio);
        let test_time = quantile(&t, 1.0 - options.test_ratio);
        let (train, val, test) = match (val_time, test_time) {
            (Some(val_time), Some(test_time)) => {
                let mut train = Vec::with_capacity(t.len());
                let mut val = Vec::with_capacity(t.len());
                let mut test = Vec::with_capacity(t.len());
                for &ts in &t {
                    let ts = ts as f64;
                    train.push((ts <= val_time) as u8);
                    val.push((ts > val_time && ts <= test_time) as u8);
                    test.push((ts > test_time) as u8);
                }
                (train, val, test)
            }
            _ => Default::default(),
        };
        let device = full_data.device().clone();
        let num_edges = t.len();
        let mask = |m: Vec<u8>| Tensor::from_vec(m, num_edges, &device);
        let dataset = Self {
            name: name.to_owned(),
            dir: dir.as_ref().to_path_buf(),
            train_mask: mask(train)?,
            val_mask: mask(val)?,
            test_mask: mask(test)?,
            full_data,
            negative_sampler: NegativeEdgeSampler::new(),
            generator: options.negatives,
        };
        tracing::info!(
            dataset = name,
            num_edges,
            num_nodes = dataset.full_data.num_nodes,
            ?val_time,
            ?test_time,
            "split dataset chronologically"
        );
        Ok(dataset)
    }

    /// Every tgbl dataset is ranked by MRR.
    pub fn eval_metric(&self) -> EvalMetric {
        EvalMetric::Mrr
    }

    pub fn negative_sampler(&self) -> &NegativeEdgeSampler {
        &self.negative_sampler
    }

    pub fn load_val_ns(&mut self) -> Result<()> {
        self.load_ns(SplitMode::Val)
    }

    pub fn load_test_ns(&mut self) -> Result<()> {
        self.load_ns(SplitMode::Test)
    }

    pub fn ns_path(&self, split: SplitMode) -> PathBuf {
        self.dir.join(format!("{}_{}_ns.json", self.name, split))
    }

    fn load_ns(&mut self, split: SplitMode) -> Result<()> {
        let path = self.ns_path(split);
        let set = if path.exists() {
            tracing::info!(path = %path.display(), %split, "loading negative samples");
            NegativeSet::load(&path)?
        } else {
            let set = self.generate_ns(split)?;
            std::fs::create_dir_all(&self.dir)?;
            set.save(&path)?;
            tracing::info!(path = %path.display(), %split, "saved negative samples");
            set
        };
        self.negative_sampler.load_eval_set(split, set);
        Ok(())
    }

    fn generate_ns(&self, split: SplitMode) -> Result<NegativeSet> {
        let history_mask = match split {
            SplitMode::Val => self.train_mask.clone(),
            SplitMode::Test => (&self.train_mask + &self.val_mask)?,
        };
        let history = self.full_data.index_select(&history_mask)?;
        let split_data = self.full_data.index_select(self.split_mask(split))?;
        let all_dst: Vec<u32> = self
            .full_data
            .dst
            .to_vec1::<u32>()?
            .into_iter()
            .sorted_unstable()
            .dedup()
            .collect();
        tracing::info!(%split, num_edges = split_data.len(), "generating negative samples");
        self.generator.generate(&split_data, &history, &all_dst)
    }
}

impl TemporalDataset for LinkPropPredDataset {
    fn full_data(&self) -> &TemporalData {
        &self.full_data
    }
    fn train_mask(&self) -> &Tensor {
        &self.train_mask
    }
    fn val_mask(&self) -> &Tensor {
        &self.val_mask
    }
    fn test_mask(&self) -> &Tensor {
        &self.test_mask
    }
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;
    use crate::datasets::NegativeStrategy;

    fn dataset(dir: &Path) -> Result<LinkPropPredDataset> {
        // t = 0..20, quantiles 0.7 -> 13.3, 0.85 -> 16.15
        let data = TemporalData::new(
            (0..20).map(|i| i % 4).collect(),
            (0..20).map(|i| 4 + i % 3).collect(),
            (0..20).collect(),
            &Device::Cpu,
        )?;
        LinkPropPredDataset::from_data("tgbl-toy", dir, data, LinkPropPredOptions::default())
    }

    #[test]
    fn chronological_split_partitions_edges() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = dataset(dir.path())?;
        let train = dataset.train_mask().to_vec1::<u8>()?;
        let val = dataset.val_mask().to_vec1::<u8>()?;
        let test = dataset.test_mask().to_vec1::<u8>()?;
        assert_eq!(train.iter().filter(|&&m| m == 1).count(), 14);
        assert_eq!(val.iter().filter(|&&m| m == 1).count(), 3);
        assert_eq!(test.iter().filter(|&&m| m == 1).count(), 3);
        for i in 0..20 {
            assert_eq!(train[i] + val[i] + test[i], 1);
        }
        assert_eq!(dataset.eval_metric(), EvalMetric::Mrr);
        Ok(())
    }

    #[test]
    fn negatives_are_generated_then_cached() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut dataset = dataset(dir.path())?;
        assert!(!dataset.negative_sampler().is_loaded(SplitMode::Val));

        dataset.load_val_ns()?;
        assert!(dataset.negative_sampler().is_loaded(SplitMode::Val));
        assert!(dataset.ns_path(SplitMode::Val).exists());

        let val = dataset.full_data().index_select(dataset.val_mask())?;
        let first = dataset
            .negative_sampler()
            .query_batch(&val.src, &val.dst, &val.t, SplitMode::Val)?;

        // a fresh dataset reads the cached file
        let mut reloaded = self::dataset(dir.path())?;
        reloaded.load_val_ns()?;
        let second = reloaded
            .negative_sampler()
            .query_batch(&val.src, &val.dst, &val.t, SplitMode::Val)?;
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.to_vec1::<u32>()?, b.to_vec1::<u32>()?);
        }
        Ok(())
    }

    #[test]
    fn test_negatives_draw_history_from_train_and_val() -> Result<()> {
        // source 9 only appears at t = 15 (val, -> 10) and t = 18 (test, -> 11)
        let data = TemporalData::new(
            (0..20).map(|i| if i == 15 || i == 18 { 9 } else { i % 4 }).collect(),
            (0..20)
                .map(|i| match i {
                    15 => 10,
                    18 => 11,
                    _ => 4 + i % 3,
                })
                .collect(),
            (0..20).collect(),
            &Device::Cpu,
        )?;
        let options = LinkPropPredOptions {
            negatives: NegativeEdgeGenerator {
                strategy: NegativeStrategy::HistoricalRandom,
                num_neg_e: 2,
                seed: 5,
            },
            ..Default::default()
        };
        let dir = tempfile::tempdir()?;
        let mut dataset = LinkPropPredDataset::from_data("tgbl-toy", dir.path(), data, options)?;
        dataset.load_test_ns()?;

        let device = Device::Cpu;
        let negatives = dataset.negative_sampler().query_batch(
            &Tensor::new(&[9u32], &device)?,
            &Tensor::new(&[11u32], &device)?,
            &Tensor::new(&[18i64], &device)?,
            SplitMode::Test,
        )?;
        let negatives = negatives[0].to_vec1::<u32>()?;
        assert_eq!(negatives.len(), 2);
        // the historical half is the val-only destination
        assert_eq!(negatives[0], 10);
        assert!(!negatives.contains(&11));
        Ok(())
    }

    #[test]
    fn missing_dataset_without_url_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = LinkPropPredDataset::new(
            "tgbl-missing",
            dir.path(),
            LinkPropPredOptions::default(),
            &Device::Cpu,
        )
        .unwrap_err();
        assert!(err.to_string().contains("tgbl-missing"));
        Ok(())
    }
}
