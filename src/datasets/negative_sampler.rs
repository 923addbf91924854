use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::Result;
use candle_core::Tensor;
use itertools::izip;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{SplitMode, TemporalData};
use crate::{error::TgbError, utils::write_json};

/// How negative destinations are drawn for a positive edge.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
pub enum NegativeStrategy {
    /// Uniformly among all destination nodes.
    #[value(name = "rnd")]
    #[serde(rename = "rnd")]
    Random,
    /// Half from the source's past destinations, the rest uniformly.
    #[default]
    #[value(name = "hist_rnd")]
    #[serde(rename = "hist_rnd")]
    HistoricalRandom,
}

#[derive(Serialize, Deserialize)]
struct NegativeEntry {
    src: u32,
    dst: u32,
    t: i64,
    negatives: Vec<u32>,
}

/// Negative destinations keyed by the positive edge `(src, dst, t)`.
#[derive(Debug, Clone, Default)]
pub struct NegativeSet {
    edges: HashMap<(u32, u32, i64), Vec<u32>>,
}
impl NegativeSet {
    pub fn get(&self, src: u32, dst: u32, t: i64) -> Option<&[u32]> {
        self.edges.get(&(src, dst, t)).map(Vec::as_slice)
    }
    pub fn insert(&mut self, src: u32, dst: u32, t: i64, negatives: Vec<u32>) {
        self.edges.insert((src, dst, t), negatives);
    }
    pub fn len(&self) -> usize {
        self.edges.len()
    }
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut entries: Vec<NegativeEntry> = self
            .edges
            .iter()
            .map(|(&(src, dst, t), negatives)| NegativeEntry {
                src,
                dst,
                t,
                negatives: negatives.clone(),
            })
            .collect();
        entries.sort_by_key(|e| (e.t, e.src, e.dst));
        write_json(&entries, path, false)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let entries: Vec<NegativeEntry> =
            serde_json::from_reader(BufReader::new(File::open(path)?))?;
        let edges = entries
            .into_iter()
            .map(|e| ((e.src, e.dst, e.t), e.negatives))
            .collect();
        Ok(Self { edges })
    }
}

/// Seeded generator of one-vs-many negative sets.
#[derive(Debug, Clone)]
pub struct NegativeEdgeGenerator {
    pub strategy: NegativeStrategy,
    pub num_neg_e: usize,
    pub seed: u64,
}
impl Default for NegativeEdgeGenerator {
    fn default() -> Self {
        Self {
            strategy: NegativeStrategy::HistoricalRandom,
            num_neg_e: 100,
            seed: 1,
        }
    }
}
impl NegativeEdgeGenerator {
    /// For every edge of `split`, draws up to `num_neg_e` destinations among
    /// `all_dst` (sorted, unique). The positive destination and any
    /// destination the source reaches at the same timestamp are never
    /// sampled. `history` supplies the past destinations used by
    /// [`NegativeStrategy::HistoricalRandom`].
    pub fn generate(
        &self,
        split: &TemporalData,
        history: &TemporalData,
        all_dst: &[u32],
    ) -> Result<NegativeSet> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let src = split.src.to_vec1::<u32>()?;
        let dst = split.dst.to_vec1::<u32>()?;
        let t = split.t.to_vec1::<i64>()?;

        let mut same_time: HashMap<(u32, i64), HashSet<u32>> = HashMap::new();
        for (&s, &d, &ts) in izip!(&src, &dst, &t) {
            same_time.entry((s, ts)).or_default().insert(d);
        }

        let mut past: HashMap<u32, BTreeSet<u32>> = HashMap::new();
        if self.strategy == NegativeStrategy::HistoricalRandom {
            let hist_src = history.src.to_vec1::<u32>()?;
            let hist_dst = history.dst.to_vec1::<u32>()?;
            for (s, d) in hist_src.into_iter().zip(hist_dst) {
                past.entry(s).or_default().insert(d);
            }
        }

        let mut set = NegativeSet::default();
        for (&s, &d, &ts) in izip!(&src, &dst, &t) {
            if set.get(s, d, ts).is_some() {
                continue;
            }
            let excluded = &same_time[&(s, ts)];
            let mut chosen = Vec::with_capacity(self.num_neg_e);
            if self.strategy == NegativeStrategy::HistoricalRandom {
                if let Some(past) = past.get(&s) {
                    let pool: Vec<u32> =
                        past.iter().copied().filter(|v| !excluded.contains(v)).collect();
                    chosen.extend(pool.choose_multiple(&mut rng, self.num_neg_e / 2).copied());
                }
            }
            fill_uniform(&mut rng, all_dst, excluded, &mut chosen, self.num_neg_e);
            set.insert(s, d, ts, chosen);
        }
        tracing::debug!(
            strategy = ?self.strategy,
            num_edges = src.len(),
            num_keys = set.len(),
            "generated negative edges"
        );
        Ok(set)
    }
}

fn fill_uniform<R: Rng>(
    rng: &mut R,
    all_dst: &[u32],
    excluded: &HashSet<u32>,
    chosen: &mut Vec<u32>,
    target: usize,
) {
    if chosen.len() >= target || all_dst.is_empty() {
        return;
    }
    let mut taken: HashSet<u32> = chosen.iter().copied().collect();
    let budget = target - chosen.len();
    if all_dst.len() <= excluded.len() + taken.len() + 2 * budget {
        // dense: enumerate what is left
        let pool: Vec<u32> = all_dst
            .iter()
            .copied()
            .filter(|v| !excluded.contains(v) && !taken.contains(v))
            .collect();
        chosen.extend(pool.choose_multiple(rng, budget).copied());
        return;
    }
    // more than `budget` candidates remain, so rejection terminates
    while chosen.len() < target {
        let v = all_dst[rng.gen_range(0..all_dst.len())];
        if !excluded.contains(&v) && taken.insert(v) {
            chosen.push(v);
        }
    }
}

/// Serves the negative set of each evaluation split, `query_batch` style.
#[derive(Debug, Clone, Default)]
pub struct NegativeEdgeSampler {
    eval_sets: HashMap<SplitMode, NegativeSet>,
}
impl NegativeEdgeSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_eval_set(&mut self, split: SplitMode, set: NegativeSet) {
        self.eval_sets.insert(split, set);
    }

    pub fn is_loaded(&self, split: SplitMode) -> bool {
        self.eval_sets.contains_key(&split)
    }

    /// One u32 tensor of negative destinations per positive edge.
    pub fn query_batch(
        &self,
        pos_src: &Tensor,
        pos_dst: &Tensor,
        pos_t: &Tensor,
        split: SplitMode,
    ) -> Result<Vec<Tensor>> {
        let set = self
            .eval_sets
            .get(&split)
            .ok_or(TgbError::NegativesNotLoaded(split))?;
        let device = pos_src.device();
        izip!(
            pos_src.to_vec1::<u32>()?,
            pos_dst.to_vec1::<u32>()?,
            pos_t.to_vec1::<i64>()?
        )
        .map(|(src, dst, t)| -> Result<Tensor> {
            let negatives = set.get(src, dst, t).ok_or(TgbError::MissingNegatives {
                src,
                dst,
                t,
                split,
            })?;
            Ok(Tensor::from_vec(negatives.to_vec(), negatives.len(), device)?)
        })
        .collect()
    }
}
