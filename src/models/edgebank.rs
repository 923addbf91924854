use std::{collections::HashMap, str::FromStr};

use anyhow::Result;
use candle_core::Tensor;
use itertools::izip;
use serde::{Deserialize, Serialize};

use super::traits::LinkPredictor;
use crate::error::TgbError;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMode {
    /// Every edge ever observed stays in memory.
    #[default]
    #[value(name = "unlimited")]
    Unlimited,
    /// Only edges observed inside the trailing time window count.
    #[value(name = "fixed_time_window")]
    FixedTimeWindow,
}
impl std::fmt::Display for MemoryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Unlimited => write!(f, "unlimited"),
            Self::FixedTimeWindow => write!(f, "fixed_time_window"),
        }
    }
}
impl FromStr for MemoryMode {
    type Err = TgbError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unlimited" => Ok(Self::Unlimited),
            "fixed_time_window" => Ok(Self::FixedTimeWindow),
            _ => Err(TgbError::UnknownMemoryMode(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TimeWindow {
    prev_t: f64,
    cur_t: i64,
    duration: f64,
}

/// EdgeBank: a non-parametric baseline that predicts a link iff the same
/// `(src, dst)` pair was observed before (within the time window, if any).
///
/// https://arxiv.org/abs/2207.10128
#[derive(Debug, Clone)]
pub struct EdgeBankPredictor {
    memory_mode: MemoryMode,
    time_window_ratio: f64,
    window: Option<TimeWindow>,
    // last time each pair was observed
    memory: HashMap<(u32, u32), i64>,
    pos_prob: f32,
}
impl EdgeBankPredictor {
    pub fn new(
        src: &Tensor,
        dst: &Tensor,
        t: &Tensor,
        memory_mode: MemoryMode,
        time_window_ratio: f64,
    ) -> Result<Self> {
        if memory_mode == MemoryMode::FixedTimeWindow
            && !(time_window_ratio > 0.0 && time_window_ratio <= 1.0)
        {
            return Err(TgbError::InvalidTimeWindowRatio(time_window_ratio).into());
        }
        let mut edgebank = Self {
            memory_mode,
            time_window_ratio,
            window: None,
            memory: HashMap::new(),
            pos_prob: 1.0,
        };
        edgebank.update_memory(src, dst, t)?;
        Ok(edgebank)
    }

    pub fn with_pos_prob(mut self, pos_prob: f32) -> Self {
        self.pos_prob = pos_prob;
        self
    }

    /// Number of distinct `(src, dst)` pairs remembered.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Start of the time window; `None` with unlimited memory.
    pub fn start_time(&self) -> Option<f64> {
        self.window.map(|w| w.prev_t)
    }

    /// End of the time window; `None` with unlimited memory.
    pub fn end_time(&self) -> Option<i64> {
        self.window.map(|w| w.cur_t)
    }

    fn contains(&self, src: u32, dst: u32) -> bool {
        match (self.memory.get(&(src, dst)), &self.window) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(&last_t), Some(window)) => last_t as f64 >= window.prev_t,
        }
    }

    fn slide_window(&mut self, t: &[i64]) {
        let (Some(&min_t), Some(&max_t)) = (t.iter().min(), t.iter().max()) else {
            return;
        };
        match &mut self.window {
            // the first edges fix the window length
            None => {
                let duration = (max_t - min_t) as f64;
                let prev_t = min_t as f64 + duration * (1.0 - self.time_window_ratio);
                self.window = Some(TimeWindow {
                    prev_t,
                    cur_t: max_t,
                    duration: max_t as f64 - prev_t,
                });
            }
            Some(window) if max_t > window.cur_t => {
                window.cur_t = max_t;
                window.prev_t = max_t as f64 - window.duration;
            }
            Some(_) => {}
        }
    }
}

impl LinkPredictor for EdgeBankPredictor {
    fn predict_link(&self, query_src: &Tensor, query_dst: &Tensor) -> Result<Tensor> {
        let device = query_src.device();
        let query_src = query_src.to_vec1::<u32>()?;
        let query_dst = query_dst.to_vec1::<u32>()?;
        if query_src.len() != query_dst.len() {
            return Err(TgbError::LengthMismatch {
                src: query_src.len(),
                dst: query_dst.len(),
                t: query_src.len(),
            }
            .into());
        }
        let pred: Vec<f32> = query_src
            .iter()
            .zip(&query_dst)
            .map(|(&src, &dst)| {
                if self.contains(src, dst) {
                    self.pos_prob
                } else {
                    0.0
                }
            })
            .collect();
        let n = pred.len();
        Ok(Tensor::from_vec(pred, n, device)?)
    }

    fn update_memory(&mut self, src: &Tensor, dst: &Tensor, t: &Tensor) -> Result<()> {
        let src = src.to_vec1::<u32>()?;
        let dst = dst.to_vec1::<u32>()?;
        let t = t.to_vec1::<i64>()?;
        if src.len() != dst.len() || src.len() != t.len() {
            return Err(TgbError::LengthMismatch {
                src: src.len(),
                dst: dst.len(),
                t: t.len(),
            }
            .into());
        }
        if self.memory_mode == MemoryMode::FixedTimeWindow {
            self.slide_window(&t);
        }
        for (s, d, ts) in izip!(src, dst, t) {
            self.memory
                .entry((s, d))
                .and_modify(|last_t| *last_t = (*last_t).max(ts))
                .or_insert(ts);
        }
        Ok(())
    }
}
