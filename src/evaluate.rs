//! One-vs-many ranking evaluation for dynamic link prediction.
//!
//! Each positive edge is scored against its own list of negative edges. Ties
//! are resolved by averaging the optimistic and the pessimistic rank, so a
//! predictor that outputs the same score for everything is not rewarded.

use std::{collections::HashMap, str::FromStr};

use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::TgbError;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum EvalMetric {
    #[serde(rename = "mrr")]
    Mrr,
    #[serde(rename = "hits@")]
    Hits,
}
impl EvalMetric {
    /// Name of the reported value, e.g. `mrr` or `hits@10`.
    pub fn key(&self, k_value: usize) -> String {
        match self {
            Self::Mrr => "mrr".to_owned(),
            Self::Hits => format!("hits@{k_value}"),
        }
    }
}
impl std::fmt::Display for EvalMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Mrr => write!(f, "mrr"),
            Self::Hits => write!(f, "hits@"),
        }
    }
}
impl FromStr for EvalMetric {
    type Err = TgbError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mrr" => Ok(Self::Mrr),
            "hits@" | "hits" => Ok(Self::Hits),
            _ => Err(TgbError::UnknownMetric(s.to_owned())),
        }
    }
}

pub struct EvalInput<'a> {
    /// Scores of the positive edges, shape `(n,)` or `(n, 1)`.
    pub y_pred_pos: &'a Tensor,
    /// Scores of the negative edges, `m` per positive, shape `(n, m)` or `(n * m,)`.
    pub y_pred_neg: &'a Tensor,
    pub eval_metric: &'a [EvalMetric],
    pub k_value: usize,
}

/// Metric names are parsed by [`EvalMetric::from_str`], which rejects
/// anything but `mrr` and `hits@`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;
impl Evaluator {
    pub fn eval(&self, input: &EvalInput) -> Result<HashMap<EvalMetric, f64>> {
        let num_pos = input.y_pred_pos.elem_count();
        ensure!(num_pos > 0, "no positive scores to evaluate");
        let num_neg = input.y_pred_neg.elem_count() / num_pos;
        ensure!(
            num_neg * num_pos == input.y_pred_neg.elem_count(),
            "{} negative scores cannot be split among {} positives",
            input.y_pred_neg.elem_count(),
            num_pos
        );
        let ranking = if num_neg == 0 {
            Tensor::ones(num_pos, DType::F32, input.y_pred_pos.device())?
        } else {
            let y_pred_pos = input
                .y_pred_pos
                .to_dtype(DType::F32)?
                .reshape((num_pos, 1))?;
            let y_pred_neg = input
                .y_pred_neg
                .to_dtype(DType::F32)?
                .reshape((num_pos, num_neg))?;

            // optimistic: negatives strictly above; pessimistic: at least as high
            let optimistic_rank = y_pred_neg
                .broadcast_gt(&y_pred_pos)?
                .to_dtype(DType::F32)?
                .sum(1)?;
            let pessimistic_rank = y_pred_neg
                .broadcast_ge(&y_pred_pos)?
                .to_dtype(DType::F32)?
                .sum(1)?;
            (optimistic_rank + pessimistic_rank)?.affine(0.5, 1.0)?
        };

        let mut result = HashMap::new();
        for &metric in input.eval_metric {
            let value = match metric {
                EvalMetric::Mrr => ranking.recip()?.mean_all()?,
                EvalMetric::Hits => {
                    let k = Tensor::new(input.k_value as f32, ranking.device())?;
                    ranking.broadcast_le(&k)?.to_dtype(DType::F32)?.mean_all()?
                }
            };
            result.insert(metric, value.to_scalar::<f32>()? as f64);
        }
        Ok(result)
    }
}
