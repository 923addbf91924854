use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use super::TemporalData;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    Val,
    Test,
}
impl std::fmt::Display for SplitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Val => write!(f, "val"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// A stream of timestamped edges with chronological train/val/test masks.
pub trait TemporalDataset {
    fn full_data(&self) -> &TemporalData;
    fn train_mask(&self) -> &Tensor;
    fn val_mask(&self) -> &Tensor;
    fn test_mask(&self) -> &Tensor;

    fn split_mask(&self, split: SplitMode) -> &Tensor {
        match split {
            SplitMode::Val => self.val_mask(),
            SplitMode::Test => self.test_mask(),
        }
    }
}
