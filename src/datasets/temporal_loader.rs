use anyhow::Result;
use candle_core::Tensor;

use super::TemporalData;
use crate::error::TgbError;

#[derive(Debug, Clone)]
pub struct TemporalBatch {
    pub src: Tensor,
    pub dst: Tensor,
    pub t: Tensor,
}

/// Iterates over contiguous, time-ordered chunks of a [`TemporalData`].
/// The last batch holds the remainder.
pub struct TemporalDataLoader<'a> {
    data: &'a TemporalData,
    batch_size: usize,
    offset: usize,
}
impl<'a> TemporalDataLoader<'a> {
    pub fn new(data: &'a TemporalData, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(TgbError::ZeroBatchSize.into());
        }
        Ok(Self {
            data,
            batch_size,
            offset: 0,
        })
    }

    pub fn num_batches(&self) -> usize {
        self.data.len().div_ceil(self.batch_size)
    }

    fn batch(&self, start: usize, len: usize) -> candle_core::Result<TemporalBatch> {
        Ok(TemporalBatch {
            src: self.data.src.narrow(0, start, len)?,
            dst: self.data.dst.narrow(0, start, len)?,
            t: self.data.t.narrow(0, start, len)?,
        })
    }
}

impl<'a> Iterator for TemporalDataLoader<'a> {
    type Item = candle_core::Result<TemporalBatch>;
    fn next(&mut self) -> Option<Self::Item> {
        let total = self.data.len();
        if self.offset >= total {
            return None;
        }
        let len = self.batch_size.min(total - self.offset);
        let batch = self.batch(self.offset, len);
        self.offset += len;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    #[test]
    fn batches_cover_stream_in_order() -> Result<()> {
        let data = TemporalData::new(
            (0..5).collect(),
            (1..6).collect(),
            (0..5).map(|t| t * 10).collect(),
            &Device::Cpu,
        )?;
        let loader = TemporalDataLoader::new(&data, 2)?;
        assert_eq!(loader.num_batches(), 3);

        let batches = loader.collect::<candle_core::Result<Vec<_>>>()?;
        let sizes: Vec<usize> = batches.iter().map(|b| b.src.elem_count()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(batches[1].src.to_vec1::<u32>()?, vec![2, 3]);
        assert_eq!(batches[2].t.to_vec1::<i64>()?, vec![40]);
        Ok(())
    }

    #[test]
    fn zero_batch_size_is_rejected() -> Result<()> {
        let data = TemporalData::new(vec![0], vec![1], vec![0], &Device::Cpu)?;
        assert!(TemporalDataLoader::new(&data, 0).is_err());
        Ok(())
    }
}
