use anyhow::Result;
use candle_core::Tensor;

/// A temporal link predictor scored one query edge at a time and fed the
/// observed edges after every batch.
pub trait LinkPredictor {
    /// Scores for the edges `query_src[i] -> query_dst[i]`, one f32 per query.
    fn predict_link(&self, query_src: &Tensor, query_dst: &Tensor) -> Result<Tensor>;
    fn update_memory(&mut self, src: &Tensor, dst: &Tensor, t: &Tensor) -> Result<()>;
}
