use std::{collections::HashMap, path::Path};

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use polars::prelude::*;

use crate::{error::TgbError, utils::mask_to_index};

/// Names of the edge list columns holding the endpoints and the timestamp.
#[derive(Clone, Debug)]
pub struct EdgeListColumns {
    pub src: String,
    pub dst: String,
    pub ts: String,
}
impl Default for EdgeListColumns {
    fn default() -> Self {
        Self {
            src: "src".to_owned(),
            dst: "dst".to_owned(),
            ts: "ts".to_owned(),
        }
    }
}

/// Chronologically sorted stream of directed, timestamped edges.
#[derive(Debug, Clone)]
pub struct TemporalData {
    pub src: Tensor, // u32
    pub dst: Tensor, // u32
    pub t: Tensor,   // i64
    pub num_nodes: usize,
}
impl TemporalData {
    pub fn new(src: Vec<u32>, dst: Vec<u32>, t: Vec<i64>, device: &Device) -> Result<Self> {
        if src.len() != dst.len() || src.len() != t.len() {
            return Err(TgbError::LengthMismatch {
                src: src.len(),
                dst: dst.len(),
                t: t.len(),
            }
            .into());
        }
        // stable, so edges sharing a timestamp keep their file order
        let mut order: Vec<usize> = (0..t.len()).collect();
        order.sort_by_key(|&i| t[i]);

        let num_nodes = src
            .iter()
            .chain(dst.iter())
            .max()
            .map_or(0, |&max_id| max_id as usize + 1);
        Ok(Self {
            src: Tensor::from_iter(order.iter().map(|&i| src[i]), device)?,
            dst: Tensor::from_iter(order.iter().map(|&i| dst[i]), device)?,
            t: Tensor::from_iter(order.iter().map(|&i| t[i]), device)?,
            num_nodes,
        })
    }

    /// Reads an edge list with a header row. Raw node ids (integers or strings
    /// such as wallet addresses) are remapped to contiguous ids in order of
    /// first appearance after sorting by time. An empty file or a header
    /// without rows gives an empty stream.
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        columns: &EdgeListColumns,
        device: &Device,
    ) -> Result<Self> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)
            .with_context(|| format!("opening {}", path.display()))?
            .len();
        if size == 0 {
            return Self::new(vec![], vec![], vec![], device);
        }
        let df = CsvReader::from_path(path)
            .with_context(|| format!("opening {}", path.display()))?
            .has_header(true)
            .finish()?;
        if df.height() == 0 {
            return Self::new(vec![], vec![], vec![], device);
        }

        let raw_src = string_column(&df, &columns.src)?;
        let raw_dst = string_column(&df, &columns.dst)?;
        let t = df
            .column(&columns.ts)
            .with_context(|| format!("missing timestamp column `{}`", columns.ts))?
            .cast(&DataType::Int64)
            .with_context(|| format!("timestamp column `{}` is not integer", columns.ts))?;
        let t = t
            .i64()?
            .into_iter()
            .enumerate()
            .map(|(row, ts)| ts.ok_or_else(|| anyhow!("null timestamp at row {row}")))
            .collect::<Result<Vec<i64>>>()?;

        let mut order: Vec<usize> = (0..t.len()).collect();
        order.sort_by_key(|&i| t[i]);

        let mut ids: HashMap<&str, u32> = HashMap::new();
        let mut src = Vec::with_capacity(order.len());
        let mut dst = Vec::with_capacity(order.len());
        let mut ts = Vec::with_capacity(order.len());
        for &i in &order {
            for (raw, out) in [(&raw_src[i], &mut src), (&raw_dst[i], &mut dst)] {
                let next = ids.len() as u32;
                out.push(*ids.entry(raw.as_str()).or_insert(next));
            }
            ts.push(t[i]);
        }
        tracing::debug!(
            path = %path.display(),
            num_edges = ts.len(),
            num_nodes = ids.len(),
            "loaded edge list"
        );
        Self::new(src, dst, ts, device)
    }

    pub fn len(&self) -> usize {
        self.src.elem_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn device(&self) -> &Device {
        self.src.device()
    }

    /// Edges where `mask` (u8, one entry per edge) is non-zero.
    pub fn index_select(&self, mask: &Tensor) -> Result<Self> {
        let index = mask_to_index(mask)?;
        if index.elem_count() == 0 {
            let device = self.device();
            return Ok(Self {
                src: Tensor::zeros(0, DType::U32, device)?,
                dst: Tensor::zeros(0, DType::U32, device)?,
                t: Tensor::zeros(0, DType::I64, device)?,
                num_nodes: self.num_nodes,
            });
        }
        Ok(Self {
            src: self.src.index_select(&index, 0)?,
            dst: self.dst.index_select(&index, 0)?,
            t: self.t.index_select(&index, 0)?,
            num_nodes: self.num_nodes,
        })
    }

    pub fn min_time(&self) -> Result<Option<i64>> {
        Ok(self.t.to_vec1::<i64>()?.into_iter().min())
    }

    pub fn max_time(&self) -> Result<Option<i64>> {
        Ok(self.t.to_vec1::<i64>()?.into_iter().max())
    }
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df
        .column(name)
        .with_context(|| format!("missing endpoint column `{name}`"))?
        .cast(&DataType::Utf8)?;
    column
        .utf8()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.filter(|v| !v.is_empty())
                .map(str::to_owned)
                .ok_or_else(|| anyhow!("null value in column `{name}` at row {row}"))
        })
        .collect()
}
