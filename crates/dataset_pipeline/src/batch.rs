use anyhow::{bail, Result};
use tch::{Device, Tensor};

/// A batch of rows ready for a model.
///
/// `x` holds one tensor per column processor, in processor order, each with
/// shape `[batch_size, ...]`. `y` holds the labels with shape
/// `[batch_size, 1]`: `Int64` class ids for categorical data, `Float`
/// targets for regression.
#[derive(Debug)]
pub struct Batch {
    pub x: Vec<Tensor>,
    pub y: Tensor,
    pub weights: BatchWeights,
}

/// Loss weights travelling with a batch.
#[derive(Debug)]
pub enum BatchWeights {
    /// One `Float` weight per row, shape `[batch_size]`.
    PerSample(Tensor),
    /// Scalar weights for the positive and negative class of a binary task.
    Binary { pos: Tensor, neg: Tensor },
    None,
}

impl BatchWeights {
    fn to_device(&self, device: Device) -> Self {
        match self {
            BatchWeights::PerSample(w) => BatchWeights::PerSample(w.to_device(device)),
            BatchWeights::Binary { pos, neg } => BatchWeights::Binary {
                pos: pos.to_device(device),
                neg: neg.to_device(device),
            },
            BatchWeights::None => BatchWeights::None,
        }
    }
}

impl Batch {
    /// Returns the number of rows in the batch.
    pub fn batch_size(&self) -> i64 {
        self.y.size().first().copied().unwrap_or(0)
    }

    /// Returns the feature tensor produced by processor `column`.
    pub fn column(&self, column: usize) -> Result<&Tensor> {
        match self.x.get(column) {
            Some(tensor) => Ok(tensor),
            None => bail!(
                "Column {} not found in batch with {} columns",
                column,
                self.x.len()
            ),
        }
    }

    /// Transfers all tensors to the target device (CPU/GPU)
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            x: self.x.iter().map(|t| t.to_device(device)).collect(),
            y: self.y.to_device(device),
            weights: self.weights.to_device(device),
        }
    }
}

/// Outcome of asking for one batch.
#[derive(Debug)]
pub enum Generated {
    /// A full batch.
    Batch(Batch),
    /// The partition ran out. Carries the rows gathered before that, if any.
    End(Option<Batch>),
}

impl Generated {
    pub fn is_end(&self) -> bool {
        matches!(self, Generated::End(_))
    }

    /// The batch, full or partial, if one was produced.
    pub fn into_batch(self) -> Option<Batch> {
        match self {
            Generated::Batch(batch) => Some(batch),
            Generated::End(partial) => partial,
        }
    }
}
