//! Conversions between environment types and candle tensors.
//!
//! The learning stack consumes observations as `f32` tensors of shape
//! `[batch, OBS_DIM]` and produces actions as `i64` tensors. This module
//! hosts those conversions together with [`TensorBatch`], the tensor-backed
//! storage used by the experience buffers.
use crate::{act::MicrogridAct, obs::MicrogridObs};
use candle_core::{Device, IndexOp, Tensor};
use gridrl_core::generic_replay_buffer::BatchBase;

impl From<MicrogridObs> for Tensor {
    fn from(obs: MicrogridObs) -> Tensor {
        Tensor::from_slice(&obs.obs, (1, obs.obs.len()), &Device::Cpu).unwrap()
    }
}

impl From<Tensor> for MicrogridAct {
    /// Takes the first element of an `i64` action tensor.
    fn from(t: Tensor) -> Self {
        let act = t
            .flatten_all()
            .unwrap()
            .to_vec1::<i64>()
            .unwrap()
            .first()
            .copied()
            .expect("empty action tensor");
        Self { act }
    }
}

impl From<MicrogridAct> for Tensor {
    fn from(a: MicrogridAct) -> Tensor {
        Tensor::from_vec(vec![a.act], (1, 1), &Device::Cpu).unwrap()
    }
}

/// A buffer of rows of one tensor.
///
/// The internal storage is allocated lazily from the first pushed data, with
/// the first dimension replaced by the buffer capacity. Pushes wrap around
/// the capacity, matching the ring semantics of the replay store.
#[derive(Clone, Debug)]
pub struct TensorBatch {
    buf: Option<Tensor>,
    capacity: usize,
}

impl TensorBatch {
    /// Wraps a tensor as a batch of its rows.
    pub fn from_tensor(t: Tensor) -> Self {
        let capacity = t.dims()[0] as _;
        Self {
            buf: Some(t),
            capacity,
        }
    }
}

impl BatchBase for TensorBatch {
    fn new(capacity: usize) -> Self {
        Self {
            buf: None,
            capacity,
        }
    }

    fn push(&mut self, index: usize, data: Self) {
        if data.buf.is_none() {
            return;
        }

        let data = data.buf.unwrap();
        let batch_size = data.dims()[0];
        if batch_size == 0 {
            return;
        }

        if self.buf.is_none() {
            let mut shape = data.dims().to_vec();
            shape[0] = self.capacity;
            let dtype = data.dtype();
            self.buf = Some(Tensor::zeros(shape, dtype, &Device::Cpu).unwrap());
        }

        if index + batch_size > self.capacity {
            let batch_size = self.capacity - index;
            let data1 = data.i((..batch_size,)).unwrap();
            let data2 = data.i((batch_size..,)).unwrap();
            self.buf
                .as_mut()
                .unwrap()
                .slice_set(&data1, 0, index)
                .unwrap();
            self.buf.as_mut().unwrap().slice_set(&data2, 0, 0).unwrap();
        } else {
            self.buf.as_mut().unwrap().slice_set(&data, 0, index).unwrap();
        }
    }

    fn sample(&self, ixs: &[usize]) -> Self {
        let capacity = ixs.len();
        let ixs = {
            let device = self.buf.as_ref().unwrap().device();
            let ixs = ixs.iter().map(|x| *x as u32).collect();
            Tensor::from_vec(ixs, (capacity,), device).unwrap()
        };
        let buf = Some(self.buf.as_ref().unwrap().index_select(&ixs, 0).unwrap());
        Self { buf, capacity }
    }
}

impl From<TensorBatch> for Tensor {
    fn from(b: TensorBatch) -> Self {
        b.buf.expect("empty TensorBatch")
    }
}

impl From<MicrogridObs> for TensorBatch {
    fn from(obs: MicrogridObs) -> Self {
        Self::from_tensor(obs.into())
    }
}

impl From<MicrogridAct> for TensorBatch {
    fn from(a: MicrogridAct) -> Self {
        Self::from_tensor(a.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obs_round_trip() {
        let obs = MicrogridObs::new([0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);
        let t: Tensor = obs.into();
        assert_eq!(t.dims(), &[1, 8]);
        let v = t.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(v[0], 0.1);
        assert_eq!(v[7], 0.8);
    }

    #[test]
    fn test_act_round_trip() {
        let a = MicrogridAct::new(3);
        let t: Tensor = a.into();
        let b: MicrogridAct = t.into();
        assert_eq!(b.act, 3);
    }

    #[test]
    fn test_tensor_batch_push_wraps_around() {
        let mut batch = TensorBatch::new(3);
        for v in 0..5i64 {
            let t = Tensor::from_vec(vec![v], (1, 1), &Device::Cpu).unwrap();
            batch.push(v as usize % 3, TensorBatch::from_tensor(t));
        }
        let stored: Tensor = batch.sample(&[0, 1, 2]).into();
        let stored = stored.flatten_all().unwrap().to_vec1::<i64>().unwrap();
        assert_eq!(stored, vec![3, 4, 2]);
    }
}
