//! Utilities shared by the agents.
use anyhow::{anyhow, Result};
use candle_core::{backprop::GradStore, DType, Device, Tensor, Var};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

/// Loss of the value regression.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum CriticLoss {
    /// Mean squared error.
    Mse,

    /// Smooth L1 (Huber) loss, robust to large TD errors.
    SmoothL1,
}

/// Interface for reading and overriding the output dimension of a network
/// configuration.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> i64;

    /// Sets the output dimension.
    fn set_out_dim(&mut self, v: i64);
}

/// Hard copy of all variables from `src` into `dest`.
///
/// Variables are identified by their names; both varmaps must have been
/// built from the same network configuration.
pub fn copy_params(dest: &VarMap, src: &VarMap) -> Result<()> {
    let dest = dest.data().lock().unwrap();
    let src = src.data().lock().unwrap();

    for (k, v_dest) in dest.iter() {
        let v_src = src
            .get(k)
            .ok_or_else(|| anyhow!("variable {} not found in source varmap", k))?;
        v_dest.set(v_src.as_tensor())?;
    }

    Ok(())
}

/// Elementwise smooth L1 loss.
///
/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1(x: &Tensor, y: &Tensor) -> Result<Tensor, candle_core::Error> {
    let device = x.device();
    let d = (x - y)?.abs()?;
    let m1 = d.lt(1.0)?.to_dtype(DType::F32)?.to_device(device)?;
    let m2 = m1.affine(-1.0, 1.0)?;
    ((0.5 * m1)? * d.powf(2.0))? + m2 * (d - 0.5)
}

/// Mean-reduced smooth L1 loss.
pub fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor, candle_core::Error> {
    smooth_l1(x, y)?.mean_all()
}

/// Builds the `gamma * (1 - done)` factor of TD targets.
///
/// Terminated and truncated flags both stop the bootstrap, matching the
/// single done flag of the modeled system.
pub fn gamma_not_done(
    gamma: f32,
    is_terminated: &[i8],
    is_truncated: &[i8],
    device: &Device,
) -> Result<Tensor> {
    let batch_size = is_terminated.len();
    let v = is_terminated
        .iter()
        .zip(is_truncated.iter())
        .map(|(t, tr)| (1 - (*t | *tr)) as f32 * gamma)
        .collect::<Vec<_>>();
    Ok(Tensor::from_slice(&v[..], (batch_size,), device)?)
}

/// Builds a reward tensor from a slice.
pub fn reward_tensor(reward: &[f32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(reward, (reward.len(),), device)?)
}

/// Clips gradients to a bounded global norm before the optimizer step.
///
/// Returns the unclipped global norm.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f64) -> Result<f64> {
    let mut total_sq = 0f64;
    for var in vars.iter() {
        if let Some(grad) = grads.get(var.as_tensor()) {
            total_sq += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let total_norm = total_sq.sqrt();

    if total_norm > max_norm {
        let scale = max_norm / (total_norm + 1e-6);
        for var in vars.iter() {
            if let Some(grad) = grads.get(var.as_tensor()) {
                let scaled = (grad * scale)?;
                grads.insert(var.as_tensor(), scaled);
            }
        }
    }

    Ok(total_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::Init;

    #[test]
    fn test_copy_params_is_a_hard_copy() -> Result<()> {
        let device = Device::Cpu;
        let t_src = Tensor::from_slice(&[1.0f32, 2.0, 3.0], (3,), &device)?;

        let make = |init: &Tensor| -> Result<VarMap> {
            let vm = VarMap::new();
            vm.get(
                (3,),
                "var1",
                Init::Const(0.0),
                DType::F32,
                &device,
            )?;
            vm.data().lock().unwrap().get("var1").unwrap().set(init)?;
            Ok(vm)
        };

        let vm_src = make(&t_src)?;
        let vm_dest = make(&Tensor::zeros((3,), DType::F32, &device)?)?;
        copy_params(&vm_dest, &vm_src)?;

        let copied = vm_dest
            .data()
            .lock()
            .unwrap()
            .get("var1")
            .unwrap()
            .as_tensor()
            .to_vec1::<f32>()?;
        assert_eq!(copied, vec![1.0, 2.0, 3.0]);

        // Mutating the source afterwards must not affect the copy.
        vm_src
            .data()
            .lock()
            .unwrap()
            .get("var1")
            .unwrap()
            .set(&Tensor::zeros((3,), DType::F32, &device)?)?;
        let copied = vm_dest
            .data()
            .lock()
            .unwrap()
            .get("var1")
            .unwrap()
            .as_tensor()
            .to_vec1::<f32>()?;
        assert_eq!(copied, vec![1.0, 2.0, 3.0]);

        Ok(())
    }

    #[test]
    fn test_smooth_l1_matches_quadratic_and_linear_regions() -> Result<()> {
        let device = Device::Cpu;
        let x = Tensor::from_slice(&[0.0f32, 0.5, 3.0], (3,), &device)?;
        let y = Tensor::zeros((3,), DType::F32, &device)?;
        let loss = smooth_l1(&x, &y)?.to_vec1::<f32>()?;

        assert!((loss[0] - 0.0).abs() < 1e-6);
        assert!((loss[1] - 0.125).abs() < 1e-6);
        assert!((loss[2] - 2.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_clip_grad_norm_bounds_the_norm() -> Result<()> {
        let device = Device::Cpu;
        let var = Var::from_tensor(&Tensor::from_slice(&[1.0f32, 1.0], (2,), &device)?)?;
        let loss = (var.as_tensor() * 10.0)?.sum_all()?;
        let mut grads = loss.backward()?;

        let vars = vec![var];
        let norm = clip_grad_norm(&mut grads, &vars, 1.0)?;
        // Gradient of the loss is [10, 10], norm ~14.14.
        assert!((norm - 200f64.sqrt()).abs() < 1e-3);

        let clipped = grads.get(vars[0].as_tensor()).unwrap();
        let clipped_norm = clipped.sqr()?.sum_all()?.to_scalar::<f32>()?.sqrt();
        assert!((clipped_norm - 1.0).abs() < 1e-3);
        Ok(())
    }
}
