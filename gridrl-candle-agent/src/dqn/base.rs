//! DQN agent implemented with candle.
use super::{config::DqnConfig, explorer::EpsilonGreedy, model::DqnModel};
use crate::{
    model::SubModel1,
    util::{copy_params, gamma_not_done, reward_tensor, smooth_l1, smooth_l1_loss, CriticLoss, OutDim},
};
use anyhow::Result;
use candle_core::{shape::D, DType, Device, Tensor};
use candle_nn::loss::mse;
use gridrl_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Env, ExperienceBufferBase, Policy, ReplayBufferBase, TransitionBatch,
};
use rand::{rngs::SmallRng, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, io::Write, marker::PhantomData, path::Path};

/// Learner scalars serialized next to the network parameters.
#[derive(Debug, serde::Deserialize, Serialize)]
struct DqnLearnerState {
    eps: f64,
    n_opts: usize,
}

/// TD target of a batch.
///
/// With `q_next_online` given, the Double-DQN target is computed: the next
/// action is the online network's argmax, evaluated by the target network.
/// Otherwise the vanilla target takes the target network's own maximum,
/// which is prone to overestimation.
pub(super) fn td_target(
    reward: &Tensor,
    gamma_not_done: &Tensor,
    q_next_online: Option<&Tensor>,
    q_next_tgt: &Tensor,
) -> Result<Tensor> {
    let q = match q_next_online {
        Some(q_online) => {
            let next_act = q_online
                .argmax(D::Minus1)?
                .to_dtype(DType::I64)?
                .unsqueeze(D::Minus1)?;
            q_next_tgt.gather(&next_act, D::Minus1)?.squeeze(D::Minus1)?
        }
        None => q_next_tgt.max(D::Minus1)?,
    };

    Ok(((reward + (gamma_not_done * q)?)?).detach())
}

#[allow(clippy::upper_case_acronyms)]
/// DQN agent with experience replay and a periodically synchronized target
/// network.
///
/// Generic over the environment `E`, the action-value network `Q` (plain or
/// dueling MLP) and the replay store `R`.
pub struct Dqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    R: ExperienceBufferBase + ReplayBufferBase,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    pub(super) qnet: DqnModel<Q>,
    pub(super) qnet_tgt: DqnModel<Q>,
    pub(super) batch_size: usize,
    pub(super) min_transitions_warmup: usize,
    pub(super) discount_factor: f64,
    pub(super) target_sync_interval: usize,
    pub(super) double_dqn: bool,
    pub(super) explorer: EpsilonGreedy,
    pub(super) critic_loss: CriticLoss,
    pub(super) device: Device,
    pub(super) train: bool,
    pub(super) n_opts: usize,
    rng: SmallRng,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, R> Dqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    R: ExperienceBufferBase + ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn update_critic(&mut self, buffer: &mut R) -> Result<f32> {
        let batch = buffer.batch(self.batch_size)?;
        let (obs, act, next_obs, reward, is_terminated, is_truncated, ixs, weight) = batch.unpack();
        let obs: Tensor = obs.into();
        let act: Tensor = act.into().to_device(&self.device)?;
        let next_obs: Tensor = next_obs.into();
        let reward = reward_tensor(&reward, &self.device)?;
        let gamma_nd = gamma_not_done(
            self.discount_factor as f32,
            &is_terminated,
            &is_truncated,
            &self.device,
        )?;

        let pred = self
            .qnet
            .forward(&obs)
            .gather(&act, D::Minus1)?
            .squeeze(D::Minus1)?;

        let tgt = {
            let q_next_tgt = self.qnet_tgt.forward(&next_obs);
            match self.double_dqn {
                true => {
                    let q_next_online = self.qnet.forward(&next_obs);
                    td_target(&reward, &gamma_nd, Some(&q_next_online), &q_next_tgt)?
                }
                false => td_target(&reward, &gamma_nd, None, &q_next_tgt)?,
            }
        };

        let loss = match weight {
            Some(ws) => {
                // Importance-weighted loss of the prioritized store; the
                // absolute TD errors become the new priorities.
                let ws = Tensor::from_slice(&ws[..], (ws.len(),), &self.device)?;
                let elementwise = match self.critic_loss {
                    CriticLoss::Mse => (&pred - &tgt)?.sqr()?,
                    CriticLoss::SmoothL1 => smooth_l1(&pred, &tgt)?,
                };
                let loss = (elementwise * ws)?.mean_all()?;

                let td_errs = (&pred - &tgt)?.abs()?.to_vec1::<f32>()?;
                buffer.update_priority(&ixs, &Some(td_errs));
                loss
            }
            None => match self.critic_loss {
                CriticLoss::Mse => mse(&pred, &tgt)?,
                CriticLoss::SmoothL1 => smooth_l1_loss(&pred, &tgt)?,
            },
        };

        self.qnet.backward_step(&loss)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    fn opt_(&mut self, buffer: &mut R) -> Result<Record> {
        let loss_critic = self.update_critic(buffer)?;

        self.n_opts += 1;
        if self.n_opts % self.target_sync_interval == 0 {
            copy_params(self.qnet_tgt.varmap(), self.qnet.varmap())?;
        }

        Ok(Record::from_slice(&[(
            "loss_critic",
            RecordValue::Scalar(loss_critic),
        )]))
    }
}

impl<E, Q, R> Policy<E> for Dqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    R: ExperienceBufferBase + ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// Epsilon-greedy in training mode, the argmax action in evaluation mode.
    fn sample(&mut self, obs: &E::Obs) -> E::Act {
        let q = self.qnet.forward(&obs.clone().into());
        let a = if self.train {
            self.explorer.action(&q, &mut self.rng)
        } else {
            q.argmax(D::Minus1).unwrap().to_dtype(DType::I64).unwrap()
        };
        a.into()
    }
}

impl<E, Q, R> Configurable for Dqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    R: ExperienceBufferBase + ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    type Config = DqnConfig<Q::Config>;

    /// Constructs the DQN agent.
    ///
    /// The target network starts as an exact copy of the online network.
    fn build(config: Self::Config) -> Self {
        let device: Device = config.device.into();
        let qnet = DqnModel::build(config.model_config, device.clone()).unwrap();
        let qnet_tgt = qnet.clone();

        Self {
            qnet,
            qnet_tgt,
            batch_size: config.batch_size,
            min_transitions_warmup: config.min_transitions_warmup,
            discount_factor: config.discount_factor,
            target_sync_interval: config.target_sync_interval,
            double_dqn: config.double_dqn,
            explorer: config.explorer,
            critic_loss: config.critic_loss,
            device,
            train: true,
            n_opts: 0,
            rng: SmallRng::seed_from_u64(config.seed),
            phantom: PhantomData,
        }
    }
}

impl<E, Q, R> Agent<E, R> for Dqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    R: ExperienceBufferBase + ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    /// A no-op until the store holds a batch of transitions.
    fn opt(&mut self, buffer: &mut R) -> Option<Record> {
        if buffer.len() >= self.min_transitions_warmup && buffer.len() >= self.batch_size {
            Some(self.opt_(buffer).expect("DQN optimization step failed"))
        } else {
            None
        }
    }

    /// Decays epsilon once per episode.
    fn on_episode_end(&mut self) -> Record {
        self.explorer.decay();
        Record::from_scalar("eps", self.explorer.eps() as f32)
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.qnet.save(path.join("qnet.safetensors"))?;
        self.qnet_tgt.save(path.join("qnet_tgt.safetensors"))?;

        let state = DqnLearnerState {
            eps: self.explorer.eps(),
            n_opts: self.n_opts,
        };
        let mut file = fs::File::create(path.join("state.yaml"))?;
        file.write_all(serde_yaml::to_string(&state)?.as_bytes())?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.qnet.load(path.join("qnet.safetensors"))?;
        self.qnet_tgt.load(path.join("qnet_tgt.safetensors"))?;

        let file = fs::File::open(path.join("state.yaml"))?;
        let state: DqnLearnerState = serde_yaml::from_reader(std::io::BufReader::new(file))?;
        self.explorer = self.explorer.clone().eps_start(state.eps);
        self.n_opts = state.n_opts;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_and_vanilla_targets_differ_on_disagreement() -> Result<()> {
        let device = Device::Cpu;
        let reward = Tensor::from_slice(&[0.0f32], (1,), &device)?;
        let gamma_nd = Tensor::from_slice(&[0.99f32], (1,), &device)?;

        // The online network prefers action 0, the target network action 1.
        let q_online = Tensor::from_slice(&[1.0f32, 0.0], (1, 2), &device)?;
        let q_tgt = Tensor::from_slice(&[0.0f32, 1.0], (1, 2), &device)?;

        let vanilla = td_target(&reward, &gamma_nd, None, &q_tgt)?.to_vec1::<f32>()?;
        let double = td_target(&reward, &gamma_nd, Some(&q_online), &q_tgt)?.to_vec1::<f32>()?;

        // Vanilla bootstraps from the target's own max (1.0); Double
        // evaluates the online argmax (action 0) under the target (0.0).
        assert!((vanilla[0] - 0.99).abs() < 1e-6);
        assert!((double[0] - 0.0).abs() < 1e-6);
        assert_ne!(vanilla, double);
        Ok(())
    }

    #[test]
    fn test_targets_agree_when_networks_agree() -> Result<()> {
        let device = Device::Cpu;
        let reward = Tensor::from_slice(&[0.5f32], (1,), &device)?;
        let gamma_nd = Tensor::from_slice(&[0.99f32], (1,), &device)?;

        let q = Tensor::from_slice(&[0.2f32, 0.8], (1, 2), &device)?;
        let vanilla = td_target(&reward, &gamma_nd, None, &q)?.to_vec1::<f32>()?;
        let double = td_target(&reward, &gamma_nd, Some(&q), &q)?.to_vec1::<f32>()?;
        assert_eq!(vanilla, double);
        Ok(())
    }

    #[test]
    fn test_terminal_transitions_do_not_bootstrap() -> Result<()> {
        let device = Device::Cpu;
        let reward = Tensor::from_slice(&[1.0f32], (1,), &device)?;
        let gamma_nd = gamma_not_done(0.99, &[1], &[0], &device)?;
        let q_tgt = Tensor::from_slice(&[5.0f32, 7.0], (1, 2), &device)?;

        let tgt = td_target(&reward, &gamma_nd, None, &q_tgt)?.to_vec1::<f32>()?;
        assert!((tgt[0] - 1.0).abs() < 1e-6);
        Ok(())
    }
}
