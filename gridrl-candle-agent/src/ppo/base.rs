//! PPO agent implemented with candle.
use super::{compute_gae, config::PpoConfig, model::PpoModel};
use crate::{model::SubModel1, util::OutDim};
use anyhow::Result;
use candle_core::{shape::D, DType, Device, IndexOp, Tensor};
use candle_nn::{loss::mse, ops::log_softmax};
use gridrl_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Env, ExperienceBufferBase, OnPolicyBuffer, Policy, ReplayBufferBase,
    TransitionBatch,
};
use rand::{distributions::WeightedIndex, rngs::SmallRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, marker::PhantomData, path::Path};

/// PPO agent with generalized advantage estimation and a clipped surrogate
/// objective.
///
/// In training mode the policy samples from the categorical distribution of
/// the actor head and records the log-probability and value estimate at
/// collection time; the clipped objective compares those "old"
/// log-probabilities against the updated policy. The rollout store is
/// consumed wholesale at every update and cleared unconditionally.
pub struct Ppo<E, P, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ExperienceBufferBase + ReplayBufferBase,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    pub(super) model: PpoModel<P>,
    pub(super) gamma: f64,
    pub(super) gae_lambda: f64,
    pub(super) clip_eps: f64,
    pub(super) opt_epochs: usize,
    pub(super) minibatch_size: usize,
    pub(super) entropy_coef: f64,
    pub(super) value_coef: f64,
    pub(super) device: Device,
    pub(super) train: bool,
    pub(super) n_opts: usize,

    /// Log-probabilities and value estimates captured when actions were
    /// sampled, aligned with the rollout store.
    collected: Vec<(f32, f32)>,

    rng: SmallRng,
    phantom: PhantomData<(E, R)>,
}

impl<E, P, R> Ppo<E, P, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ExperienceBufferBase + ReplayBufferBase + OnPolicyBuffer,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    <R as OnPolicyBuffer>::Batch: TransitionBatch,
    <<R as OnPolicyBuffer>::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <<R as OnPolicyBuffer>::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn update(&mut self, buffer: &mut R) -> Result<Record> {
        let batch = buffer.drain()?;
        let (obs, act, next_obs, reward, is_terminated, is_truncated, _, _) = batch.unpack();
        let n = reward.len();
        assert_eq!(
            self.collected.len(),
            n,
            "rollout store and collection-time records diverged"
        );

        let obs: Tensor = obs.into().to_device(&self.device)?;
        let act: Tensor = act.into().to_device(&self.device)?;
        let next_obs: Tensor = next_obs.into().to_device(&self.device)?;

        let dones: Vec<f32> = is_terminated
            .iter()
            .zip(is_truncated.iter())
            .map(|(t, tr)| (*t | *tr) as f32)
            .collect();
        let values: Vec<f32> = self.collected.iter().map(|(_, v)| *v).collect();
        let old_logp: Vec<f32> = self.collected.iter().map(|(logp, _)| *logp).collect();

        // Value of the state following the rollout, bootstrapping the
        // advantage recursion. Computed just before the first gradient step,
        // so it comes from the pre-update critic.
        let bootstrap_value = {
            let last = next_obs.i((n - 1..n, ..))?;
            let (_, value) = self.model.forward(&last);
            value.flatten_all()?.to_vec1::<f32>()?[0]
        };

        let (advantages, returns) = compute_gae(
            &reward,
            &values,
            &dones,
            bootstrap_value,
            self.gamma as f32,
            self.gae_lambda as f32,
        );

        // Normalize advantages to zero mean and unit variance.
        let advantages = {
            let mean = advantages.iter().sum::<f32>() / n as f32;
            let var = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>()
                / (n as f32 - 1.0).max(1.0);
            let std = var.sqrt();
            advantages
                .iter()
                .map(|a| (a - mean) / (std + 1e-8))
                .collect::<Vec<_>>()
        };

        let adv = Tensor::from_vec(advantages, (n,), &self.device)?;
        let ret = Tensor::from_vec(returns, (n,), &self.device)?;
        let old_logp = Tensor::from_vec(old_logp, (n,), &self.device)?;

        let mut ixs: Vec<u32> = (0..n as u32).collect();
        let mut loss_policy = 0f32;
        let mut loss_value = 0f32;
        let mut entropy_mean = 0f32;
        let mut n_minibatches = 0usize;

        for _ in 0..self.opt_epochs {
            ixs.shuffle(&mut self.rng);
            for chunk in ixs.chunks(self.minibatch_size) {
                let ix = Tensor::from_slice(chunk, (chunk.len(),), &self.device)?;
                let obs_mb = obs.index_select(&ix, 0)?;
                let act_mb = act.index_select(&ix, 0)?;
                let adv_mb = adv.index_select(&ix, 0)?;
                let ret_mb = ret.index_select(&ix, 0)?;
                let old_logp_mb = old_logp.index_select(&ix, 0)?;

                let (logits, values_new) = self.model.forward(&obs_mb);
                let logp_all = log_softmax(&logits, D::Minus1)?;
                let new_logp = logp_all.gather(&act_mb, D::Minus1)?.squeeze(D::Minus1)?;
                let entropy = (logp_all.exp()? * &logp_all)?.sum(D::Minus1)?.neg()?;

                // Clipped surrogate objective.
                let ratio = (&new_logp - &old_logp_mb)?.exp()?;
                let surr1 = (&ratio * &adv_mb)?;
                let surr2 =
                    (ratio.clamp(1.0 - self.clip_eps, 1.0 + self.clip_eps)? * &adv_mb)?;
                let policy_loss = surr1.minimum(&surr2)?.mean_all()?.neg()?;

                let value_loss = mse(&values_new, &ret_mb)?;
                let entropy_bonus = entropy.mean_all()?;

                let loss = {
                    let weighted_value = (&value_loss * self.value_coef)?;
                    let weighted_entropy = (&entropy_bonus * self.entropy_coef)?;
                    ((&policy_loss + weighted_value)? - weighted_entropy)?
                };
                self.model.backward_step(&loss)?;

                loss_policy += policy_loss.to_scalar::<f32>()?;
                loss_value += value_loss.to_scalar::<f32>()?;
                entropy_mean += entropy_bonus.to_scalar::<f32>()?;
                n_minibatches += 1;
            }
        }

        // On-policy invariant: nothing collected outlives this update.
        self.collected.clear();
        buffer.clear();
        self.n_opts += 1;

        let k = n_minibatches.max(1) as f32;
        Ok(Record::from_slice(&[
            ("loss_policy", RecordValue::Scalar(loss_policy / k)),
            ("loss_value", RecordValue::Scalar(loss_value / k)),
            ("entropy", RecordValue::Scalar(entropy_mean / k)),
        ]))
    }
}

impl<E, P, R> Policy<E> for Ppo<E, P, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ExperienceBufferBase + ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// Samples from the actor's categorical distribution in training mode,
    /// recording the log-probability and value estimate of the draw. Takes
    /// the most probable action in evaluation mode.
    fn sample(&mut self, obs: &E::Obs) -> E::Act {
        let obs: Tensor = obs.clone().into();
        let (logits, value) = self.model.forward(&obs);

        let a = if self.train {
            let logp_all = log_softmax(&logits, D::Minus1).unwrap();
            let probs = logp_all
                .exp()
                .unwrap()
                .flatten_all()
                .unwrap()
                .to_vec1::<f32>()
                .unwrap();
            let a = self.rng.sample(WeightedIndex::new(&probs).unwrap());

            let logp = logp_all
                .flatten_all()
                .unwrap()
                .to_vec1::<f32>()
                .unwrap()[a];
            let v = value.flatten_all().unwrap().to_vec1::<f32>().unwrap()[0];
            self.collected.push((logp, v));

            Tensor::from_vec(vec![a as i64], (1,), logits.device()).unwrap()
        } else {
            logits
                .argmax(D::Minus1)
                .unwrap()
                .to_dtype(DType::I64)
                .unwrap()
        };
        a.into()
    }
}

impl<E, P, R> Configurable for Ppo<E, P, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ExperienceBufferBase + ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    type Config = PpoConfig<P::Config>;

    /// Constructs the PPO agent.
    fn build(config: Self::Config) -> Self {
        let device: Device = config.device.into();
        let model = PpoModel::build(config.model_config, device.clone()).unwrap();

        Self {
            model,
            gamma: config.gamma,
            gae_lambda: config.gae_lambda,
            clip_eps: config.clip_eps,
            opt_epochs: config.opt_epochs,
            minibatch_size: config.minibatch_size,
            entropy_coef: config.entropy_coef,
            value_coef: config.value_coef,
            device,
            train: true,
            n_opts: 0,
            collected: Vec::new(),
            rng: SmallRng::seed_from_u64(config.seed),
            phantom: PhantomData,
        }
    }
}

impl<E, P, R> Agent<E, R> for Ppo<E, P, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ExperienceBufferBase + ReplayBufferBase + OnPolicyBuffer,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    <R as OnPolicyBuffer>::Batch: TransitionBatch,
    <<R as OnPolicyBuffer>::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <<R as OnPolicyBuffer>::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
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

    /// Consumes the rollout store wholesale. A no-op on an empty store
    /// (readiness is a checked precondition, not a failure).
    fn opt(&mut self, buffer: &mut R) -> Option<Record> {
        if buffer.is_empty() {
            return None;
        }
        Some(self.update(buffer).expect("PPO optimization step failed"))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.model.save(path.join("actor_critic.safetensors"))?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.model.load(path.join("actor_critic.safetensors"))?;
        Ok(())
    }
}
