//! End-to-end tests wiring the environment, agents and trainer together.
use anyhow::Result;
use gridrl_candle_agent::{
    dqn::{Dqn, DqnConfig, DqnModelConfig, EpsilonGreedy},
    mlp::{Mlp, MlpConfig},
    ppo::{ActorCritic, ActorCriticConfig, Ppo, PpoConfig, PpoModelConfig},
};
use gridrl_core::{
    generic_replay_buffer::{
        RolloutBuffer, RolloutBufferConfig, SimpleReplayBuffer, SimpleReplayBufferConfig,
        SimpleStepProcessor, SimpleStepProcessorConfig,
    },
    record::{NullRecorder, Recorder},
    Agent, Configurable, DefaultEvaluator, Env as _, ExperienceBufferBase, Policy,
    ReplayBufferBase, Sampler, StepProcessor, Trainer, TrainerConfig,
};
use gridrl_sim::{candle::TensorBatch, MicrogridEnv, MicrogridEnvConfig, MicrogridObs};
use tempdir::TempDir;

type Env = MicrogridEnv;
type ReplayBuffer = SimpleReplayBuffer<TensorBatch, TensorBatch>;
type Rollout = RolloutBuffer<TensorBatch, TensorBatch>;
type StepProc = SimpleStepProcessor<Env, TensorBatch, TensorBatch>;

fn small_dqn_config() -> DqnConfig<MlpConfig> {
    let model_config = DqnModelConfig::default().q_config(MlpConfig::new(8, vec![32, 16], 5));
    DqnConfig::default()
        .model_config(model_config)
        .batch_size(8)
        .min_transitions_warmup(8)
        .target_sync_interval(10)
        .explorer(EpsilonGreedy::new().eps_decay(0.9))
}

fn small_ppo_config() -> PpoConfig<ActorCriticConfig> {
    let model_config = PpoModelConfig::default().ac_config(ActorCriticConfig::new(8, vec![32], 5));
    PpoConfig::default()
        .model_config(model_config)
        .opt_epochs(2)
        .minibatch_size(8)
}

fn greedy_actions<A: Policy<Env>>(agent: &mut A, env: &mut Env, n: usize) -> Result<Vec<i64>> {
    let mut obs = env.reset_with_index(0)?;
    let mut actions = vec![];
    for _ in 0..n {
        let act = agent.sample(&obs);
        actions.push(act.act);
        let (step, _) = env.step(&act);
        obs = if step.is_done() {
            env.reset_with_index(0)?
        } else {
            step.obs
        };
    }
    Ok(actions)
}

#[test]
fn test_dqn_checkpoint_round_trip_reproduces_actions() -> Result<()> {
    let dir = TempDir::new("dqn_checkpoint")?;
    let env_config = MicrogridEnvConfig::standalone();
    let mut env = Env::build(&env_config, 0)?;

    let mut agent: Dqn<Env, Mlp, ReplayBuffer> = Dqn::build(small_dqn_config());
    agent.save_params(dir.path())?;

    let mut restored: Dqn<Env, Mlp, ReplayBuffer> = Dqn::build(small_dqn_config());
    restored.load_params(dir.path())?;

    agent.eval();
    restored.eval();
    let a = greedy_actions(&mut agent, &mut env, 48)?;
    let b = greedy_actions(&mut restored, &mut env, 48)?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn test_ppo_rollout_store_is_empty_after_update() -> Result<()> {
    let env_config = MicrogridEnvConfig::standalone();
    let env = Env::build(&env_config, 1)?;
    let step_proc = StepProc::build(&SimpleStepProcessorConfig::default());

    let mut agent: Ppo<Env, ActorCritic, Rollout> = Ppo::build(small_ppo_config());
    let mut buffer = Rollout::build(&RolloutBufferConfig::default());
    let mut sampler = Sampler::new(env, step_proc);

    for _ in 0..16 {
        sampler.sample_and_push(&mut agent, &mut buffer)?;
    }
    assert_eq!(buffer.len(), 16);

    let record = agent.opt(&mut buffer);
    assert!(record.is_some());
    assert!(buffer.is_empty());

    // An empty store is a checked precondition, not a failure.
    assert!(agent.opt(&mut buffer).is_none());
    Ok(())
}

#[test]
fn test_dqn_training_loop_runs_and_saves() -> Result<()> {
    let dir = TempDir::new("dqn_train")?;
    let model_dir = dir.path().to_str().unwrap().to_string();
    let env_config = MicrogridEnvConfig::standalone();

    let config = TrainerConfig::default()
        .max_episodes(4)
        .opt_interval(1)
        .warmup_period(8)
        .eval_interval(2)
        .save_interval(0)
        .flush_record_interval(2)
        .model_dir(model_dir.clone());

    let env = Env::build(&env_config, 0)?;
    let step_proc = StepProc::build(&SimpleStepProcessorConfig::default());
    let mut agent: Dqn<Env, Mlp, ReplayBuffer> = Dqn::build(small_dqn_config());
    let mut buffer = ReplayBuffer::build(&SimpleReplayBufferConfig::default().capacity(512));
    let mut recorder: Box<dyn Recorder> = Box::new(NullRecorder {});
    let mut evaluator = DefaultEvaluator::<Env>::new(&env_config, 100, 1)?;

    Trainer::build(config).train(
        env,
        step_proc,
        &mut agent,
        &mut buffer,
        &mut recorder,
        &mut evaluator,
    )?;

    // The trainer snapshots the final model unconditionally.
    assert!(dir.path().join("final/qnet.safetensors").exists());
    assert!(dir.path().join("final/state.yaml").exists());
    Ok(())
}

#[test]
fn test_ppo_training_loop_runs() -> Result<()> {
    let dir = TempDir::new("ppo_train")?;
    let model_dir = dir.path().to_str().unwrap().to_string();
    let env_config = MicrogridEnvConfig::standalone();

    let config = TrainerConfig::default()
        .max_episodes(3)
        .opt_interval(24)
        .warmup_period(0)
        .eval_interval(2)
        .save_interval(0)
        .flush_record_interval(2)
        .model_dir(model_dir);

    let env = Env::build(&env_config, 7)?;
    let step_proc = StepProc::build(&SimpleStepProcessorConfig::default());
    let mut agent: Ppo<Env, ActorCritic, Rollout> = Ppo::build(small_ppo_config());
    let mut buffer = Rollout::build(&RolloutBufferConfig::default());
    let mut recorder: Box<dyn Recorder> = Box::new(NullRecorder {});
    let mut evaluator = DefaultEvaluator::<Env>::new(&env_config, 100, 1)?;

    Trainer::build(config).train(
        env,
        step_proc,
        &mut agent,
        &mut buffer,
        &mut recorder,
        &mut evaluator,
    )?;

    assert!(dir.path().join("final/actor_critic.safetensors").exists());
    Ok(())
}

#[test]
fn test_dqn_optimizes_from_a_prioritized_store() -> Result<()> {
    use gridrl_core::generic_replay_buffer::PerConfig;

    let env_config = MicrogridEnvConfig::standalone();
    let env = Env::build(&env_config, 5)?;
    let step_proc = StepProc::build(&SimpleStepProcessorConfig::default());

    let mut agent: Dqn<Env, Mlp, ReplayBuffer> = Dqn::build(small_dqn_config());
    let mut buffer = ReplayBuffer::build(
        &SimpleReplayBufferConfig::default()
            .capacity(256)
            .per_config(Some(PerConfig::default().n_opts_final(100))),
    );
    let mut sampler = Sampler::new(env, step_proc);

    for _ in 0..4 {
        sampler.sample_and_push(&mut agent, &mut buffer)?;
    }
    // Below one batch of transitions the optimization step is skipped.
    assert!(agent.opt(&mut buffer).is_none());

    for _ in 0..20 {
        sampler.sample_and_push(&mut agent, &mut buffer)?;
    }
    for _ in 0..3 {
        let record = agent.opt(&mut buffer);
        assert!(record.is_some());
        assert!(record.unwrap().get_scalar("loss_critic")?.is_finite());
    }
    Ok(())
}

#[test]
fn test_exploration_rate_decays_across_episodes() -> Result<()> {
    let env_config = MicrogridEnvConfig::standalone();
    let env = Env::build(&env_config, 3)?;
    let step_proc = StepProc::build(&SimpleStepProcessorConfig::default());

    let mut agent: Dqn<Env, Mlp, ReplayBuffer> = Dqn::build(small_dqn_config());
    let mut buffer = ReplayBuffer::build(&SimpleReplayBufferConfig::default().capacity(512));
    let mut sampler = Sampler::new(env, step_proc);

    let mut eps_log = vec![];
    let mut episodes = 0;
    while episodes < 3 {
        let (record, is_done) = sampler.sample_and_push(&mut agent, &mut buffer)?;
        if is_done {
            let record = record.merge(agent.on_episode_end());
            eps_log.push(record.get_scalar("eps")?);
            episodes += 1;
        }
    }

    assert!(eps_log[0] > eps_log[1]);
    assert!(eps_log[1] > eps_log[2]);
    Ok(())
}

#[test]
fn test_untrained_policies_emit_valid_actions() -> Result<()> {
    let env_config = MicrogridEnvConfig::library();
    let mut env = Env::build(&env_config, 9)?;

    let mut dqn: Dqn<Env, Mlp, ReplayBuffer> = Dqn::build(small_dqn_config());
    dqn.eval();
    for a in greedy_actions(&mut dqn, &mut env, 24)? {
        assert!((0..5).contains(&a));
    }

    let mut ppo: Ppo<Env, ActorCritic, Rollout> = Ppo::build(small_ppo_config());
    <Ppo<Env, ActorCritic, Rollout> as Agent<Env, Rollout>>::eval(&mut ppo);
    let mut obs: MicrogridObs = env.reset()?;
    for _ in 0..24 {
        let act = ppo.sample(&obs);
        assert!((0..5).contains(&act.act));
        let (step, _) = env.step(&act);
        obs = if step.is_done() { env.reset()? } else { step.obs };
    }
    Ok(())
}
