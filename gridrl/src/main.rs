//! Command-line driver: train, evaluate and demo microgrid dispatch agents.
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use gridrl_candle_agent::{
    dqn::{Dqn, DqnConfig, DqnModelConfig, EpsilonGreedy},
    mlp::{DuelingMlp, DuelingMlpConfig, Mlp, MlpConfig},
    opt::OptimizerConfig,
    ppo::{ActorCritic, ActorCriticConfig, Ppo, PpoConfig, PpoModelConfig},
};
use gridrl_core::{
    generic_replay_buffer::{
        PerConfig, RolloutBuffer, RolloutBufferConfig, SimpleReplayBuffer,
        SimpleReplayBufferConfig, SimpleStepProcessor, SimpleStepProcessorConfig,
    },
    record::{CsvRecorder, Recorder},
    Agent, Configurable, DefaultEvaluator, Env as _, ExperienceBufferBase, Policy,
    ReplayBufferBase, StepProcessor, Trainer, TrainerConfig,
};
use gridrl_sim::{candle::TensorBatch, MicrogridAct, MicrogridEnv, MicrogridEnvConfig};
use log::{info, warn};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::convert::TryFrom;
use std::path::Path;

type Env = MicrogridEnv;
type ReplayBuffer = SimpleReplayBuffer<TensorBatch, TensorBatch>;
type Rollout = RolloutBuffer<TensorBatch, TensorBatch>;
type StepProc = SimpleStepProcessor<Env, TensorBatch, TensorBatch>;
type Evaluator = DefaultEvaluator<Env>;
type DqnAgent = Dqn<Env, Mlp, ReplayBuffer>;
type DuelingDqnAgent = Dqn<Env, DuelingMlp, ReplayBuffer>;
type PpoAgent = Ppo<Env, ActorCritic, Rollout>;

const DIM_OBS: i64 = 8;
const DIM_ACT: i64 = 5;
const LR_DQN: f64 = 1e-4;
const LR_ACTOR: f64 = 3e-4;
const LR_CRITIC: f64 = 1e-3;
const DQN_UNITS: [i64; 3] = [256, 256, 128];
const PPO_UNITS: [i64; 2] = [128, 128];
const REPLAY_BUFFER_CAPACITY: usize = 100_000;
const BATCH_SIZE: usize = 64;
const TARGET_SYNC_INTERVAL: usize = 1000;
const ROLLOUT_STEPS: usize = 96;
const EVAL_INTERVAL: usize = 50;
const SAVE_INTERVAL: usize = 100;
const FLUSH_INTERVAL: usize = 10;
const N_EPISODES_PER_EVAL: usize = 5;
const EVAL_SEED_OFFSET: i64 = 10_000;

/// Microgrid energy dispatch with deep reinforcement learning.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Preset {
    /// Constants of the standalone training scripts.
    Standalone,
    /// Constants of the library environment module.
    Library,
}

impl Preset {
    fn env_config(self) -> MicrogridEnvConfig {
        match self {
            Self::Standalone => MicrogridEnvConfig::standalone(),
            Self::Library => MicrogridEnvConfig::library(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Algo {
    /// DQN with a plain MLP.
    Dqn,
    /// DQN with a dueling value network.
    DuelingDqn,
    /// PPO with an actor-critic network.
    Ppo,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train an agent.
    Train {
        /// Number of training episodes.
        #[arg(long, default_value_t = 500)]
        episodes: usize,

        /// Random seed of the run.
        #[arg(long, default_value_t = 42)]
        seed: i64,

        /// Use the Double-DQN target computation.
        #[arg(long)]
        double_dqn: bool,

        /// Train the PPO agent instead of DQN.
        #[arg(long)]
        ppo: bool,

        /// Use the dueling value network (DQN only).
        #[arg(long)]
        dueling: bool,

        /// Use prioritized experience replay (DQN only).
        #[arg(long)]
        per: bool,

        /// Environment constants preset.
        #[arg(long, value_enum, default_value_t = Preset::Standalone)]
        preset: Preset,

        /// Directory of checkpoints and the training history.
        #[arg(long, default_value = "checkpoints")]
        model_dir: String,
    },

    /// Evaluate a trained agent against a random baseline.
    Evaluate {
        /// Path of the checkpoint directory.
        #[arg(long, default_value = "checkpoints/best")]
        model: String,

        /// Number of evaluation episodes.
        #[arg(long, default_value_t = 20)]
        episodes: usize,

        /// Random seed of the evaluation episodes.
        #[arg(long, default_value_t = 42)]
        seed: i64,

        /// Evaluate the PPO agent instead of DQN.
        #[arg(long)]
        ppo: bool,

        /// Use the dueling value network (DQN only).
        #[arg(long)]
        dueling: bool,

        /// Environment constants preset.
        #[arg(long, value_enum, default_value_t = Preset::Standalone)]
        preset: Preset,
    },

    /// Run one episode and print the hourly dispatch table.
    Demo {
        /// Path of the checkpoint directory.
        #[arg(long, default_value = "checkpoints/best")]
        model: String,

        /// Random seed of the demo episode.
        #[arg(long, default_value_t = 999)]
        seed: i64,

        /// Demo the PPO agent instead of DQN.
        #[arg(long)]
        ppo: bool,

        /// Use the dueling value network (DQN only).
        #[arg(long)]
        dueling: bool,

        /// Environment constants preset.
        #[arg(long, value_enum, default_value_t = Preset::Standalone)]
        preset: Preset,
    },
}

fn algo(ppo: bool, dueling: bool) -> Algo {
    match (ppo, dueling) {
        (true, _) => Algo::Ppo,
        (false, true) => Algo::DuelingDqn,
        (false, false) => Algo::Dqn,
    }
}

fn dqn_config(double_dqn: bool, seed: i64) -> DqnConfig<MlpConfig> {
    let model_config = DqnModelConfig::default()
        .q_config(MlpConfig::new(DIM_OBS, DQN_UNITS.to_vec(), DIM_ACT))
        .opt_config(OptimizerConfig::Adam { lr: LR_DQN });
    DqnConfig::default()
        .model_config(model_config)
        .batch_size(BATCH_SIZE)
        .min_transitions_warmup(BATCH_SIZE)
        .target_sync_interval(TARGET_SYNC_INTERVAL)
        .double_dqn(double_dqn)
        .explorer(EpsilonGreedy::new())
        .seed(seed as u64)
}

fn dueling_dqn_config(double_dqn: bool, seed: i64) -> DqnConfig<DuelingMlpConfig> {
    let model_config = DqnModelConfig::default()
        .q_config(DuelingMlpConfig::new(DIM_OBS, DQN_UNITS.to_vec(), DIM_ACT))
        .opt_config(OptimizerConfig::Adam { lr: LR_DQN });
    DqnConfig::default()
        .model_config(model_config)
        .batch_size(BATCH_SIZE)
        .min_transitions_warmup(BATCH_SIZE)
        .target_sync_interval(TARGET_SYNC_INTERVAL)
        .double_dqn(double_dqn)
        .explorer(EpsilonGreedy::new())
        .seed(seed as u64)
}

fn ppo_config(seed: i64) -> PpoConfig<ActorCriticConfig> {
    let model_config = PpoModelConfig::default()
        .ac_config(ActorCriticConfig::new(DIM_OBS, PPO_UNITS.to_vec(), DIM_ACT))
        .opt_config_actor(OptimizerConfig::Adam { lr: LR_ACTOR })
        .opt_config_critic(OptimizerConfig::Adam { lr: LR_CRITIC });
    PpoConfig::default().model_config(model_config).seed(seed as u64)
}

fn trainer_config(episodes: usize, opt_interval: usize, warmup: usize, model_dir: &str) -> TrainerConfig {
    TrainerConfig::default()
        .max_episodes(episodes)
        .opt_interval(opt_interval)
        .warmup_period(warmup)
        .eval_interval(EVAL_INTERVAL)
        .save_interval(SAVE_INTERVAL)
        .flush_record_interval(FLUSH_INTERVAL)
        .model_dir(model_dir)
}

fn run_train<A, R>(
    env_config: &MicrogridEnvConfig,
    config: TrainerConfig,
    agent: &mut A,
    buffer: &mut R,
    seed: i64,
    model_dir: &str,
) -> Result<()>
where
    A: Agent<Env, R>,
    R: ExperienceBufferBase<Item = <StepProc as StepProcessor<Env>>::Output> + ReplayBufferBase,
{
    std::fs::create_dir_all(model_dir)?;
    let env = Env::build(env_config, seed)?;
    let step_proc = StepProc::build(&SimpleStepProcessorConfig::default());
    let mut recorder: Box<dyn Recorder> =
        Box::new(CsvRecorder::new(Path::new(model_dir).join("history.csv"))?);
    let mut evaluator = Evaluator::new(env_config, seed + EVAL_SEED_OFFSET, N_EPISODES_PER_EVAL)?;
    let mut trainer = Trainer::build(config);

    trainer.train(env, step_proc, agent, buffer, &mut recorder, &mut evaluator)
}

fn replay_buffer_config(seed: i64, per: bool) -> SimpleReplayBufferConfig {
    let per_config = match per {
        true => Some(PerConfig::default()),
        false => None,
    };
    SimpleReplayBufferConfig::default()
        .capacity(REPLAY_BUFFER_CAPACITY)
        .seed(seed as u64)
        .per_config(per_config)
}

#[allow(clippy::too_many_arguments)]
fn train(
    episodes: usize,
    seed: i64,
    double_dqn: bool,
    ppo: bool,
    dueling: bool,
    per: bool,
    preset: Preset,
    model_dir: &str,
) -> Result<()> {
    let env_config = preset.env_config();

    match algo(ppo, dueling) {
        Algo::Ppo => {
            if per {
                warn!("--per has no effect on PPO; the rollout store is on-policy");
            }
            info!("Training PPO for {} episodes (seed {})", episodes, seed);
            let config = trainer_config(episodes, ROLLOUT_STEPS, 0, model_dir);
            let mut agent = PpoAgent::build(ppo_config(seed));
            let mut buffer = Rollout::build(&RolloutBufferConfig::default());
            run_train(&env_config, config, &mut agent, &mut buffer, seed, model_dir)
        }
        Algo::DuelingDqn => {
            info!(
                "Training dueling {} for {} episodes (seed {})",
                if double_dqn { "Double DQN" } else { "DQN" },
                episodes,
                seed
            );
            let config = trainer_config(episodes, 1, BATCH_SIZE, model_dir);
            let mut agent = DuelingDqnAgent::build(dueling_dqn_config(double_dqn, seed));
            let mut buffer = ReplayBuffer::build(&replay_buffer_config(seed, per));
            run_train(&env_config, config, &mut agent, &mut buffer, seed, model_dir)
        }
        Algo::Dqn => {
            info!(
                "Training {} for {} episodes (seed {})",
                if double_dqn { "Double DQN" } else { "DQN" },
                episodes,
                seed
            );
            let config = trainer_config(episodes, 1, BATCH_SIZE, model_dir);
            let mut agent = DqnAgent::build(dqn_config(double_dqn, seed));
            let mut buffer = ReplayBuffer::build(&replay_buffer_config(seed, per));
            run_train(&env_config, config, &mut agent, &mut buffer, seed, model_dir)
        }
    }
}

/// A policy taking uniformly random actions, the evaluation baseline.
struct RandomPolicy {
    rng: SmallRng,
}

impl RandomPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Policy<Env> for RandomPolicy {
    fn sample(&mut self, _obs: &<Env as gridrl_core::Env>::Obs) -> MicrogridAct {
        MicrogridAct::new(self.rng.gen_range(0..DIM_ACT))
    }
}

/// Loads an agent for evaluation or demo.
///
/// A missing or unreadable checkpoint is a warning, not a failure: the
/// untrained policy is used instead.
fn load_policy<A>(mut agent: A, model: &str) -> Box<dyn Policy<Env>>
where
    A: Agent<Env, ReplayBuffer> + 'static,
{
    let path = Path::new(model);
    if path.exists() {
        match agent.load_params(path) {
            Ok(()) => info!("Loaded model from {:?}", path),
            Err(e) => warn!(
                "Failed to load model from {:?} ({}); using the untrained policy",
                path, e
            ),
        }
    } else {
        warn!(
            "No checkpoint at {:?}; using the untrained policy",
            path
        );
    }
    agent.eval();
    Box::new(agent)
}

fn load_ppo_policy(model: &str, seed: i64) -> Box<dyn Policy<Env>> {
    let mut agent = PpoAgent::build(ppo_config(seed));
    let path = Path::new(model);
    if path.exists() {
        match agent.load_params(path) {
            Ok(()) => info!("Loaded model from {:?}", path),
            Err(e) => warn!(
                "Failed to load model from {:?} ({}); using the untrained policy",
                path, e
            ),
        }
    } else {
        warn!("No checkpoint at {:?}; using the untrained policy", path);
    }
    <PpoAgent as Agent<Env, Rollout>>::eval(&mut agent);
    Box::new(agent)
}

fn build_policy(model: &str, seed: i64, ppo: bool, dueling: bool) -> Box<dyn Policy<Env>> {
    match algo(ppo, dueling) {
        Algo::Ppo => load_ppo_policy(model, seed),
        Algo::DuelingDqn => load_policy(
            DuelingDqnAgent::build(dueling_dqn_config(false, seed)),
            model,
        ),
        Algo::Dqn => load_policy(DqnAgent::build(dqn_config(false, seed)), model),
    }
}

#[derive(Default)]
struct EvalStats {
    reward: f64,
    cost: f64,
    renewable: f64,
    unmet: f64,
}

fn eval_episodes<P: Policy<Env>>(
    policy: &mut P,
    env_config: &MicrogridEnvConfig,
    seed: i64,
    n_episodes: usize,
) -> Result<EvalStats> {
    let mut env = Env::build(env_config, seed)?;
    let mut stats = EvalStats::default();

    for ix in 0..n_episodes {
        let mut obs = env.reset_with_index(ix)?;
        let mut episode_reward = 0f64;
        loop {
            let act = policy.sample(&obs);
            let (step, _) = env.step(&act);
            episode_reward += step.reward[0] as f64;
            if step.is_done() {
                stats.cost += step.info.total_grid_cost;
                stats.renewable += step.info.renewable_ratio;
                stats.unmet += step.info.unmet_ratio;
                break;
            }
            obs = step.obs;
        }
        stats.reward += episode_reward;
    }

    let n = n_episodes as f64;
    stats.reward /= n;
    stats.cost /= n;
    stats.renewable /= n;
    stats.unmet /= n;
    Ok(stats)
}

fn evaluate(
    model: &str,
    episodes: usize,
    seed: i64,
    ppo: bool,
    dueling: bool,
    preset: Preset,
) -> Result<()> {
    let env_config = preset.env_config();
    let mut policy = build_policy(model, seed, ppo, dueling);
    let agent_stats = eval_episodes(&mut policy, &env_config, seed + EVAL_SEED_OFFSET, episodes)?;

    let mut random = RandomPolicy::new(seed as u64);
    let random_stats = eval_episodes(&mut random, &env_config, seed + EVAL_SEED_OFFSET, episodes)?;

    println!("{:<24} {:>12} {:>12}", "Metric", "Agent", "Random");
    println!("{}", "-".repeat(50));
    println!(
        "{:<24} {:>12.2} {:>12.2}",
        "Mean reward", agent_stats.reward, random_stats.reward
    );
    println!(
        "{:<24} {:>12.2} {:>12.2}",
        "Grid cost ($)", agent_stats.cost, random_stats.cost
    );
    println!(
        "{:<24} {:>11.1}% {:>11.1}%",
        "Renewable usage",
        agent_stats.renewable * 100.0,
        random_stats.renewable * 100.0
    );
    println!(
        "{:<24} {:>11.1}% {:>11.1}%",
        "Unmet demand",
        agent_stats.unmet * 100.0,
        random_stats.unmet * 100.0
    );

    Ok(())
}

fn demo(model: &str, seed: i64, ppo: bool, dueling: bool, preset: Preset) -> Result<()> {
    let env_config = preset.env_config();
    let mut policy = build_policy(model, seed, ppo, dueling);

    let mut env = Env::build(&env_config, seed)?;
    let mut obs = env.reset()?;
    let mut total_reward = 0f64;

    println!(
        "{:>4} | {:<12} | {:>7} | {:>6} | {:>6} | {:>8} | {:>7} | {:>7}",
        "Hour", "Action", "Demand", "Solar", "Wind", "Battery", "Price", "Reward"
    );
    println!("{}", "-".repeat(82));

    loop {
        let act = policy.sample(&obs);
        let action = gridrl_sim::EnergyAction::try_from(act.act)?;
        let (step, _) = env.step(&act);
        let info = &step.info;
        let flows = &info.flows;
        total_reward += step.reward[0] as f64;

        println!(
            "{:>4} | {:<12} | {:>7.1} | {:>6.1} | {:>6.1} | {:>8.1} | {:>7.3} | {:>+7.2}",
            info.hour,
            action.to_string(),
            flows.demand,
            flows.solar,
            flows.wind,
            info.battery_level,
            flows.price,
            step.reward[0]
        );

        if step.is_done() {
            println!("{}", "-".repeat(82));
            println!("Total reward:       {:+.2}", total_reward);
            println!("Grid cost:          ${:.2}", info.total_grid_cost);
            println!("Renewable usage:    {:.1}%", info.renewable_ratio * 100.0);
            println!("Unmet demand:       {:.1}%", info.unmet_ratio * 100.0);
            if let Some(reason) = info.termination {
                println!("Termination:        {}", reason);
            }
            break;
        }
        obs = step.obs;
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            episodes,
            seed,
            double_dqn,
            ppo,
            dueling,
            per,
            preset,
            model_dir,
        } => train(episodes, seed, double_dqn, ppo, dueling, per, preset, &model_dir),
        Command::Evaluate {
            model,
            episodes,
            seed,
            ppo,
            dueling,
            preset,
        } => evaluate(&model, episodes, seed, ppo, dueling, preset),
        Command::Demo {
            model,
            seed,
            ppo,
            dueling,
            preset,
        } => demo(&model, seed, ppo, dueling, preset),
    }
}
