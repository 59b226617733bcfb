// Corridor RL example driving a single Actor directly
//
// The agent starts at the left end of a short corridor and is rewarded for
// reaching the right end. Its position is the only input column; the single
// hidden column chooses between stepping left (0) and right (1).
//
// Run with: RUST_LOG=debug cargo run --release --example corridor

use log::info;

use ogmaneo_actor::helpers::{get_num_threads, set_num_threads, Int3};
use ogmaneo_actor::{Actor, Params, VisibleLayerDesc};

struct Corridor {
    pos: i32,
}

impl Corridor {
    const LENGTH: i32 = 8;
    const MAX_STEPS: usize = 100;

    fn new() -> Self {
        Self { pos: 0 }
    }

    fn reset(&mut self) {
        self.pos = 0;
    }

    /// Returns (reward, done).
    fn step(&mut self, action: i32) -> (f32, bool) {
        self.pos = (self.pos + if action == 1 { 1 } else { -1 }).clamp(0, Self::LENGTH - 1);

        if self.pos == Self::LENGTH - 1 {
            (1.0, true)
        } else {
            (-0.01, false)
        }
    }
}

fn main() {
    env_logger::init();
    set_num_threads(2);

    let num_episodes = 200;

    let mut actor = Actor::default();
    if let Err(e) = actor.init_random(
        Int3::new(1, 1, 2),
        64,
        vec![VisibleLayerDesc {
            size: Int3::new(1, 1, Corridor::LENGTH),
            radius: 0,
        }],
        1234,
    ) {
        eprintln!("failed to initialize actor: {e}");
        std::process::exit(1);
    }

    let params = Params {
        alpha: 0.1,
        beta: 0.05,
        gamma: 0.9,
        ..Params::default()
    };

    if let Err(e) = params.validate() {
        eprintln!("bad parameters: {e}");
        std::process::exit(1);
    }

    info!(
        "training corridor of length {} on {} threads with {:?}",
        Corridor::LENGTH,
        get_num_threads(),
        params
    );

    let mut env = Corridor::new();

    println!("{:>7} | {:>5} | {:>12}", "Episode", "Steps", "Avg(last 10)");
    println!("{}", "-".repeat(30));

    let mut avg_window = [0.0f32; 10];
    let mut avg_idx = 0usize;

    for ep in 0..num_episodes {
        env.reset();

        let mut reward = 0.0f32;
        let mut steps = 0usize;

        for _ in 0..Corridor::MAX_STEPS {
            let obs_cis = [env.pos];

            // the action taken last step is the target credited by this step's reward
            let act_cis = actor.get_hidden_cis().to_vec();

            actor.step(&[&obs_cis], &act_cis, reward, true, false, &params);

            let (r, done) = env.step(actor.get_hidden_cis()[0]);
            reward = r;
            steps += 1;

            if done {
                // deliver the terminal reward before resetting
                let obs_cis = [env.pos];
                let act_cis = actor.get_hidden_cis().to_vec();
                actor.step(&[&obs_cis], &act_cis, reward, true, false, &params);
                break;
            }
        }

        avg_window[avg_idx % 10] = steps as f32;
        avg_idx += 1;

        let count = avg_idx.min(10);
        let avg: f32 = avg_window[..count].iter().sum::<f32>() / count as f32;

        if (ep + 1) % 10 == 0 || ep == 0 {
            println!("{:>7} | {:>5} | {:>12.1}", ep + 1, steps, avg);
        }
    }

    info!("final value estimate {:?}", actor.get_hidden_values());
}
