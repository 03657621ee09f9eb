//! Buzz Wire entry point
//!
//! Headless replay: connects to the session server, starts a session and
//! walks a synthetic probe along the returned track, printing session events.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::Vec3;

use buzz_wire::session::{SessionDriver, SessionEvent, SessionPhase};
use buzz_wire::settings::{CollisionSource, Settings};

#[derive(Debug, Parser)]
#[command(
    name = "buzz-wire",
    version,
    about = "Buzz-wire session driver (headless replay)"
)]
struct Args {
    /// Session server base URL (overrides config and BUZZ_WIRE_SERVER_URL)
    #[arg(long)]
    server: Option<String>,

    /// Settings file
    #[arg(long, default_value = "buzz_wire.json")]
    config: PathBuf,

    /// Collision threshold sent with start_session (meters)
    #[arg(long)]
    threshold: Option<f32>,

    /// Collision signal that drives the counter
    #[arg(long, value_enum)]
    collision_source: Option<CollisionSource>,

    /// Control-loop rate
    #[arg(long, default_value_t = 60.0)]
    tick_hz: f32,

    /// Probe speed along the track (meters per second)
    #[arg(long, default_value_t = 0.25)]
    speed: f32,

    /// Sideways wobble amplitude of the probe (meters)
    #[arg(long, default_value_t = 0.0)]
    wobble: f32,

    /// Stop after this many ticks
    #[arg(long, default_value_t = 36_000)]
    max_ticks: u64,

    /// Health check attempts before giving up (0 = forever)
    #[arg(long, default_value_t = 10)]
    connect_attempts: u32,
}

/// Probe that travels the polyline at constant speed, offset by a wobble
struct ReplayProbe {
    points: Vec<Vec3>,
    speed: f32,
    wobble: f32,
    travelled: f32,
    clock: f32,
}

impl ReplayProbe {
    fn new(points: Vec<Vec3>, speed: f32, wobble: f32) -> Self {
        Self {
            points,
            speed,
            wobble,
            travelled: 0.0,
            clock: 0.0,
        }
    }

    /// Position after advancing by `dt`
    fn advance(&mut self, dt: f32) -> Vec3 {
        self.clock += dt;
        self.travelled += self.speed * dt;

        let mut remaining = self.travelled;
        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let len = a.distance(b);
            if remaining <= len && len > 0.0 {
                let dir = (b - a) / len;
                let (side, _) = dir.any_orthonormal_pair();
                let offset = side * self.wobble * (self.clock * std::f32::consts::TAU).sin();
                return a + dir * remaining + offset;
            }
            remaining -= len;
        }
        self.points.last().copied().unwrap_or(Vec3::ZERO)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    log::info!("Buzz Wire starting...");

    let mut settings = Settings::load(&args.config);
    if let Some(server) = args.server {
        settings.server_url = server;
    }
    if let Some(threshold) = args.threshold {
        settings.collision_threshold = threshold;
    }
    if let Some(source) = args.collision_source {
        settings.collision_source = source;
    }

    let mut driver = match SessionDriver::new(&settings) {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("{}", e.status_message());
            return ExitCode::FAILURE;
        }
    };

    let attempts = (args.connect_attempts > 0).then_some(args.connect_attempts);
    if !driver.connect(attempts).await {
        eprintln!("{}", driver.last_error().unwrap_or("Cannot reach server"));
        return ExitCode::FAILURE;
    }
    println!("Connected to {}", settings.server_url);
    log::info!(
        "Counting collisions from the {} signal",
        settings.collision_source.as_str()
    );

    match driver.start_session().await {
        Ok(events) => events.iter().for_each(|e| println!("{e}")),
        Err(e) => {
            eprintln!("{}", e.status_message());
            return ExitCode::FAILURE;
        }
    }

    let Some(geometry) = driver.machine().geometry() else {
        eprintln!("No track loaded");
        return ExitCode::FAILURE;
    };
    let mut probe = ReplayProbe::new(geometry.polyline.clone(), args.speed, args.wobble);

    let period = Duration::from_secs_f32(1.0 / args.tick_hz.max(1.0));
    let mut interval = tokio::time::interval(period);
    let mut last = Instant::now();

    for _ in 0..args.max_ticks {
        interval.tick().await;
        let now = Instant::now();
        let dt = (now - last).as_secs_f32();
        last = now;

        let sample = probe.advance(dt);
        let touching = driver
            .machine()
            .geometry()
            .is_some_and(|g| g.touches(&[sample]));

        for event in driver.tick(&[sample], touching, dt) {
            println!("{event}");
            if let SessionEvent::Completed { .. } = event {
                if let Some(snapshot) = driver.machine().snapshot() {
                    log::info!(
                        "Server reports {:.2}s, {} collisions",
                        snapshot.elapsed,
                        snapshot.collision_count
                    );
                }
            }
        }

        if driver.phase() == SessionPhase::Completed {
            return ExitCode::SUCCESS;
        }
    }

    let state = driver.machine().state();
    println!(
        "Stopped while {} after {:.2}s with {} collisions",
        state.phase.as_str(),
        state.elapsed,
        state.collision_count
    );
    ExitCode::SUCCESS
}
