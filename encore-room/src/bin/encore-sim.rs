//! Encore room simulator
//!
//! Runs one song through the full phase cycle: a singer drives song-select →
//! ready → countdown → playing → finished while band bots tap along with
//! random timing jitter, fire calls and post requests. Everyone shares an
//! in-process hub unless `--relay` points at a running encore relay.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use encore_common::config::TomlConfig;
use encore_common::events::{Difficulty, GamePhase, Instrument, Player, Role, SyncPayload};
use encore_common::{time, uuid_utils};
use encore_game::{ChartLibrary, SessionSummary, SimulatedTrack, SongInfo};
use encore_room::{
    InMemoryQueue, LocalHub, PhaseDriver, RelayTransport, ReservationQueue, RoomClient,
    StageController, StageView, Transport,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

const FRAME: Duration = Duration::from_millis(16);

/// Command-line arguments for encore-sim
#[derive(Parser, Debug, Clone)]
#[command(name = "encore-sim")]
#[command(about = "Simulate an encore room session with band bots")]
#[command(version)]
struct Args {
    /// Config file (overrides ENCORE_CONFIG)
    #[arg(short, long, env = "ENCORE_CONFIG")]
    config: Option<PathBuf>,

    /// Room code (random if omitted)
    #[arg(short, long)]
    room: Option<String>,

    /// Relay base URL; without it the session runs in process
    #[arg(long, env = "ENCORE_RELAY_URL")]
    relay: Option<String>,

    /// Number of band bots
    #[arg(short, long, default_value = "3")]
    bots: usize,

    #[arg(long, default_value = "120")]
    bpm: f64,

    /// Song length in seconds
    #[arg(long, default_value = "20")]
    song_secs: f64,

    /// Maximum tap timing error (ms, either side)
    #[arg(long, default_value = "150")]
    jitter_ms: i64,

    /// Probability a bot ignores a note entirely
    #[arg(long, default_value = "0.1")]
    skip_rate: f64,

    /// Base RNG seed; bot n uses seed + n
    #[arg(long, default_value = "7")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise the configured level replaces this once loaded
    let from_env = EnvFilter::try_from_default_env().ok();
    let use_config_level = from_env.is_none();
    let (filter, filter_handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new(log_filter("info"))));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load config")?;
    config.validate().context("Invalid configuration")?;
    if use_config_level {
        if let Err(e) = filter_handle.reload(EnvFilter::new(log_filter(&config.logging.level))) {
            warn!("Could not apply configured log level: {}", e);
        }
    }
    if !(0.0..=1.0).contains(&args.skip_rate) {
        bail!("--skip-rate must be within 0..=1, got {}", args.skip_rate);
    }

    let song = SongInfo {
        id: "sim-song".to_string(),
        title: "Simulated Song".to_string(),
        bpm: args.bpm,
        duration_secs: args.song_secs,
    };
    let library = Arc::new(
        ChartLibrary::build(std::slice::from_ref(&song), &config.charts)
            .context("Failed to build charts")?,
    );
    let room = args.room.clone().unwrap_or_else(uuid_utils::room_code);
    info!(
        "Room {}: {} bots, {} at {} bpm for {}s",
        room, args.bots, song.title, song.bpm, song.duration_secs
    );

    match &args.relay {
        Some(url) => {
            let relay = RelayTransport::new(url, config.room.channel_capacity)
                .context("Invalid relay URL")?;
            info!("Using relay {}", relay.base_url());
            simulate(relay, &args, room, library, &config, &song).await
        }
        None => {
            let hub = LocalHub::new(config.room.channel_capacity);
            let result = simulate(hub.clone(), &args, room, library, &config, &song).await;
            hub.shutdown().await;
            result
        }
    }
}

async fn simulate<T>(
    transport: T,
    args: &Args,
    room: String,
    library: Arc<ChartLibrary>,
    config: &TomlConfig,
    song: &SongInfo,
) -> Result<()>
where
    T: Transport + Clone + 'static,
{
    let cancel = CancellationToken::new();

    let mut bots = Vec::new();
    for n in 0..args.bots {
        let bot = Bot {
            name: format!("Bot{}", n + 1),
            instrument: Instrument::ALL[n % Instrument::ALL.len()],
            rng: StdRng::seed_from_u64(args.seed.wrapping_add(n as u64)),
            jitter_ms: args.jitter_ms.max(0),
            skip_rate: args.skip_rate,
            wants_request: n == 0,
        };
        bots.push(tokio::spawn(bot.run(
            transport.clone(),
            room.clone(),
            library.clone(),
            config.clone(),
            song.clone(),
            cancel.clone(),
        )));
    }

    // Let bots subscribe before the singer announces itself
    tokio::time::sleep(Duration::from_millis(200)).await;
    let singer = run_singer(&transport, &room, library, config, song, &cancel).await;
    cancel.cancel();

    for handle in bots {
        match handle.await {
            Ok((name, Some(summary))) => log_summary(&name, &summary),
            Ok((name, None)) => info!("{} did not play", name),
            Err(e) => warn!("Bot task failed: {}", e),
        }
    }
    singer
}

fn log_filter(level: &str) -> String {
    format!("encore_sim={0},encore_room={0},encore_game={0}", level)
}

fn log_summary(name: &str, s: &SessionSummary) {
    info!(
        "{} ({}): score {} max combo {} | perfect {} great {} good {} miss {} | accuracy {:.1}%",
        name,
        s.instrument,
        s.score,
        s.max_combo,
        s.counts.perfect,
        s.counts.great,
        s.counts.good,
        s.counts.miss,
        s.accuracy_percent
    );
}

async fn run_singer<T: Transport>(
    transport: &T,
    room: &str,
    library: Arc<ChartLibrary>,
    config: &TomlConfig,
    song: &SongInfo,
    cancel: &CancellationToken,
) -> Result<()> {
    let me = Player {
        id: uuid_utils::participant_id(),
        name: "Singer".to_string(),
        role: Role::Singer,
        instrument: None,
    };
    let mut client = RoomClient::join(transport, room, me, config.room.clone()).await;
    if !client.is_connected() {
        bail!("Singer could not connect to room {}", room);
    }

    let mut driver = PhaseDriver::new(config.room.countdown_lead_ms);
    let mut queue = InMemoryQueue::default();
    queue.enqueue(&song.id);

    let mut stage = StageController::new(
        library,
        config.clone(),
        None,
        Difficulty::Easy,
        SimulatedTrack::new(Duration::from_secs_f64(song.duration_secs)),
    );

    // Collect roster replies
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.poll(time::now_ms());
    info!("Singer sees {} members", client.mirror().player_count());

    client.send_game_update(driver.select_next_from_queue(&mut queue)?)?;
    client.send_message(&format!("Next up: {}", song.title))?;
    client.send_game_update(driver.start_countdown(time::now_ms())?)?;

    let mut ticker = tokio::time::interval(FRAME);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let now = time::now_ms();
        for event in client.poll(now) {
            if let SyncPayload::Request(request) = &event.payload {
                info!("{} asks: {} {}", event.sender_name, request.emoji, request.text);
                client.complete_request(request.request_id)?;
            }
        }

        let tick = stage.update(client.mirror().game_state(), now);
        let due = driver
            .state()
            .scheduled_start_time
            .is_some_and(|start| now >= start);
        if driver.phase() == GamePhase::Countdown && due {
            client.send_game_update(driver.start_playing()?)?;
        }
        if tick.track_ended {
            client.send_game_update(driver.finish()?)?;
            break;
        }
    }

    // Give bots a few frames to observe `finished` and report
    tokio::time::sleep(Duration::from_millis(500)).await;
    client.poll(time::now_ms());
    for (id, report) in client.mirror().scoreboard() {
        let name = client
            .mirror()
            .player(id)
            .map_or(id.as_str(), |p| p.name.as_str());
        info!("Scoreboard {}: {} (combo {})", name, report.score, report.combo);
    }
    info!("Excitement {:.0}/100", client.mirror().excitement());

    client.send_game_update(driver.back_to_song_select()?)?;
    client.leave();
    Ok(())
}

struct Bot {
    name: String,
    instrument: Instrument,
    rng: StdRng,
    jitter_ms: i64,
    skip_rate: f64,
    wants_request: bool,
}

impl Bot {
    async fn run<T: Transport>(
        mut self,
        transport: T,
        room: String,
        library: Arc<ChartLibrary>,
        config: TomlConfig,
        song: SongInfo,
        cancel: CancellationToken,
    ) -> (String, Option<SessionSummary>) {
        let me = Player {
            id: uuid_utils::participant_id(),
            name: self.name.clone(),
            role: Role::Band,
            instrument: Some(self.instrument),
        };
        let mut client = RoomClient::join(&transport, &room, me, config.room.clone()).await;
        let mut stage = StageController::new(
            library,
            config.clone(),
            Some(self.instrument),
            Difficulty::Easy,
            SimulatedTrack::new(Duration::from_secs_f64(song.duration_secs)),
        );

        // Per-note plan: Some(tap offset) or None to skip
        let mut plan: HashMap<usize, Option<i64>> = HashMap::new();
        let mut ticker = tokio::time::interval(FRAME);
        let mut report = tokio::time::interval(Duration::from_secs(1));
        let mut result = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = report.tick() => {
                    if let Some(session) = stage.session() {
                        let _ = client.send_score(session.score_report());
                    }
                }
                _ = ticker.tick() => {
                    let now = time::now_ms();
                    client.poll(now);
                    let tick = stage.update(client.mirror().game_state(), now);

                    if tick.track_ended {
                        if let Some(session) = stage.session() {
                            let _ = client.send_score(session.score_report());
                        }
                    }
                    if let StageView::Finished(Some(summary)) = &tick.view {
                        result = Some(summary.clone());
                    }
                    if let StageView::Playing { position_ms } = tick.view {
                        if self.wants_request {
                            self.wants_request = false;
                            let _ = client.send_request("Point at me!", "👉");
                        }
                        self.play_frame(&mut stage, &mut client, &mut plan, position_ms);
                    }
                }
            }
        }

        client.leave();
        (self.name, result)
    }

    fn play_frame(
        &mut self,
        stage: &mut StageController<SimulatedTrack>,
        client: &mut RoomClient,
        plan: &mut HashMap<usize, Option<i64>>,
        position_ms: i64,
    ) {
        let Some((id, time_ms, lane)) = stage
            .session()
            .and_then(|s| s.judge().notes().iter().find(|n| !n.hit))
            .map(|n| (n.id, n.note.time_ms, n.note.lane))
        else {
            return;
        };

        let jitter = self.jitter_ms;
        let skip_rate = self.skip_rate;
        let rng = &mut self.rng;
        let offset = *plan.entry(id).or_insert_with(|| {
            if rng.gen_bool(skip_rate) {
                None
            } else {
                Some(rng.gen_range(-jitter..=jitter))
            }
        });

        if let Some(offset) = offset {
            if position_ms >= time_ms + offset && stage.tap(lane).is_some() {
                plan.insert(id, None);
            }
        }

        let Some(session) = stage.session() else {
            return;
        };
        let unlocked: Vec<String> = session
            .calls()
            .available(session.score().score)
            .iter()
            .map(|c| c.id.clone())
            .collect();
        for id in unlocked {
            if let Some(Ok(payload)) = stage.use_call(&id) {
                let _ = client.send_call(payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_builds_a_filter() {
        let level = TomlConfig::default().logging.level;
        let filter = EnvFilter::try_new(log_filter(&level)).unwrap();
        assert!(filter.to_string().contains("encore_sim="));
    }
}
