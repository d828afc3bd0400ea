use bumpalo::Bump;
use clap::Parser;
use score_performer::midi::{ControlChange, ControllerKind, MidiNote, NoteOn, PressVelocity};
use score_performer::region::parse_region_defs;
use score_performer::*;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};
use thiserror::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error(transparent)]
    Performance(#[from] PerformanceError),
    #[error("Could not build the demo score: bad MIDI data.")]
    DemoData,
}

/// Plays a short built-in score and prints every message as it falls due.
///
/// While playing, type `p` to pause or resume, `r` to restart, `m <track>`
/// to mute or unmute a track and `s` to stop.
#[derive(Parser, Debug)]
#[command(name = "score-performer")]
struct Opt {
    /// Region definitions, in score ms.
    #[arg(long, default_value = "a:0-2000 b:2000-4000")]
    regions: String,
    /// The order in which regions are played.
    #[arg(long, default_value = "aab")]
    sequence: String,
    /// Start position in the score, in ms.
    #[arg(long, default_value_t = 0)]
    start: u32,
    /// End position in the score, in ms.
    #[arg(long, default_value_t = 4000)]
    end: u32,
    /// Playback speed factor.
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Spacing of sampled controller values, in ms.
    #[arg(long, default_value_t = config::DEFAULT_CONTROLLER_UPDATE_INTERVAL_MS)]
    update_interval: u32,
    /// Scheduler tick, in ms.
    #[arg(long, default_value_t = 10)]
    tick: u64,
    /// Print the whole performance at once instead of playing in real time.
    #[arg(long)]
    dump: bool,
    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log: String,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Command {
    TogglePause,
    Restart,
    Stop,
    ToggleTrack(usize),
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let first = words.next()?;
    match first.chars().next()?.to_ascii_lowercase() {
        'p' => Some(Command::TogglePause),
        'r' => Some(Command::Restart),
        's' => Some(Command::Stop),
        'm' => words
            .next()
            .and_then(|raw| raw.parse().ok())
            .map(Command::ToggleTrack),
        _ => None,
    }
}

fn spawn_command_reader() -> Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            match parse_command(&line) {
                Some(cmd) => {
                    if tx.send(cmd).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Bad cmd: {:?}", line),
            }
        }
    });
    rx
}

fn demo_chord(
    channel: MidiChannel,
    position_ms: u32,
    duration_ms: u32,
    notes: &[u8],
) -> Result<ObjectRecord, CliError> {
    let velocity = PressVelocity::from_raw(96).ok_or(CliError::DemoData)?;
    let mut start = MomentRecord::new(0);
    let mut end = MomentRecord::new(duration_ms);
    for &raw in notes {
        let note = MidiNote::from_raw(raw).ok_or(CliError::DemoData)?;
        let on = NoteOn::new(channel, note, velocity);
        start.note_ons.push(on.into());
        end.note_offs.push(on.release().into());
    }
    Ok(ObjectRecord::chord(position_ms, duration_ms, vec![start, end]))
}

/// Two tracks over four seconds: a swelling melody and a panned bass line.
fn demo_score() -> Result<Vec<TrackRecord>, CliError> {
    let lead = MidiChannel::default();
    let bass = MidiChannel::from_raw(1).ok_or(CliError::DemoData)?;

    let mut melody = Vec::new();
    for (idx, &note) in [72u8, 74, 76, 77, 79, 77, 76, 74].iter().enumerate() {
        let position = idx as u32 * 500;
        let mut chord = demo_chord(lead, position, 500, &[note])?;
        if idx % 4 == 0 {
            chord = chord.with_envelope(Envelope::new(
                ControllerKind::EXPRESSION,
                vec![Vertex::new(40, 400), Vertex::new(110, 100)],
            ));
        }
        melody.push(chord);
    }

    let mut low = demo_chord(bass, 0, 1500, &[36, 43])?;
    let pan: MidiMessage = ControlChange::new(bass, midi::PAN, 32)
        .ok_or(CliError::DemoData)?
        .into();
    let mut switch = MomentRecord::new(0);
    switch.switches.push(pan);
    low.moments.push(switch);
    let bass_line = vec![
        low,
        ObjectRecord::rest(1500, 500).with_envelope(Envelope::new(
            ControllerKind::Control(midi::SUSTAIN_PEDAL),
            vec![Vertex::new(127, 500)],
        )),
        demo_chord(bass, 2000, 2000, &[41, 48])?,
    ];

    Ok(vec![
        TrackRecord::new(lead, melody),
        TrackRecord::new(bass, bass_line),
    ])
}

/// Performance time, advanced only while the performance runs.
#[derive(Debug, Copy, Clone)]
struct PlayClock {
    // Kept as a `Duration` so sub-millisecond remainders are not lost per tick.
    played: Duration,
    last: Instant,
}

impl PlayClock {
    fn new(now: Instant) -> Self {
        PlayClock {
            played: Duration::from_millis(0),
            last: now,
        }
    }

    fn tick(&mut self, now: Instant, running: bool) {
        if running {
            self.played += now.duration_since(self.last);
        }
        self.last = now;
    }

    fn reset(&mut self) {
        self.played = Duration::from_millis(0);
    }

    fn ms(&self) -> u64 {
        self.played.as_millis() as u64
    }
}

fn print_message(time_ms: u64, track: usize, message: &MidiMessage) {
    let bytes: Vec<String> = message
        .bytes()
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect();
    println!("{:>8} ms  track {}  {}", time_ms, track, bytes.join(" "));
}

fn print_inits(inits: &[TrackInit]) {
    for init in inits {
        for message in &init.messages {
            print_message(0, init.track, message);
        }
    }
}

fn run(opt: Opt) -> Result<(), CliError> {
    let config = ScoreConfig::default()
        .with_update_interval(opt.update_interval)
        .with_speed(opt.speed);
    let defs = parse_region_defs(&opt.regions)?;
    let score = Score::load(demo_score()?, defs, &opt.sequence, &config)?;
    let start = config.scale(opt.start);
    let end = config.scale(opt.end);
    let mut perf = score.into_performance();
    print_inits(&perf.start(start, end)?);

    let mut bump = Bump::new();
    if opt.dump {
        let batch = perf.step_until(u64::MAX, &bump);
        for scheduled in batch.iter() {
            for message in perf.messages(scheduled) {
                print_message(scheduled.time_ms, scheduled.track, message);
            }
        }
        return Ok(());
    }

    let commands = spawn_command_reader();
    let tick = Duration::from_millis(opt.tick.max(1));
    let mut clock = PlayClock::new(Instant::now());
    loop {
        loop {
            let cmd = match commands.try_recv() {
                Ok(cmd) => cmd,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            match cmd {
                Command::TogglePause => match perf.state() {
                    PerformanceState::Paused => perf.resume()?,
                    _ => perf.pause()?,
                },
                Command::Restart => {
                    print_inits(&perf.restart()?);
                    clock.reset();
                }
                Command::Stop => perf.stop(),
                Command::ToggleTrack(track) => {
                    let on = perf.is_track_on(track);
                    if let Err(e) = perf.set_track_on(track, !on) {
                        warn!("{}", e);
                    }
                }
            }
        }

        clock.tick(Instant::now(), perf.state() == PerformanceState::Running);
        let batch = perf.step_until(clock.ms(), &bump);
        for scheduled in batch.iter() {
            for message in perf.messages(scheduled) {
                print_message(scheduled.time_ms, scheduled.track, message);
            }
        }
        drop(batch);
        bump.reset();

        match perf.state() {
            PerformanceState::Finished | PerformanceState::Stopped => break,
            PerformanceState::Running | PerformanceState::Paused => {}
        }
        std::thread::sleep(tick);
    }
    info!("Played {} ms.", clock.ms());
    Ok(())
}

fn main() {
    let opt = Opt::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&opt.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(opt) {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_keeps_fractions() {
        let start = Instant::now();
        let mut clock = PlayClock::new(start);
        let mut now = start;
        for _ in 0..100 {
            now += Duration::from_micros(10_900);
            clock.tick(now, true);
        }
        assert_eq!(1090, clock.ms());
    }

    #[test]
    fn test_clock_stands_while_paused() {
        let start = Instant::now();
        let mut clock = PlayClock::new(start);
        clock.tick(start + Duration::from_millis(300), true);
        clock.tick(start + Duration::from_millis(800), false);
        clock.tick(start + Duration::from_millis(900), true);
        assert_eq!(400, clock.ms());
        clock.reset();
        clock.tick(start + Duration::from_millis(950), true);
        assert_eq!(50, clock.ms());
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(Some(Command::TogglePause), parse_command(" p "));
        assert_eq!(Some(Command::ToggleTrack(2)), parse_command("m 2"));
        assert_eq!(None, parse_command("m x"));
        assert_eq!(None, parse_command(""));
    }
}
