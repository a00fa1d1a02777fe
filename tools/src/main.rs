//! fangcare: terminal front end for the fang treatment simulation.
//!
//! Usage:
//!   fangcare --seed 12345 --name Riley --tool 2
//!   fangcare --load .buffy_save.btfd --art --color
//!   fangcare --validate .buffy_save.btfd
//!   fangcare --inspect .buffy_save.btfd
//!   fangcare --journal run.db --data-dir ./data

use std::{
    env,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use fangcare_core::{
    catalog::Catalog,
    command::PlayerCommand,
    config::GameConfig,
    engine::{resume_phase, Phase, SetupOptions, TurnEngine},
    error::SimError,
    event::SimEvent,
    gateway::PersistenceGateway,
    snapshot::SimSnapshot,
    state::{FangColor, SimulationState, Subject},
    store::SimStore,
    types::{new_run_id, slot_name, SLOT_COUNT},
    view::Renderer,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config = match flag_value(&args, "--data-dir") {
        Some(dir) => GameConfig::load(dir).with_context(|| format!("loading content from {dir}"))?,
        None => GameConfig::default(),
    };
    let gateway = PersistenceGateway::new(&config);

    if let Some(path) = flag_value(&args, "--validate") {
        let valid = gateway.validate(Path::new(path));
        println!("{path}: {}", if valid { "valid" } else { "invalid" });
        std::process::exit(if valid { 0 } else { 1 });
    }

    if let Some(path) = flag_value(&args, "--inspect") {
        let loaded = gateway
            .load(Path::new(path))
            .with_context(|| format!("reading {path}"))?;
        let snapshot = SimSnapshot {
            run_id: new_run_id(),
            phase: resume_phase(&loaded.subject),
            state: loaded.state,
            subject: loaded.subject,
        };
        println!("{}", snapshot.to_json()?);
        return Ok(());
    }

    let save_path = PathBuf::from(
        flag_value(&args, "--save").unwrap_or(config.persistence.default_save_file.as_str()),
    );
    let seed = parse_arg(&args, "--seed", clock_seed());
    let tool_idx = if has_flag(&args, "--daggerset") {
        0
    } else {
        parse_arg(&args, "--tool", 0usize)
    };
    let options = SetupOptions {
        player_name: flag_value(&args, "--name").map(str::to_string),
        tool_idx,
        render_mode: has_flag(&args, "--art"),
        color_mode: has_flag(&args, "--color"),
    };

    let mut engine = TurnEngine::setup_seeded(new_run_id(), config, seed, options)?;
    log::info!("Run {} started with seed {seed}", engine.run_id);

    if let Some(path) = flag_value(&args, "--journal") {
        let store = SimStore::open(path)?;
        store.migrate()?;
        engine.attach_store(store)?;
    }

    if let Some(path) = flag_value(&args, "--load") {
        if let Err(err) = engine.load(&gateway, Path::new(path)) {
            println!("Rejected save file {path}: {err}");
            println!("Starting a fresh appointment instead.");
        }
    }

    let mut renderer = PlainRenderer::new(io::stdout());
    if let Err(err) = play(&mut engine, &gateway, &save_path, &mut renderer) {
        let diag = PathBuf::from(format!("{}.diag", save_path.display()));
        match engine.dump_diagnostic(&gateway, &diag) {
            Ok(()) => eprintln!("State dumped to {}", diag.display()),
            Err(dump_err) => log::error!("Diagnostic dump failed: {dump_err}"),
        }
        return Err(err);
    }
    Ok(())
}

fn play(
    engine: &mut TurnEngine,
    gateway: &PersistenceGateway,
    save_path: &Path,
    renderer: &mut PlainRenderer<io::Stdout>,
) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut shown_turn = None;

    loop {
        print_events(engine.drain_events());
        match engine.phase() {
            Phase::AwaitingTreatment | Phase::TreatmentApplied => {
                let turn = engine.state().turns;
                if shown_turn != Some(turn) {
                    renderer.render(engine.state(), engine.subject(), &engine.config().catalog)?;
                    shown_turn = Some(turn);
                }
                let Some(slot) = engine.pending_slot() else {
                    bail!("engine in {:?} with no pending slot", engine.phase());
                };
                let tool = engine.tool()?;
                let (max_dip, max_effort) = (tool.max_dip, tool.max_effort);
                println!("\n{} [{}/{}]", slot_name(slot), slot + 1, SLOT_COUNT);
                let dip = prompt_number(&mut input, &format!("  Fluoride dip (0-{max_dip}): "))?;
                let effort = prompt_number(&mut input, &format!("  Scrub effort (0-{max_effort}): "))?;
                engine.treat(dip, effort)?;
            }
            Phase::AwaitingContinue => {
                renderer.render(engine.state(), engine.subject(), &engine.config().catalog)?;
                let answer = prompt_line(&mut input, "Another round? [y]es / [n]o / [s]ave and quit: ")?;
                match engine.decide(PlayerCommand::parse(&answer), gateway, save_path) {
                    Ok(_) => {}
                    Err(SimError::Persist(err)) => println!("Save failed: {err}"),
                    Err(err) => return Err(err.into()),
                }
            }
            Phase::Setup => bail!("engine was never set up"),
            Phase::Won | Phase::Exhausted | Phase::Quit | Phase::Saved => break,
        }
    }

    print_events(engine.drain_events());
    print_summary(engine);
    Ok(())
}

fn print_events(events: Vec<SimEvent>) {
    for event in events {
        match event {
            SimEvent::RunInitialized { subject, species, tool, .. } => {
                println!("Your patient tonight: {subject} the {}. You hold the {tool}.", species.label());
            }
            SimEvent::GameLoaded { turn, path } => println!("Resumed {path} at turn {turn}."),
            SimEvent::GameSaved { path, .. } => println!("Game saved to {path}."),
            SimEvent::GameQuit { .. } => println!("You hang up your apron."),
            SimEvent::TreatmentApplied {
                slot,
                consumed,
                fluoride_left,
                health_before,
                health_after,
                ..
            } => {
                println!(
                    "  Used {consumed} fluoride ({fluoride_left} left). {}: {health_before} -> {health_after}",
                    slot_name(slot)
                );
            }
            SimEvent::PatientReacted { phrase, .. } => println!("  {phrase}"),
            SimEvent::SlotSkipped { slot, .. } => println!("  {} is already spotless.", slot_name(slot)),
            SimEvent::ResourceExhausted { needed, available, .. } => {
                println!("  That needs {needed} fluoride and only {available} is left. The appointment is over.");
            }
            SimEvent::RoundCompleted { turn, score } => println!("Round {turn} complete. Score: {score}"),
            SimEvent::SubjectHealed { .. } => println!("Every fang gleams!"),
        }
    }
}

fn print_summary(engine: &TurnEngine) {
    let state = engine.state();
    println!();
    println!("=== APPOINTMENT SUMMARY ===");
    println!("  run_id:    {}", engine.run_id);
    println!("  player:    {}", engine.player_name());
    println!("  outcome:   {:?}", engine.phase());
    println!("  turns:     {}", state.turns);
    println!("  score:     {}", state.score);
    println!("  fluoride:  {}", state.fluoride);
}

fn prompt_line(input: &mut impl BufRead, prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("input closed mid-game");
    }
    Ok(line.trim().to_string())
}

fn prompt_number(input: &mut impl BufRead, prompt: &str) -> Result<i32> {
    loop {
        let line = prompt_line(input, prompt)?;
        match line.parse() {
            Ok(value) => return Ok(value),
            Err(_) => println!("  Please enter a whole number."),
        }
    }
}

/// Plain-text view: a status block, one line per fang, optional ASCII art.
struct PlainRenderer<W: Write> {
    out: W,
}

impl<W: Write> PlainRenderer<W> {
    fn new(out: W) -> Self {
        Self { out }
    }

    fn paint(&self, color_mode: bool, color: FangColor, text: &str) -> String {
        if !color_mode {
            return text.to_string();
        }
        let code = match color {
            FangColor::White => "97",
            FangColor::Dull => "37",
            FangColor::Yellow => "33",
        };
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn draw_art(&mut self, state: &SimulationState, subject: &Subject) -> io::Result<()> {
        let tallest = subject.slots.iter().map(|s| s.length()).max().unwrap_or(0);
        for row in 0..tallest {
            let mut line = String::from("   ");
            for slot in &subject.slots {
                let cell = if row < slot.length() {
                    let marker = slot.marker();
                    format!("|{marker}{marker}|")
                } else {
                    "    ".to_string()
                };
                line.push_str(&self.paint(state.color_mode, slot.color(), &cell));
                line.push_str("   ");
            }
            writeln!(self.out, "{line}")?;
        }
        let mut tips = String::from("   ");
        for slot in &subject.slots {
            let tip = if slot.sharpness() > 6 { " \\/ " } else { " \\_/" };
            tips.push_str(&self.paint(state.color_mode, slot.color(), tip));
            tips.push_str("   ");
        }
        writeln!(self.out, "{tips}")
    }
}

impl<W: Write> Renderer for PlainRenderer<W> {
    fn render(&mut self, state: &SimulationState, subject: &Subject, catalog: &Catalog) -> io::Result<()> {
        let tool = catalog
            .tool(state.tool_idx as usize)
            .map(|t| t.name.as_str())
            .unwrap_or("unknown tool");
        writeln!(self.out)?;
        writeln!(
            self.out,
            "Turn {} | Score {} | Fluoride {} | {}",
            state.turns, state.score, state.fluoride, tool
        )?;
        writeln!(
            self.out,
            "{} the {}, age {} | mood {:?} | patience {} ({:?})",
            if subject.name.is_empty() { "Unnamed" } else { subject.name.as_str() },
            subject.species.label(),
            subject.age,
            subject.mood,
            subject.patience,
            subject.patience_level
        )?;
        if state.render_mode {
            self.draw_art(state, subject)?;
        }
        for (i, slot) in subject.slots.iter().enumerate() {
            let label = self.paint(state.color_mode, slot.color(), &format!("{:<6}", slot.color().label()));
            writeln!(
                self.out,
                "  [{}] {:<24} health {:>3}  {label}",
                i + 1,
                slot_name(i),
                slot.health(),
            )?;
        }
        self.out.flush()
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn clock_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
