//! Line-oriented player for AI-narrated sessions.
//!
//! ```bash
//! cargo run -p narrator -- --name "Mira" --premise "a city inside a sleeping volcano"
//! cargo run -p narrator -- --list
//! cargo run -p narrator -- --load 6f1c2d9e-...
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`.

mod play;

use anyhow::{bail, Context, Result};
use narrator_core::headless::{HeadlessConfig, HeadlessGame};
use narrator_core::{SessionConfig, SlotId, SpecialAbility, Stat, Stats, WorldInfo};

/// What the command line asked for.
#[derive(Debug)]
enum Command {
    New(HeadlessConfig),
    Load(HeadlessConfig, SlotId),
    List(HeadlessConfig),
    Help,
}

#[derive(Debug, Default)]
pub struct PlayOptions {
    pub auto_roll: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (command, options) = parse_args(&args)?;

    match command {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::List(config) => {
            let slots = HeadlessGame::list_saves(&config).await?;
            play::print_slots(&slots);
            Ok(())
        }
        Command::New(config) => {
            require_api_key()?;
            println!("Preparing the world...");
            let game = HeadlessGame::new(config.clone())
                .await
                .context("failed to start a new game")?;
            play::run(game, config, options).await
        }
        Command::Load(config, slot_id) => {
            require_api_key()?;
            let game = HeadlessGame::load(config.clone(), slot_id)
                .await
                .with_context(|| format!("failed to load save {slot_id}"))?;
            play::run(game, config, options).await
        }
    }
}

fn require_api_key() -> Result<()> {
    if std::env::var("ANTHROPIC_API_KEY").is_err() {
        bail!(
            "ANTHROPIC_API_KEY environment variable not set. \
             Set it in a .env file or with: export ANTHROPIC_API_KEY=your_key_here"
        );
    }
    Ok(())
}

/// Parse command line arguments into a command.
fn parse_args(args: &[String]) -> Result<(Command, PlayOptions)> {
    let mut config = HeadlessConfig::quick_start("Wanderer");
    let mut session = SessionConfig::new(whoami());
    let mut options = PlayOptions::default();
    let mut load = None;
    let mut list = false;
    let mut world_name = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || {
            args.get(i + 1)
                .cloned()
                .with_context(|| format!("{flag} needs a value"))
        };

        match flag {
            "--help" | "-h" => return Ok((Command::Help, options)),
            "--list" => list = true,
            "--auto-roll" => options.auto_roll = true,
            "--name" => {
                config.name = value()?;
                i += 1;
            }
            "--gender" => {
                config.gender = value()?;
                i += 1;
            }
            "--premise" => {
                config.premise = value()?;
                i += 1;
            }
            "--world" => {
                world_name = Some(value()?);
                i += 1;
            }
            "--stats" => {
                config.stats = parse_stats(&value()?)?;
                i += 1;
            }
            "--ability" => {
                config.special_ability = parse_ability(&value()?)?;
                i += 1;
            }
            "--player" => {
                session.player_id = value()?;
                i += 1;
            }
            "--slot" => {
                let slot = value()?;
                session.slot_number = slot
                    .parse()
                    .with_context(|| format!("invalid slot number '{slot}'"))?;
                i += 1;
            }
            "--save-dir" => {
                config.save_dir = value()?.into();
                i += 1;
            }
            "--load" => {
                let id = value()?;
                load = Some(
                    id.parse::<SlotId>()
                        .with_context(|| format!("invalid save id '{id}'"))?,
                );
                i += 1;
            }
            other => bail!("unknown argument '{other}' (try --help)"),
        }
        i += 1;
    }

    // A named world skips generation and uses the premise as its setting.
    if let Some(name) = world_name {
        config.world = Some(
            WorldInfo::new(name, config.premise.clone()).with_premise(config.premise.clone()),
        );
    }
    config.session = session;

    let command = match (list, load) {
        (true, _) => Command::List(config),
        (false, Some(slot_id)) => Command::Load(config, slot_id),
        (false, None) => Command::New(config),
    };
    Ok((command, options))
}

/// `STR,DEX,INT,CHA,WIL`, e.g. `2,1,0,3,1`.
fn parse_stats(s: &str) -> Result<Stats> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid stats '{s}'"))?;

    let [strength, dexterity, intelligence, charisma, willpower] = values[..] else {
        bail!("expected five stats (STR,DEX,INT,CHA,WIL), got '{s}'");
    };
    Ok(Stats::new(strength, dexterity, intelligence, charisma, willpower))
}

/// `NAME:STAT`, e.g. `Silver Tongue:CHA`.
fn parse_ability(s: &str) -> Result<SpecialAbility> {
    let (name, stat) = s
        .rsplit_once(':')
        .with_context(|| format!("expected NAME:STAT, got '{s}'"))?;
    let stat: Stat = stat.parse()?;
    Ok(SpecialAbility::new(name.trim(), stat, ""))
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_string())
}

fn print_help() {
    println!("narrator - play an AI-narrated adventure in the terminal");
    println!();
    println!("USAGE:");
    println!("  narrator [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  --name <NAME>          Character name");
    println!("  --gender <GENDER>      Character gender, passed to the narrator");
    println!("  --stats <S,D,I,C,W>    Stat values (default 2,1,1,1,1)");
    println!("  --ability <NAME:STAT>  Special ability and the stat it boosts");
    println!("  --premise <TEXT>       Premise used to generate the world");
    println!("  --world <NAME>         Skip world generation; use the premise as setting");
    println!("  --player <ID>          Owner of the save slots (default $USER)");
    println!("  --slot <N>             Slot number for new saves (default 1)");
    println!("  --save-dir <DIR>       Where saves are kept (default ./saves)");
    println!("  --load <SAVE-ID>       Resume a saved game");
    println!("  --list                 List saved games and exit");
    println!("  --auto-roll            Roll dice without waiting for Enter");
    println!("  -h, --help             Show this help");
    println!();
    println!("Requires ANTHROPIC_API_KEY (a .env file is read if present).");
}
