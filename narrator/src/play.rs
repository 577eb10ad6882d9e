//! The interactive line loop.
//!
//! This provides a simple line-oriented protocol:
//! - Lines starting with `#` are commands (save, status, slots, abandon, quit)
//! - An empty line rolls a pending dice check
//! - Anything else is sent as the player's action
//!
//! Output lines are tagged (`[NARRATOR]`, `[ROLL]`, `[STATUS]`, ...) so
//! scripts can follow along.

use anyhow::Result;
use narrator_core::headless::{HeadlessConfig, HeadlessGame};
use narrator_core::persist::SlotMetadata;
use narrator_core::session::{Notice, RollRequest, TurnProgress, TurnReport};
use narrator_core::{Effect, SessionError};
use std::io::{self, BufRead, Write};

use crate::PlayOptions;

/// Run the game until the player quits, the input ends or the story ends.
pub async fn run(mut game: HeadlessGame, config: HeadlessConfig, options: PlayOptions) -> Result<()> {
    print_banner(&game);

    for entry in game.transcript() {
        print_narrative(&entry.narrative);
    }

    if let Some(request) = game.session().pending_roll() {
        println!("[RESUMED] A roll was pending when this game was saved.");
        print_roll_request(&request);
        if options.auto_roll {
            roll(&mut game).await;
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    prompt(&game, &mut stdout);

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };
        let line = line.trim();

        if let Some(command) = line.strip_prefix('#') {
            if handle_command(command, &mut game, &config).await {
                break;
            }
        } else if game.session().pending_roll().is_some() {
            if line.is_empty() {
                roll(&mut game).await;
            } else {
                println!("[ROLL] Press Enter to roll first.");
            }
        } else if game.is_ended() {
            println!("[ENDED] The story is over. Type #quit to leave.");
        } else if !line.is_empty() {
            act(&mut game, line, options.auto_roll).await;
        }

        prompt(&game, &mut stdout);
    }

    Ok(())
}

/// Handle a `#command`. Returns true when the loop should stop.
async fn handle_command(command: &str, game: &mut HeadlessGame, config: &HeadlessConfig) -> bool {
    let parts: Vec<&str> = command.split_whitespace().collect();
    match parts.first().copied() {
        Some("quit") | Some("exit") => {
            println!("Goodbye!");
            return true;
        }
        Some("save") => match game.save().await {
            Ok(slot_id) => println!("[SAVED] Save id {slot_id}"),
            Err(e) => println!("[ERROR] Save failed: {e}"),
        },
        Some("status") => print_status(game),
        Some("slots") => match HeadlessGame::list_saves(config).await {
            Ok(slots) => print_slots(&slots),
            Err(e) => println!("[ERROR] Could not list saves: {e}"),
        },
        Some("abandon") => match game.abandon().await {
            Ok(notices) => {
                println!("[ENDED] You walk away from the story.");
                print_notices(&notices);
            }
            Err(e) => println!("[ERROR] {e}"),
        },
        Some("help") => print_help(),
        _ => println!("[ERROR] Unknown command. Type #help for help."),
    }
    false
}

async fn act(game: &mut HeadlessGame, action: &str, auto_roll: bool) {
    if auto_roll {
        match game.send(action).await {
            Ok(response) => {
                print_narrative(&response.narrative);
                if let Some(dice) = response.dice {
                    println!("[DICE] {dice}");
                }
                print_effects(&response.effects);
                print_notices(&response.notices);
                if let Some(outcome) = response.ended {
                    println!("[ENDED] {outcome}");
                }
            }
            Err(e) => print_error(&e),
        }
        return;
    }

    match game.session_mut().player_action(action).await {
        Ok(TurnProgress::Complete(report)) => print_report(&report),
        Ok(TurnProgress::AwaitingRoll(request)) => {
            print_narrative(&request.narrative);
            print_effects(&request.effects);
            print_roll_request(&request);
        }
        Err(e) => print_error(&e),
    }
}

async fn roll(game: &mut HeadlessGame) {
    match game.roll_pending().await {
        Ok(Some(response)) => {
            if let Some(dice) = response.dice {
                println!("[DICE] {dice}");
            }
            print_narrative(&response.narrative);
            print_effects(&response.effects);
            print_notices(&response.notices);
            if let Some(outcome) = response.ended {
                println!("[ENDED] {outcome}");
            }
        }
        Ok(None) => println!("[ROLL] Nothing to roll."),
        Err(e) => print_error(&e),
    }
}

fn print_report(report: &TurnReport) {
    print_narrative(&report.narrative);
    print_effects(&report.effects);
    print_notices(&report.notices);
    if let Some(outcome) = report.ended {
        println!("[ENDED] {outcome}");
    }
}

fn print_narrative(narrative: &str) {
    println!("[NARRATOR]");
    for para in narrative.split("\n\n") {
        println!("{para}");
    }
    println!();
}

fn print_roll_request(request: &RollRequest) {
    let special = if request.special_ability_active {
        " (special ability)"
    } else {
        ""
    };
    println!(
        "[ROLL] {} check: {} {:+}{special} vs DC {}, {} stakes. Press Enter to roll.",
        request.kind, request.stat, request.bonus, request.difficulty, request.severity
    );
}

fn print_effects(effects: &[Effect]) {
    for effect in effects {
        let line = match effect {
            Effect::Damage { amount, hp } => format!("-{amount} HP (now {hp})"),
            Effect::Healing { amount, hp } => format!("+{amount} HP (now {hp})"),
            Effect::XpGained { amount, xp } => format!("{amount:+} XP (now {xp})"),
            Effect::LevelUp { level, max_hp } => format!("Level up! Level {level}, max HP {max_hp}"),
            Effect::ItemGained { item } => format!("Gained: {item}"),
            Effect::ItemLost { item } => format!("Lost: {item}"),
            Effect::NpcMet { name } => format!("Met {name}"),
            Effect::RelationshipChanged {
                name,
                change,
                relationship,
            } => format!("{name} {change:+} (relationship {relationship})"),
        };
        println!("[EFFECT] {line}");
    }
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        match notice {
            Notice::NarrationFallback(reason) => {
                println!("[WARN] The narrator stumbled ({reason}); the result still stands.")
            }
            Notice::Saved(slot_id) => println!("[SAVED] Save id {slot_id}"),
            Notice::SaveFailed(reason) => println!("[WARN] Autosave failed: {reason}"),
        }
    }
}

fn print_error(e: &SessionError) {
    match e {
        SessionError::Generator(_) => {
            println!("[ERROR] The narrator could not respond: {e}. Nothing happened; try again.")
        }
        _ => println!("[ERROR] {e}"),
    }
}

fn print_banner(game: &HeadlessGame) {
    let world = &game.state().world;
    println!("=== {} ===", world.world_name);
    if !world.setting.is_empty() {
        println!("{}", world.setting);
    }
    print_status(game);
    println!();
    println!("Type your actions, one per line. #help lists commands.");
    println!();
}

fn print_status(game: &HeadlessGame) {
    let pc = game.character();
    println!("[STATUS]");
    println!("  {} - level {}, HP {}/{}, XP {}/{}", pc.name, pc.level, pc.hp, pc.max_hp, pc.xp, pc.xp_to_next);
    let stats: Vec<String> = narrator_core::Stat::ALL
        .iter()
        .map(|stat| format!("{stat} {}", pc.stat_value(*stat)))
        .collect();
    println!("  {}", stats.join("  "));
    if !pc.special_ability.name.is_empty() {
        println!("  Ability: {} ({})", pc.special_ability.name, pc.special_ability.stat);
    }

    let state = game.state();
    if !state.inventory.is_empty() {
        println!("  Inventory: {}", state.inventory.items().join(", "));
    }
    for npc in state.npcs.iter() {
        println!("  {} ({}) relationship {}", npc.name, npc.role, npc.relationship);
    }
    println!("  Turn {}, status {}", state.turn_count, state.status);
}

pub fn print_slots(slots: &[SlotMetadata]) {
    if slots.is_empty() {
        println!("No saved games.");
        return;
    }
    for slot in slots {
        println!(
            "#{} {} - {} (level {}) in {}, turn {}, {} [{}]",
            slot.slot_number,
            slot.updated_at.format("%Y-%m-%d %H:%M"),
            slot.character_name,
            slot.level,
            slot.world_name,
            slot.turn_count,
            slot.status,
            slot.slot_id
        );
    }
}

fn print_help() {
    println!("[HELP]");
    println!("  #quit     - Exit the game");
    println!("  #save     - Save the game");
    println!("  #status   - Show the character and what they carry");
    println!("  #slots    - List saved games");
    println!("  #abandon  - Give up on this story");
    println!("  #help     - Show this help");
    println!("  (empty line rolls a pending check; anything else is your action)");
}

fn prompt(game: &HeadlessGame, stdout: &mut io::Stdout) {
    if !game.is_ended() {
        print!("> ");
    }
    stdout.flush().ok();
}
