//! A scripted playthrough of the simulation core.
//!
//! Builds the starter flat, runs a handful of player turns (including a
//! barricade and a collapse that hands the adversary a turn), and prints
//! the structured narration records a presentation layer would render.
//!
//! ```sh
//! cargo run -p fugue-engine --example breakin
//! ```

use anyhow::Result;

use fugue_engine::prelude::*;
use fugue_world::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // -- world setup --------------------------------------------------------

    let mut graph = WorldGraph::new();
    let flat = graph.spawn(EntityProto::container("flat", None), None)?;
    let main = graph.spawn(EntityProto::location("main"), Some(flat))?;
    let bedroom = graph.spawn(EntityProto::location("bedroom"), Some(flat))?;
    let _closet = graph.spawn(EntityProto::location("closet"), Some(flat))?;
    let toolbox = graph.spawn(EntityProto::openable("toolbox", Some(80)), Some(main))?;
    let fridge = graph.spawn(EntityProto::openable("fridge", Some(60)), Some(main))?;
    let me = graph.spawn(EntityProto::actor("me", Some(100)), Some(main))?;

    let hammer = graph.spawn(EntityProto::item("hammer", 15), Some(toolbox))?;
    graph.spawn(EntityProto::item("nails", 5), Some(toolbox))?;
    graph.spawn(EntityProto::item("plank", 20), Some(main))?;
    let leftovers = graph.spawn(EntityProto::item("leftovers", 2), Some(fridge))?;

    let mut session = Session::new(graph, me, bedroom, toolbox, SessionConfig::default())?;
    session.install_stipend(25, GameDuration::days(14))?;

    // -- a few player turns -------------------------------------------------

    let turns: Vec<Command> = vec![
        Command::macro_of(
            "raid the toolbox",
            vec![Command::open(toolbox), Command::take(hammer)],
        ),
        Command::open(fridge),
        Command::eat(leftovers, 10),
        Command::barricade(bedroom),
        // Long enough to collapse; the adversary gets one turn.
        Command::ponder(6),
    ];

    for command in turns {
        let label = command.label().to_owned();
        match session.perform(command) {
            Ok(result) if result.success => println!("> {label}"),
            Ok(result) => println!("> {label} -- refused: {}", result.message),
            Err(err) => {
                println!("> {label} -- session: {err}");
                break;
            }
        }
        for record in session.drain_narration() {
            println!("    {record:?}");
        }
    }

    // One undo, to show the history working.
    match session.undo() {
        Ok(label) => println!("> undo -- reversed `{label}`"),
        Err(err) => println!("> undo -- {err}"),
    }
    for record in session.drain_narration() {
        println!("    {record:?}");
    }

    println!(
        "clock {} | vitality {} | balance {} | adversary phase {} | terminal: {}",
        session.now(),
        session.ledger().vitality(),
        session.ledger().balance(),
        session.alter_ego().phase(),
        session.is_terminal(),
    );
    Ok(())
}
