//! Process entry point: `-mode console|sp|zero_server`, `-gen <file>`,
//! `-conf_file <file>`, `-conf_str "k1=v1:k2=v2"`. Exit code `0` on clean
//! termination, `-1` on argument or configuration errors.

use clap::{App, Arg};
use std::fs;
use std::process;
use zero_core::config::CoreConfig;
use zero_server::ZeroServer;

fn main() {
    flexi_logger::Logger::with_env().start().unwrap();

    let args = App::new("zero")
        .arg(
            Arg::with_name("mode")
                .long("mode")
                .takes_value(true)
                .possible_values(&["console", "sp", "zero_server"]),
        )
        .arg(Arg::with_name("gen").long("gen").takes_value(true))
        .arg(Arg::with_name("conf_file").long("conf_file").takes_value(true))
        .arg(Arg::with_name("conf_str").long("conf_str").takes_value(true))
        .arg(Arg::with_name("checkpoint").long("checkpoint").takes_value(true))
        .get_matches();

    if let Some(path) = args.value_of("gen") {
        if let Err(e) = fs::write(path, CoreConfig::default().to_kv_string()) {
            eprintln!("failed to write default configuration to {}: {}", path, e);
            process::exit(-1);
        }
        log::info!("wrote default configuration to {}", path);
        return;
    }

    let mut config = CoreConfig::default();
    if let Some(path) = args.value_of("conf_file") {
        if let Err(e) = config.apply_conf_file(std::path::Path::new(path)) {
            eprintln!("configuration error: {}", e);
            process::exit(-1);
        }
    }
    if let Some(conf_str) = args.value_of("conf_str") {
        if let Err(e) = config.apply_conf_str(conf_str) {
            eprintln!("configuration error: {}", e);
            process::exit(-1);
        }
    }

    let mode = match args.value_of("mode") {
        Some(mode) => mode,
        None => {
            eprintln!("-mode console|sp|zero_server is required");
            process::exit(-1);
        }
    };

    let result = match mode {
        "console" => run_console(),
        "sp" => run_self_play(),
        "zero_server" => run_zero_server(config, args.value_of("checkpoint").unwrap_or("")),
        _ => unreachable!("clap restricts -mode to a known set of values"),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(-1);
    }
}

/// Interactive console mode isn't a build target of this workspace: the
/// flag exists because the CLI surface documents it, not because it has
/// meaningful interactive behavior here.
fn run_console() -> anyhow::Result<()> {
    log::info!("console mode: no interactive console is implemented by this build");
    Ok(())
}

/// Running an actual self-play worker needs a concrete `Environment` and
/// `AlphaZeroEvaluator`/`MuZeroEvaluator` wired in at compile time, since
/// `zero_scheduler::ActorGroupScheduler<E>` is generic over the game.
/// Game rules and the network forward pass are both out of scope here;
/// a game-specific binary links `zero-core`/`zero-scheduler` directly and
/// plugs in its own `Environment`/evaluator to get a working `sp` worker.
fn run_self_play() -> anyhow::Result<()> {
    log::warn!("sp mode: no Environment/network is linked into this binary, nothing to run");
    Ok(())
}

fn run_zero_server(config: CoreConfig, checkpoint_filename: &str) -> anyhow::Result<()> {
    let server = ZeroServer::new(config, checkpoint_filename)?;
    let mut runtime = tokio::runtime::Builder::new()
        .threaded_scheduler()
        .enable_all()
        .build()?;
    runtime.block_on(server.run())?;
    Ok(())
}
