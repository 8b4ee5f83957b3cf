//! portaprog - Command channel server for a portable AVR programmer
//!
//! Clients connect over TCP and send whitespace separated commands; file
//! commands act on a host directory standing in for the device's flash file
//! system, and `UPLOAD` turns the rest of the connection into file content.
//!
//! The same command engine can be driven locally:
//!
//! ```bash
//! portaprog --exec 'dir'
//! portaprog --exec 'upload hello.txt\nhello world'
//! portaprog --run setup.cmd
//! ```

mod cli;
mod config;

use std::io::Write;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use cli::Cli;
use config::Config;
use portaprog_core::commands::HelpContext;
use portaprog_core::console::Console;
use portaprog_core::dispatch::Dispatcher;
use portaprog_core::registry::Registry;
use portaprog_core::store::FileStore;
use portaprog_fs::DirFs;
use portaprog_net::Server;

static REGISTRY: Registry = Registry::standard();

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(root) = &cli.root {
        config.storage.root = root.clone();
    }

    let store = DirFs::open(&config.storage.root)?;
    log::info!("file store at {}", store.root().display());

    let mut programmer = config.programmer();
    programmer.init()?;
    if let Some(kind) = programmer.kind() {
        log::info!("programmer: {}", kind);
    }

    let mut dispatcher = Dispatcher::new(&REGISTRY, store)
        .with_programmer(programmer)
        .with_hidden_files(config.storage.show_hidden)
        .with_help(HelpContext {
            address: config.server.bind.clone(),
            port: config.server.port,
        });

    if !cli.exec.is_empty() || cli.run.is_some() {
        let ok = run_local(&mut dispatcher, &config, &cli)?;
        if !ok {
            std::process::exit(1);
        }
        return Ok(());
    }

    let server = Server::bind(config.server_config())?;
    dispatcher.set_help(HelpContext {
        address: config.server.bind.clone(),
        port: server.local_addr()?.port(),
    });
    let cancel = AtomicBool::new(false);
    server.serve(&mut dispatcher, &cancel)?;
    Ok(())
}

/// Run `--exec` lines or a `--run` file through the local console
///
/// Returns whether everything succeeded. After a failed `--exec` line the
/// following ones run aborted, like the lines of a command file.
fn run_local<F: FileStore>(
    dispatcher: &mut Dispatcher<'_, F>,
    config: &Config,
    cli: &Cli,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut console = Console::new(config.console.input_buffer, config.console.echo_buffer);
    let mut stdout = std::io::stdout().lock();

    if let Some(name) = &cli.run {
        let ok = console.run_file(dispatcher, name)?;
        stdout.write_all(&console.take_echo())?;
        return Ok(ok);
    }

    let mut aborted = false;
    for line in &cli.exec {
        console.feed_escaped(line.as_bytes());
        console.feed(b"\n");
        let outcome = console.run_pending(dispatcher, aborted);
        stdout.write_all(&console.take_echo())?;
        if console.pending() > 0 {
            log::warn!("{} input bytes left unprocessed", console.pending());
            console.clear();
        }
        aborted = !outcome.ok();
    }
    stdout.flush()?;
    Ok(!aborted)
}
