use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tao::event::Event;
use tao::event_loop::{ControlFlow, EventLoop};
use tokio::{signal, sync::mpsc::unbounded_channel};
use tracing::{debug, error, info, trace};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use channel_keys::{ChannelHotkeyRouter, JsonFileStorage, KeybindingStore, derive_identifier};
use hotkey_manager::{
    DetectorThread, DeviceQueryKeyState, GlobalHotkeyBackend, HotkeyRegistry, Job, Key,
    NotificationListener, ReleaseDetector,
};

mod config;

use config::Config;

/// How often the event loop drains callbacks and channel events
const LOOP_TICK: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Parser, Debug)]
#[command(name = "ptt-cli")]
#[command(about = "Per-channel push-to-talk hotkeys", long_about = None)]
struct Args {
    /// JSON keybinding document (overrides the config file's `store`)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Set the log level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the keybinding identifier for a codeplug file
    Id {
        /// Codeplug file
        codeplug: Option<PathBuf>,
    },
    /// List the stored keybindings of a codeplug
    Show {
        /// Codeplug file
        codeplug: Option<PathBuf>,
    },
    /// Set or clear a channel's keybindings. An empty value clears.
    Set {
        /// Channel name
        channel: String,
        /// Codeplug file
        #[arg(long)]
        codeplug: Option<PathBuf>,
        /// PTT keybinding, e.g. "Ctrl+F1"
        #[arg(long)]
        ptt: Option<String>,
        /// Toggle keybinding, e.g. "Alt+1"
        #[arg(long)]
        toggle: Option<String>,
    },
    /// Bind the channels of a RON config and print channel events
    Run {
        /// Path to RON config file
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Only initialize tracing if RUST_LOG is set or log level is explicitly provided
    if std::env::var("RUST_LOG").is_ok() || args.log_level.is_some() {
        let log_level = match args.log_level.clone().unwrap_or(LogLevel::Info) {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .without_time()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .with(
                EnvFilter::from_default_env()
                    .add_directive(format!("hotkey_manager={log_level}").parse()?)
                    .add_directive(format!("channel_keys={log_level}").parse()?)
                    .add_directive(format!("ptt_cli={log_level}").parse()?),
            )
            .init();
    }

    let store = args.store;
    match args.command {
        Command::Id { codeplug } => {
            println!("{}", derive_identifier(codeplug.as_deref()));
            Ok(())
        }
        Command::Show { codeplug } => show(&store_path(store), codeplug.as_deref()),
        Command::Set {
            channel,
            codeplug,
            ptt,
            toggle,
        } => set(
            &store_path(store),
            codeplug.as_deref(),
            &channel,
            ptt.as_deref(),
            toggle.as_deref(),
        ),
        Command::Run { config } => run(&config, store),
    }
}

fn store_path(store: Option<PathBuf>) -> PathBuf {
    store.unwrap_or_else(|| PathBuf::from("keybindings.json"))
}

fn open_store(path: &Path) -> Result<KeybindingStore> {
    KeybindingStore::load(JsonFileStorage::new(path))
        .with_context(|| format!("Failed to load keybindings from {}", path.display()))
}

fn show(store_path: &Path, codeplug: Option<&Path>) -> Result<()> {
    let store = open_store(store_path)?;
    let id = derive_identifier(codeplug);
    println!("{id}");

    let Some(profile) = store.profile(&id) else {
        println!("  (no keybindings)");
        return Ok(());
    };
    let channels: BTreeSet<&String> = profile
        .ptt_keybindings
        .keys()
        .chain(profile.toggle_keybindings.keys())
        .collect();
    for channel in channels {
        let ptt = profile.ptt_keybindings.get(channel).map_or("-", String::as_str);
        let toggle = profile
            .toggle_keybindings
            .get(channel)
            .map_or("-", String::as_str);
        println!("  {channel}: ptt {ptt}, toggle {toggle}");
    }
    Ok(())
}

fn set(
    store_path: &Path,
    codeplug: Option<&Path>,
    channel: &str,
    ptt: Option<&str>,
    toggle: Option<&str>,
) -> Result<()> {
    if ptt.is_none() && toggle.is_none() {
        anyhow::bail!("Nothing to set; pass --ptt and/or --toggle");
    }
    // Validate both before writing either
    for value in [ptt, toggle].into_iter().flatten() {
        if !value.trim().is_empty() {
            Key::parse(value).with_context(|| format!("Invalid keybinding {value:?}"))?;
        }
    }

    let mut store = open_store(store_path)?;
    let id = derive_identifier(codeplug);
    if let Some(value) = ptt {
        store.set_ptt_keybinding(&id, channel, value)?;
    }
    if let Some(value) = toggle {
        store.set_toggle_keybinding(&id, channel, value)?;
    }
    info!(codeplug = %id, channel, "keybindings saved");
    Ok(())
}

/// Everything torn down when the event loop exits
struct Session {
    router: ChannelHotkeyRouter,
    detector: DetectorThread,
    listener: NotificationListener,
}

impl Session {
    fn close(mut self) {
        self.listener.stop();
        self.detector.stop();
        self.router.shutdown();
    }
}

fn run(config_path: &Path, store_override: Option<PathBuf>) -> Result<()> {
    info!("Loading config from: {}", config_path.display());
    let text = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
    let config = Config::from_ron(&text)
        .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

    let store = open_store(&store_override.unwrap_or_else(|| config.store.clone()))?;

    // Without key state polling a PTT hotkey could never release
    let keyboard = DeviceQueryKeyState::new()
        .context("Cannot read keyboard state (needs X11, or Input Monitoring on macOS)")?;

    // Create the tao event loop (must be on main thread for macOS)
    let event_loop = EventLoop::new();

    let backend = GlobalHotkeyBackend::new().context("Failed to create hotkey manager")?;
    let routes = backend.routes();

    // Callbacks run on this thread, drained from the event loop
    let (job_tx, mut job_rx) = unbounded_channel::<Job>();
    let registry = HotkeyRegistry::new(Box::new(backend), Arc::new(job_tx));

    let listener = routes.listen(registry.handle());
    let detector = ReleaseDetector::new(registry.handle(), Arc::new(keyboard))
        .spawn(config.detector());

    let (event_tx, mut event_rx) = unbounded_channel();
    let mut router = ChannelHotkeyRouter::new(registry, store, event_tx);
    let identifier = config.identifier();
    let bound = router.initialize(&identifier, &config.codeplug.channels);
    println!(
        "Codeplug {identifier}: {bound} hotkeys for {} channels. Ctrl+C to exit.",
        router.channels().len()
    );

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let shutdown_requested_clone = shutdown_requested.clone();
    thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to create tokio runtime: {}", e);
                return;
            }
        };
        runtime.block_on(async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down..."),
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
        });
        shutdown_requested_clone.store(true, Ordering::SeqCst);
    });

    let mut session = Some(Session {
        router,
        detector,
        listener,
    });

    info!("Starting tao event loop...");
    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::WaitUntil(Instant::now() + LOOP_TICK);

        let mut drain = || {
            while let Ok(job) = job_rx.try_recv() {
                job();
            }
            while let Ok(event) = event_rx.try_recv() {
                println!("{event}");
            }
        };
        drain();

        if shutdown_requested.load(Ordering::SeqCst) {
            if let Some(session) = session.take() {
                session.close();
                // Releases of hotkeys held at shutdown
                drain();
            }
            *control_flow = ControlFlow::Exit;
            return;
        }

        match event {
            Event::NewEvents(_) | Event::MainEventsCleared | Event::RedrawEventsCleared => {}
            Event::LoopDestroyed => {
                debug!("Event loop destroyed");
            }
            _ => {
                trace!("Event loop received: {:?}", event);
            }
        }
    });
}
