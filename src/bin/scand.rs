//! scand - barcode scan session host
//!
//! Drives a `ScanController` against the synthetic camera:
//! 1. Loads layered configuration (file, env overrides)
//! 2. Registers and warms up decoder backends
//! 3. Runs scan sessions on demand (interactive) or exactly once (`--once`)
//! 4. Keeps the list of scanned values for the lifetime of the process

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use scan_session::config::ScanConfig;
use scan_session::{
    BackendRegistry, CameraPermission, ChannelSink, ControllerError, DecodeWorker, Decoder,
    FrameSource, LoggingSink, ScanController, ScanLog, SessionEvent, SessionState, StubBackend,
    SyntheticCamera,
};

#[path = "../ui.rs"]
mod ui;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension). Overrides SCAN_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Run a single session and exit with its outcome.
    #[arg(long)]
    once: bool,
    /// Stop a session that has not scanned anything after this many seconds.
    #[arg(long = "timeout", default_value_t = 30, value_name = "SECS")]
    timeout_s: u64,
    /// Camera permission reported by the host.
    #[arg(long, value_enum, default_value_t = PermissionArg::Granted)]
    permission: PermissionArg,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PermissionArg {
    Granted,
    Denied,
}

impl From<PermissionArg> for CameraPermission {
    fn from(arg: PermissionArg) -> Self {
        match arg {
            PermissionArg::Granted => CameraPermission::Granted,
            PermissionArg::Denied => CameraPermission::Denied,
        }
    }
}

enum Input {
    Line(String),
    Eof,
    Interrupt,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        match &args.config {
            Some(path) => ScanConfig::load_from(path)?,
            None => ScanConfig::load()?,
        }
    };
    log::info!(
        "camera {} ({}x{} @ {} fps, rotation {}), decoder {}",
        cfg.camera.url,
        cfg.camera.width,
        cfg.camera.height,
        cfg.camera.target_fps,
        cfg.camera.rotation_degrees,
        cfg.decoder.backend
    );

    let registry = {
        let _stage = ui.stage("Warm up decoder");
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());
        registry.set_default(&cfg.decoder.backend)?;
        registry.warm_up_all()?;
        registry
    };

    let (input_tx, input_rx) = mpsc::channel::<Input>();
    let interrupt_tx = input_tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(Input::Interrupt);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let scan_log = ScanLog::new();
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>();
    let controller = ScanController::new((
        scan_log.clone(),
        (LoggingSink, ChannelSink::new(event_tx)),
    ))?;

    let mut host = Host {
        args: &args,
        cfg: &cfg,
        registry: &registry,
        ui: &ui,
        controller,
        scan_log,
        events: event_rx,
        indicator: None,
        started: None,
    };

    if args.once {
        return host.run_once(&input_rx);
    }

    spawn_stdin_reader(input_tx)?;
    host.run_interactive(&input_rx)
}

fn spawn_stdin_reader(tx: Sender<Input>) -> Result<()> {
    thread::Builder::new()
        .name("scand-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(Input::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        log::warn!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
            let _ = tx.send(Input::Eof);
        })?;
    Ok(())
}

struct Host<'a> {
    args: &'a Args,
    cfg: &'a ScanConfig,
    registry: &'a BackendRegistry,
    ui: &'a ui::Ui,
    controller: ScanController,
    scan_log: ScanLog,
    events: Receiver<SessionEvent>,
    indicator: Option<ui::ScanIndicator>,
    started: Option<Instant>,
}

impl Host<'_> {
    fn run_once(&mut self, input: &Receiver<Input>) -> Result<()> {
        self.start_session()?;
        loop {
            match input.recv_timeout(POLL_INTERVAL) {
                Ok(Input::Interrupt) => {
                    log::info!("interrupt received, cancelling scan");
                    self.stop_session();
                }
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if let Some(outcome) = self.pump()? {
                return outcome;
            }
        }
        Err(anyhow!("input channel closed"))
    }

    fn run_interactive(&mut self, input: &Receiver<Input>) -> Result<()> {
        print_help();
        loop {
            match input.recv_timeout(POLL_INTERVAL) {
                Ok(Input::Line(line)) => {
                    if !self.command(line.trim())? {
                        break;
                    }
                }
                Ok(Input::Eof) => {
                    log::info!("stdin closed, exiting");
                    break;
                }
                Ok(Input::Interrupt) => {
                    log::info!("interrupt received, exiting");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            // Session outcomes are already logged; nothing else to do with them here.
            let _ = self.pump()?;
        }

        if self.controller.state().is_active() {
            self.stop_session();
            let _ = self.pump()?;
        }
        self.print_log();
        Ok(())
    }

    /// Returns `false` when the host should exit.
    fn command(&mut self, command: &str) -> Result<bool> {
        match command {
            "" | "s" => {
                if self.controller.state().is_terminal() {
                    self.report(self.controller.reset());
                }
                if let Err(e) = self.start_session() {
                    eprintln!("start failed: {:#}", e);
                }
            }
            "x" => self.stop_session(),
            "r" => self.report(self.controller.reset()),
            "l" => self.print_log(),
            "?" | "h" => print_help(),
            "q" => return Ok(false),
            other => eprintln!("unknown command '{}' (h for help)", other),
        }
        Ok(true)
    }

    fn start_session(&mut self) -> Result<()> {
        let source = self.open_source()?;
        let decoder = self.open_decoder()?;
        match self
            .controller
            .start(source, decoder, self.args.permission.into())
        {
            Ok(()) => Ok(()),
            // Reported through the Error event as well.
            Err(e @ ControllerError::BindingFailed(_)) => {
                log::debug!("start returned {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn stop_session(&mut self) {
        self.report(self.controller.stop());
    }

    fn report(&self, result: Result<(), ControllerError>) {
        if let Err(e) = result {
            eprintln!("{}", e);
        }
    }

    fn open_source(&self) -> Result<Box<dyn FrameSource>> {
        if !self.cfg.camera.url.starts_with("stub://") {
            return Err(anyhow!(
                "scand only drives stub:// cameras (got {})",
                self.cfg.camera.url
            ));
        }
        Ok(Box::new(SyntheticCamera::new(self.cfg.synthetic_camera())?))
    }

    fn open_decoder(&self) -> Result<Box<dyn Decoder>> {
        let worker = if self.cfg.decoder.formats.is_empty() {
            self.registry.worker(&self.cfg.decoder.backend)?
        } else {
            DecodeWorker::spawn(self.registry.backend_for_formats(&self.cfg.decoder.formats)?)?
        };
        Ok(Box::new(worker))
    }

    /// Drain session events. Returns the session outcome once one arrives.
    fn pump(&mut self) -> Result<Option<Result<()>>> {
        let mut outcome = None;
        while let Ok(event) = self.events.try_recv() {
            match event {
                SessionEvent::Started => {
                    self.started = Some(Instant::now());
                    self.indicator = Some(self.ui.scanning(&self.cfg.camera.url));
                }
                SessionEvent::Scanned(value) => {
                    self.finish_indicator(&format!("scanned {}", value));
                    println!("{}", value);
                    outcome = Some(Ok(()));
                }
                SessionEvent::Stopped => {
                    self.finish_indicator("stopped");
                    outcome = Some(Err(anyhow!("scan cancelled")));
                }
                SessionEvent::Error { code, message } => {
                    self.finish_indicator(&format!("failed ({})", code));
                    outcome = Some(Err(anyhow!("scan failed [{}]: {}", code, message)));
                }
            }
        }

        if let Some(indicator) = self.indicator.as_mut() {
            indicator.set_frames(self.controller.snapshot().stats.frames_received);
        }
        let timeout = Duration::from_secs(self.args.timeout_s);
        if self.started.is_some_and(|at| at.elapsed() >= timeout)
            && self.controller.state() == SessionState::Scanning
        {
            log::warn!("no barcode after {}s, stopping session", self.args.timeout_s);
            self.started = None;
            self.stop_session();
        }
        Ok(outcome)
    }

    fn finish_indicator(&mut self, outcome: &str) {
        self.started = None;
        if let Some(indicator) = self.indicator.take() {
            indicator.finish(outcome);
        }
    }

    fn print_log(&self) {
        let entries = self.scan_log.entries();
        if entries.is_empty() {
            eprintln!("no values scanned yet");
            return;
        }
        for (i, value) in entries.iter().enumerate() {
            eprintln!("{:>3}. {}", i + 1, value);
        }
    }
}

fn print_help() {
    eprintln!("commands: <enter>/s start, x stop, r reset, l list, q quit");
}
