//! Present a raw YUV 4:2:0 file frame by frame.
//!
//! Usage: play [--verbose] WIDTHxHEIGHT FILE
//!
//! The frame dimensions are not embedded in the file and must be given on
//! the command line. Frames are pushed through the full session/exchange
//! pipeline into the in-memory compositor; Ctrl-C stops cleanly at the next
//! frame boundary (a second Ctrl-C kills the process outright).

use std::process::exit;

use surface_stream::headless::HeadlessCompositor;
use surface_stream::{
    Error, FrameSource, PixelFormat, PresentStats, Presenter, Size, StopToken, StreamConfig,
    SurfaceSession,
};

struct Args {
    size: Size,
    path: String,
    verbose: bool,
}

/// Parse a string of the form "240x320".
fn parse_width_height(s: &str) -> Option<Size> {
    let (w, h) = s.split_once('x')?;
    let width: u32 = w.parse().ok()?;
    let height: u32 = h.parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some(Size { width, height })
}

fn usage() {
    eprintln!(
        "Usage: play [options] WIDTHxHEIGHT FILE\n\
         \n\
         Presents the raw planar YUV 4:2:0 frames in FILE, each exactly\n\
         width*height*3/2 bytes, until the file ends or Ctrl-C is hit.\n\
         \n\
         Options:\n\
         --verbose    Chatty output on stderr.\n\
         --help       Show this message."
    );
}

fn parse_args() -> Result<Args, String> {
    let mut size = None;
    let mut path = None;
    let mut verbose = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => {
                usage();
                exit(0);
            }
            other if size.is_none() => {
                size = Some(
                    parse_width_height(other)
                        .ok_or_else(|| format!("invalid size '{other}' (expected WIDTHxHEIGHT)"))?,
                );
            }
            other if path.is_none() => path = Some(other.to_owned()),
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }
    match (size, path) {
        (Some(size), Some(path)) => Ok(Args {
            size,
            path,
            verbose,
        }),
        _ => Err("missing WIDTHxHEIGHT or FILE".into()),
    }
}

fn run(args: &Args, stop: &StopToken) -> Result<PresentStats, Error> {
    let config = StreamConfig {
        pixel_format: PixelFormat::Yuv420Planar,
        size: args.size,
    };
    let mut source = FrameSource::open(&args.path, &config)?;

    let compositor = HeadlessCompositor::with_defaults();
    let mut session = SurfaceSession::open(compositor, config)?;
    session.configure_buffers()?;

    let stats = Presenter::new(&mut session).run(&mut source, stop)?;
    session.teardown();
    Ok(stats)
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("error: {msg}\n");
            usage();
            exit(2);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if args.verbose { "debug" } else { "info" },
    ))
    .init();

    let stop = StopToken::new();
    #[cfg(unix)]
    signals::install(&stop);

    match run(&args, &stop) {
        Ok(stats) if stats.presented == 0 && !stop.is_raised() => {
            eprintln!(
                "error: '{}' holds no complete {}x{} frame",
                args.path, args.size.width, args.size.height
            );
            exit(1);
        }
        Ok(stats) => {
            println!("presented {} frame(s)", stats.presented);
        }
        Err(err) => {
            eprintln!("error: {err}");
            exit(err.exit_code());
        }
    }
}

#[cfg(unix)]
mod signals {
    use std::sync::OnceLock;

    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use surface_stream::StopToken;

    static STOP: OnceLock<StopToken> = OnceLock::new();
    static PREVIOUS: OnceLock<(SigAction, SigAction)> = OnceLock::new();

    extern "C" fn on_signal(_signum: i32) {
        // Only flag-setting happens here; the exchange cycle observes the
        // token at the next frame boundary. Restoring the previous
        // dispositions means a second signal kills the process if normal
        // teardown is itself stuck.
        if let Some(stop) = STOP.get() {
            stop.raise();
        }
        if let Some((int_prev, hup_prev)) = PREVIOUS.get() {
            unsafe {
                let _ = signal::sigaction(Signal::SIGINT, int_prev);
                let _ = signal::sigaction(Signal::SIGHUP, hup_prev);
            }
        }
    }

    /// Route SIGINT and SIGHUP to the stop token. SIGHUP covers the
    /// terminal disconnecting while a remote shell runs the tool.
    pub fn install(stop: &StopToken) {
        let _ = STOP.set(stop.clone());
        let action = SigAction::new(
            SigHandler::Handler(on_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );
        unsafe {
            let int_prev = signal::sigaction(Signal::SIGINT, &action);
            let hup_prev = signal::sigaction(Signal::SIGHUP, &action);
            if let (Ok(int_prev), Ok(hup_prev)) = (int_prev, hup_prev) {
                let _ = PREVIOUS.set((int_prev, hup_prev));
            }
        }
    }
}
