mod meter_display;
mod persisting_delegate;
mod platform;
mod reference_store;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use vu_capture_core::DeviceKind;

#[derive(Parser, Debug)]
#[command(
    name = "vu-meter",
    about = "Stereo VU meter for system output or microphone input",
    version
)]
struct Cli {
    /// What to meter when no --device is given
    #[arg(long, value_enum, default_value_t = DeviceTypeArg::SystemOutput)]
    device_type: DeviceTypeArg,

    /// Specific device identifier (see --list-devices)
    #[arg(long)]
    device: Option<String>,

    /// 0 VU reference in dBFS, overriding the stored value for this run
    #[arg(long, allow_negative_numbers = true)]
    reference: Option<f32>,

    /// Store a new 0 VU reference (dBFS) for the current device type
    #[arg(long, allow_negative_numbers = true)]
    calibrate: Option<f32>,

    /// Print available devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Reference store location (default: ~/.config/vu-meter/references.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable the needle's idle jitter
    #[arg(long)]
    steady: bool,

    /// Bar width in columns
    #[arg(long, default_value_t = 30)]
    width: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DeviceTypeArg {
    SystemOutput,
    Microphone,
}

impl From<DeviceTypeArg> for DeviceKind {
    fn from(arg: DeviceTypeArg) -> Self {
        match arg {
            DeviceTypeArg::SystemOutput => DeviceKind::SystemOutput,
            DeviceTypeArg::Microphone => DeviceKind::Microphone,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    meter::run(cli)
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
mod meter {
    use std::io::{self, Write};
    use std::thread;
    use std::time::{Duration, Instant};

    use anyhow::Context;

    use vu_capture_core::{BallisticsConfig, CaptureBackend, CaptureOptions, CaptureState, MeterSession};

    use super::Cli;
    use crate::persisting_delegate::PersistingDelegate;
    use crate::reference_store::{self, StoredReferences};
    use crate::{meter_display, platform};

    const REFRESH_INTERVAL: Duration = Duration::from_millis(33);

    /// Sequence:
    /// 1. Load stored references, build options
    /// 2. Start the session with a delegate that persists reference changes
    /// 3. Redraw the meter at ~30 Hz until the duration elapses
    pub fn run(cli: Cli) -> anyhow::Result<()> {
        if cli.list_devices {
            let report = platform::new_backend().device_report()?;
            print!("{}", report);
            return Ok(());
        }

        let store_path = cli.config.clone().or_else(reference_store::default_path);
        let stored = match &store_path {
            Some(path) => reference_store::load(path)
                .with_context(|| format!("loading references from {}", path.display()))?,
            None => StoredReferences::default(),
        };

        let mut options = CaptureOptions {
            device_uid: cli.device.clone(),
            device_type: cli.device_type.into(),
            reference_dbfs_override: cli.reference,
            scale: platform::default_scale(),
            ..Default::default()
        };
        stored.apply_to(&mut options);
        let scale = options.scale;

        let mut ballistics = BallisticsConfig::default();
        if cli.steady {
            ballistics = ballistics.without_jitter();
        }
        let mut session = MeterSession::new(platform::new_backend(), options)?.with_ballistics(ballistics);
        session.set_delegate(PersistingDelegate::new(stored, store_path));

        log::info!("starting {} capture", platform::PLATFORM_NAME);
        session.start().context("starting capture")?;

        if let Some(dbfs) = cli.calibrate {
            session.set_reference_dbfs(dbfs)?;
            eprintln!("{} reference set to {:.1} dBFS", session.device_kind().label(), dbfs);
        }
        let source = match session.reference_override() {
            Some(_) => "override",
            None => session.device_kind().label(),
        };
        eprintln!(
            "{} | reference {:.1} dBFS ({})",
            session.current_device_uid().unwrap_or_default(),
            session.reference_dbfs(),
            source
        );

        let started = Instant::now();
        let mut stdout = io::stdout();
        loop {
            if cli.duration.is_some_and(|limit| started.elapsed().as_secs_f64() >= limit) {
                break;
            }

            let line = meter_display::render_line(session.reading(), scale, cli.width);
            let status = match session.state() {
                CaptureState::Degraded(fault) => format!("  [{}]", fault),
                _ => String::new(),
            };
            write!(stdout, "\r{}{}\x1b[K", line, status)?;
            stdout.flush()?;
            thread::sleep(REFRESH_INTERVAL);
        }

        writeln!(stdout)?;
        session.stop();
        Ok(())
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod meter {
    use super::Cli;

    pub fn run(_cli: Cli) -> anyhow::Result<()> {
        anyhow::bail!("no capture backend for this platform ({})", crate::platform::PLATFORM_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_negative_reference() {
        let cli = Cli::try_parse_from(["vu-meter", "--device-type", "microphone", "--reference", "-18"]).unwrap();
        assert_eq!(cli.device_type, DeviceTypeArg::Microphone);
        assert_eq!(cli.reference, Some(-18.0));
        assert!(!cli.list_devices);
        assert!(!cli.steady);
    }

    #[test]
    fn defaults_to_system_output() {
        let cli = Cli::try_parse_from(["vu-meter"]).unwrap();
        assert_eq!(DeviceKind::from(cli.device_type), DeviceKind::SystemOutput);
        assert_eq!(cli.device, None);
    }

    #[test]
    fn rejects_unknown_device_type() {
        assert!(Cli::try_parse_from(["vu-meter", "--device-type", "speakers"]).is_err());
    }
}
