use caffeine_take::settings::default_settings_path;
use caffeine_take::{Caffeine, CaffeineMode, Settings, SharedSettings, SystemPower};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn parse_mode(arg: &str) -> Option<CaffeineMode> {
    CaffeineMode::ALL
        .into_iter()
        .find(|mode| mode.as_str().eq_ignore_ascii_case(arg))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);

    let mode = match args.next() {
        Some(arg) => match parse_mode(&arg) {
            Some(mode) => mode,
            None => {
                eprintln!("Unknown mode '{arg}', expected disabled|enabled|auto|timer.");
                std::process::exit(2);
            }
        },
        None => CaffeineMode::Enabled,
    };

    let seconds: u64 = args.next().as_deref().unwrap_or("10").parse().unwrap_or(10);

    if !SystemPower::is_supported() {
        eprintln!("Keeping the computer awake is not supported in this environment.");
        std::process::exit(2);
    }

    let settings = match default_settings_path() {
        Some(path) => Settings::load(&path)?,
        None => Settings::default(),
    };

    let mut caffeine = Caffeine::new(SystemPower::new()?, SharedSettings::new(settings));
    let handle = caffeine.handle();

    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(seconds));
        handle.shutdown();
    });

    println!("Running in {mode} mode for {seconds}s");
    caffeine.set_mode(mode);
    caffeine.run();
    println!("Done (execution state cleared).");

    Ok(())
}
