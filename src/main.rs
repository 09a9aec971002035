use anyhow::{Context, Result};
use badge_reader::{
    config::{AppConfig, IndicatorKind},
    device::Device,
    host::{
        actuators::{LogBuzzer, LogIndicator},
        console::HostConsole,
        network::HostNetwork,
        reader::HostCardReader,
        storage::FileStorage,
    },
    services::feedback::{FeedbackSink, ToneAndColor, ToneOnly},
};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info};
use std::{io::Write, time::Instant};
use tokio::time::{MissedTickBehavior, interval};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let config = AppConfig::get().context("failed to load application configuration")?;
    debug!("{config:?}");

    let sink: Box<dyn FeedbackSink> = match config.feedback.indicator {
        IndicatorKind::Rgb => Box::new(ToneAndColor::new(
            LogBuzzer::default(),
            LogIndicator::default(),
            config.feedback.buzzer_frequency_hz,
        )),
        IndicatorKind::None => Box::new(ToneOnly::new(
            LogBuzzer::default(),
            config.feedback.buzzer_frequency_hz,
        )),
    };

    let reader = HostCardReader::bind(config.reader.listen_addr)
        .await
        .context("failed to start card reader")?;

    let mut device = Device::new(
        FileStorage::new(&config.storage.eeprom_path),
        HostNetwork::new(config.network.connect_timeout),
        reader,
        HostConsole::spawn(),
        sink,
    );

    device.start(Instant::now()).await;

    let mut ticker = interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for ctrl-c")?;
                debug!("ctrl-c received");
                break;
            },
            _ = ticker.tick() => device.poll(Instant::now()).await,
        }
    }

    info!("shutdown complete");

    Ok(())
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error | log::Level::Warn => {
            writeln!(f, "{}: {}", record.level(), record.args())
        }
        _ => writeln!(f, "{}", record.args()),
    });

    // stdout belongs to the console protocol
    builder.target(Target::Stderr).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}
