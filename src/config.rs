use anyhow::{Context, Result, bail, ensure};
use std::{env, net::SocketAddr, path::PathBuf, sync::OnceLock, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Storage image standing in for the EEPROM
    pub storage: StorageConfig,

    /// Card reader endpoint
    pub reader: ReaderConfig,

    /// Outbound network configuration
    pub network: NetworkConfig,

    /// Buzzer and indicator configuration
    pub feedback: FeedbackConfig,

    /// Period of the main polling loop
    pub tick_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub eeprom_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ReaderConfig {
    pub listen_addr: SocketAddr,
}

#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub connect_timeout: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndicatorKind {
    Rgb,
    None,
}

#[derive(Clone, Debug)]
pub struct FeedbackConfig {
    pub indicator: IndicatorKind,
    pub buzzer_frequency_hz: u32,
}

impl AppConfig {
    /// Get or load the application configuration
    ///
    /// The first successful load is cached; later calls return the cached
    /// instance.
    pub fn get() -> Result<&'static Self> {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

        if let Some(config) = APP_CONFIG.get() {
            return Ok(config);
        }

        let config = Self::load()?;
        Ok(APP_CONFIG.get_or_init(|| config))
    }

    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let storage = StorageConfig::load(&lookup)?;
        let reader = ReaderConfig::load(&lookup)?;
        let network = NetworkConfig::load(&lookup)?;
        let feedback = FeedbackConfig::load(&lookup)?;

        let tick_interval_ms = lookup("TICK_INTERVAL_MS")
            .unwrap_or_else(|| "10".to_string())
            .parse::<u64>()
            .context("failed to parse TICK_INTERVAL_MS: invalid format")?;
        ensure!(
            tick_interval_ms > 0,
            "failed to parse TICK_INTERVAL_MS: must be greater than zero"
        );

        Ok(Self {
            storage,
            reader,
            network,
            feedback,
            tick_interval: Duration::from_millis(tick_interval_ms),
        })
    }
}

impl StorageConfig {
    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let eeprom_path = lookup("EEPROM_PATH")
            .unwrap_or_else(|| "/data/eeprom.bin".to_string())
            .into();

        Ok(Self { eeprom_path })
    }
}

impl ReaderConfig {
    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = lookup("CARD_READER_ADDR")
            .unwrap_or_else(|| "127.0.0.1:4210".to_string())
            .parse::<SocketAddr>()
            .context("failed to parse CARD_READER_ADDR: invalid format")?;

        Ok(Self { listen_addr })
    }
}

impl NetworkConfig {
    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let connect_timeout_ms = lookup("CONNECT_TIMEOUT_MS")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u64>()
            .context("failed to parse CONNECT_TIMEOUT_MS: invalid format")?;

        Ok(Self {
            connect_timeout: Duration::from_millis(connect_timeout_ms),
        })
    }
}

impl FeedbackConfig {
    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let indicator = match lookup("FEEDBACK_INDICATOR")
            .unwrap_or_else(|| "rgb".to_string())
            .to_lowercase()
            .as_str()
        {
            "rgb" => IndicatorKind::Rgb,
            "none" => IndicatorKind::None,
            other => bail!("failed to parse FEEDBACK_INDICATOR: unknown value {other}"),
        };

        let buzzer_frequency_hz = lookup("BUZZER_FREQUENCY_HZ")
            .unwrap_or_else(|| "1000".to_string())
            .parse::<u32>()
            .context("failed to parse BUZZER_FREQUENCY_HZ: invalid format")?;
        ensure!(
            buzzer_frequency_hz > 0,
            "failed to parse BUZZER_FREQUENCY_HZ: must be greater than zero"
        );

        Ok(Self {
            indicator,
            buzzer_frequency_hz,
        })
    }
}
