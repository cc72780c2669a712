use chrono::Local;
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use super::live_buffer::{LiveBuffer, SharedBuffer};
use crate::config::Settings;
use crate::devices::mock::MockMeter;
use crate::devices::reading::Reading;
use crate::devices::registry::adapter_for;
use crate::devices::traits::ReadingSource;
use crate::output::chart::render_sparkline;
use crate::output::{ConsoleFormatter, ConsoleSender, DataSender, ReadingFormatter};
use crate::serial::{SerialLineSource, SerialMeterSource};
use crate::storage::sink::ReadingSink;
use crate::storage::{CsvLogger, History};
use crate::utils::error::CondensateError;

/// Days of simulated history written on the first mock run.
pub const MOCK_HISTORY_DAYS: u32 = 7;

const BROADCAST_CAPACITY: usize = 256;
const CHART_WIDTH: usize = 60;

pub struct DataService {
    settings: Settings,
    source: Arc<dyn ReadingSource>,
    mock: Option<Arc<MockMeter>>,
    logger: Arc<CsvLogger>,
    sinks: Vec<Arc<dyn ReadingSink>>,
    formatter: Box<dyn ReadingFormatter>,
    senders: Vec<Box<dyn DataSender>>,
    buffer: SharedBuffer,
    broadcaster: broadcast::Sender<Reading>,
    live_chart: bool,
}

impl DataService {
    /// Builds the service for the configured mode, opening the serial port unless mock data is enabled.
    pub async fn new(settings: Settings) -> Result<Self, CondensateError> {
        info!("🚀 Initializing Data Service");

        let (source, mock): (Arc<dyn ReadingSource>, Option<Arc<MockMeter>>) = if settings.device.mock_data {
            info!("🧪 Mock mode: readings every {}s", settings.device.mock_interval);
            let mock = Arc::new(MockMeter::new());
            (mock.clone() as Arc<dyn ReadingSource>, Some(mock))
        } else {
            let lines = SerialLineSource::open(
                &settings.serial.port,
                settings.serial.baud_rate,
                settings.serial_timeout()?,
            )?;
            let adapter = adapter_for(&settings.device.model);
            info!(
                "🔌 {} on {} @ {} baud, polling every {}s",
                adapter.name(),
                settings.serial.port,
                settings.serial.baud_rate,
                settings.device.measurement_interval
            );
            (Arc::new(SerialMeterSource::new(Arc::new(lines), adapter)) as Arc<dyn ReadingSource>, None)
        };

        #[allow(unused_mut)]
        let mut service = Self::with_source(settings, source, mock);

        #[cfg(feature = "sqlite")]
        if service.settings.storage.sqlite_enabled {
            let path = service.settings.storage.database_path.clone();
            match crate::storage::SqliteManager::new(&path).await {
                Ok(manager) => service.add_sink(Arc::new(manager)),
                Err(e) => error!("❌ Failed to open database {}: {}", path.display(), e),
            }
        }

        info!("✅ Data Service initialized");
        Ok(service)
    }

    /// Builds the service around an existing source, logging to CSV and printing to the console.
    pub fn with_source(settings: Settings, source: Arc<dyn ReadingSource>, mock: Option<Arc<MockMeter>>) -> Self {
        let logger = Arc::new(CsvLogger::from_settings(&settings.logging));
        let (broadcaster, _) = broadcast::channel(BROADCAST_CAPACITY);
        let buffer = LiveBuffer::shared(settings.display.buffer_size);
        let formatter: Box<dyn ReadingFormatter> = Box::new(ConsoleFormatter::new(settings.display.threshold));
        let senders: Vec<Box<dyn DataSender>> = vec![Box::new(ConsoleSender)];

        Self {
            sinks: vec![logger.clone() as Arc<dyn ReadingSink>],
            settings,
            source,
            mock,
            logger,
            formatter,
            senders,
            buffer,
            broadcaster,
            live_chart: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_mock(&self) -> bool {
        self.source.is_mock()
    }

    pub fn mock(&self) -> Option<Arc<MockMeter>> {
        self.mock.clone()
    }

    pub fn buffer(&self) -> SharedBuffer {
        Arc::clone(&self.buffer)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Reading> {
        self.broadcaster.subscribe()
    }

    pub fn broadcaster(&self) -> broadcast::Sender<Reading> {
        self.broadcaster.clone()
    }

    pub fn logger(&self) -> Arc<CsvLogger> {
        Arc::clone(&self.logger)
    }

    pub fn add_sink(&mut self, sink: Arc<dyn ReadingSink>) {
        info!("💾 Added {} sink at {}", sink.sink_type(), sink.destination());
        self.sinks.push(sink);
    }

    pub fn add_sender(&mut self, sender: Box<dyn DataSender>) {
        info!("📤 Added {} sender to {}", sender.sender_type(), sender.destination());
        self.senders.push(sender);
    }

    pub fn clear_senders(&mut self) {
        self.senders.clear();
    }

    pub fn set_formatter(&mut self, formatter: Box<dyn ReadingFormatter>) {
        self.formatter = formatter;
    }

    pub fn set_live_chart(&mut self, enabled: bool) {
        self.live_chart = enabled;
    }

    /// Pulls one reading from the meter or the mock generator.
    pub async fn acquire(&self) -> Result<Option<Reading>, CondensateError> {
        self.source.next_reading().await
    }

    /// Sends a reading to every sink, the live buffer, subscribers and the console senders.
    /// Sink and sender failures are logged and do not stop the others.
    pub async fn record(&self, reading: &Reading) {
        for sink in &self.sinks {
            match sink.record(reading).await {
                Ok(outcome) => debug!("💾 {} -> {} ({})", sink.sink_type(), outcome.path.display(), outcome.level),
                Err(e) => error!("❌ Failed to record reading via {} ({}): {}", sink.sink_type(), sink.destination(), e),
            }
        }

        match self.buffer.lock() {
            Ok(mut buffer) => buffer.push(reading.clone()),
            Err(_) => error!("❌ Live buffer lock poisoned"),
        }

        // No subscribers is not an error.
        let _ = self.broadcaster.send(reading.clone());

        let line = self.formatter.format_reading(reading);
        for sender in &self.senders {
            if let Err(e) = sender.send(&line).await {
                error!("❌ Failed to send reading via {} to {}: {}", sender.sender_type(), sender.destination(), e);
            }
        }
    }

    pub async fn read_once(&self) -> Result<Option<Reading>, CondensateError> {
        let reading = self.acquire().await?;
        if let Some(reading) = &reading {
            self.record(reading).await;
        }
        Ok(reading)
    }

    /// Writes `days` of simulated history when mock mode has never logged anything.
    /// Returns the number of readings written.
    pub async fn seed_mock_history(&self, days: u32) -> Result<usize, CondensateError> {
        let Some(mock) = self.mock.clone() else {
            return Ok(0);
        };
        let logging = self.settings.logging.clone();
        let logger = Arc::clone(&self.logger);

        tokio::task::spawn_blocking(move || -> Result<usize, CondensateError> {
            let history = History::from_settings(&logging, true)?;
            if !history.is_empty() {
                debug!("🧪 Mock history already present, skipping generation");
                return Ok(0);
            }

            let readings = mock.generate_history(days)?;
            let written = logger.write_all(&readings)?;
            info!("🧪 Generated {} days of mock history ({} readings)", days, written);
            Ok(written)
        })
        .await?
    }

    /// Fills the live buffer with what has already been logged today.
    pub async fn preload_today(&self) -> Result<usize, CondensateError> {
        let logging = self.settings.logging.clone();
        let mock = self.is_mock();
        let today = tokio::task::spawn_blocking(move || -> Result<Vec<Reading>, CondensateError> {
            History::from_settings(&logging, mock)?.for_date(Local::now().date_naive())
        })
        .await??;
        let count = today.len();

        let mut buffer = self.buffer.lock().map_err(|_| CondensateError::LockError)?;
        buffer.extend(today);
        if count > 0 {
            info!("📂 Loaded {} readings logged earlier today", count);
        }
        Ok(count)
    }

    pub async fn run(&self) -> Result<(), CondensateError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("❌ Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Polls on the configured interval until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), CondensateError>
    where
        F: Future<Output = ()>,
    {
        let poll_period = self.settings.poll_interval()?;
        let display_period = self.settings.display_interval()?;

        if self.mock.is_some() {
            if let Err(e) = self.seed_mock_history(MOCK_HISTORY_DAYS).await {
                warn!("⚠️  Could not generate mock history: {}", e);
            }
        }
        if let Err(e) = self.preload_today().await {
            warn!("⚠️  Could not load today's readings: {}", e);
        }

        let header = self.formatter.format_header();
        if !header.is_empty() {
            for sender in &self.senders {
                if let Err(e) = sender.send(&header).await {
                    warn!("⚠️  Failed to send header via {} to {}: {}", sender.sender_type(), sender.destination(), e);
                }
            }
        }

        info!("🔄 Polling {} every {:?}", self.source.source_name(), poll_period);

        let mut poll = interval(poll_period);
        let mut display = interval(display_period);
        display.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    match self.read_once().await {
                        Ok(Some(_)) => {}
                        Ok(None) => debug!("⏳ Poll produced no reading"),
                        Err(e) => warn!("⚠️  Poll failed: {}", e),
                    }
                }
                _ = display.tick(), if self.live_chart => self.draw_chart(),
                _ = &mut shutdown => {
                    info!("🛑 Stopping acquisition");
                    break;
                }
            }
        }
        Ok(())
    }

    fn draw_chart(&self) {
        let values = match self.buffer.lock() {
            Ok(buffer) => buffer.values(),
            Err(_) => return,
        };
        if values.is_empty() {
            return;
        }
        println!("{}", render_sparkline(&values, CHART_WIDTH, self.settings.display.threshold));
    }
}
