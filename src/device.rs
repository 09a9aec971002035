//! The reader appliance
//!
//! [`Device`] owns the configuration record and every collaborator. The
//! binary calls [`Device::start`] once and then [`Device::poll`] on every
//! loop tick. One poll services, in order: inbound response bytes, connection
//! teardown, the card reader, console input and the feedback timer.

use crate::{
    peripherals::{CardReader, Console},
    services::{
        card_event::{CardEventPipeline, Dispatch},
        command::{CommandProtocol, Reply},
        config_store::{ConfigStorage, ConfigStore, ConfigurationRecord},
        feedback::{FeedbackPlayer, FeedbackSink, Pattern},
        network::{Connection, NetworkProvisioner, NetworkStack},
        response::{ResponseClassifier, ResponseOutcome},
    },
};
use log::{debug, error, info, warn};
use std::time::Instant;

/// Bytes read from the pending connection per poll
const RESPONSE_CHUNK: usize = 64;

/// Bytes read from the console per poll
const CONSOLE_CHUNK: usize = 64;

pub struct Device<S, N: NetworkStack, R, C, F> {
    store: ConfigStore<S>,
    record: ConfigurationRecord,
    network: N,
    network_ready: bool,
    reader: R,
    console: C,
    commands: CommandProtocol,
    pipeline: CardEventPipeline<N::Connection>,
    classifier: ResponseClassifier,
    feedback: FeedbackPlayer<F>,
}

impl<S, N, R, C, F> Device<S, N, R, C, F>
where
    S: ConfigStorage,
    N: NetworkStack,
    R: CardReader,
    C: Console,
    F: FeedbackSink,
{
    pub fn new(storage: S, network: N, reader: R, console: C, sink: F) -> Self {
        Self {
            store: ConfigStore::new(storage),
            record: ConfigurationRecord::default(),
            network,
            network_ready: false,
            reader,
            console,
            commands: CommandProtocol::new(),
            pipeline: CardEventPipeline::new(),
            classifier: ResponseClassifier::new(),
            feedback: FeedbackPlayer::new(sink),
        }
    }

    pub fn record(&self) -> &ConfigurationRecord {
        &self.record
    }

    pub fn is_network_ready(&self) -> bool {
        self.network_ready
    }

    pub fn has_pending_request(&self) -> bool {
        self.pipeline.is_pending()
    }

    pub fn is_feedback_active(&self) -> bool {
        self.feedback.is_busy()
    }

    /// Load the record, bring networking up if provisioned, play the startup tone
    pub async fn start(&mut self, now: Instant) {
        self.record = match self.store.load() {
            Ok(record) => record,
            Err(e) => {
                error!("failed to load configuration: {e}");
                ConfigurationRecord::default()
            }
        };

        if self.record.is_valid() {
            info!("configured");
            self.provision_network().await;
        } else {
            info!("not configured yet");
        }

        self.feedback.play(Pattern::Startup, now);
    }

    /// One iteration of the main loop
    pub async fn poll(&mut self, now: Instant) {
        self.service_response(now);
        self.service_teardown();
        self.service_card_reader(now).await;
        self.service_console().await;
        self.feedback.tick(now);
    }

    async fn provision_network(&mut self) {
        let Some(provisioner) = NetworkProvisioner::for_record(&self.record) else {
            self.network_ready = false;
            return;
        };

        match provisioner
            .provision(&mut self.network, self.record.hardware_address)
            .await
        {
            Ok(_) => self.network_ready = true,
            Err(e) => {
                error!("{e:#}");
                self.network_ready = false;
            }
        }
    }

    fn service_response(&mut self, now: Instant) {
        let Some(connection) = self.pipeline.pending_mut() else {
            return;
        };

        let mut buf = [0u8; RESPONSE_CHUNK];
        let read = match connection.try_read(&mut buf) {
            Ok(read) => read,
            Err(e) => {
                warn!("failed to read response: {e:#}");
                return;
            }
        };

        if read == 0 {
            return;
        }

        debug!("response bytes: {}", String::from_utf8_lossy(&buf[..read]));

        for outcome in self.classifier.feed(&buf[..read]) {
            let pattern = match outcome {
                ResponseOutcome::Success => Pattern::Success,
                ResponseOutcome::Failure => Pattern::Failure,
            };
            info!("response classified: {outcome:?}");
            self.feedback.play(pattern, now);
        }
    }

    fn service_teardown(&mut self) {
        if self.pipeline.teardown_closed() {
            self.classifier.reset();
        }
    }

    async fn service_card_reader(&mut self, now: Instant) {
        let Some(uid) = self.reader.poll_card() else {
            return;
        };

        let usable = self.network_ready && self.record.is_valid();
        let network = usable.then_some(&mut self.network);

        match self.pipeline.on_card(&uid, &self.record, network).await {
            Dispatch::Sent => self.classifier.reset(),
            Dispatch::Busy => {}
            Dispatch::ConnectFailed => {
                warn!("connection failed");
                self.feedback.play(Pattern::ConnectFailed, now);
            }
        }
    }

    async fn service_console(&mut self) {
        let mut buf = [0u8; CONSOLE_CHUNK];
        let read = self.console.read_available(&mut buf);
        if read == 0 {
            return;
        }

        let replies = self
            .commands
            .handle(&buf[..read], &mut self.record, &mut self.store);

        for reply in replies {
            match reply {
                Ok(Reply::Configured) => {
                    if self.record.is_valid() {
                        self.provision_network().await;
                    } else {
                        self.drop_network();
                    }
                }
                Ok(Reply::Config(line)) => {
                    if !self.record.is_valid() {
                        self.drop_network();
                    }
                    self.console.write_line(&line);
                }
                Err(e) => error!("{e:#}"),
            }
        }
    }

    fn drop_network(&mut self) {
        if self.network_ready {
            info!("configuration no longer valid, networking disabled");
        }
        self.network_ready = false;
    }
}
