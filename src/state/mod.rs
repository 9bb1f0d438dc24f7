use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::bridge::{BridgeConfig, BridgeDeps};
use crate::core::cache::PromptCache;
use crate::core::call_control::{
    CallControl, CallControlError, DisabledCallControl, HttpCallControl,
};
use crate::core::call_state::{CallStateStore, spawn_sweeper};
use crate::core::conversation::{CallDriver, ConversationFsm};
use crate::core::directory::{
    DirectoryError, HttpDirectory, InMemoryDirectory, WorkforceDirectory,
};
use crate::core::speech::{HttpSpeechService, SpeechError, SpeechService};
use crate::core::transfer::{HoldQueue, TransferManager};
use crate::handlers::voice::TRANSFER_PATH;

const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Directory setup failed: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Speech service setup failed: {0}")]
    Speech(#[from] SpeechError),

    #[error("Call-control setup failed: {0}")]
    CallControl(#[from] CallControlError),
}

/// Application state that can be shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<CallStateStore>,
    pub transfers: Arc<TransferManager>,
    pub driver: Arc<CallDriver>,
    /// Services every media bridge shares
    pub bridge: BridgeDeps,
    pub bridge_config: BridgeConfig,
    /// Cancelled on shutdown; per-call work runs on child tokens
    pub cancel: CancellationToken,
}

impl AppState {
    /// Builds the collaborators named by `config` and wires the engine.
    pub async fn new(config: ServerConfig) -> Result<Arc<Self>, StartupError> {
        let directory: Arc<dyn WorkforceDirectory> = if let Some(url) = &config.directory_url {
            info!(url = %url, "Using HTTP workforce directory");
            Arc::new(HttpDirectory::new(
                url.clone(),
                config.directory_api_key.clone(),
                DIRECTORY_TIMEOUT,
            )?)
        } else if let Some(path) = &config.directory_fixture_path {
            Arc::new(InMemoryDirectory::from_file(path).await?)
        } else {
            warn!("No directory configured; every caller will be asked for a PIN that matches nobody");
            Arc::new(InMemoryDirectory::default())
        };

        let speech: Arc<dyn SpeechService> =
            Arc::new(HttpSpeechService::new(config.speech_config())?);

        let call_control: Arc<dyn CallControl> = match config.call_control_config() {
            Some(control) => Arc::new(HttpCallControl::new(control)?),
            None => {
                info!("Telephony API not configured; live call redirects disabled");
                Arc::new(DisabledCallControl)
            }
        };

        Ok(Self::from_parts(config, directory, speech, call_control))
    }

    /// Wires the engine around the given collaborators and starts the
    /// background store sweep.
    pub fn from_parts(
        config: ServerConfig,
        directory: Arc<dyn WorkforceDirectory>,
        speech: Arc<dyn SpeechService>,
        call_control: Arc<dyn CallControl>,
    ) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let store = Arc::new(CallStateStore::new(config.session_ttl()));
        let transfers = Arc::new(TransferManager::new(
            store.clone(),
            Arc::new(HoldQueue::new()),
            config.transfer_config(),
        ));
        let driver = Arc::new(CallDriver::new(
            store.clone(),
            ConversationFsm::new(config.flow_config()),
            directory,
            transfers.clone(),
        ));

        let sweep_transfers = transfers.clone();
        spawn_sweeper(
            store.clone(),
            config.sweep_interval(),
            cancel.child_token(),
            move |call_id| {
                if sweep_transfers.release(call_id) {
                    info!(call_id, "Released hold slot of expired call");
                }
            },
        );

        let bridge = BridgeDeps {
            driver: driver.clone(),
            speech,
            prompts: Arc::new(PromptCache::new(config.cache_config())),
            call_control,
        };
        let bridge_config = BridgeConfig {
            hold_announcement_interval: transfers.config().hold_announcement_interval,
            transfer_url: Some(config.callback_url(TRANSFER_PATH)),
            ..BridgeConfig::default()
        };

        Arc::new(Self {
            config,
            store,
            transfers,
            driver,
            bridge,
            bridge_config,
            cancel,
        })
    }

    /// Stops background work and in-flight call tasks.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
