use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::sync::mpsc::{self, Receiver, Sender};

pub mod database;
pub mod error;
pub mod events;
pub mod groups;
pub mod messages;
pub mod summary;
pub mod users;
pub mod visibility;

use crate::init_tracing;
use database::Database;
use error::{ChattyError, Result};
use events::PushEvent;
use summary::{GeminiModel, SummarizerAdapter, SummaryModel, SummaryOptions};

const PUSH_CHANNEL_CAPACITY: usize = 500;

#[derive(Clone, Debug)]
pub struct ChattyConfig {
    /// Directory for application data
    pub data_dir: PathBuf,

    /// Directory for application logs
    pub logs_dir: PathBuf,

    /// Summary generation and caching options
    pub summary: SummaryOptions,
}

impl ChattyConfig {
    pub fn new(data_dir: &Path, logs_dir: &Path) -> Self {
        let env_suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };
        let formatted_data_dir = data_dir.join(env_suffix);
        let formatted_logs_dir = logs_dir.join(env_suffix);

        Self {
            data_dir: formatted_data_dir,
            logs_dir: formatted_logs_dir,
            summary: SummaryOptions::default(),
        }
    }

    /// Create a new configuration with custom summary options
    pub fn new_with_summary_options(
        data_dir: &Path,
        logs_dir: &Path,
        summary: SummaryOptions,
    ) -> Self {
        Self {
            summary,
            ..Self::new(data_dir, logs_dir)
        }
    }
}

pub struct Chatty {
    pub config: ChattyConfig,
    pub(crate) database: Arc<Database>,
    pub(crate) summarizer: SummarizerAdapter,
    push_sender: Sender<PushEvent>,
    push_receiver: Mutex<Option<Receiver<PushEvent>>>,
}

impl std::fmt::Debug for Chatty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chatty")
            .field("config", &self.config)
            .field("database", &"<REDACTED>")
            .field("summarizer", &"<REDACTED>")
            .finish()
    }
}

impl Chatty {
    /// Initializes the core with the provided configuration, reading the
    /// summarization model's credentials from the environment.
    ///
    /// Sets up the data and log directories, configures logging, opens the
    /// database (running any pending migrations), and wires the push-event
    /// channel the embedding layer drains via [`Chatty::push_events`].
    pub async fn initialize(config: ChattyConfig) -> Result<Self> {
        let model = GeminiModel::from_env()?;
        Self::initialize_with_model(config, Arc::new(model)).await
    }

    /// Like [`Chatty::initialize`], but with an explicit summarization
    /// model. Useful for embedding a different provider or a stub.
    pub async fn initialize_with_model(
        config: ChattyConfig,
        model: Arc<dyn SummaryModel>,
    ) -> Result<Self> {
        let data_dir = &config.data_dir;
        let logs_dir = &config.logs_dir;

        // Setup directories
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))
            .map_err(ChattyError::from)?;
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))
            .map_err(ChattyError::from)?;

        // Only initialize tracing once
        init_tracing(logs_dir);

        tracing::debug!(
            target: "chatty::initialize",
            "Logging initialized in directory: {:?}",
            logs_dir
        );

        let database = Arc::new(Database::new(data_dir.join("chatty.sqlite")).await?);

        let (push_sender, push_receiver) = mpsc::channel(PUSH_CHANNEL_CAPACITY);

        let summarizer = SummarizerAdapter::new(model, config.summary.clone());

        Ok(Self {
            config,
            database,
            summarizer,
            push_sender,
            push_receiver: Mutex::new(Some(push_receiver)),
        })
    }

    /// Takes the push-event receiver. The embedding layer calls this once
    /// and fans events out to connected clients; returns `None` on
    /// subsequent calls.
    pub fn push_events(&self) -> Option<Receiver<PushEvent>> {
        self.push_receiver.lock().ok()?.take()
    }

    /// Queues a push event for the real-time layer. Emission is
    /// fire-and-forget: a full or unconsumed channel drops the event with a
    /// debug log rather than blocking or failing the operation.
    pub(crate) fn emit(&self, event: PushEvent) {
        if let Err(e) = self.push_sender.try_send(event) {
            tracing::debug!(
                target: "chatty::events",
                "Dropped push event: {}",
                e
            );
        }
    }

    /// Deletes all application data: every database table and all log
    /// files. Useful for resetting to a clean state.
    pub async fn delete_all_data(&self) -> Result<()> {
        tracing::debug!(target: "chatty::delete_all_data", "Deleting all data");

        self.database.delete_all_data().await?;

        if self.config.logs_dir.exists() {
            for entry in std::fs::read_dir(&self.config.logs_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_file() {
                    std::fs::remove_file(path)?;
                } else if path.is_dir() {
                    std::fs::remove_dir_all(path)?;
                }
            }
        }

        Ok(())
    }
}
