use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use marginalia::cloze::{DisabledGenerator, OpenAiGenerator, QuestionGenerator};
use marginalia::config::{AppConfig, ResolvedConfig};
use marginalia::highlights::UploadDirImporter;
use marginalia::review::{ReviewStore, SqliteReviewStore, Source};
use marginalia::session::{Action, ReviewError, SessionManager, ViewModel};

pub type Manager = SessionManager<SqliteReviewStore, dyn QuestionGenerator>;

/// Shared application state for CLI commands
pub struct App {
    pub config: ResolvedConfig,
    pub store: Arc<SqliteReviewStore>,
    pub manager: Manager,
}

impl App {
    /// Load configuration and open the store
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = AppConfig::load(config_path).context("Failed to load configuration")?;

        let store = SqliteReviewStore::open(&config.database_path).with_context(|| {
            format!("Failed to open database at {}", config.database_path.display())
        })?;
        let store = Arc::new(store);

        let generator: Arc<dyn QuestionGenerator> = match config.generator.api_key() {
            Some(key) => Arc::new(
                OpenAiGenerator::new(
                    key.to_string(),
                    config.generator.base_url.clone(),
                    config.generator.model.clone(),
                )
                .context("Failed to build the question generator client")?,
            ),
            None => {
                log::info!("No generator API key configured, cloze questions disabled");
                Arc::new(DisabledGenerator)
            }
        };

        let importer = Arc::new(UploadDirImporter::new(config.uploads_dir.clone()));
        let manager = SessionManager::new(
            Arc::clone(&store),
            generator,
            importer,
            config.authorized_identity,
            config.generator.timeout(),
        );

        Ok(Self {
            config,
            store,
            manager,
        })
    }

    /// Run an action as the configured identity
    pub async fn handle(&self, action: Action) -> Result<ViewModel, ReviewError> {
        self.manager
            .handle(self.config.authorized_identity, action)
            .await
    }

    /// Find a source by id or title (case-insensitive prefix match)
    pub fn find_source(&self, query: &str) -> Result<Source> {
        let sources = self.store.list_sources().context("Failed to list sources")?;

        if let Ok(id) = query.parse::<i64>() {
            if let Some(source) = sources.iter().find(|s| s.id == id) {
                return Ok(source.clone());
            }
        }

        let query_lower = query.to_lowercase();

        // Exact match first
        if let Some(source) = sources.iter().find(|s| s.title.to_lowercase() == query_lower) {
            return Ok(source.clone());
        }

        let matches: Vec<&Source> = sources
            .iter()
            .filter(|s| s.title.to_lowercase().starts_with(&query_lower))
            .collect();

        match matches.len() {
            0 => bail!(
                "No source matching '{}'. Available sources:\n{}",
                query,
                sources
                    .iter()
                    .map(|s| format!("  - {}", s.title))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            1 => Ok(matches[0].clone()),
            _ => bail!(
                "Ambiguous source name '{}'. Matches:\n{}",
                query,
                matches
                    .iter()
                    .map(|s| format!("  - {}", s.title))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
        }
    }
}
