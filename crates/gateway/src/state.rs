//! Shared application state and the chat session registry

use chrono::{DateTime, Utc};
use moviemate_common::{
    config::AppConfig,
    errors::{AppError, Result},
    metrics,
    types::{ChatMode, MetadataFilters},
    Embedder, LanguageModel,
};
use moviemate_context::{ChatEngine, QueryEngine, TreeSummarizer};
use moviemate_search::{VectorIndex, VectorRetriever};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LanguageModel>,
    pub index: Arc<dyn VectorIndex>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(config.server.max_sessions));
        Self {
            config: Arc::new(config),
            embedder,
            llm,
            index,
            sessions,
        }
    }

    /// Session settings taken from configuration
    pub fn default_settings(&self) -> Result<SessionSettings> {
        Ok(SessionSettings {
            mode: self.config.chat.mode.parse()?,
            top_k: self.config.retrieval.top_k,
            filters: self.config.retrieval.filters.clone(),
            streaming: self.config.synthesis.streaming,
            max_iterations: self.config.chat.max_iterations,
        })
    }

    /// Build a chat engine with its own retriever, so filters never leak
    /// between sessions.
    pub fn build_engine(&self, settings: &SessionSettings) -> Result<ChatEngine> {
        settings.filters.validate()?;
        let retriever = VectorRetriever::new(self.index.clone(), Some(self.embedder.clone()))
            .with_top_k(settings.top_k)?
            .with_filters(settings.filters.clone());

        let synthesizer = TreeSummarizer::new(self.llm.clone(), &self.config.synthesis)
            .with_streaming(settings.streaming);

        let query_engine = Arc::new(QueryEngine::from_vector_retriever(retriever, synthesizer));

        ChatEngine::new(
            settings.mode,
            self.llm.clone(),
            query_engine,
            settings.max_iterations,
        )
    }
}

/// Settings fixed when a session is opened
#[derive(Debug, Clone, Serialize)]
pub struct SessionSettings {
    pub mode: ChatMode,
    pub top_k: usize,
    pub filters: MetadataFilters,
    pub streaming: bool,
    pub max_iterations: usize,
}

/// One conversation and the engine that owns its history
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub settings: SessionSettings,
    engine: Arc<Mutex<ChatEngine>>,
}

impl Session {
    /// Exclusive access to the engine. A session answers one message at a time.
    pub fn acquire(&self) -> Result<OwnedMutexGuard<ChatEngine>> {
        self.engine
            .clone()
            .try_lock_owned()
            .map_err(|_| AppError::SessionBusy {
                id: self.id.to_string(),
            })
    }
}

/// In-process session registry with a hard cap
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    pub async fn insert(&self, settings: SessionSettings, engine: ChatEngine) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(AppError::SessionLimitReached {
                limit: self.max_sessions,
            });
        }

        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            settings,
            engine: Arc::new(Mutex::new(engine)),
        });
        sessions.insert(session.id, session.clone());
        metrics::set_active_sessions(sessions.len());

        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })
    }

    /// Forget a session. A turn already in flight finishes on its own handle.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(&id)
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })?;
        metrics::set_active_sessions(sessions.len());
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
