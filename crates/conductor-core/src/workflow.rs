use crate::conductor::{ResearchComponents, ResearchOptions};
use crate::config::ResearchConfig;
use crate::images::ImageCandidate;
use crate::state::ResearchState;
use crate::tasks::{
    CONTEXT_KEY, ConductResearchTask, ERROR_KEY, FinalizeTask, IMAGES_KEY, OPTIONS_KEY,
    SOURCES_KEY, SUMMARY_KEY, VISITED_URLS_KEY,
};
use anyhow::{Result, anyhow};
use graph_flow::{
    ExecutionStatus, FlowRunner, GraphBuilder, InMemorySessionStorage, Session, SessionStorage,
    Task,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

fn build_graph(conduct: Arc<ConductResearchTask>) -> Arc<graph_flow::Graph> {
    let finalize = Arc::new(FinalizeTask);

    let builder = GraphBuilder::new("research_conductor")
        .add_task(conduct.clone())
        .add_task(finalize.clone())
        .add_edge(conduct.id(), finalize.id())
        .set_start_task(conduct.id());

    Arc::new(builder.build())
}

/// Options for running a research session.
pub struct SessionOptions {
    pub components: ResearchComponents,
    pub config: ResearchConfig,
    pub research: ResearchOptions,
    pub session_id: Option<String>,
    /// Shared state to accumulate sources and images across sessions.
    pub state: Option<Arc<ResearchState>>,
    pub initial_context: Vec<(String, Value)>, // Pre-seeded context values
}

impl SessionOptions {
    pub fn new(
        components: ResearchComponents,
        config: ResearchConfig,
        research: ResearchOptions,
    ) -> Self {
        Self {
            components,
            config,
            research,
            session_id: None,
            state: None,
            initial_context: Vec::new(),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_state(mut self, state: Arc<ResearchState>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_initial_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.initial_context.push((key.into(), value));
        self
    }
}

/// Everything a finished session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: String,
    pub context: Vec<String>,
    pub sources: Vec<String>,
    pub images: Vec<ImageCandidate>,
    pub visited_urls: Vec<String>,
    pub summary: String,
}

/// Run the conduct-then-finalize workflow for one research task.
pub async fn run_research_session(
    components: ResearchComponents,
    config: ResearchConfig,
    research: ResearchOptions,
) -> Result<SessionOutcome> {
    run_research_session_with_options(SessionOptions::new(components, config, research)).await
}

/// Run the workflow with custom options (session ID, shared state, seeded context).
pub async fn run_research_session_with_options(options: SessionOptions) -> Result<SessionOutcome> {
    let state = options
        .state
        .clone()
        .unwrap_or_else(|| Arc::new(ResearchState::new()));
    let conduct = Arc::new(ConductResearchTask::new(
        options.components,
        options.config,
        state,
    ));
    let graph = build_graph(conduct.clone());

    let storage = Arc::new(InMemorySessionStorage::new());
    let runner = FlowRunner::new(graph, storage.clone());

    let session_id = options
        .session_id
        .unwrap_or_else(|| format!("session-{}", Uuid::new_v4()));
    let session = Session::new_from_task(session_id.clone(), conduct.id());

    session
        .context
        .set("query", options.research.query.clone())
        .await;
    session.context.set(OPTIONS_KEY, &options.research).await;
    for (key, value) in options.initial_context.iter() {
        session.context.set(key, value.clone()).await;
    }

    storage
        .save(session)
        .await
        .map_err(|err| anyhow!("failed to persist session: {err}"))?;

    loop {
        let result = runner
            .run(&session_id)
            .await
            .map_err(|err| anyhow!("graph execution failure: {err}"))?;

        match result.status {
            ExecutionStatus::Completed => break,
            ExecutionStatus::Error(message) => return Err(anyhow!(message)),
            ExecutionStatus::WaitingForInput => continue,
        }
    }

    let session = storage
        .get(&session_id)
        .await
        .map_err(|err| anyhow!("failed to reload session: {err}"))?
        .ok_or_else(|| anyhow!("session missing after execution"))?;

    if let Some(message) = session.context.get::<String>(ERROR_KEY).await {
        return Err(anyhow!(message));
    }

    Ok(SessionOutcome {
        session_id,
        context: session.context.get(CONTEXT_KEY).await.unwrap_or_default(),
        sources: session.context.get(SOURCES_KEY).await.unwrap_or_default(),
        images: session.context.get(IMAGES_KEY).await.unwrap_or_default(),
        visited_urls: session
            .context
            .get(VISITED_URLS_KEY)
            .await
            .unwrap_or_default(),
        summary: session
            .context
            .get(SUMMARY_KEY)
            .await
            .unwrap_or_else(|| "No final summary recorded".to_string()),
    })
}
