use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use tracing::{error, info, instrument};

use crate::conductor::{ResearchComponents, ResearchConductor, ResearchOptions};
use crate::config::ResearchConfig;
use crate::images::ImageCandidate;
use crate::state::ResearchState;

pub const OPTIONS_KEY: &str = "research.options";
pub const CONTEXT_KEY: &str = "research.context";
pub const SOURCES_KEY: &str = "research.sources";
pub const IMAGES_KEY: &str = "research.images";
pub const VISITED_URLS_KEY: &str = "research.visited_urls";
pub const ERROR_KEY: &str = "research.error";
pub const SUMMARY_KEY: &str = "final.summary";

/// Runs the conductor and writes its results into the session context.
///
/// Conductor failures end the graph with the error recorded under
/// [`ERROR_KEY`] instead of failing the task.
pub struct ConductResearchTask {
    components: ResearchComponents,
    config: ResearchConfig,
    state: Arc<ResearchState>,
}

impl ConductResearchTask {
    pub fn new(
        components: ResearchComponents,
        config: ResearchConfig,
        state: Arc<ResearchState>,
    ) -> Self {
        Self {
            components,
            config,
            state,
        }
    }
}

#[async_trait]
impl Task for ConductResearchTask {
    fn id(&self) -> &str {
        "conduct"
    }

    #[instrument(name = "task.conduct", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let options: ResearchOptions = match context.get(OPTIONS_KEY).await {
            Some(options) => options,
            None => ResearchOptions::new(context.get::<String>("query").await.unwrap_or_default()),
        };
        let query = options.query.clone();

        let mut conductor = ResearchConductor::with_state(
            self.components.clone(),
            self.config.clone(),
            self.state.clone(),
        );

        match conductor.conduct_research(options).await {
            Ok(research_context) => {
                let sources: Vec<String> = self
                    .state
                    .sources()
                    .await
                    .into_iter()
                    .map(|doc| doc.url)
                    .collect();
                let images: Vec<ImageCandidate> = self.state.images().await;
                let visited = self.state.visited_urls().snapshot();

                info!(
                    %query,
                    elements = research_context.len(),
                    sources = sources.len(),
                    images = images.len(),
                    "conduct task completed"
                );

                context.set(CONTEXT_KEY, &research_context).await;
                context.set(SOURCES_KEY, &sources).await;
                context.set(IMAGES_KEY, &images).await;
                context.set(VISITED_URLS_KEY, &visited).await;

                Ok(TaskResult::new(
                    Some(format!("Research gathered for \"{}\"", query)),
                    NextAction::ContinueAndExecute,
                ))
            }
            Err(err) => {
                error!(%query, error = %err, "research failed");
                context.set(ERROR_KEY, err.to_string()).await;
                Ok(TaskResult::new(
                    Some(format!("Research failed for \"{}\"", query)),
                    NextAction::End,
                ))
            }
        }
    }
}

#[derive(Default)]
pub struct FinalizeTask;

#[async_trait]
impl Task for FinalizeTask {
    fn id(&self) -> &str {
        "finalize"
    }

    #[instrument(name = "task.finalize", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let options: Option<ResearchOptions> = context.get(OPTIONS_KEY).await;
        let query = match options {
            Some(options) => options.query,
            None => context.get::<String>("query").await.unwrap_or_default(),
        };
        let research_context: Vec<String> = context.get(CONTEXT_KEY).await.unwrap_or_default();
        let sources: Vec<String> = context.get(SOURCES_KEY).await.unwrap_or_default();

        let summary = format!(
            "Research for \"{query}\" produced {} context elements ({} chars).\nSources:\n{}",
            research_context.len(),
            research_context.iter().map(String::len).sum::<usize>(),
            if sources.is_empty() {
                "  (none recorded)".to_string()
            } else {
                sources
                    .iter()
                    .enumerate()
                    .map(|(idx, src)| format!("  {}. {}", idx + 1, src))
                    .collect::<Vec<_>>()
                    .join("\n")
            },
        );

        context.set(SUMMARY_KEY, summary.clone()).await;
        info!(elements = research_context.len(), "finalize task completed");

        Ok(TaskResult::new(Some(summary), NextAction::End))
    }
}
