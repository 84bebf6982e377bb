//! Reviewer agent that critiques drafts against a guideline list.

use std::sync::Arc;

use anyhow::Context;
use conductor_core::{
    ChatMessage, LlmClient, NoopProgress, ProgressEvent, ProgressKind, ProgressSink,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const SYSTEM_PROMPT: &str = "You are an expert research article reviewer. \
Your goal is to review research drafts and provide feedback to the reviser only based on specific guidelines.";

/// Marker the model returns when the draft needs no further changes.
const ACCEPT_MARKER: &str = "None";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewTask {
    pub guidelines: Vec<String>,
    pub follow_guidelines: bool,
    pub verbose: bool,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftState {
    pub task: ReviewTask,
    pub draft: String,
    /// Reviser feedback from the previous round, if any.
    pub revision_notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    /// `None` when the draft is accepted or guidelines are not enforced.
    pub review: Option<String>,
}

pub struct ReviewerAgent {
    llm: Arc<dyn LlmClient>,
    progress: Arc<dyn ProgressSink>,
}

impl ReviewerAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn build_messages(draft_state: &DraftState) -> Vec<ChatMessage> {
        let guidelines = draft_state
            .task
            .guidelines
            .iter()
            .map(|guideline| format!("- {guideline}"))
            .collect::<Vec<_>>()
            .join("\n");

        let revise_prompt = match draft_state.revision_notes.as_deref() {
            Some(notes) if !notes.trim().is_empty() => format!(
                "The reviser has already revised the draft based on your previous review notes with the following feedback:\n\
                 {notes}\n\n\
                 Please provide additional feedback ONLY if critical since the reviser has already made changes based on your previous feedback.\n\
                 If you think the article is sufficient or that non critical revisions are required, please aim to return None.\n"
            ),
            _ => String::new(),
        };

        let review_prompt = format!(
            "You have been tasked with reviewing the draft which was written by a non-expert based on specific guidelines.\n\
             Please accept the draft if it is good enough to publish, or send it for revision, along with your notes to guide the revision.\n\
             If not all of the guideline criteria are met, you should send appropriate revision notes.\n\
             If the draft meets all the guidelines, please return None.\n\
             {revise_prompt}\n\
             Guidelines:\n{guidelines}\n\
             Draft: {draft}\n",
            draft = draft_state.draft,
        );

        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(review_prompt),
        ]
    }

    /// Ask the model for review notes; `Ok(None)` means the draft is accepted.
    pub async fn review_draft(&self, draft_state: &DraftState) -> anyhow::Result<Option<String>> {
        let messages = Self::build_messages(draft_state);
        debug!(model = ?draft_state.task.model, "requesting draft review");

        let response = self
            .llm
            .complete(&messages)
            .await
            .context("reviewer model call failed")?;

        if draft_state.task.verbose {
            self.progress.emit(ProgressEvent::new(
                ProgressKind::ReviewFeedback,
                format!("Review feedback is: {response}..."),
            ));
        }

        if response.contains(ACCEPT_MARKER) {
            return Ok(None);
        }
        Ok(Some(response))
    }

    pub async fn run(&self, draft_state: &DraftState) -> anyhow::Result<ReviewOutcome> {
        if !draft_state.task.follow_guidelines {
            info!("ignoring guidelines");
            return Ok(ReviewOutcome::default());
        }

        info!(
            guidelines = draft_state.task.guidelines.len(),
            "reviewing draft"
        );
        let review = self.review_draft(draft_state).await?;
        Ok(ReviewOutcome { review })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_core::ChannelProgress;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedLlm {
        response: String,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<Vec<ChatMessage>>>,
    }

    impl CannedLlm {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(messages.to_vec());
            Ok(self.response.clone())
        }
    }

    fn draft(follow: bool, notes: Option<&str>) -> DraftState {
        DraftState {
            task: ReviewTask {
                guidelines: vec!["Cite sources".into(), "Use APA format".into()],
                follow_guidelines: follow,
                verbose: true,
                model: Some("gpt-4o".into()),
            },
            draft: "Battery costs fell sharply.".into(),
            revision_notes: notes.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_review_returns_notes() {
        let llm = CannedLlm::new("Add citations for the cost figures.");
        let (progress, mut receiver) = ChannelProgress::new();
        let agent = ReviewerAgent::new(llm.clone()).with_progress(Arc::new(progress));

        let outcome = agent.run(&draft(true, None)).await.unwrap();
        assert_eq!(
            outcome.review.as_deref(),
            Some("Add citations for the cost figures.")
        );

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.kind, ProgressKind::ReviewFeedback);

        let prompt = llm.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt[1].content.contains("- Cite sources\n- Use APA format"));
        assert!(!prompt[1].content.contains("already revised"));
    }

    #[tokio::test]
    async fn test_accepting_response_yields_none() {
        let agent = ReviewerAgent::new(CannedLlm::new("None"));
        let review = agent
            .review_draft(&draft(true, Some("fixed the intro")))
            .await
            .unwrap();
        assert!(review.is_none());
    }

    #[tokio::test]
    async fn test_revision_notes_are_included() {
        let llm = CannedLlm::new("Tighten the conclusion.");
        let agent = ReviewerAgent::new(llm.clone());
        agent
            .review_draft(&draft(true, Some("fixed the intro")))
            .await
            .unwrap();

        let prompt = llm.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt[1].content.contains("fixed the intro"));
        assert!(prompt[1].content.contains("ONLY if critical"));
    }

    #[tokio::test]
    async fn test_guidelines_not_followed_skips_model() {
        let llm = CannedLlm::new("unused");
        let agent = ReviewerAgent::new(llm.clone());

        let outcome = agent.run(&draft(false, None)).await.unwrap();
        assert_eq!(outcome, ReviewOutcome::default());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }
}
