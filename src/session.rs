//! Session state and the actions that drive it.
//!
//! All mutable state for one interactive session lives in [`SessionState`],
//! passed by `&mut` into each [`Scout`] action. A new extraction cycle calls
//! [`SessionState::reset`] once its page is fetched. An action that fails leaves
//! whatever earlier actions produced (records, knowledge base, saved
//! routines) untouched.

use crate::answer::{self, AnswerOptions};
use crate::api::{Embed, Generate};
use crate::config::AppConfig;
use crate::error::ActionError;
use crate::executor;
use crate::fetch::{FetchMode, PageFetcher};
use crate::knowledge::{self, KnowledgeBase};
use crate::models::{ArticleRecord, ConversationMessage, FetchedPage};
use crate::pipeline;
use crate::registry::ScraperRegistry;
use crate::utils::domain_of;
use tracing::{info, instrument, warn};

/// Everything one session knows.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Registry key for the site being processed.
    pub current_domain: Option<String>,
    /// Most recently fetched page.
    pub page: Option<FetchedPage>,
    /// Generated or edited routine waiting for approval.
    pub pending_routine: Option<String>,
    /// Output of the last successful routine run.
    pub records: Option<Vec<ArticleRecord>>,
    pub knowledge: Option<KnowledgeBase>,
    pub messages: Vec<ConversationMessage>,
}

impl SessionState {
    /// Forget everything from the previous extraction cycle.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn records(&self) -> &[ArticleRecord] {
        self.records.as_deref().unwrap_or_default()
    }
}

/// What starting a cycle led to.
#[derive(Debug)]
pub enum CycleOutcome {
    /// A saved routine was run; records and knowledge base are ready.
    Reused { records: usize, indexed: usize },
    /// A new routine was generated and awaits review in `pending_routine`.
    NeedsApproval,
    /// The saved routine failed or found nothing. It is back in
    /// `pending_routine` so it can be edited or regenerated.
    SavedRoutineFailed(String),
    /// Inference gave up; nothing to review.
    InferenceFailed,
}

/// The scout's collaborators, wired together.
pub struct Scout<G, E> {
    pub model: G,
    pub embedder: E,
    pub fetcher: PageFetcher,
    pub registry: ScraperRegistry,
    pub config: AppConfig,
}

impl<G: Generate, E: Embed> Scout<G, E> {
    /// Fetch `url` and either reuse its saved routine or generate a new one.
    ///
    /// The previous cycle's state is only dropped once the new page has been
    /// fetched; a bad URL or a failed fetch leaves it untouched.
    #[instrument(level = "info", skip(self, state))]
    pub async fn start_cycle(
        &self,
        state: &mut SessionState,
        url: &str,
        mode: FetchMode,
        force_regenerate: bool,
    ) -> Result<CycleOutcome, ActionError> {
        let domain = match url::Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => domain_of(url),
            _ => None,
        }
        .ok_or_else(|| ActionError::InvalidUrl(url.to_string()))?;

        let page = self.fetcher.fetch(url, mode).await?;
        state.reset();
        state.current_domain = Some(domain);
        self.process_page(state, page, force_regenerate).await
    }

    /// Second half of [`Scout::start_cycle`], once the page is in hand.
    pub async fn process_page(
        &self,
        state: &mut SessionState,
        page: FetchedPage,
        force_regenerate: bool,
    ) -> Result<CycleOutcome, ActionError> {
        let domain = match &state.current_domain {
            Some(d) => d.clone(),
            None => {
                let d = domain_of(&page.url).ok_or_else(|| ActionError::InvalidUrl(page.url.clone()))?;
                state.current_domain = Some(d.clone());
                d
            }
        };
        state.page = Some(page);

        let saved = if force_regenerate {
            None
        } else {
            self.registry.get(&domain)
        };

        let Some(routine) = saved else {
            info!(%domain, force_regenerate, "Generating new scraper");
            return Ok(if self.regenerate(state).await? {
                CycleOutcome::NeedsApproval
            } else {
                CycleOutcome::InferenceFailed
            });
        };

        info!(%domain, "Running saved scraper");
        let reason = match self.test_routine(state, &routine) {
            Ok(0) => "saved scraper found no articles".to_string(),
            Ok(records) => {
                let indexed = self.build_knowledge(state).await?;
                return Ok(CycleOutcome::Reused { records, indexed });
            }
            Err(ActionError::Execution(e)) => e.to_string(),
            Err(e) => return Err(e),
        };
        warn!(%domain, %reason, "Saved scraper needs review");
        state.pending_routine = Some(routine);
        state.records = None;
        Ok(CycleOutcome::SavedRoutineFailed(reason))
    }

    /// Infer a fresh routine for the current page into `pending_routine`.
    ///
    /// Returns `false` when inference gave up; the previous pending routine
    /// and records are kept in that case.
    pub async fn regenerate(&self, state: &mut SessionState) -> Result<bool, ActionError> {
        let page = state
            .page
            .as_ref()
            .ok_or(ActionError::NotReady("fetch a page first"))?;
        match pipeline::infer(&self.model, &page.html, &page.url, &self.config.pipeline).await {
            Some(routine) => {
                self.edit_pending(state, routine);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run `routine_source` against the current page and keep the records.
    ///
    /// On failure the previous records stay in place.
    pub fn test_routine(
        &self,
        state: &mut SessionState,
        routine_source: &str,
    ) -> Result<usize, ActionError> {
        let page = state
            .page
            .as_ref()
            .ok_or(ActionError::NotReady("fetch a page first"))?;
        let records = executor::execute(&page.html, routine_source, Some(&page.url))?;
        let count = records.len();
        state.records = Some(records);
        Ok(count)
    }

    /// Replace the pending routine with an edited version. Its output must
    /// be re-tested before it can be approved.
    pub fn edit_pending(&self, state: &mut SessionState, routine_source: String) {
        state.pending_routine = Some(routine_source);
        state.records = None;
    }

    /// Persist the pending routine and build the knowledge base from its
    /// output. Requires a test run that produced at least one record.
    #[instrument(level = "info", skip_all, fields(domain = ?state.current_domain))]
    pub async fn approve(&self, state: &mut SessionState) -> Result<usize, ActionError> {
        let domain = state
            .current_domain
            .clone()
            .ok_or(ActionError::NotReady("no site in progress"))?;
        let routine = state
            .pending_routine
            .clone()
            .ok_or(ActionError::NotReady("no routine waiting for approval"))?;
        if state.records().is_empty() {
            return Err(ActionError::NotReady(
                "test the routine and get at least one record before saving",
            ));
        }

        self.registry.save(&domain, &routine)?;
        state.pending_routine = None;
        self.build_knowledge(state).await
    }

    /// Rebuild the knowledge base from the current records. A failed build
    /// keeps the previous knowledge base.
    pub async fn build_knowledge(&self, state: &mut SessionState) -> Result<usize, ActionError> {
        let kb = knowledge::build(&self.embedder, state.records(), &self.config.knowledge).await?;
        let indexed = kb.len();
        state.knowledge = Some(kb);
        Ok(indexed)
    }

    /// Answer a question and record both turns in the conversation.
    pub async fn ask(&self, state: &mut SessionState, question: &str) -> Result<String, ActionError> {
        let kb = state
            .knowledge
            .as_ref()
            .ok_or(ActionError::NotReady("build the knowledge base first"))?;
        let options = AnswerOptions {
            top_k: self.config.knowledge.top_k,
            language: &self.config.answer_language,
        };
        let reply = answer::answer(
            &self.model,
            &self.embedder,
            question,
            kb,
            state.records(),
            &options,
        )
        .await?;

        state.messages.push(ConversationMessage::user(question));
        state.messages.push(ConversationMessage::assistant(reply.clone()));
        Ok(reply)
    }
}
