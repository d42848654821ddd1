//! Query planning and answer synthesis
//!
//! A query moves through [`QueryState`]: a filter is decided, the store is
//! searched, and the completion model answers from the retrieved passages.
//! External errors fail the query immediately; nothing is retried.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::errors::{RagError, Result};
use crate::filter::{parse_llm_reply, FilterParser, FilterPredicate, MetadataSchema};
use crate::planner::context::{AssembledContext, ContextBuilder, ContextConfig};
use crate::planner::state::{QueryEvent, QueryState};
use crate::providers::{EmbeddingProvider, TextCompletionProvider};
use crate::store::VectorStoreGateway;
use crate::types::{DataQualityWarning, PipelineStep, QueryResult};

pub const DEFAULT_TOP_K: usize = 5;

/// How filters are derived from free-text queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Deterministic grammar match against the schema
    #[default]
    Rules,
    /// Ask the completion model for a predicate
    Llm,
}

/// Query planner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub index: String,
    pub top_k: usize,
    pub enable_filter: bool,
    pub filter_mode: FilterMode,
    /// Fields a filter may reference
    pub schema: MetadataSchema,
    pub context: ContextConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            index: "metarag".to_string(),
            top_k: DEFAULT_TOP_K,
            enable_filter: true,
            filter_mode: FilterMode::Rules,
            schema: MetadataSchema::new(),
            context: ContextConfig::default(),
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.index.trim().is_empty() {
            return Err(RagError::Config("index name must not be empty".to_string()));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Everything a finished query produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    pub filter: Option<FilterPredicate>,
    pub results: Vec<QueryResult>,
    /// `None` for retrieval-only queries
    pub answer: Option<String>,
    pub state: QueryState,
    pub warnings: Vec<DataQualityWarning>,
}

impl QueryOutcome {
    fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            filter: None,
            results: Vec::new(),
            answer: None,
            state: QueryState::Received,
            warnings: Vec::new(),
        }
    }

    fn advance(&mut self, event: QueryEvent) -> Result<()> {
        self.state = self.state.transition(event)?;
        debug!(state = self.state.display_name(), "query state");
        Ok(())
    }

    fn warn(&mut self, warning: DataQualityWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// A query that ended in [`QueryState::Failed`]
#[derive(Debug, Error)]
#[error("query failed during {step}: {error}")]
pub struct QueryFailure {
    /// Partial outcome; `state` is `Failed`
    pub outcome: QueryOutcome,
    pub step: PipelineStep,
    #[source]
    pub error: RagError,
}

/// Build the filter-construction prompt
pub fn filter_prompt(query: &str, schema: &MetadataSchema) -> String {
    format!(
        "You translate search questions into metadata filters.\n\n\
         Available fields:\n{}\n\n\
         Reply with one JSON object and nothing else. Allowed shapes:\n\
         {{\"kind\": \"compare\", \"field\": \"<field>\", \"op\": \"==|!=|>|>=|<|<=\", \"value\": <value>}}\n\
         {{\"kind\": \"regex\", \"field\": \"<field>\", \"pattern\": \"<regex>\"}}\n\
         {{\"kind\": \"range\", \"field\": \"<field>\", \"min\": <number>, \"max\": <number>}}\n\
         {{\"kind\": \"in\", \"field\": \"<field>\", \"values\": [<value>, ...]}}\n\
         {{\"kind\": \"and\" | \"or\", \"predicates\": [<filter>, ...]}}\n\
         {{\"kind\": \"not\", \"predicate\": <filter>}}\n\n\
         If the question does not restrict any listed field, reply with the single word none.\n\n\
         Question: {}\nFilter:",
        schema.describe(),
        query
    )
}

/// Build the answer prompt
pub fn synthesis_prompt(query: &str, context: &AssembledContext) -> String {
    let context_text = if context.is_empty() {
        "No context was retrieved."
    } else {
        context.text.as_str()
    };

    format!(
        "Answer the question using only the context below. \
         If the context does not contain the information needed, say explicitly \
         that the provided context is insufficient to answer. Do not guess.\n\n\
         {}\n\n\
         Question: {}\nAnswer:",
        context_text, query
    )
}

/// Plans and answers queries against one index
pub struct QueryPlanner {
    config: PlannerConfig,
    parser: FilterParser,
    context: ContextBuilder,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn TextCompletionProvider>,
    store: Arc<dyn VectorStoreGateway>,
}

impl QueryPlanner {
    pub fn new(
        config: PlannerConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn TextCompletionProvider>,
        store: Arc<dyn VectorStoreGateway>,
    ) -> Result<Self> {
        config.validate()?;
        let parser = FilterParser::new(config.schema.clone());
        let context = ContextBuilder::with_config(config.context.clone());

        Ok(Self {
            config,
            parser,
            context,
            embedder,
            completion,
            store,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Decide the filter for a query.
    ///
    /// A filter that cannot be constructed degrades to pure semantic search
    /// and is reported as a warning. Completion errors are returned.
    pub async fn plan_filter(
        &self,
        query: &str,
    ) -> Result<(Option<FilterPredicate>, Option<DataQualityWarning>)> {
        if !self.config.enable_filter {
            return Ok((None, None));
        }

        match self.config.filter_mode {
            FilterMode::Rules => Ok((self.parser.extract(query), None)),
            FilterMode::Llm => {
                let reply = self
                    .completion
                    .complete(&filter_prompt(query, &self.config.schema))
                    .await?;
                debug!(reply = %reply.trim(), "filter reply");

                let candidate = parse_llm_reply(&reply).and_then(|predicate| {
                    if let Some(p) = &predicate {
                        p.validate(&self.config.schema)?;
                    }
                    Ok(predicate)
                });

                match candidate {
                    Ok(predicate) => Ok((predicate, None)),
                    Err(e) => Ok((None, Some(DataQualityWarning::FilterDiscarded { reason: e.to_string() }))),
                }
            }
        }
    }

    /// Embed the query and search the index
    pub async fn retrieve(&self, query: &str, filter: Option<&FilterPredicate>) -> Result<Vec<QueryResult>> {
        let vector = self.embedder.embed_one(query).await?;
        if vector.len() != self.embedder.dimension() {
            return Err(RagError::integration(
                PipelineStep::Retrieve,
                None,
                format!(
                    "query vector has dimension {}, embedder declares {}",
                    vector.len(),
                    self.embedder.dimension()
                ),
            ));
        }

        let results = self
            .store
            .query(&self.config.index, &vector, filter, self.config.top_k)
            .await?;
        if results.len() > self.config.top_k {
            return Err(RagError::integration(
                PipelineStep::Retrieve,
                None,
                format!("store returned {} results for top_k {}", results.len(), self.config.top_k),
            ));
        }
        Ok(results)
    }

    /// Answer from the given results
    pub async fn synthesize(&self, query: &str, results: &[QueryResult]) -> Result<String> {
        let context = self.context.build(results);
        debug!(passages = context.passage_count, chars = context.char_count, "context assembled");

        let answer = self.completion.complete(&synthesis_prompt(query, &context)).await?;
        Ok(answer.trim().to_string())
    }

    /// Filter, retrieve and synthesize
    pub async fn answer(&self, query: &str) -> Result<QueryOutcome> {
        self.run(query, true).await.map_err(|failure| failure.error)
    }

    /// Filter and retrieve without synthesis
    pub async fn search(&self, query: &str) -> Result<QueryOutcome> {
        self.run(query, false).await.map_err(|failure| failure.error)
    }

    /// Run a query, keeping the partial outcome when a step fails
    pub async fn run(&self, query: &str, synthesize: bool) -> std::result::Result<QueryOutcome, QueryFailure> {
        let mut outcome = QueryOutcome::new(query);

        match self.run_steps(&mut outcome, synthesize).await {
            Ok(()) => {
                info!(
                    index = %self.config.index,
                    hits = outcome.results.len(),
                    filtered = outcome.filter.is_some(),
                    "query complete"
                );
                Ok(outcome)
            }
            Err(error) => {
                let from = outcome.state;
                let step = from.pending_step().unwrap_or(PipelineStep::Synthesize);
                outcome.state = from.transition(QueryEvent::StepFailed).unwrap_or(QueryState::Failed);
                error!(from = from.display_name(), %step, error = %error, "query failed");
                Err(QueryFailure { outcome, step, error })
            }
        }
    }

    async fn run_steps(&self, outcome: &mut QueryOutcome, synthesize: bool) -> Result<()> {
        let query = outcome.query.clone();

        let (filter, warning) = self.plan_filter(&query).await?;
        if let Some(warning) = warning {
            outcome.warn(warning);
        }
        if let Some(f) = &filter {
            debug!(filter = %f, "filter constructed");
        }
        outcome.filter = filter;
        outcome.advance(QueryEvent::FilterReady)?;

        outcome.results = self.retrieve(&query, outcome.filter.as_ref()).await?;
        outcome.advance(QueryEvent::ResultsReturned)?;

        if synthesize {
            if outcome.results.is_empty() {
                outcome.warn(DataQualityWarning::EmptyContext { query: query.clone() });
            }
            outcome.answer = Some(self.synthesize(&query, &outcome.results).await?);
            outcome.advance(QueryEvent::AnswerGenerated)?;
        }

        outcome.advance(QueryEvent::Finish)
    }
}
