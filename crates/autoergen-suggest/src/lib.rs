pub mod cache;
pub mod engine;
mod error;
pub mod parse;
pub mod prompt;

use std::sync::Arc;
use std::time::{Duration, Instant};

use autoergen_core::{schema, Diagram, DiagramStyle, ErSpec, LogSink, NewLogEntry, Settings};

pub use cache::{CachedGeneration, PromptCache};
pub use engine::{GenerationRequest, Generator, LlmGenerator};
pub use error::{GenerateError, ParseError};

/// Output of the markup pipeline: DOT written by the model.
#[derive(Debug, Clone)]
pub struct MarkupDraft {
    pub dot: String,
    pub raw: String,
    pub elapsed: Duration,
    pub cached: bool,
}

/// Output of the structured pipeline.
///
/// When the model's JSON could not be parsed, `spec` is empty and
/// `parse_error` says why.
#[derive(Debug, Clone)]
pub struct ErDraft {
    pub spec: ErSpec,
    pub parse_error: Option<ParseError>,
    pub raw: String,
    pub elapsed: Duration,
    pub cached: bool,
}

impl ErDraft {
    pub fn diagram(&self) -> Diagram {
        Diagram::from_spec(&self.spec)
    }

    pub fn dot(&self, style: &DiagramStyle) -> String {
        self.diagram().to_dot(style)
    }

    pub fn sql(&self) -> String {
        schema::synthesize(&self.spec)
    }
}

struct Journal {
    sink: Arc<dyn LogSink>,
    project_id: u64,
}

/// Runs both generation pipelines against one generator.
///
/// Holds everything a request needs (generator, prompt cache, sampling
/// temperature, diagram style and an optional log journal) so nothing lives in
/// process-wide state.
pub struct Architect {
    generator: Arc<dyn Generator>,
    cache: Option<PromptCache>,
    temperature: f32,
    style: DiagramStyle,
    journal: Option<Journal>,
}

impl Architect {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            cache: None,
            temperature: 0.2,
            style: DiagramStyle::default(),
            journal: None,
        }
    }

    /// Provider client, cache and style as configured in `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, GenerateError> {
        if !(0.0..=1.0).contains(&settings.temperature) {
            return Err(GenerateError::InvalidTemperature(settings.temperature));
        }
        let generator = LlmGenerator::from_settings(settings)?;
        let mut architect = Self::new(Arc::new(generator))
            .with_temperature(settings.temperature)
            .with_style(settings.diagram.clone());
        if settings.cache_ttl_secs > 0 {
            architect = architect.with_cache(PromptCache::new(Duration::from_secs(
                settings.cache_ttl_secs,
            )));
        }
        Ok(architect)
    }

    pub fn with_cache(mut self, cache: PromptCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_style(mut self, style: DiagramStyle) -> Self {
        self.style = style;
        self
    }

    /// Record every successful generation to `sink` under `project_id`.
    pub fn with_journal(mut self, sink: Arc<dyn LogSink>, project_id: u64) -> Self {
        self.journal = Some(Journal { sink, project_id });
        self
    }

    pub fn style(&self) -> &DiagramStyle {
        &self.style
    }

    pub fn cache(&self) -> Option<&PromptCache> {
        self.cache.as_ref()
    }

    /// Ask the model for DOT directly.
    pub async fn draft_markup(&self, description: &str) -> Result<MarkupDraft, GenerateError> {
        ensure_description(description)?;
        let request = prompt::markup_request(description, self.temperature);
        let (generation, cached) = self.generate(&request).await?;

        let dot = parse::normalize_markup(&generation.text);
        self.record(description, &dot, generation.elapsed);
        Ok(MarkupDraft {
            dot,
            raw: generation.text,
            elapsed: generation.elapsed,
            cached,
        })
    }

    /// Ask the model for an ER specification as JSON. Unparseable output
    /// yields an empty specification rather than an error.
    pub async fn draft_er(&self, description: &str) -> Result<ErDraft, GenerateError> {
        ensure_description(description)?;
        let request = prompt::structured_request(description, self.temperature);
        let (generation, cached) = self.generate(&request).await?;

        let (spec, parse_error) = parse::parse_er_spec_or_empty(&generation.text);
        self.record(description, &generation.text, generation.elapsed);
        tracing::info!(
            entities = spec.entities().len(),
            relationships = spec.relationships().len(),
            cached,
            "ER specification drafted"
        );
        Ok(ErDraft {
            spec,
            parse_error,
            raw: generation.text,
            elapsed: generation.elapsed,
            cached,
        })
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<(CachedGeneration, bool), GenerateError> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&request.user)) {
            tracing::debug!("prompt served from cache");
            return Ok((hit, true));
        }

        let start = Instant::now();
        let text = self.generator.generate(request).await.inspect_err(|e| {
            tracing::warn!(error = %e, "generation failed");
        })?;
        if text.trim().is_empty() {
            return Err(GenerateError::Empty);
        }
        let generation = CachedGeneration {
            text,
            elapsed: start.elapsed(),
        };
        tracing::debug!(elapsed_ms = generation.elapsed.as_millis() as u64, "generation finished");

        if let Some(cache) = &self.cache {
            cache.insert(request.user.clone(), generation.clone());
        }
        Ok((generation, false))
    }

    fn record(&self, prompt: &str, response: &str, elapsed: Duration) {
        let Some(journal) = &self.journal else {
            return;
        };
        let entry = NewLogEntry {
            project_id: journal.project_id,
            user_prompt: prompt.to_string(),
            llm_response: response.to_string(),
            execution_time: elapsed.as_secs_f64(),
        };
        if let Err(e) = journal.sink.append_log(entry) {
            tracing::warn!(error = %e, project_id = journal.project_id, "failed to record generation");
        }
    }
}

fn ensure_description(description: &str) -> Result<(), GenerateError> {
    if description.trim().is_empty() {
        return Err(GenerateError::EmptyDescription);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoergen_core::{LogEntry, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns a fixed reply and counts calls.
    struct Scripted {
        reply: Result<String, fn() -> GenerateError>,
        calls: AtomicUsize,
        last: Mutex<Option<GenerationRequest>>,
    }

    impl Scripted {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn err(make: fn() -> GenerateError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(make),
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Generator for Scripted {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    #[derive(Default)]
    struct MemorySink {
        entries: Mutex<Vec<NewLogEntry>>,
        fail: bool,
    }

    impl LogSink for MemorySink {
        fn append_log(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError> {
            if self.fail {
                return Err(StoreError::NotFound {
                    entity: "project",
                    id: entry.project_id,
                });
            }
            let mut entries = self.entries.lock().unwrap();
            entries.push(entry.clone());
            Ok(LogEntry {
                id: entries.len() as u64,
                project_id: entry.project_id,
                user_prompt: entry.user_prompt,
                llm_response: entry.llm_response,
                execution_time: entry.execution_time,
                created_at: chrono::Utc::now(),
            })
        }
    }

    const SHOP_JSON: &str = r#"{"entities": ["Customer","Order"], "relationships": [{"from":"Customer","to":"Order","relation":"places"}]}"#;

    #[tokio::test]
    async fn test_blank_description_never_calls_generator() {
        let generator = Scripted::ok("digraph {}");
        let architect = Architect::new(generator.clone());
        for blank in ["", "   ", "\n\t "] {
            assert!(matches!(
                architect.draft_markup(blank).await,
                Err(GenerateError::EmptyDescription)
            ));
            assert!(matches!(
                architect.draft_er(blank).await,
                Err(GenerateError::EmptyDescription)
            ));
        }
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_markup_fence_is_stripped() {
        let generator = Scripted::ok("```dot\ndigraph { A -> B }\n```");
        let architect = Architect::new(generator.clone()).with_temperature(0.1);
        let draft = architect.draft_markup("A relates to B").await.unwrap();
        assert_eq!(draft.dot, "digraph { A -> B }");
        assert!(!draft.cached);

        let sent = generator.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.user, "A relates to B");
        assert_eq!(sent.temperature, 0.1);
    }

    #[tokio::test]
    async fn test_empty_generation_is_error() {
        let architect = Architect::new(Scripted::ok(""));
        assert!(matches!(
            architect.draft_markup("Customers place Orders").await,
            Err(GenerateError::Empty)
        ));
        let architect = Architect::new(Scripted::ok("  \n"));
        assert!(matches!(
            architect.draft_er("Customers place Orders").await,
            Err(GenerateError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let architect = Architect::new(Scripted::err(|| {
            GenerateError::Failed("chat: connection refused".into())
        }));
        match architect.draft_er("Customers place Orders").await {
            Err(GenerateError::Failed(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_structured_pipeline() {
        let architect = Architect::new(Scripted::ok(SHOP_JSON));
        let draft = architect.draft_er("Customers place Orders").await.unwrap();
        assert!(draft.parse_error.is_none());

        let diagram = draft.diagram();
        assert_eq!(diagram.nodes.len(), 2);
        assert_eq!(diagram.edges.len(), 1);
        assert_eq!(diagram.edges[0].label, "places");

        let sql = draft.sql();
        assert!(sql.contains("CREATE TABLE Customer ("));
        assert!(sql.contains("CREATE TABLE Order ("));
        assert!(sql.contains("ALTER TABLE Customer ADD COLUMN order_id INT REFERENCES Order(id);"));
    }

    #[tokio::test]
    async fn test_unparseable_structured_output_degrades() {
        let architect = Architect::new(Scripted::ok("I'm sorry, I can't do that."));
        let draft = architect.draft_er("Customers place Orders").await.unwrap();
        assert!(draft.spec.is_empty());
        assert!(draft.parse_error.is_some());
        assert_eq!(draft.sql(), "");
    }

    #[tokio::test]
    async fn test_cache_serves_identical_prompt() {
        let generator = Scripted::ok(SHOP_JSON);
        let architect = Architect::new(generator.clone())
            .with_cache(PromptCache::new(Duration::from_secs(3600)));

        let first = architect.draft_er("Customers place Orders").await.unwrap();
        let second = architect.draft_er("Customers place Orders").await.unwrap();
        let third = architect.draft_er("customers place orders").await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert!(!third.cached);
        assert_eq!(second.elapsed, first.elapsed);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_pipelines_do_not_share_cache_entries() {
        let generator = Scripted::ok(SHOP_JSON);
        let architect = Architect::new(generator.clone())
            .with_cache(PromptCache::new(Duration::from_secs(3600)));
        architect.draft_er("Customers place Orders").await.unwrap();
        architect.draft_markup("Customers place Orders").await.unwrap();
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_journal_records_each_success() {
        let sink = Arc::new(MemorySink::default());
        let architect = Architect::new(Scripted::ok("```\ndigraph {}\n```"))
            .with_cache(PromptCache::new(Duration::from_secs(60)))
            .with_journal(sink.clone(), 3);

        architect.draft_markup("Customers place Orders").await.unwrap();
        architect.draft_markup("Customers place Orders").await.unwrap();

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].project_id, 3);
        assert_eq!(entries[0].user_prompt, "Customers place Orders");
        assert_eq!(entries[0].llm_response, "digraph {}");
    }

    #[tokio::test]
    async fn test_journal_failure_does_not_fail_request() {
        let sink = Arc::new(MemorySink {
            fail: true,
            ..MemorySink::default()
        });
        let architect = Architect::new(Scripted::ok(SHOP_JSON)).with_journal(sink, 9);
        assert!(architect.draft_er("Customers place Orders").await.is_ok());
    }

    #[test]
    fn test_from_settings_rejects_bad_temperature() {
        let settings = Settings {
            temperature: -0.5,
            ..Settings::default()
        };
        assert!(matches!(
            Architect::from_settings(&settings),
            Err(GenerateError::InvalidTemperature(_))
        ));
    }

    #[test]
    fn test_from_settings_zero_ttl_disables_cache() {
        let settings = Settings {
            cache_ttl_secs: 0,
            ..Settings::default()
        };
        assert!(Architect::from_settings(&settings).unwrap().cache().is_none());
    }
}
