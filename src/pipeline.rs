use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;

use crate::chat::ConversationSession;
use crate::cli::{Mode, OutputFormat};
use crate::config::{EmbeddingBackend, Settings};
use crate::embed::{EmbeddingProvider, GeminiEmbeddingProvider, HashEmbeddingProvider};
use crate::error::{RagError, Result};
use crate::eval::{self, Evaluator};
use crate::gemini::GeminiTransport;
use crate::index::{IndexHandle, VectorIndex};
use crate::interactive;
use crate::llm::{GeminiClient, LanguageModel};
use crate::model::{Report, ScoredCandidate};
use crate::output::{self, RunOutput};
use crate::rerank::Reranker;
use crate::retrieval::Retriever;
use crate::store::DocumentStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    Inline(String),
    File(PathBuf),
    /// Read from the terminal.
    Prompt,
    /// Nothing given: search modes prompt, chatbot mode runs without one.
    Unspecified,
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub mode: Mode,
    pub job: JobSource,
    pub detailed_evaluation: bool,
    pub interactive: bool,
    pub skip_report: bool,
    pub format: OutputFormat,
}

impl RunRequest {
    /// Whether this run calls the language model at all.
    pub fn needs_llm(&self) -> bool {
        match self.mode {
            Mode::Chatbot => true,
            Mode::Full => self.detailed_evaluation || self.interactive,
            Mode::Search => false,
        }
    }
}

/// What a run produced, for callers that want more than the printed output.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub indexed: usize,
    pub candidates: Vec<ScoredCandidate>,
    pub report: Option<Report>,
}

pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>> {
    let dims = settings.embedding.effective_dimensions();
    match settings.embedding.backend {
        EmbeddingBackend::Hash => Ok(Arc::new(HashEmbeddingProvider::new(dims))),
        EmbeddingBackend::Gemini => {
            let transport = GeminiTransport::new(
                &settings.llm.endpoint,
                settings.require_api_key()?,
                settings.llm.request_timeout,
            )?;
            Ok(Arc::new(GeminiEmbeddingProvider::new(
                transport,
                &settings.embedding.model,
                dims,
                settings.retry_policy(),
            )))
        }
    }
}

pub fn build_llm(settings: &Settings) -> Result<Arc<dyn LanguageModel>> {
    let transport = GeminiTransport::new(
        &settings.llm.endpoint,
        settings.require_api_key()?,
        settings.llm.request_timeout,
    )?;
    Ok(Arc::new(GeminiClient::new(transport, &settings.llm.model)))
}

pub struct Pipeline {
    settings: Settings,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Option<Arc<dyn LanguageModel>>,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        Self {
            settings,
            embedder,
            llm,
        }
    }

    /// Build the providers the request needs; a missing API key surfaces here,
    /// before any work is done.
    pub fn from_settings(settings: Settings, request: &RunRequest) -> Result<Self> {
        settings.validate()?;
        let embedder = build_embedder(&settings)?;
        let llm = if request.needs_llm() {
            Some(build_llm(&settings)?)
        } else {
            None
        };
        Ok(Self::new(settings, embedder, llm))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn llm(&self) -> Result<Arc<dyn LanguageModel>> {
        self.llm.clone().ok_or_else(|| {
            RagError::Config("this run needs a language model but none is configured".to_string())
        })
    }

    pub async fn run<R, W>(
        &self,
        request: &RunRequest,
        input: &mut R,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        tracing::info!("Running in {:?} mode", request.mode);
        match request.mode {
            Mode::Full | Mode::Search => self.run_search(request, input, out, cancel).await,
            Mode::Chatbot => self.run_chatbot(request, input, out, cancel).await,
        }
    }

    /// Ingest the resume directory and embed every record. Zero usable
    /// documents is an error: there is nothing to rank. Returns the index and
    /// the number of skipped files.
    pub async fn build_index(&self) -> Result<(VectorIndex, usize)> {
        let store = DocumentStore::new(&self.settings.resume_dir, &self.settings.ingest.extensions);
        let ingest = store.load();
        if ingest.records.is_empty() {
            tracing::warn!("No resumes found in {}", store.root().display());
            return Err(RagError::EmptyIndex);
        }
        let skipped = ingest.skipped.len();
        let index = VectorIndex::build(ingest.records, self.embedder.as_ref()).await?;
        Ok((index, skipped))
    }

    async fn build_and_save(&self) -> Result<(VectorIndex, usize)> {
        let (index, skipped) = self.build_index().await?;
        index.save(&self.settings.index_path)?;
        Ok((index, skipped))
    }

    /// The persisted index if it matches the embedder, otherwise a fresh one
    /// built from the resume directory and saved.
    pub async fn open_index(&self) -> Result<VectorIndex> {
        let path = &self.settings.index_path;
        match VectorIndex::load_compatible(path, self.embedder.as_ref()) {
            Ok(index) if !index.is_empty() => Ok(index),
            Ok(_) => {
                tracing::warn!("Saved index at {} is empty; rebuilding", path.display());
                self.rebuild_or(RagError::EmptyIndex).await
            }
            Err(err @ RagError::IndexNotFound { .. }) => {
                tracing::warn!("{err}; building a new index");
                self.rebuild_or(err).await
            }
            Err(err) => Err(err),
        }
    }

    async fn rebuild_or(&self, original: RagError) -> Result<VectorIndex> {
        match self.build_and_save().await {
            Ok((index, _)) => Ok(index),
            Err(RagError::EmptyIndex) => Err(original),
            Err(err) => Err(err),
        }
    }

    async fn resolve_job_description<R, W>(
        &self,
        job: &JobSource,
        prompt_if_unspecified: bool,
        input: &mut R,
        out: &mut W,
    ) -> Result<Option<String>>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let text = match job {
            JobSource::Inline(text) => text.clone(),
            JobSource::File(path) => fs::read_to_string(path).map_err(|e| {
                RagError::InvalidArgument(format!("read job file {}: {e}", path.display()))
            })?,
            JobSource::Prompt => interactive::read_job_description(input, out).await?,
            JobSource::Unspecified if prompt_if_unspecified => {
                interactive::read_job_description(input, out).await?
            }
            JobSource::Unspecified => return Ok(None),
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(RagError::InvalidArgument(
                "job description is empty".to_string(),
            ));
        }
        Ok(Some(text))
    }

    async fn run_search<R, W>(
        &self,
        request: &RunRequest,
        input: &mut R,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let (index, skipped) = self.build_and_save().await?;
        let indexed = index.len();

        let job_description = self
            .resolve_job_description(&request.job, true, input, out)
            .await?
            .ok_or_else(|| RagError::InvalidArgument("job description is required".to_string()))?;

        let retriever = Retriever::new(IndexHandle::new(index), self.embedder.clone());
        let retrieved = retriever
            .retrieve(&job_description, self.settings.retrieval_config().top_k)
            .await?;
        let reranker = Reranker::new(self.settings.rerank_policy());
        let candidates = reranker.rerank(&retrieved, self.settings.rerank.top_n)?;
        tracing::info!(
            "Ranked {} candidate(s) out of {} retrieved",
            candidates.len(),
            retrieved.len()
        );

        let report = if request.mode == Mode::Full && request.detailed_evaluation {
            let evaluator = Evaluator::new(self.llm()?, self.settings.evaluator_config());
            Some(evaluator.evaluate(&candidates, &job_description, cancel).await?)
        } else {
            None
        };

        let summary = (!request.skip_report).then(|| eval::summarize(&candidates));
        output::print_run(
            out,
            request.format,
            &RunOutput {
                job_description: &job_description,
                indexed,
                skipped,
                match_reason: reranker.policy().describe(),
                summary: summary.as_deref(),
                report: report.as_ref(),
            },
        )?;

        if request.mode == Mode::Full && request.interactive && !cancel.is_cancelled() {
            let mut session = ConversationSession::new(
                retriever,
                self.llm()?,
                self.settings.chat_config(),
                Some(job_description),
            );
            interactive::run_chat_loop(&mut session, input, out, cancel).await?;
        }

        Ok(RunOutcome {
            indexed,
            candidates,
            report,
        })
    }

    async fn run_chatbot<R, W>(
        &self,
        request: &RunRequest,
        input: &mut R,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let index = self.open_index().await?;
        let indexed = index.len();
        let job_description = self
            .resolve_job_description(&request.job, false, input, out)
            .await?;
        if request.format == OutputFormat::Text {
            writeln!(out, "Loaded {indexed} candidate(s) for chat")?;
        }

        let retriever = Retriever::new(IndexHandle::new(index), self.embedder.clone());
        let mut session = ConversationSession::new(
            retriever,
            self.llm()?,
            self.settings.chat_config(),
            job_description,
        );
        interactive::run_chat_loop(&mut session, input, out, cancel).await?;

        Ok(RunOutcome {
            indexed,
            ..RunOutcome::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use tempfile::tempdir;

    fn settings(root: &std::path::Path) -> Settings {
        let mut s = Settings::default();
        s.resume_dir = root.join("resumes");
        s.index_path = root.join("store/index.jsonl");
        s.embedding.dimensions = Some(128);
        s
    }

    fn request(mode: Mode) -> RunRequest {
        RunRequest {
            mode,
            job: JobSource::Inline("Senior Accountant with GAAP and CPA".to_string()),
            detailed_evaluation: false,
            interactive: false,
            skip_report: false,
            format: OutputFormat::Json,
        }
    }

    fn write_resumes(root: &std::path::Path) {
        let dir = root.join("resumes");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("alice.txt"), "Alice. Senior accountant, CPA, GAAP reporting").expect("write");
        fs::write(dir.join("bob.txt"), "Bob. Line cook and pastry chef").expect("write");
    }

    fn pipeline(s: Settings, llm: Option<Arc<dyn LanguageModel>>) -> Pipeline {
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(HashEmbeddingProvider::new(s.embedding.effective_dimensions()));
        Pipeline::new(s, embedder, llm)
    }

    #[test]
    fn llm_is_only_needed_when_used() {
        let mut r = request(Mode::Search);
        assert!(!r.needs_llm());
        r.mode = Mode::Full;
        assert!(!r.needs_llm());
        r.detailed_evaluation = true;
        assert!(r.needs_llm());
        assert!(request(Mode::Chatbot).needs_llm());
    }

    #[tokio::test]
    async fn search_ranks_and_saves_the_index() {
        let dir = tempdir().expect("tempdir");
        write_resumes(dir.path());
        let p = pipeline(settings(dir.path()), None);

        let mut input = "".as_bytes();
        let mut out = Vec::new();
        let outcome = p
            .run(&request(Mode::Search), &mut input, &mut out, &CancellationToken::new())
            .await
            .expect("run");
        assert_eq!(outcome.indexed, 2);
        assert_eq!(outcome.candidates[0].id(), "alice.txt");
        assert!(outcome.report.is_none());
        assert!(dir.path().join("store/index.jsonl").is_file());

        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value["candidates"][0]["id"], "alice.txt");
    }

    #[tokio::test]
    async fn full_mode_evaluates_and_chats() {
        let dir = tempdir().expect("tempdir");
        write_resumes(dir.path());
        let model = Arc::new(ScriptedModel::new("Alice holds a CPA.").route(
            "Evaluate how well",
            r#"{"score": 91, "rationale": "Strong GAAP background", "strengths": ["CPA"], "weaknesses": []}"#,
        ));
        let p = pipeline(settings(dir.path()), Some(model.clone()));
        let mut req = request(Mode::Full);
        req.detailed_evaluation = true;
        req.interactive = true;
        req.format = OutputFormat::Text;

        let mut input = "Who is certified?\nexit\n".as_bytes();
        let mut out = Vec::new();
        let outcome = p
            .run(&req, &mut input, &mut out, &CancellationToken::new())
            .await
            .expect("run");
        let report = outcome.report.expect("report");
        assert_eq!(report.evaluations.len(), 2);
        assert_eq!(report.evaluations[0].score, Some(91.0));

        let printed = String::from_utf8(out).expect("utf8");
        assert!(printed.contains("CANDIDATE SUMMARY REPORT"));
        assert!(printed.contains("DETAILED EVALUATION"));
        assert!(printed.contains("Chatbot: Alice holds a CPA."));
    }

    #[tokio::test]
    async fn missing_resumes_fail_with_empty_index() {
        let dir = tempdir().expect("tempdir");
        let p = pipeline(settings(dir.path()), None);
        let mut input = "".as_bytes();
        let mut out = Vec::new();
        let err = p
            .run(&request(Mode::Search), &mut input, &mut out, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmptyIndex));
    }

    #[tokio::test]
    async fn chatbot_without_index_or_resumes_is_index_not_found() {
        let dir = tempdir().expect("tempdir");
        let p = pipeline(settings(dir.path()), Some(Arc::new(ScriptedModel::new("hi"))));
        let err = p.open_index().await.unwrap_err();
        assert!(matches!(err, RagError::IndexNotFound { .. }));
    }

    #[tokio::test]
    async fn chatbot_rebuilds_an_index_from_another_model() {
        let dir = tempdir().expect("tempdir");
        write_resumes(dir.path());
        let s = settings(dir.path());
        let mut stale = VectorIndex::empty(4, "some-other-model");
        stale
            .insert(
                crate::model::mk_record("old.txt", "old"),
                vec![1.0, 0.0, 0.0, 0.0],
            )
            .expect("insert");
        stale.save(&s.index_path).expect("save");

        let p = pipeline(s.clone(), Some(Arc::new(ScriptedModel::new("hi"))));
        let index = p.open_index().await.expect("open");
        assert_eq!(index.len(), 2);
        assert_eq!(index.embedding_model(), "hash-128");

        let reloaded = VectorIndex::load(&s.index_path).expect("load");
        assert_eq!(reloaded.len(), 2);
    }

    #[tokio::test]
    async fn chatbot_mode_uses_the_saved_index() {
        let dir = tempdir().expect("tempdir");
        write_resumes(dir.path());
        let s = settings(dir.path());
        pipeline(s.clone(), None).build_and_save().await.expect("save");
        fs::remove_dir_all(&s.resume_dir).expect("rm");

        let model = Arc::new(ScriptedModel::new("Bob cooks."));
        let p = pipeline(s, Some(model.clone()));
        let mut req = request(Mode::Chatbot);
        req.job = JobSource::Unspecified;
        req.format = OutputFormat::Text;
        let mut input = "who cooks?\nquit\n".as_bytes();
        let mut out = Vec::new();
        let outcome = p
            .run(&req, &mut input, &mut out, &CancellationToken::new())
            .await
            .expect("run");
        assert_eq!(outcome.indexed, 2);
        assert_eq!(model.call_count(), 1);
        assert!(!model.prompts()[0].contains("position being filled"));
    }

    #[tokio::test]
    async fn job_file_is_read_and_blank_files_rejected() {
        let dir = tempdir().expect("tempdir");
        write_resumes(dir.path());
        let jd = dir.path().join("jd.txt");
        fs::write(&jd, "   \n").expect("write");
        let p = pipeline(settings(dir.path()), None);
        let mut req = request(Mode::Search);
        req.job = JobSource::File(jd);
        let mut input = "".as_bytes();
        let mut out = Vec::new();
        let err = p
            .run(&req, &mut input, &mut out, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }
}
