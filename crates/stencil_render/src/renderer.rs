//! Render orchestration.
//!
//! Each document of a set moves through `Resolving -> Parsing -> Evaluating
//! -> Substituting -> Checking`. Documents are independent until `Checking`,
//! where the render waits for all of them and runs the consistency checks.
//! A render either returns every document or none of them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stencil_context::{ContextResolver, ProvisioningRequest, ResolvedContext};
use stencil_templates::{
    missing_variables, AstCache, Evaluator, Parser, RenderedDocument, Substitutor,
};
use tracing::{debug, info, warn};

use crate::consistency::ConsistencyChecker;
use crate::error::{RenderError, RenderResult};
use crate::manifest::{TemplateDocument, TemplateSet};
use crate::options::RenderOptions;
use crate::output::{validate_output, RenderedManifests};
use crate::redact::Redactor;
use crate::report::RenderReport;
use crate::sink::ManifestSink;
use crate::state::{DocumentProgress, RenderState, RenderTrace};

/// Contexts for one render: a base context plus per-document overlays.
#[derive(Debug, Clone)]
pub struct RenderInput {
    base: Arc<ResolvedContext>,
    overrides: HashMap<String, Arc<ResolvedContext>>,
}

impl RenderInput {
    pub fn new(base: impl Into<Arc<ResolvedContext>>) -> Self {
        Self {
            base: base.into(),
            overrides: HashMap::new(),
        }
    }

    /// Render `document` from `context` instead of the base context.
    pub fn with_override(
        mut self,
        document: impl Into<String>,
        context: impl Into<Arc<ResolvedContext>>,
    ) -> Self {
        self.overrides.insert(document.into(), context.into());
        self
    }

    pub fn base(&self) -> &ResolvedContext {
        &self.base
    }

    pub fn context_for(&self, document: &str) -> Arc<ResolvedContext> {
        Arc::clone(self.overrides.get(document).unwrap_or(&self.base))
    }

    fn secret_texts(&self) -> Vec<String> {
        let mut secrets = self.base.secret_texts();
        for context in self.overrides.values() {
            secrets.extend(context.secret_texts());
        }
        secrets
    }
}

/// Cooperative cancellation, checked between documents.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of rendering one document.
struct DocumentOutcome {
    name: String,
    progress: DocumentProgress,
    result: Result<RenderedDocument, Vec<RenderError>>,
    /// Escaped secret forms written into the document, even if it failed later.
    secrets: Vec<String>,
}

/// Renders template sets into manifests.
#[derive(Debug, Clone)]
pub struct Renderer {
    options: RenderOptions,
    resolver: ContextResolver,
    parser: Arc<Parser>,
    cache: Arc<AstCache>,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> RenderResult<Self> {
        options.validate()?;
        let parser = Parser::new(options.grammar.clone())?;
        Ok(Self {
            options,
            resolver: ContextResolver::new(),
            parser: Arc::new(parser),
            cache: Arc::new(AstCache::new()),
        })
    }

    pub fn with_resolver(mut self, resolver: ContextResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Share a parse cache with other renderers.
    ///
    /// Cache keys include the grammar, so renderers with different grammars
    /// can share one cache.
    pub fn with_cache(mut self, cache: Arc<AstCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn cache(&self) -> &AstCache {
        &self.cache
    }

    /// Resolve `request` and render every document of `set`.
    pub fn render(
        &self,
        request: &ProvisioningRequest,
        set: &TemplateSet,
    ) -> Result<RenderedManifests, RenderReport> {
        let (trace, mut progress) = self.start(set);
        let input = self.resolve(request, set, &trace, &mut progress)?;
        self.render_documents(&input, set, &CancellationFlag::new(), trace, progress)
    }

    /// Render from an already resolved context.
    pub fn render_context(
        &self,
        context: ResolvedContext,
        set: &TemplateSet,
    ) -> Result<RenderedManifests, RenderReport> {
        self.render_with_overrides(&RenderInput::new(context), set)
    }

    pub fn render_with_overrides(
        &self,
        input: &RenderInput,
        set: &TemplateSet,
    ) -> Result<RenderedManifests, RenderReport> {
        self.render_cancellable(input, set, &CancellationFlag::new())
    }

    /// Render documents one after the other, stopping between documents
    /// once `cancel` is set.
    pub fn render_cancellable(
        &self,
        input: &RenderInput,
        set: &TemplateSet,
        cancel: &CancellationFlag,
    ) -> Result<RenderedManifests, RenderReport> {
        let (trace, mut progress) = self.start(set);
        progress.advance(RenderState::Resolving);
        self.render_documents(input, set, cancel, trace, progress)
    }

    /// Render documents concurrently on the blocking pool.
    ///
    /// Every task is joined before the consistency check.
    pub async fn render_parallel(
        &self,
        input: Arc<RenderInput>,
        set: Arc<TemplateSet>,
        cancel: CancellationFlag,
    ) -> Result<RenderedManifests, RenderReport> {
        let (trace, mut progress) = self.start(&set);
        progress.advance(RenderState::Resolving);
        self.render_documents_parallel(input, set, cancel, trace, progress)
            .await
    }

    /// Resolve, render and hand the manifests to `sink`.
    ///
    /// The sink is only called for a render that reached `Done`.
    pub async fn render_and_publish(
        &self,
        request: &ProvisioningRequest,
        set: Arc<TemplateSet>,
        sink: &dyn ManifestSink,
    ) -> Result<RenderedManifests, RenderReport> {
        let (trace, mut progress) = self.start(&set);
        let input = self.resolve(request, &set, &trace, &mut progress)?;

        let manifests = if self.options.parallel {
            self.render_documents_parallel(
                Arc::new(input),
                Arc::clone(&set),
                CancellationFlag::new(),
                trace,
                progress,
            )
            .await?
        } else {
            self.render_documents(&input, &set, &CancellationFlag::new(), trace, progress)?
        };

        if let Err(e) = sink.publish(&manifests).await {
            let secrets = manifests
                .iter()
                .flat_map(|(_, doc)| doc.secrets.clone())
                .collect::<Vec<_>>();
            let redactor = Redactor::new(secrets, self.options.redaction_marker.clone());
            warn!("Publishing set {} failed", set.id);
            return Err(RenderReport::new(
                set.id.clone(),
                vec![RenderError::Publish(e.to_string())],
                manifests.trace().clone(),
                redactor,
            ));
        }

        info!("Published {} document(s) of set {}", manifests.len(), set.id);
        Ok(manifests)
    }

    fn start(&self, set: &TemplateSet) -> (RenderTrace, DocumentProgress) {
        info!(
            "Rendering template set {} ({} document(s))",
            set.id,
            set.documents.len()
        );
        (RenderTrace::start(&set.id), DocumentProgress::render_level())
    }

    /// Resolve the request, failing the render on validation errors.
    fn resolve(
        &self,
        request: &ProvisioningRequest,
        set: &TemplateSet,
        trace: &RenderTrace,
        progress: &mut DocumentProgress,
    ) -> Result<RenderInput, RenderReport> {
        progress.advance(RenderState::Resolving);
        match self.resolver.resolve(request) {
            Ok(context) => Ok(RenderInput::new(context)),
            Err(violations) => {
                let errors: Vec<RenderError> = violations
                    .violations
                    .into_iter()
                    .map(RenderError::Validation)
                    .collect();
                progress.fail();
                let mut trace = trace.clone();
                trace.record(progress.clone());
                trace.finish();
                warn!(
                    "Render of set {} failed with {} validation error(s)",
                    set.id,
                    errors.len()
                );
                let redactor = Redactor::new(
                    [request.database_password.expose().to_string()],
                    self.options.redaction_marker.clone(),
                );
                Err(RenderReport::new(set.id.clone(), errors, trace, redactor))
            }
        }
    }

    fn render_documents(
        &self,
        input: &RenderInput,
        set: &TemplateSet,
        cancel: &CancellationFlag,
        trace: RenderTrace,
        progress: DocumentProgress,
    ) -> Result<RenderedManifests, RenderReport> {
        if let Err(errors) = set.validate() {
            return Err(self.fail(input, set, errors, Vec::new(), trace, progress));
        }

        let mut outcomes = Vec::with_capacity(set.documents.len());
        for document in &set.documents {
            if cancel.is_cancelled() {
                debug!("Render of set {} cancelled before {}", set.id, document.name);
                break;
            }
            let context = input.context_for(&document.name);
            outcomes.push(render_document(
                &self.parser,
                &self.cache,
                document,
                &context,
                self.options.validate_output,
            ));
        }

        self.fan_in(input, set, outcomes, Vec::new(), cancel, trace, progress)
    }

    async fn render_documents_parallel(
        &self,
        input: Arc<RenderInput>,
        set: Arc<TemplateSet>,
        cancel: CancellationFlag,
        trace: RenderTrace,
        progress: DocumentProgress,
    ) -> Result<RenderedManifests, RenderReport> {
        if let Err(errors) = set.validate() {
            return Err(self.fail(&input, &set, errors, Vec::new(), trace, progress));
        }

        let handles: Vec<_> = (0..set.documents.len())
            .map(|index| {
                let name = set.documents[index].name.clone();
                let parser = Arc::clone(&self.parser);
                let cache = Arc::clone(&self.cache);
                let set = Arc::clone(&set);
                let context = input.context_for(&name);
                let cancel = cancel.clone();
                let validate = self.options.validate_output;
                let handle = tokio::task::spawn_blocking(move || {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(render_document(
                        &parser,
                        &cache,
                        &set.documents[index],
                        &context,
                        validate,
                    ))
                });
                (name, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut errors = Vec::new();
        for (name, handle) in handles {
            match handle.await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => debug!("Render of set {} cancelled before {}", set.id, name),
                Err(e) => errors.push(RenderError::TaskFailed {
                    document: name,
                    reason: e.to_string(),
                }),
            }
        }

        self.fan_in(&input, &set, outcomes, errors, &cancel, trace, progress)
    }

    /// Join point of a render: check consistency and settle every state.
    #[allow(clippy::too_many_arguments)]
    fn fan_in(
        &self,
        input: &RenderInput,
        set: &TemplateSet,
        outcomes: Vec<DocumentOutcome>,
        mut errors: Vec<RenderError>,
        cancel: &CancellationFlag,
        mut trace: RenderTrace,
        mut progress: DocumentProgress,
    ) -> Result<RenderedManifests, RenderReport> {
        let mut documents = BTreeMap::new();
        let mut failed = BTreeSet::new();
        let mut progresses = Vec::with_capacity(outcomes.len());
        let mut secrets = Vec::new();

        for outcome in outcomes {
            secrets.extend(outcome.secrets);
            match outcome.result {
                Ok(document) => {
                    documents.insert(outcome.name, document);
                }
                Err(document_errors) => {
                    errors.extend(document_errors);
                    failed.insert(outcome.name);
                }
            }
            progresses.push(outcome.progress);
        }

        if cancel.is_cancelled() {
            for mut p in progresses {
                p.fail();
                trace.record(p);
            }
            return Err(self.fail(
                input,
                set,
                vec![RenderError::Cancelled],
                secrets,
                trace,
                progress,
            ));
        }

        progress.advance_to(RenderState::Checking);
        let consistency = ConsistencyChecker::new(&set.constraints)
            .with_redaction_marker(self.options.redaction_marker.clone())
            .check(&documents, &failed);
        debug!(
            "Checked {} constraint(s) of set {}: {} violation(s)",
            set.constraints.len(),
            set.id,
            consistency.len()
        );
        errors.extend(consistency.into_iter().map(RenderError::Consistency));

        if !errors.is_empty() {
            for mut p in progresses {
                p.fail();
                trace.record(p);
            }
            return Err(self.fail(input, set, errors, secrets, trace, progress));
        }

        for mut p in progresses {
            p.advance(RenderState::Done);
            trace.record(p);
        }
        progress.advance(RenderState::Done);
        trace.record(progress);
        trace.finish();

        info!(
            "Rendered {} document(s) of set {} in {}ms",
            documents.len(),
            set.id,
            trace.duration_ms().unwrap_or_default()
        );
        Ok(RenderedManifests::new(set.id.clone(), documents, trace))
    }

    /// Build the report of a failed render.
    fn fail(
        &self,
        input: &RenderInput,
        set: &TemplateSet,
        errors: Vec<RenderError>,
        secrets: Vec<String>,
        mut trace: RenderTrace,
        mut render: DocumentProgress,
    ) -> RenderReport {
        render.fail();
        trace.record(render);
        trace.finish();

        warn!(
            "Render of set {} failed with {} error(s)",
            set.id,
            errors.len()
        );

        let mut all_secrets = input.secret_texts();
        all_secrets.extend(secrets);
        let redactor = Redactor::new(all_secrets, self.options.redaction_marker.clone());
        RenderReport::new(set.id.clone(), errors, trace, redactor)
    }
}

/// Render one document up to the `Checking` state.
fn render_document(
    parser: &Parser,
    cache: &AstCache,
    document: &TemplateDocument,
    context: &ResolvedContext,
    validate: bool,
) -> DocumentOutcome {
    let mut progress = DocumentProgress::new(&document.name);
    progress.advance(RenderState::Resolving);
    let outcome = |progress: DocumentProgress,
                   result: Result<RenderedDocument, Vec<RenderError>>,
                   secrets: Vec<String>| DocumentOutcome {
        name: document.name.clone(),
        progress,
        result,
        secrets,
    };

    progress.advance(RenderState::Parsing);
    let ast = match cache.get_or_parse(parser, &document.name, &document.source) {
        Ok(ast) => ast,
        Err(errors) => {
            progress.fail();
            let errors: Vec<RenderError> = errors.into_iter().map(RenderError::Syntax).collect();
            return outcome(progress, Err(errors), Vec::new());
        }
    };

    progress.advance(RenderState::Evaluating);
    let mut errors = missing_variables(&ast, context);
    let (selected, eval_errors) = Evaluator::new(&ast.name, context).select(&ast.nodes);
    errors.extend(eval_errors.into_iter().filter(|e| !e.is_missing()));

    if errors.is_empty() {
        progress.advance(RenderState::Substituting);
    }
    let substituted = Substitutor::new(document.format()).substitute(&ast.name, &selected, context);
    let rendered = match substituted {
        Ok(rendered) if errors.is_empty() => rendered,
        Ok(_) => {
            progress.fail();
            return outcome(progress, Err(into_render_errors(errors)), Vec::new());
        }
        Err(sub_errors) => {
            errors.extend(sub_errors.into_iter().filter(|e| !e.is_missing()));
            progress.fail();
            return outcome(progress, Err(into_render_errors(errors)), Vec::new());
        }
    };

    let secrets = rendered.secrets.clone();
    if validate {
        if let Err(e) = validate_output(&rendered) {
            progress.fail();
            return outcome(progress, Err(vec![e]), secrets);
        }
    }

    progress.advance(RenderState::Checking);
    outcome(progress, Ok(rendered), secrets)
}

fn into_render_errors(errors: Vec<stencil_templates::ResolutionError>) -> Vec<RenderError> {
    errors.into_iter().map(RenderError::Resolution).collect()
}
