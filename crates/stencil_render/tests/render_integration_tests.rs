//! End-to-end rendering tests.

use std::sync::Arc;

use async_trait::async_trait;
use stencil_context::{ContextResolver, ProvisioningRequest, ResolvedContext};
use stencil_render::{
    CancellationFlag, ConsistencyConstraint, ConsistencyError, ManifestSink, MemorySink,
    RenderError, RenderInput, RenderOptions, RenderState, RenderedManifests, Renderer,
    SinkError, TemplateCatalog, TemplateDocument, TemplateSet,
};
use stencil_templates::{ResolutionErrorKind, SyntaxErrorKind};

const PASSWORD: &str = "s3cr\"et@pw";

const REQUEST: &str = r#"
id: z4c5d6e7f
long_id: 8d5a1f2e-4b3c-4d5e-9f60-718293a4b5c6
environment_id: zenv1
owner_id: zorg1
sanitized_name: app1db
fqdn: zf1b3c2a1-mysql.example.com
service_name: mysql-app1db
database_total_cpus: 500m
database_ram_size_in_mib: 512
database_disk_size_in_gib: 10
database_disk_type: gp2
database_login: superuser
database_password: s3cr"et@pw
publicly_accessible: true
version: "8"
"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

fn renderer() -> Renderer {
    Renderer::new(RenderOptions::default()).unwrap()
}

fn request() -> ProvisioningRequest {
    ProvisioningRequest::from_yaml_str(REQUEST).unwrap()
}

fn example_context(publicly_accessible: bool) -> ResolvedContext {
    ResolvedContext::builder()
        .insert("database_disk_size_in_gib", 10u32)
        .insert("publicly_accessible", publicly_accessible)
        .build()
}

fn single(name: &str, source: &str) -> TemplateSet {
    TemplateSet::new("single").with_document(TemplateDocument::new(name, source))
}

const SERVICE: &str = "size: {{ database_disk_size_in_gib }}Gi\n{% if publicly_accessible %}type: LoadBalancer{% else %}type: ClusterIP{% endif %}\n";

#[test]
fn test_size_and_load_balancer_example() {
    init_tracing();
    let manifests = renderer()
        .render_context(example_context(true), &single("service.yaml", SERVICE))
        .unwrap();
    assert_eq!(
        manifests.text("service.yaml"),
        Some("size: 10Gi\ntype: LoadBalancer\n")
    );
}

#[test]
fn test_conditional_selects_exactly_one_branch() {
    let set = single("service.yaml", SERVICE);
    let public = renderer().render_context(example_context(true), &set).unwrap();
    let private = renderer().render_context(example_context(false), &set).unwrap();

    let public = public.text("service.yaml").unwrap();
    let private = private.text("service.yaml").unwrap();
    assert!(public.contains("LoadBalancer") && !public.contains("ClusterIP"));
    assert!(private.contains("ClusterIP") && !private.contains("LoadBalancer"));
}

#[test]
fn test_missing_condition_variable_is_an_error() {
    let context = ResolvedContext::builder()
        .insert("database_disk_size_in_gib", 10u32)
        .build();
    let report = renderer()
        .render_context(context, &single("service.yaml", SERVICE))
        .unwrap_err();

    assert_eq!(report.len(), 1);
    match &report.errors()[0] {
        RenderError::Resolution(e) => {
            assert_eq!(e.variable, "publicly_accessible");
            assert_eq!(e.kind, ResolutionErrorKind::Missing);
            assert_eq!(e.template, "service.yaml");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_rendering_twice_is_byte_identical() {
    let set = TemplateCatalog::builtin().get("mysql").unwrap();
    let first = renderer().render(&request(), &set).unwrap();
    let second = renderer().render(&request(), &set).unwrap();
    assert_eq!(first.into_texts(), second.into_texts());
}

#[test]
fn test_literal_template_renders_to_itself() {
    let source = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: static\n";
    let manifests = renderer()
        .render_context(ResolvedContext::default(), &single("ns.yaml", source))
        .unwrap();
    assert_eq!(manifests.text("ns.yaml"), Some(source));
}

#[test]
fn test_independent_errors_reported_exactly_once_each() {
    let set = TemplateSet::new("broken")
        .with_document(TemplateDocument::new("missing.txt", "a {{ cluster_id }} b {{ cluster_id }}"))
        .with_document(TemplateDocument::new(
            "typed.txt",
            "{% if database_disk_size_in_gib %}x{% endif %}",
        ))
        .with_document(TemplateDocument::new("syntax.txt", "ok\n{% endif %}"));

    let report = renderer().render_context(example_context(true), &set).unwrap_err();
    assert_eq!(report.len(), 3);

    assert!(matches!(
        &report.errors()[0],
        RenderError::Resolution(e) if e.kind == ResolutionErrorKind::Missing && e.variable == "cluster_id"
    ));
    assert!(matches!(
        &report.errors()[1],
        RenderError::Resolution(e) if matches!(e.kind, ResolutionErrorKind::TypeMismatch { .. })
    ));
    match &report.errors()[2] {
        RenderError::Syntax(e) => {
            assert_eq!((e.template.as_str(), e.line, e.column), ("syntax.txt", 2, 1));
            assert!(matches!(e.kind, SyntaxErrorKind::UnmatchedDirective { .. }));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_request_violations_fail_the_render() {
    let yaml = REQUEST
        .replace("sanitized_name: app1db", "sanitized_name: App_1")
        .replace("version: \"8\"", "version: \"9\"");
    let request = ProvisioningRequest::from_yaml_str(&yaml).unwrap();
    let set = TemplateCatalog::builtin().get("mysql").unwrap();

    let report = renderer().render(&request, &set).unwrap_err();
    let fields: Vec<&str> = report
        .errors()
        .iter()
        .filter_map(|e| match e {
            RenderError::Validation(v) => Some(v.field.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(fields, vec!["sanitized_name", "version"]);
    assert_eq!(report.trace().outcome(), RenderState::Failed);
    assert!(!report.to_string().contains(PASSWORD));
}

#[test]
fn test_id_unusable_in_derived_names_is_rejected() {
    let yaml = REQUEST.replace("id: z4c5d6e7f", "id: Z4c.5");
    let request = ProvisioningRequest::from_yaml_str(&yaml).unwrap();
    let set = TemplateCatalog::builtin().get("mysql").unwrap();

    let report = renderer().render(&request, &set).unwrap_err();
    let fields: Vec<&str> = report
        .errors()
        .iter()
        .filter_map(|e| match e {
            RenderError::Validation(v) => Some(v.field.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(fields, vec!["helm_release_name", "database_instance_name"]);
}

fn cluster_set() -> TemplateSet {
    TemplateSet::new("cluster")
        .with_document(TemplateDocument::new("a.yaml", "clusterId: {{ cluster_id }}\n"))
        .with_document(TemplateDocument::new(
            "b.tf",
            "locals {\n  cluster_id = \"{{ cluster_id }}\"\n}\n",
        ))
        .with_constraint(
            ConsistencyConstraint::new("cluster_id")
                .at("a.yaml", "cluster_id")
                .at("b.tf", "cluster_id"),
        )
}

fn cluster_context() -> ResolvedContext {
    ResolvedContext::builder().insert("cluster_id", "c-123").build()
}

#[test]
fn test_shared_context_keeps_documents_consistent() {
    let manifests = renderer()
        .render_context(cluster_context(), &cluster_set())
        .unwrap();
    assert_eq!(manifests.text("a.yaml"), Some("clusterId: c-123\n"));
    assert!(manifests.text("b.tf").unwrap().contains("\"c-123\""));
}

#[test]
fn test_overlay_with_other_cluster_id_diverges() {
    let base = cluster_context();
    let input = RenderInput::new(base.clone())
        .with_override("b.tf", base.with_override("cluster_id", "c-456"));

    let report = renderer()
        .render_with_overrides(&input, &cluster_set())
        .unwrap_err();

    assert_eq!(report.len(), 1);
    let RenderError::Consistency(error) = &report.errors()[0] else {
        panic!("unexpected error {:?}", report.errors()[0]);
    };
    assert_eq!(error.constraint(), "cluster_id");
    assert!(matches!(error, ConsistencyError::Divergent { values, .. } if values.len() == 2));
    let message = error.to_string();
    assert!(message.contains("a.yaml/cluster_id = \"c-123\""));
    assert!(message.contains("b.tf/cluster_id = \"c-456\""));
    assert_eq!(report.trace().final_state("a.yaml"), RenderState::Failed);
}

#[test]
fn test_secrets_never_appear_in_diagnostics() {
    let context = ContextResolver::new().resolve(&request()).unwrap();
    let set = TemplateSet::new("secrets")
        .with_document(TemplateDocument::new("a.yaml", "password: \"{{ database_password }}\"\n"))
        .with_document(TemplateDocument::new("b.yaml", "password: {{ database_password }}\n"))
        .with_constraint(
            ConsistencyConstraint::new("password")
                .at("a.yaml", "database_password")
                .at("b.yaml", "database_password"),
        );
    let input = RenderInput::new(context.clone()).with_override(
        "b.yaml",
        context.with_override("database_password", "other-secret"),
    );

    let report = renderer().render_with_overrides(&input, &set).unwrap_err();
    let rendered = [
        report.to_string(),
        format!("{:?}", report),
        report.to_json().to_string(),
    ];
    for text in rendered {
        assert!(!text.contains("s3cr"), "leaked in {}", text);
        assert!(!text.contains("other-secret"), "leaked in {}", text);
        assert!(text.contains("[REDACTED]"));
    }

    let manifests = renderer().render_context(context, &set).unwrap();
    assert!(!format!("{:?}", manifests).contains("s3cr"));
}

#[test]
fn test_builtin_mysql_set_renders_valid_documents() {
    init_tracing();
    let set = TemplateCatalog::builtin().get("mysql").unwrap();
    let manifests = renderer().render(&request(), &set).unwrap();

    let values: serde_yaml::Value =
        serde_yaml::from_str(manifests.text("values.yaml").unwrap()).unwrap();
    assert_eq!(values["fullnameOverride"].as_str(), Some("mysql-z4c5d6e7f"));
    assert_eq!(values["commonLabels"]["appName"].as_str(), Some("app1db"));
    assert_eq!(values["image"]["tag"].as_str(), Some("8.0.24"));
    assert_eq!(values["auth"]["password"].as_str(), Some(PASSWORD));
    assert_eq!(values["primary"]["resources"]["requests"]["cpu"].as_str(), Some("500m"));
    assert_eq!(values["primary"]["persistence"]["storageClass"].as_str(), Some("gp2"));
    assert_eq!(values["primary"]["persistence"]["size"].as_str(), Some("10Gi"));
    assert_eq!(values["primary"]["service"]["type"].as_str(), Some("LoadBalancer"));
    assert_eq!(values["primary"]["service"]["ports"]["mysql"].as_u64(), Some(3306));
    assert!(values["primary"]["configuration"]
        .as_str()
        .unwrap()
        .starts_with("[mysqld]\n"));

    let rules = manifests.text("security_group.tf").unwrap();
    assert!(rules.contains("resource \"aws_security_group_rule\" \"dbz4c5d6e7f_public\" {"));
    assert!(rules.contains("count             = 1\n"));
    assert!(rules.contains("from_port         = 3306\n"));
    assert!(rules.contains("Name          = \"app1db\"\n"));
    assert!(rules.contains("Version       = \"8.0.24\"\n"));
}

#[test]
fn test_builtin_mysql_private_database() {
    let yaml = REQUEST.replace("publicly_accessible: true", "publicly_accessible: false");
    let request = ProvisioningRequest::from_yaml_str(&yaml).unwrap();
    let set = TemplateCatalog::builtin().get("mysql").unwrap();
    let manifests = renderer().render(&request, &set).unwrap();

    let values: serde_yaml::Value =
        serde_yaml::from_str(manifests.text("values.yaml").unwrap()).unwrap();
    assert_eq!(values["primary"]["service"]["type"].as_str(), Some("ClusterIP"));
    assert!(manifests
        .text("security_group.tf")
        .unwrap()
        .contains("count             = 0\n"));
}

#[test]
fn test_builtin_mysql_rejects_invalid_shared_name() {
    let context = ContextResolver::new()
        .resolve(&request())
        .unwrap()
        .with_override("sanitized_name", "App_1");
    let set = TemplateCatalog::builtin().get("mysql").unwrap();

    let report = renderer().render_context(context, &set).unwrap_err();
    assert_eq!(report.len(), 1);
    assert!(matches!(
        &report.errors()[0],
        RenderError::Consistency(ConsistencyError::RuleViolation { constraint, .. }) if constraint == "sanitized_name"
    ));
}

#[test]
fn test_cancelled_render_produces_nothing() {
    let cancel = CancellationFlag::new();
    cancel.cancel();
    let report = renderer()
        .render_cancellable(&RenderInput::new(cluster_context()), &cluster_set(), &cancel)
        .unwrap_err();

    assert!(report.is_cancelled());
    assert_eq!(report.errors(), &[RenderError::Cancelled]);
}

#[tokio::test]
async fn test_parallel_render_matches_sequential() {
    let renderer = renderer();
    let set = TemplateCatalog::builtin().get("mysql").unwrap();
    let context = ContextResolver::new().resolve(&request()).unwrap();

    let sequential = renderer.render_context(context.clone(), &set).unwrap();
    let parallel = renderer
        .render_parallel(
            Arc::new(RenderInput::new(context)),
            Arc::clone(&set),
            CancellationFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(sequential.into_texts(), parallel.into_texts());
}

#[tokio::test]
async fn test_parallel_render_honours_cancellation() {
    let cancel = CancellationFlag::new();
    cancel.cancel();
    let report = renderer()
        .render_parallel(
            Arc::new(RenderInput::new(cluster_context())),
            Arc::new(cluster_set()),
            cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(report.errors(), &[RenderError::Cancelled]);
}

#[tokio::test]
async fn test_publish_to_memory_sink() {
    let sink = MemorySink::new();
    let set = TemplateCatalog::builtin().get("mysql").unwrap();

    renderer()
        .render_and_publish(&request(), set, &sink)
        .await
        .unwrap();

    let published = sink.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "mysql");
    assert_eq!(
        published[0].1.keys().collect::<Vec<_>>(),
        vec!["security_group.tf", "values.yaml"]
    );
}

/// Sink that rejects manifests and quotes them back in the error.
struct EchoingSink;

#[async_trait]
impl ManifestSink for EchoingSink {
    async fn publish(&self, manifests: &RenderedManifests) -> Result<(), SinkError> {
        let text = manifests.text("values.yaml").unwrap_or_default();
        Err(SinkError::Rejected(text.to_string()))
    }
}

#[tokio::test]
async fn test_publish_failure_report_is_redacted() {
    let set = TemplateCatalog::builtin().get("mysql").unwrap();
    let report = renderer()
        .render_and_publish(&request(), set, &EchoingSink)
        .await
        .unwrap_err();

    assert_eq!(report.counts().get("publish"), Some(&1));
    let text = report.to_string();
    assert!(text.contains("fullnameOverride"));
    assert!(!text.contains("s3cr"));
}
