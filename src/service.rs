//! Per-request preview pipeline and its wire shapes.
//!
//! `generate` never fails: every problem is folded into a
//! [`PreviewResponse::Failure`] carrying whatever analysis was computed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analyze::{
    analyze, AccessibilityReport, AnalysisReport, CodeMetrics, PerformanceReport, SecurityReport,
};
use crate::cache::{CacheKey, CacheStats, PipelineArtifacts, PipelineCache};
use crate::config::PreviewConfig;
use crate::document::{build_document, DocumentInput};
use crate::error::{ErrorKind, PreviewError};
use crate::protocol::DEFAULT_CHANNEL;
use crate::session::PreviewSession;
use crate::source::SourceUnit;
use crate::stubs::{synthesize_stubs, StubRegistry};
use crate::transform::TransformPipeline;
use crate::validate::{validate, ValidationIssue, ValidationResult};

pub const COMPONENT_KIND: &str = "component";

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewOptions {
    /// Symbols a previous render discovered at runtime; stubbed up front.
    #[serde(default)]
    pub known_symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub code: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub options: PreviewOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub collaboration: bool,
}

fn default_kind() -> String {
    COMPONENT_KIND.to_string()
}

impl PreviewRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            kind: default_kind(),
            options: PreviewOptions::default(),
            session_id: None,
            version: 0,
            collaboration: false,
        }
    }

    pub fn channel(&self) -> &str {
        self.options.channel.as_deref().unwrap_or(DEFAULT_CHANNEL)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESPONSE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMetadata {
    pub session: PreviewSession,
    pub channel: String,
    pub stubs: Vec<String>,
    pub warnings: Vec<ValidationIssue>,
    pub entry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syntax_error: Option<String>,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalData {
    pub code_metrics: CodeMetrics,
    pub suggestions: Vec<String>,
    pub optimization_tips: Vec<String>,
    pub accessibility_report: AccessibilityReport,
    pub performance_report: PerformanceReport,
    pub security_report: SecurityReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSuccess {
    pub success: bool,
    #[serde(rename = "previewHTML")]
    pub preview_html: String,
    pub analysis: AnalysisReport,
    pub metadata: PreviewMetadata,
    pub additional_data: AdditionalData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewFailure {
    pub success: bool,
    pub error: String,
    pub error_type: String,
    #[serde(default)]
    pub errors: Vec<ValidationIssue>,
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_analysis: Option<AnalysisReport>,
}

impl PreviewFailure {
    pub fn from_validation(result: ValidationResult) -> Self {
        let suggestions = result.suggestions();
        let (error, error_type) = match result.errors.first() {
            Some(first) => (first.message.clone(), first.error_type.clone()),
            None => (
                "Validation failed".to_string(),
                ErrorKind::Input.as_str().to_string(),
            ),
        };
        PreviewFailure {
            success: false,
            error,
            error_type,
            errors: result.errors,
            suggestions,
            partial_analysis: result.partial_analysis,
        }
    }

    pub fn from_error(err: &PreviewError) -> Self {
        PreviewFailure {
            success: false,
            error: err.to_string(),
            error_type: err.kind().as_str().to_string(),
            errors: vec![],
            suggestions: vec!["Refresh the preview to try again.".to_string()],
            partial_analysis: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreviewResponse {
    Success(Box<PreviewSuccess>),
    Failure(Box<PreviewFailure>),
}

impl PreviewResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, PreviewResponse::Success(_))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"error":"Failed to serialize response: {}","errorType":"TransportError","suggestions":[]}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct PreviewService {
    config: PreviewConfig,
    fingerprint: String,
    pipeline: TransformPipeline,
    cache: PipelineCache,
}

impl PreviewService {
    pub fn new(config: PreviewConfig) -> Self {
        let fingerprint = config.fingerprint();
        let cache = PipelineCache::new(config.cache_capacity);
        Self {
            config,
            fingerprint,
            pipeline: TransformPipeline::standard(),
            cache,
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn analyze(&self, code: &str) -> AnalysisReport {
        analyze(&SourceUnit::new(code))
    }

    pub fn generate_json(&self, raw: &str) -> String {
        let response = match serde_json::from_str::<PreviewRequest>(raw) {
            Ok(request) => self.generate(request),
            Err(e) => {
                let err = PreviewError::Input(format!("Malformed preview request: {}", e));
                PreviewResponse::Failure(Box::new(PreviewFailure::from_error(&err)))
            }
        };
        response.to_json()
    }

    pub fn generate(&self, request: PreviewRequest) -> PreviewResponse {
        if request.kind != COMPONENT_KIND {
            let err = PreviewError::Input(format!("Unsupported preview type '{}'", request.kind));
            return PreviewResponse::Failure(Box::new(PreviewFailure::from_error(&err)));
        }

        let unit = SourceUnit::new(request.code.as_str());
        let key = CacheKey::new(unit.hash(), &self.fingerprint, &request.options.known_symbols);

        let (artifacts, cached) = match self.cache.get(&key) {
            Some(hit) => (hit, true),
            None => match self.run_pipeline(&unit, &request.options.known_symbols) {
                Ok(artifacts) => (self.cache.insert(key, artifacts), false),
                Err(rejected) => {
                    return PreviewResponse::Failure(Box::new(PreviewFailure::from_validation(
                        *rejected,
                    )))
                }
            },
        };

        let session = PreviewSession::new(
            request.session_id.clone(),
            request.version,
            request.collaboration,
            unit.hash(),
        );
        let channel = request.channel().to_string();

        match self.assemble(&artifacts, session, channel, cached) {
            Ok(success) => PreviewResponse::Success(Box::new(success)),
            Err(err) => {
                tracing::warn!(error = %err, "failed to assemble preview document");
                PreviewResponse::Failure(Box::new(PreviewFailure::from_error(&err)))
            }
        }
    }

    fn run_pipeline(
        &self,
        unit: &SourceUnit,
        known_symbols: &[String],
    ) -> std::result::Result<PipelineArtifacts, Box<ValidationResult>> {
        let validation = validate(unit, &self.config);
        if !validation.is_valid {
            return Err(Box::new(validation));
        }
        let analysis = validation
            .partial_analysis
            .unwrap_or_else(|| analyze(unit));
        tracing::debug!(
            hash = %unit.hash(),
            component = %analysis.component_name,
            warnings = validation.warnings.len(),
            "source accepted"
        );

        let transformed = self.pipeline.run(unit.text());

        let mut stubs = StubRegistry::seeded(known_symbols);
        let added = synthesize_stubs(unit.text(), &analysis.imports, &mut stubs);
        tracing::debug!(stubs = ?added, "stubs synthesized");

        Ok(PipelineArtifacts {
            analysis,
            warnings: validation.warnings,
            transformed,
            stubs,
        })
    }

    fn assemble(
        &self,
        artifacts: &Arc<PipelineArtifacts>,
        session: PreviewSession,
        channel: String,
        cached: bool,
    ) -> crate::error::Result<PreviewSuccess> {
        let token = session.token(&channel);
        let document = build_document(&DocumentInput {
            token: &token,
            component_name: &artifacts.analysis.component_name,
            transformed: &artifacts.transformed,
            stubs: &artifacts.stubs,
            config: &self.config,
        })?;

        tracing::info!(
            session_id = %session.session_id,
            version = session.version,
            hash = %session.code_hash,
            cached,
            entry = document.entry.kind(),
            "preview generated"
        );

        let analysis = &artifacts.analysis;
        let syntax_error = match &document.entry {
            crate::transform::EntryPoint::SyntaxError { message } => Some(message.clone()),
            _ => None,
        };

        Ok(PreviewSuccess {
            success: true,
            preview_html: document.html,
            analysis: analysis.clone(),
            metadata: PreviewMetadata {
                session,
                channel,
                stubs: document.stub_names,
                warnings: artifacts.warnings.clone(),
                entry: document.entry.kind().to_string(),
                syntax_error,
                cached,
            },
            additional_data: AdditionalData {
                code_metrics: analysis.metrics.clone(),
                suggestions: analysis.suggestions(),
                optimization_tips: analysis.optimization_tips(),
                accessibility_report: analysis.accessibility.clone(),
                performance_report: analysis.performance.clone(),
                security_report: analysis.security.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(response: PreviewResponse) -> PreviewSuccess {
        match response {
            PreviewResponse::Success(s) => *s,
            PreviewResponse::Failure(f) => panic!("expected success, got {:?}", f),
        }
    }

    fn failure(response: PreviewResponse) -> PreviewFailure {
        match response {
            PreviewResponse::Failure(f) => *f,
            PreviewResponse::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn test_request_defaults() {
        let request: PreviewRequest = serde_json::from_str(r#"{ "code": "x" }"#).unwrap();
        assert_eq!(request.kind, "component");
        assert_eq!(request.version, 0);
        assert!(request.options.known_symbols.is_empty());
        assert_eq!(request.channel(), DEFAULT_CHANNEL);
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let service = PreviewService::new(PreviewConfig::default());
        let mut request = PreviewRequest::new("const A = () => <a/>;");
        request.kind = "page".into();
        let out = failure(service.generate(request));
        assert_eq!(out.error_type, "InputError");
        assert!(out.error.contains("page"));
    }

    #[test]
    fn test_cache_hit_on_identical_source() {
        let service = PreviewService::new(PreviewConfig::default());
        let code = "export default function App() { return <main><Header /></main>; }";

        let mut first = PreviewRequest::new(code);
        first.session_id = Some("s1".into());
        let first = success(service.generate(first));
        assert!(!first.metadata.cached);

        let mut second = PreviewRequest::new(code);
        second.session_id = Some("s2".into());
        let second = success(service.generate(second));
        assert!(second.metadata.cached);
        assert_eq!(second.metadata.stubs, vec!["Header"]);
        assert!(second.preview_html.contains("\"sessionId\":\"s2\""));
        assert_eq!(service.cache_stats().hits, 1);

        let mut seeded = PreviewRequest::new(code);
        seeded.options.known_symbols = vec!["Chart".into()];
        let seeded = success(service.generate(seeded));
        assert!(!seeded.metadata.cached);
        assert_eq!(seeded.metadata.stubs, vec!["Chart", "Header"]);
    }

    #[test]
    fn test_json_entry_point() {
        let service = PreviewService::new(PreviewConfig::default());
        let out: serde_json::Value =
            serde_json::from_str(&service.generate_json(r#"{ "code": "" }"#)).unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["error"], "Empty code provided");
        assert!(out.get("partialAnalysis").is_none());

        let out: serde_json::Value = serde_json::from_str(&service.generate_json("{")).unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["errorType"], "InputError");

        let out: serde_json::Value = serde_json::from_str(&service.generate_json(
            r#"{ "code": "export default () => <p>hi</p>;", "sessionId": "abc", "version": 3 }"#,
        ))
        .unwrap();
        assert_eq!(out["success"], true);
        assert!(out["previewHTML"].as_str().unwrap().starts_with("<!DOCTYPE html>"));
        assert_eq!(out["metadata"]["session"]["sessionId"], "abc");
        assert_eq!(out["metadata"]["session"]["version"], 3);
        assert_eq!(out["metadata"]["entry"], "defaultExport");
        assert!(out["additionalData"]["codeMetrics"].is_object());
        assert!(out["additionalData"]["securityReport"].is_object());
    }
}
