#[cfg(feature = "napi")]
use napi_derive::napi;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analyze::{analyze, AnalysisReport, RiskLevel};
use crate::config::PreviewConfig;
use crate::error::ErrorKind;
use crate::source::SourceUnit;

// ═══════════════════════════════════════════════════════════════════════════════
// ISSUE CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_EMPTY_CODE: &str = "PV-INPUT-001";
pub const ERR_CODE_TOO_LARGE: &str = "PV-INPUT-002";
pub const ERR_DYNAMIC_CODE: &str = "PV-SEC-001";
pub const ERR_BLOCKED_KEYWORD: &str = "PV-SEC-002";
pub const WARN_UNSANITIZED_HTML: &str = "PV-SEC-101";
pub const WARN_MISSING_ALT: &str = "PV-A11Y-101";
pub const WARN_CLICK_WITHOUT_KEYBOARD: &str = "PV-A11Y-102";
pub const WARN_DEPRECATED_LIFECYCLE: &str = "PV-QUAL-101";
pub const WARN_TOO_MANY_HOOKS: &str = "PV-QUAL-102";

pub const EMPTY_CODE_MESSAGE: &str = "Empty code provided";

lazy_static! {
    static ref DEPRECATED_LIFECYCLE_RE: Regex = Regex::new(
        r"\b(?:UNSAFE_)?(componentWillMount|componentWillReceiveProps|componentWillUpdate)\b"
    )
    .unwrap();
}

fn get_hints(code: &str) -> Vec<String> {
    let hints: &[&str] = match code {
        ERR_EMPTY_CODE => &["Paste or generate a component before previewing."],
        ERR_CODE_TOO_LARGE => &["Split the component into smaller files and preview them one at a time."],
        ERR_DYNAMIC_CODE | ERR_BLOCKED_KEYWORD => &[
            "Remove eval(), new Function() and string-bodied timers.",
            "Previews never execute dynamically constructed code.",
        ],
        WARN_UNSANITIZED_HTML => &["Sanitize HTML before injecting it, or render it as text."],
        WARN_MISSING_ALT => &["Add an alt attribute to every image."],
        WARN_CLICK_WITHOUT_KEYBOARD => &["Add onKeyDown or an aria-label next to onClick."],
        WARN_DEPRECATED_LIFECYCLE => &["Move the logic to componentDidMount/componentDidUpdate or to hooks."],
        WARN_TOO_MANY_HOOKS => &["Extract related stateful calls into a custom hook."],
        _ => &[],
    };
    hints.iter().map(|h| h.to_string()).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATION ISSUE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: String,
    pub error_type: String,
    pub message: String,
    pub hints: Vec<String>,
}

impl ValidationIssue {
    pub fn new(code: &str, kind: ErrorKind, message: &str) -> Self {
        ValidationIssue {
            code: code.to_string(),
            error_type: kind.as_str().to_string(),
            message: message.to_string(),
            hints: get_hints(code),
        }
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.error_type == kind.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub partial_analysis: Option<AnalysisReport>,
}

impl ValidationResult {
    /// Message of the first blocking error, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }

    pub fn suggestions(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for issue in self.errors.iter().chain(self.warnings.iter()) {
            for hint in &issue.hints {
                if !out.contains(hint) {
                    out.push(hint.clone());
                }
            }
        }
        out
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATION FUNCTIONS (Return Option, not Result)
// ═══════════════════════════════════════════════════════════════════════════════

fn validate_not_empty(unit: &SourceUnit) -> Option<ValidationIssue> {
    if unit.is_blank() {
        return Some(ValidationIssue::new(
            ERR_EMPTY_CODE,
            ErrorKind::Input,
            EMPTY_CODE_MESSAGE,
        ));
    }
    None
}

fn validate_size(unit: &SourceUnit, config: &PreviewConfig) -> Option<ValidationIssue> {
    if unit.byte_len() > config.max_code_size {
        return Some(ValidationIssue::new(
            ERR_CODE_TOO_LARGE,
            ErrorKind::Input,
            &format!(
                "Code size {} bytes exceeds maximum of {} bytes",
                unit.byte_len(),
                config.max_code_size
            ),
        ));
    }
    None
}

fn validate_no_dynamic_code(report: &AnalysisReport) -> Option<ValidationIssue> {
    let finding = report
        .security
        .findings
        .iter()
        .find(|f| f.risk == RiskLevel::Critical)?;
    Some(ValidationIssue::new(
        ERR_DYNAMIC_CODE,
        ErrorKind::Security,
        &format!("Forbidden construct detected: {}", finding.pattern),
    ))
}

fn validate_blocked_keywords(text: &str, config: &PreviewConfig) -> Option<ValidationIssue> {
    for keyword in &config.blocked_keywords {
        let escaped = regex::escape(keyword.trim());
        let starts_with_word = keyword
            .trim()
            .chars()
            .next()
            .map(|c| c.is_alphanumeric() || c == '_' || c == '$')
            .unwrap_or(false);
        let pattern = if starts_with_word {
            format!(r"\b{}\s*\(", escaped)
        } else {
            format!(r"{}\s*\(", escaped)
        };
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!(keyword = %keyword, error = %e, "skipping unusable blocked keyword");
                continue;
            }
        };
        if re.is_match(text) {
            return Some(ValidationIssue::new(
                ERR_BLOCKED_KEYWORD,
                ErrorKind::Security,
                &format!("Blocked keyword '{}' is not allowed in previews", keyword.trim()),
            ));
        }
    }
    None
}

fn collect_warnings(text: &str, report: &AnalysisReport, config: &PreviewConfig) -> Vec<ValidationIssue> {
    let mut warnings = Vec::new();

    if report.security.has_unsanitized_html() {
        let sinks: Vec<&str> = report
            .security
            .findings
            .iter()
            .filter(|f| f.risk == RiskLevel::High)
            .map(|f| f.pattern.as_str())
            .collect();
        warnings.push(ValidationIssue::new(
            WARN_UNSANITIZED_HTML,
            ErrorKind::Security,
            &format!("Unsanitized HTML sink used: {}", sinks.join(", ")),
        ));
    }

    if report.accessibility.images_without_alt {
        warnings.push(ValidationIssue::new(
            WARN_MISSING_ALT,
            ErrorKind::Quality,
            "Image element is missing an alt attribute",
        ));
    }

    if report.accessibility.click_without_keyboard {
        warnings.push(ValidationIssue::new(
            WARN_CLICK_WITHOUT_KEYBOARD,
            ErrorKind::Quality,
            "Click handler has no keyboard handler or aria-label",
        ));
    }

    let mut deprecated: Vec<&str> = Vec::new();
    for caps in DEPRECATED_LIFECYCLE_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            if !deprecated.contains(&m.as_str()) {
                deprecated.push(m.as_str());
            }
        }
    }
    if !deprecated.is_empty() {
        warnings.push(ValidationIssue::new(
            WARN_DEPRECATED_LIFECYCLE,
            ErrorKind::Quality,
            &format!("Deprecated lifecycle method(s): {}", deprecated.join(", ")),
        ));
    }

    if report.stateful_calls.len() > config.hook_warning_threshold {
        warnings.push(ValidationIssue::new(
            WARN_TOO_MANY_HOOKS,
            ErrorKind::Quality,
            &format!(
                "{} stateful calls exceed the threshold of {}",
                report.stateful_calls.len(),
                config.hook_warning_threshold
            ),
        ));
    }

    warnings
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Input gate. Empty and oversized sources are rejected before any analysis runs.
pub fn check_input(unit: &SourceUnit, config: &PreviewConfig) -> Option<ValidationIssue> {
    validate_not_empty(unit).or_else(|| validate_size(unit, config))
}

/// Full gate: input checks, then analysis, then security and quality rules.
pub fn validate(unit: &SourceUnit, config: &PreviewConfig) -> ValidationResult {
    if let Some(issue) = check_input(unit, config) {
        tracing::warn!(code = %issue.code, "rejected input before analysis");
        return ValidationResult {
            is_valid: false,
            errors: vec![issue],
            warnings: vec![],
            partial_analysis: None,
        };
    }
    let report = analyze(unit);
    validate_with_analysis(unit, report, config)
}

/// Apply the rule set to an existing report. The report always comes back in
/// `partial_analysis`, whether or not the source was accepted.
pub fn validate_with_analysis(
    unit: &SourceUnit,
    report: AnalysisReport,
    config: &PreviewConfig,
) -> ValidationResult {
    let mut errors = Vec::new();

    if let Some(issue) = check_input(unit, config) {
        errors.push(issue);
    }
    if let Some(issue) = validate_no_dynamic_code(&report) {
        errors.push(issue);
    }
    if errors.iter().all(|e| e.code != ERR_DYNAMIC_CODE) {
        if let Some(issue) = validate_blocked_keywords(unit.text(), config) {
            errors.push(issue);
        }
    }

    let warnings = collect_warnings(unit.text(), &report, config);

    if !errors.is_empty() {
        tracing::warn!(
            hash = %unit.hash(),
            errors = errors.len(),
            "source rejected by validator"
        );
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        partial_analysis: Some(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(code: &str) -> ValidationResult {
        validate(&SourceUnit::new(code), &PreviewConfig::default())
    }

    #[test]
    fn test_empty_code() {
        let result = check("");
        assert!(!result.is_valid);
        assert_eq!(result.error_message(), Some("Empty code provided"));
        assert!(result.errors[0].is_kind(ErrorKind::Input));
        assert!(result.partial_analysis.is_none());

        assert_eq!(check("   \n ").error_message(), Some(EMPTY_CODE_MESSAGE));
    }

    #[test]
    fn test_oversized_code() {
        let config = PreviewConfig {
            max_code_size: 64,
            ..PreviewConfig::default()
        };
        let code = format!("const App = () => <div>{}</div>;", "x".repeat(64));
        let result = validate(&SourceUnit::new(code), &config);
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].code, ERR_CODE_TOO_LARGE);
        assert!(result.errors[0].is_kind(ErrorKind::Input));
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let config = PreviewConfig {
            max_code_size: 20,
            ..PreviewConfig::default()
        };
        let code = "const A = () => 1;;;";
        assert_eq!(code.len(), 20);
        assert!(validate(&SourceUnit::new(code), &config).is_valid);
    }

    #[test]
    fn test_dynamic_code_rejected_regardless_of_content() {
        let samples = [
            "const App = () => { eval('alert(1)'); return <div/>; };",
            "export default function App() { const f = new Function('return 1'); return <p>{f()}</p>; }",
            "function App() { setTimeout(\"tick()\", 10); return null; }",
            "// a perfectly fine component\nconst Card = () => <img alt=\"x\" src=\"a\"/>;\nwindow.eval ('1');",
        ];
        for code in samples {
            let result = check(code);
            assert!(!result.is_valid, "should reject: {}", code);
            assert!(result.errors.iter().any(|e| e.is_kind(ErrorKind::Security)));
            assert!(result.partial_analysis.is_some());
        }
    }

    #[test]
    fn test_custom_blocked_keyword() {
        let config = PreviewConfig {
            blocked_keywords: vec!["fetch".to_string()],
            ..PreviewConfig::default()
        };
        let result = validate(
            &SourceUnit::new("const App = () => { fetch('/api'); return null; };"),
            &config,
        );
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].code, ERR_BLOCKED_KEYWORD);

        let ok = validate(&SourceUnit::new("const prefetch = () => null;"), &config);
        assert!(ok.is_valid);
    }

    #[test]
    fn test_warnings_pass_through() {
        let code = r#"
class Legacy extends React.Component {
  componentWillMount() {}
  UNSAFE_componentWillUpdate() {}
  render() {
    return <div onClick={this.go} dangerouslySetInnerHTML={{ __html: this.props.html }}><img src="x.png"/></div>;
  }
}"#;
        let result = check(code);
        assert!(result.is_valid);
        let codes: Vec<&str> = result.warnings.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(
            codes,
            vec![
                WARN_UNSANITIZED_HTML,
                WARN_MISSING_ALT,
                WARN_CLICK_WITHOUT_KEYBOARD,
                WARN_DEPRECATED_LIFECYCLE
            ]
        );
        assert!(result.warnings[3].message.contains("componentWillMount"));
        assert!(result.warnings[3].message.contains("componentWillUpdate"));
        assert!(!result.suggestions().is_empty());
    }

    #[test]
    fn test_hook_threshold_warning() {
        let code = "function App() { useA(); useB(); useC(); }";
        let config = PreviewConfig {
            hook_warning_threshold: 2,
            ..PreviewConfig::default()
        };
        let result = validate(&SourceUnit::new(code), &config);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, WARN_TOO_MANY_HOOKS);
    }
}
