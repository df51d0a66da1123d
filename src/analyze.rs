//! # Code Analyzer
//!
//! Extracts structural facts from raw component source using text heuristics.
//! Nothing here parses: every rule is a regex over the submitted text, so the
//! analyzer produces a report for any input, including half-written code.
//!
//! ## Scoring Invariants
//!
//! 1. **Complexity**: thresholds are strict greater-than and the first matching
//!    rule wins (`high` is checked before `medium`).
//! 2. **Sub-scores**: every score starts at 100, subtracts fixed deductions and
//!    is floored at 0.
//! 3. **Determinism**: imports and stateful calls keep first-appearance order,
//!    so the same text always yields the same report.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::source::SourceUnit;

pub const FALLBACK_COMPONENT_NAME: &str = "Component";

// ═══════════════════════════════════════════════════════════════════════════════
// PATTERNS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref DEFAULT_FUNCTION_RE: Regex =
        Regex::new(r"export\s+default\s+(?:async\s+)?function\s+([A-Za-z_$][\w$]*)").unwrap();
    static ref FUNCTION_DECL_RE: Regex = Regex::new(r"\bfunction\s+([A-Z][\w$]*)").unwrap();
    static ref CONST_BINDING_RE: Regex =
        Regex::new(r"\bconst\s+([A-Z][\w$]*)\s*(?::[^=\n]+)?=").unwrap();
    static ref DEFAULT_IDENT_RE: Regex =
        Regex::new(r"(?m)export\s+default\s+([A-Za-z_$][\w$]*)\s*;?\s*$").unwrap();

    static ref CLASS_EXTENDS_RE: Regex = Regex::new(r"\bclass\s+[\w$]+\s+extends\b").unwrap();
    static ref FUNCTION_KEYWORD_RE: Regex = Regex::new(r"\bfunction\b").unwrap();

    static ref IMPORT_RE: Regex =
        Regex::new(r#"\bimport\s+([\w*${}\s,]+?)\s*from\s*['"]([^'"]+)['"]"#).unwrap();
    static ref HOOK_RE: Regex = Regex::new(r"\buse[A-Z][A-Za-z0-9]*\b").unwrap();

    static ref IMAGE_TAG_RE: Regex = Regex::new(r"<(?:img|Image)\b[^>]*>").unwrap();
    static ref ALT_ATTR_RE: Regex = Regex::new(r"\balt\s*=").unwrap();
    static ref CLICK_RE: Regex = Regex::new(r"\bonClick\s*=").unwrap();
    static ref KEYBOARD_RE: Regex = Regex::new(r"\bonKey(?:Down|Up|Press)\s*=").unwrap();
    static ref ARIA_LABEL_RE: Regex = Regex::new(r"\baria-label(?:ledby)?\s*=").unwrap();
    static ref NON_SEMANTIC_CLICK_RE: Regex =
        Regex::new(r"<(?:div|span)\b[^>]*\bonClick\s*=").unwrap();

    static ref MEMO_RE: Regex =
        Regex::new(r"\b(?:useMemo|useCallback|React\.memo|memo)\s*\(").unwrap();
    static ref LAZY_RE: Regex = Regex::new(r"\b(?:React\.lazy|lazy)\s*\(|<Suspense\b").unwrap();
    static ref SETTER_CALL_RE: Regex =
        Regex::new(r"\bset([A-Z][\w$]*)\s*\(\s*([A-Za-z_$][\w$]*)\s*[-+*/]").unwrap();
    static ref EFFECT_RE: Regex = Regex::new(r"\buse(?:Layout)?Effect\s*\(").unwrap();
    static ref EMPTY_DEPS_RE: Regex = Regex::new(r",\s*\[\s*\]\s*\)").unwrap();
    static ref MAP_CALL_RE: Regex = Regex::new(r"\.map\s*\(").unwrap();
    static ref KEY_ATTR_RE: Regex = Regex::new(r"\bkey\s*=").unwrap();

    static ref EVAL_RE: Regex = Regex::new(r"\beval\s*\(").unwrap();
    static ref FUNCTION_CTOR_RE: Regex = Regex::new(r"\bFunction\s*\(").unwrap();
    static ref STRING_TIMER_RE: Regex =
        Regex::new(r#"\bset(?:Timeout|Interval)\s*\(\s*['"`]"#).unwrap();
    static ref INNER_HTML_PROP_RE: Regex = Regex::new(r"\bdangerouslySetInnerHTML\b").unwrap();
    static ref INNER_HTML_ASSIGN_RE: Regex = Regex::new(r"\.(?:inner|outer)HTML\s*=[^=]").unwrap();
    static ref DOCUMENT_WRITE_RE: Regex = Regex::new(r"\bdocument\.write(?:ln)?\s*\(").unwrap();

    static ref CONDITIONAL_RE: Regex =
        Regex::new(r"\bif\s*\(|\bcase\b|&&|\|\||\?\s").unwrap();
    static ref LISTENER_RE: Regex = Regex::new(r"\baddEventListener\s*\(").unwrap();
    static ref ELEMENT_RE: Regex = Regex::new(r"<[A-Za-z][\w.]*").unwrap();
    static ref FUNCTION_RE: Regex = Regex::new(r"\bfunction\b|=>").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPORT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Functional,
    Class,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportInfo {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeMetrics {
    pub lines_of_code: usize,
    pub characters: usize,
    pub import_count: usize,
    pub hook_count: usize,
    pub element_count: usize,
    pub conditional_count: usize,
    pub function_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityReport {
    pub score: u32,
    pub images_without_alt: bool,
    pub click_without_keyboard: bool,
    pub non_semantic_click: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub score: u32,
    pub uses_memoization: bool,
    pub uses_lazy_loading: bool,
    pub bottlenecks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFinding {
    pub pattern: String,
    pub risk: RiskLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityReport {
    pub score: u32,
    pub risk_level: RiskLevel,
    pub findings: Vec<SecurityFinding>,
}

impl SecurityReport {
    pub fn has_dynamic_code_execution(&self) -> bool {
        self.findings.iter().any(|f| f.risk == RiskLevel::Critical)
    }

    pub fn has_unsanitized_html(&self) -> bool {
        self.findings.iter().any(|f| f.risk == RiskLevel::High)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    pub accessibility: u32,
    pub performance: u32,
    pub security: u32,
    pub maintainability: u32,
    pub testability: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub component_name: String,
    pub component_type: ComponentType,
    pub imports: Vec<ImportInfo>,
    pub stateful_calls: Vec<String>,
    pub lines_of_code: usize,
    pub complexity: Complexity,
    pub scores: Scores,
    pub metrics: CodeMetrics,
    pub accessibility: AccessibilityReport,
    pub performance: PerformanceReport,
    pub security: SecurityReport,
    pub description: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn analyze(unit: &SourceUnit) -> AnalysisReport {
    analyze_source(unit.text())
}

pub fn analyze_source(text: &str) -> AnalysisReport {
    let component_name = detect_component_name(text);
    let component_type = detect_component_type(text);
    let imports = extract_imports(text);
    let stateful_calls = extract_stateful_calls(text);
    let lines_of_code = text.lines().count();
    let complexity = classify_complexity(lines_of_code, stateful_calls.len(), imports.len());

    let metrics = CodeMetrics {
        lines_of_code,
        characters: text.chars().count(),
        import_count: imports.len(),
        hook_count: stateful_calls.len(),
        element_count: ELEMENT_RE.find_iter(text).count(),
        conditional_count: CONDITIONAL_RE.find_iter(text).count(),
        function_count: FUNCTION_RE.find_iter(text).count(),
    };

    let accessibility = accessibility_report(text);
    let performance = performance_report(text);
    let security = security_report(text);

    let scores = Scores {
        accessibility: accessibility.score,
        performance: performance.score,
        security: security.score,
        maintainability: maintainability_score(&metrics),
        testability: testability_score(text, &metrics),
    };

    let description = describe(&component_name, component_type, &metrics, complexity);

    AnalysisReport {
        component_name,
        component_type,
        imports,
        stateful_calls,
        lines_of_code,
        complexity,
        scores,
        metrics,
        accessibility,
        performance,
        security,
        description,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRUCTURE
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolve the component name. Priority:
/// 1. `export default function Name`
/// 2. `function Name` (capitalized)
/// 3. `const Name =` (capitalized)
/// 4. `export default Name`
pub fn detect_component_name(text: &str) -> String {
    if let Some(name) = first_capture(&DEFAULT_FUNCTION_RE, text) {
        return name;
    }
    if let Some(name) = first_capture(&FUNCTION_DECL_RE, text) {
        return name;
    }
    if let Some(name) = first_capture(&CONST_BINDING_RE, text) {
        return name;
    }
    for caps in DEFAULT_IDENT_RE.captures_iter(text) {
        let name = &caps[1];
        if !matches!(name, "function" | "class" | "async" | "new") {
            return name.to_string();
        }
    }
    FALLBACK_COMPONENT_NAME.to_string()
}

pub fn detect_component_type(text: &str) -> ComponentType {
    if CLASS_EXTENDS_RE.is_match(text) {
        ComponentType::Class
    } else if FUNCTION_KEYWORD_RE.is_match(text) || text.contains("=>") {
        ComponentType::Functional
    } else {
        ComponentType::Unknown
    }
}

/// Every locally bound name introduced by an import statement, in source order.
pub fn extract_imports(text: &str) -> Vec<ImportInfo> {
    let mut imports = Vec::new();
    for caps in IMPORT_RE.captures_iter(text) {
        let source = caps[2].to_string();
        for name in split_import_specifier(&caps[1]) {
            imports.push(ImportInfo {
                name,
                source: source.clone(),
            });
        }
    }
    imports
}

fn split_import_specifier(spec: &str) -> Vec<String> {
    let cleaned = spec.replace(['{', '}'], ",");
    let cleaned = cleaned.trim();
    let cleaned = cleaned.strip_prefix("type ").unwrap_or(cleaned);

    cleaned
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            let part = part.strip_prefix("type ").unwrap_or(part).trim();
            if part.is_empty() {
                return None;
            }
            // `a as b` and `* as ns` bind the right-hand name
            let local = match part.rsplit_once(" as ") {
                Some((_, alias)) => alias.trim(),
                None => part,
            };
            if local.is_empty() || local == "*" {
                None
            } else {
                Some(local.to_string())
            }
        })
        .collect()
}

/// `use<Capitalized>` identifiers, deduplicated in first-appearance order.
pub fn extract_stateful_calls(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut calls = Vec::new();
    for m in HOOK_RE.find_iter(text) {
        if seen.insert(m.as_str()) {
            calls.push(m.as_str().to_string());
        }
    }
    calls
}

pub fn classify_complexity(lines: usize, hooks: usize, imports: usize) -> Complexity {
    if lines > 100 || hooks > 5 || imports > 10 {
        Complexity::High
    } else if lines > 50 || hooks > 3 || imports > 5 {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SUB-REPORTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn accessibility_report(text: &str) -> AccessibilityReport {
    let mut score: i32 = 100;
    let mut issues = Vec::new();

    let images_without_alt = IMAGE_TAG_RE
        .find_iter(text)
        .any(|tag| !ALT_ATTR_RE.is_match(tag.as_str()));
    if images_without_alt {
        score -= 20;
        issues.push("Image element without alt text".to_string());
    }

    let click_without_keyboard = CLICK_RE.is_match(text)
        && !KEYBOARD_RE.is_match(text)
        && !ARIA_LABEL_RE.is_match(text);
    if click_without_keyboard {
        score -= 15;
        issues.push("Click handler without keyboard handler or aria-label".to_string());
    }

    let non_semantic_click = NON_SEMANTIC_CLICK_RE.is_match(text);
    if non_semantic_click {
        score -= 10;
        issues.push("Clickable div/span used instead of a button or link".to_string());
    }

    AccessibilityReport {
        score: score.max(0) as u32,
        images_without_alt,
        click_without_keyboard,
        non_semantic_click,
        issues,
    }
}

pub fn performance_report(text: &str) -> PerformanceReport {
    let mut bottlenecks = Vec::new();

    let stale_closure = SETTER_CALL_RE.captures_iter(text).any(|caps| {
        let state = lower_first(&caps[1]);
        state == caps[2]
    });
    if stale_closure {
        bottlenecks.push(
            "State setter reads the current value directly; use a functional update to avoid stale closures"
                .to_string(),
        );
    }

    if EFFECT_RE.is_match(text) && EMPTY_DEPS_RE.is_match(text) {
        bottlenecks.push(
            "Effect with an empty dependency list may capture stale props or state".to_string(),
        );
    }

    if MAP_CALL_RE.is_match(text) && ELEMENT_RE.is_match(text) && !KEY_ATTR_RE.is_match(text) {
        bottlenecks.push("List rendered with .map() without a stable key prop".to_string());
    }

    let score = (100 - 15 * bottlenecks.len() as i32).max(0) as u32;

    PerformanceReport {
        score,
        uses_memoization: MEMO_RE.is_match(text),
        uses_lazy_loading: LAZY_RE.is_match(text),
        bottlenecks,
    }
}

pub fn security_report(text: &str) -> SecurityReport {
    let mut findings = Vec::new();

    let checks: [(&Regex, &str, RiskLevel, &str); 6] = [
        (
            &*EVAL_RE,
            "eval()",
            RiskLevel::Critical,
            "eval() executes arbitrary code",
        ),
        (
            &*FUNCTION_CTOR_RE,
            "Function()",
            RiskLevel::Critical,
            "The Function constructor executes arbitrary code",
        ),
        (
            &*STRING_TIMER_RE,
            "setTimeout/setInterval(string)",
            RiskLevel::Critical,
            "Timers with string bodies execute arbitrary code",
        ),
        (
            &*INNER_HTML_PROP_RE,
            "dangerouslySetInnerHTML",
            RiskLevel::High,
            "dangerouslySetInnerHTML injects unsanitized HTML",
        ),
        (
            &*INNER_HTML_ASSIGN_RE,
            "innerHTML",
            RiskLevel::High,
            "Assigning innerHTML injects unsanitized HTML",
        ),
        (
            &*DOCUMENT_WRITE_RE,
            "document.write()",
            RiskLevel::High,
            "document.write() injects unsanitized HTML",
        ),
    ];

    for (re, pattern, risk, message) in checks {
        if re.is_match(text) {
            findings.push(SecurityFinding {
                pattern: pattern.to_string(),
                risk,
                message: message.to_string(),
            });
        }
    }

    let mut score: i32 = 100;
    for finding in &findings {
        score -= match finding.risk {
            RiskLevel::Critical => 50,
            RiskLevel::High => 25,
            RiskLevel::None => 0,
        };
    }

    let risk_level = findings
        .iter()
        .map(|f| f.risk)
        .max()
        .unwrap_or(RiskLevel::None);

    SecurityReport {
        score: score.max(0) as u32,
        risk_level,
        findings,
    }
}

fn maintainability_score(metrics: &CodeMetrics) -> u32 {
    let mut score: i32 = 100;
    if metrics.lines_of_code > 100 {
        score -= 10;
    }
    if metrics.lines_of_code > 200 {
        score -= 10;
    }
    if metrics.conditional_count > 10 {
        score -= 15;
    }
    if metrics.hook_count > 5 {
        score -= 10;
    }
    score.max(0) as u32
}

fn testability_score(text: &str, metrics: &CodeMetrics) -> u32 {
    let mut score: i32 = 100;
    if EFFECT_RE.is_match(text) {
        score -= 10;
    }
    if LISTENER_RE.is_match(text) {
        score -= 15;
    }
    if metrics.hook_count > 5 {
        score -= 10;
    }
    if metrics.lines_of_code > 200 {
        score -= 10;
    }
    score.max(0) as u32
}

fn describe(
    name: &str,
    component_type: ComponentType,
    metrics: &CodeMetrics,
    complexity: Complexity,
) -> String {
    let kind = match component_type {
        ComponentType::Functional => "functional component",
        ComponentType::Class => "class component",
        ComponentType::Unknown => "module of unknown shape",
    };
    format!(
        "{} is a {} with {} stateful call(s), {} import(s) and {} line(s) of code ({} complexity).",
        name,
        kind,
        metrics.hook_count,
        metrics.import_count,
        metrics.lines_of_code,
        complexity.as_str()
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADVICE
// ═══════════════════════════════════════════════════════════════════════════════

impl AnalysisReport {
    pub fn suggestions(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.accessibility.images_without_alt {
            out.push("Add descriptive alt text to every image.".to_string());
        }
        if self.accessibility.click_without_keyboard {
            out.push("Pair click handlers with onKeyDown or an aria-label.".to_string());
        }
        if self.accessibility.non_semantic_click {
            out.push("Use <button> for clickable elements instead of <div> or <span>.".to_string());
        }
        if self.security.has_unsanitized_html() {
            out.push("Sanitize HTML before injecting it, or render it as text.".to_string());
        }
        if self.complexity == Complexity::High {
            out.push(format!(
                "Split {} into smaller components to reduce complexity.",
                self.component_name
            ));
        }
        if self.component_type == ComponentType::Class {
            out.push("Consider converting the class component to a function with hooks.".to_string());
        }
        out
    }

    pub fn optimization_tips(&self) -> Vec<String> {
        let mut tips: Vec<String> = self.performance.bottlenecks.clone();
        if !self.performance.uses_memoization && self.stateful_calls.len() > 3 {
            tips.push("Memoize derived values with useMemo and callbacks with useCallback.".to_string());
        }
        if !self.performance.uses_lazy_loading && self.lines_of_code > 200 {
            tips.push("Lazy-load heavy subtrees with React.lazy and Suspense.".to_string());
        }
        tips
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary_source(padding: usize) -> String {
        let mut lines: Vec<String> = (0..10)
            .map(|i| format!("import Dep{} from 'dep{}';", i, i))
            .collect();
        lines.push("const hooks = [useState, useEffect, useMemo, useRef, useCallback];".to_string());
        for _ in 0..padding {
            lines.push("// filler".to_string());
        }
        lines.join("\n")
    }

    #[test]
    fn test_component_name_priority() {
        let src = "const Helper = 1;\nfunction Inner() {}\nexport default function Page() {}";
        assert_eq!(detect_component_name(src), "Page");

        let src = "const Card = () => null;\nfunction Shell() {}";
        assert_eq!(detect_component_name(src), "Shell");

        let src = "const Card = () => null;";
        assert_eq!(detect_component_name(src), "Card");

        let src = "const card = () => null;\nexport default card;";
        assert_eq!(detect_component_name(src), "card");

        assert_eq!(detect_component_name("let x = 1;"), FALLBACK_COMPONENT_NAME);
    }

    #[test]
    fn test_component_type() {
        assert_eq!(
            detect_component_type("class App extends React.Component {}"),
            ComponentType::Class
        );
        assert_eq!(
            detect_component_type("const App = () => <div/>;"),
            ComponentType::Functional
        );
        assert_eq!(detect_component_type("<div/>"), ComponentType::Unknown);
    }

    #[test]
    fn test_import_splitting() {
        let src = "import React, { useState, useEffect as useFx } from 'react';\n\
                   import * as Icons from \"lucide-react\";\n\
                   import type { Props } from './types';\n\
                   import {\n  Button,\n  Card,\n} from '@/ui';\n\
                   import './styles.css';";
        let imports = extract_imports(src);
        let names: Vec<&str> = imports.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["React", "useState", "useFx", "Icons", "Props", "Button", "Card"]
        );
        assert_eq!(imports[3].source, "lucide-react");
        assert_eq!(imports[6].source, "@/ui");
    }

    #[test]
    fn test_stateful_calls_deduplicated() {
        let src = "const [a, setA] = useState(0); const [b] = useState(1); useEffect(() => {});";
        assert_eq!(extract_stateful_calls(src), vec!["useState", "useEffect"]);
        assert!(extract_stateful_calls("const user = reuseThing();").is_empty());
    }

    #[test]
    fn test_complexity_boundary_is_strict() {
        let high = analyze_source(&boundary_source(90));
        assert_eq!(high.lines_of_code, 101);
        assert_eq!(high.stateful_calls.len(), 5);
        assert_eq!(high.imports.len(), 10);
        assert_eq!(high.complexity, Complexity::High);

        let medium = analyze_source(&boundary_source(89));
        assert_eq!(medium.lines_of_code, 100);
        assert_eq!(medium.complexity, Complexity::Medium);
    }

    #[test]
    fn test_simple_functional_component() {
        let src = r#"import React from 'react';

export default function Counter() {
  const [count, setCount] = React.useState(0);
  React.useEffect(() => { document.title = String(count); }, [count]);
  return <p className="count">{count}</p>;
}
"#;
        let report = analyze_source(src);
        assert_eq!(report.component_name, "Counter");
        assert_eq!(report.component_type, ComponentType::Functional);
        assert_eq!(report.imports.len(), 1);
        assert_eq!(report.stateful_calls, vec!["useState", "useEffect"]);
        assert_eq!(report.complexity, Complexity::Low);
        assert_eq!(report.scores.accessibility, 100);
    }

    #[test]
    fn test_accessibility_deductions() {
        let src = r#"<div onClick={go}><img src="a.png" /></div>"#;
        let report = accessibility_report(src);
        assert!(report.images_without_alt);
        assert!(report.click_without_keyboard);
        assert!(report.non_semantic_click);
        assert_eq!(report.score, 55);

        let ok = accessibility_report(r#"<button onClick={go} aria-label="Go"><img alt="" src="a.png"/></button>"#);
        assert_eq!(ok.score, 100);
    }

    #[test]
    fn test_performance_bottlenecks() {
        let src = r#"
const List = ({ items }) => {
  const [count, setCount] = useState(0);
  useEffect(() => { setCount(count + 1); }, []);
  return <ul>{items.map(i => <li>{i}</li>)}</ul>;
};"#;
        let report = performance_report(src);
        assert_eq!(report.bottlenecks.len(), 3);
        assert_eq!(report.score, 55);
        assert!(!report.uses_memoization);

        let memo = performance_report("const v = useMemo(() => 1, [a]); const L = React.lazy(() => load());");
        assert!(memo.uses_memoization);
        assert!(memo.uses_lazy_loading);
    }

    #[test]
    fn test_security_findings() {
        let report = security_report("eval('1'); el.innerHTML = html;");
        assert_eq!(report.risk_level, RiskLevel::Critical);
        assert!(report.has_dynamic_code_execution());
        assert!(report.has_unsanitized_html());
        assert_eq!(report.score, 25);

        let clean = security_report("const evaluate = (x) => x; myFunction(1);");
        assert_eq!(clean.risk_level, RiskLevel::None);
        assert_eq!(clean.score, 100);
    }

    #[test]
    fn test_maintainability_and_testability() {
        let mut src = String::from("useEffect(() => { window.addEventListener('resize', f); });\n");
        for _ in 0..210 {
            src.push_str("if (a) { b(); }\n");
        }
        let report = analyze_source(&src);
        assert_eq!(report.scores.maintainability, 65);
        assert_eq!(report.scores.testability, 65);
    }
}
