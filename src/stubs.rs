//! # Stub Synthesizer
//!
//! Every capitalized symbol the preview references but never binds gets a
//! visible placeholder, so incomplete generated code still renders.
//!
//! ## Resolution Order
//!
//! 1. Names bound by the runtime (framework exports, intrinsic tags, JS globals) are never stubbed.
//! 2. Names declared in the source (`function`, `class`, `const`/`let`/`var`, destructuring,
//!    type declarations) are never stubbed.
//! 3. Imported names and uppercase markup tags are stubbed.
//! 4. Uppercase identifier references found by the syntax pass are stubbed.
//!
//! The registry is owned by a single preview session. Sessions never share one.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    IdentifierReference, TSInterfaceDeclaration, TSType, TSTypeAliasDeclaration,
};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::analyze::ImportInfo;
use crate::transform::find_matching;

lazy_static! {
    /// Uppercase tags React renders natively.
    pub static ref INTRINSIC_TAGS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("Fragment");
        s.insert("Suspense");
        s.insert("StrictMode");
        s.insert("Profiler");
        s.insert("React");
        s
    };

    /// Names the sandbox prelude binds from the framework.
    pub static ref FRAMEWORK_BINDINGS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("React");
        s.insert("ReactDOM");
        s.insert("Children");
        s.insert("Component");
        s.insert("PureComponent");
        s.insert("Fragment");
        s.insert("Suspense");
        s.insert("StrictMode");
        s.insert("Profiler");
        s.insert("createElement");
        s.insert("cloneElement");
        s.insert("createContext");
        s.insert("createRef");
        s.insert("forwardRef");
        s.insert("isValidElement");
        s.insert("lazy");
        s.insert("memo");
        s.insert("startTransition");
        s.insert("useCallback");
        s.insert("useContext");
        s.insert("useDebugValue");
        s.insert("useDeferredValue");
        s.insert("useEffect");
        s.insert("useId");
        s.insert("useImperativeHandle");
        s.insert("useInsertionEffect");
        s.insert("useLayoutEffect");
        s.insert("useMemo");
        s.insert("useReducer");
        s.insert("useRef");
        s.insert("useState");
        s.insert("useSyncExternalStore");
        s.insert("useTransition");
        s
    };

    /// Uppercase globals that must keep their real value.
    static ref JS_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for name in [
            "Array", "ArrayBuffer", "BigInt", "Blob", "Boolean", "Date", "Error", "Event",
            "EventTarget", "File", "FormData", "Headers", "Image", "Infinity", "IntersectionObserver",
            "Intl", "JSON", "Map", "Math", "MutationObserver", "NaN", "Number", "Object", "Promise",
            "Proxy", "RangeError", "Reflect", "RegExp", "Request", "ResizeObserver", "Response",
            "Set", "String", "Symbol", "TypeError", "URL", "URLSearchParams", "WeakMap", "WeakSet",
        ] {
            s.insert(name);
        }
        s
    };

    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap();
    static ref MARKUP_TAG_RE: Regex = Regex::new(r"<([A-Z][\w$]*)").unwrap();
    static ref DECLARATION_RE: Regex = Regex::new(
        r"\b(?:function\*?|class|const|let|var|interface|type|enum)\s+([A-Za-z_$][\w$]*)"
    )
    .unwrap();
    static ref DESTRUCTURING_RE: Regex =
        Regex::new(r"\b(?:const|let|var)\s*[{\[]([^}\]]*)[}\]]").unwrap();
    static ref PARAM_DESTRUCTURING_RE: Regex = Regex::new(r"\(\s*\{([^}]*)\}").unwrap();
    static ref RETURN_ANNOTATION_RE: Regex =
        Regex::new(r"^\s*[A-Za-z_$][\w$.<>\[\]| ]*(?:=>|\{)").unwrap();
}

const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "finally", "for", "function", "if", "import", "in", "instanceof",
    "let", "new", "return", "super", "switch", "this", "throw", "try", "typeof", "var", "void",
    "while", "with", "yield", "null", "true", "false", "undefined",
];

// ═══════════════════════════════════════════════════════════════════════════════
// STUB TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StubKind {
    /// Renders a labelled placeholder block.
    Component,
    /// Permissive mock for non-component imports.
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StubOrigin {
    Import,
    Markup,
    Reference,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stub {
    pub name: String,
    pub kind: StubKind,
    pub origin: StubOrigin,
    /// Declaration injected ahead of the user code.
    pub definition: String,
}

impl Stub {
    fn synthesize(name: &str, origin: StubOrigin) -> Self {
        let kind = if name.starts_with(|c: char| c.is_ascii_uppercase()) {
            StubKind::Component
        } else {
            StubKind::Value
        };
        let factory = match kind {
            StubKind::Component => "stub",
            StubKind::Value => "mock",
        };
        Stub {
            name: name.to_string(),
            kind,
            origin,
            definition: format!("var {} = __preview.{}('{}');", name, factory, name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionFailure {
    pub name: String,
    pub reason: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYMBOL RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Turns an unresolved name into a placeholder.
pub trait SymbolResolver {
    /// Returns the stub bound to `name`, synthesizing it on first use.
    /// `None` means the name cannot be stubbed; `resolution_failed` has been called.
    fn resolve(&mut self, name: &str) -> Option<Stub>;

    fn resolution_failed(&mut self, name: &str, reason: &str);
}

#[derive(Debug, Clone, Default)]
pub struct StubRegistry {
    stubs: BTreeMap<String, Stub>,
    failures: Vec<ResolutionFailure>,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with names discovered by earlier renders.
    pub fn seeded<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.resolve_from(name.as_ref(), StubOrigin::Runtime);
        }
        registry
    }

    pub fn resolve_from(&mut self, name: &str, origin: StubOrigin) -> Option<Stub> {
        if let Some(existing) = self.stubs.get(name) {
            return Some(existing.clone());
        }
        if let Some(reason) = unstubbable_reason(name) {
            self.resolution_failed(name, reason);
            return None;
        }
        let stub = Stub::synthesize(name, origin);
        tracing::debug!(name, ?origin, "synthesized stub");
        self.stubs.insert(name.to_string(), stub.clone());
        Some(stub)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stubs.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Stub> {
        self.stubs.get(name)
    }

    /// Stubs in name order.
    pub fn stubs(&self) -> impl Iterator<Item = &Stub> {
        self.stubs.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.stubs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    pub fn failures(&self) -> &[ResolutionFailure] {
        &self.failures
    }

    /// All stub declarations, one per line, in name order.
    pub fn declarations(&self) -> String {
        self.stubs
            .values()
            .map(|s| s.definition.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl SymbolResolver for StubRegistry {
    fn resolve(&mut self, name: &str) -> Option<Stub> {
        self.resolve_from(name, StubOrigin::Runtime)
    }

    fn resolution_failed(&mut self, name: &str, reason: &str) {
        tracing::warn!(name, reason, "symbol resolution failed");
        self.failures.push(ResolutionFailure {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }
}

fn unstubbable_reason(name: &str) -> Option<&'static str> {
    if !IDENTIFIER_RE.is_match(name) {
        Some("not a valid identifier")
    } else if RESERVED_WORDS.contains(&name) {
        Some("reserved word")
    } else if FRAMEWORK_BINDINGS.contains(name) {
        Some("already bound by the runtime")
    } else {
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Names the source binds itself.
pub fn collect_local_bindings(text: &str) -> HashSet<String> {
    let mut bound = HashSet::new();

    for caps in DECLARATION_RE.captures_iter(text) {
        bound.insert(caps[1].to_string());
    }

    let declared = DESTRUCTURING_RE.captures_iter(text);
    let params = PARAM_DESTRUCTURING_RE
        .captures_iter(text)
        .filter(|caps| caps.get(0).is_some_and(|m| is_parameter_list(text, m.start())));
    for caps in declared.chain(params) {
        for part in caps[1].split(',') {
            // `a: b = 1` binds `b`; `...rest` binds `rest`
            let part = part.split('=').next().unwrap_or("");
            let part = part.rsplit(':').next().unwrap_or("");
            let part = part.trim().trim_start_matches("...").trim();
            if IDENTIFIER_RE.is_match(part) {
                bound.insert(part.to_string());
            }
        }
    }

    bound
}

/// True when the `(` at `open` starts a parameter list rather than call arguments:
/// the matching `)` is followed by `=>`, a body, or a return annotation leading to one.
fn is_parameter_list(text: &str, open: usize) -> bool {
    let Some(close) = find_matching(text.as_bytes(), open) else {
        return false;
    };
    let rest = text[close + 1..].trim_start();
    if rest.starts_with("=>") || rest.starts_with('{') {
        return true;
    }
    rest.strip_prefix(':')
        .is_some_and(|annotated| RETURN_ANNOTATION_RE.is_match(annotated))
}

/// Uppercase-leading tag names in markup, excluding intrinsic tags.
pub fn collect_markup_tags(text: &str) -> BTreeSet<String> {
    MARKUP_TAG_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .filter(|name| !INTRINSIC_TAGS.contains(name.as_str()))
        .collect()
}

struct ReferenceCollector {
    names: BTreeSet<String>,
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        if it.name.starts_with(|c: char| c.is_ascii_uppercase()) {
            self.names.insert(it.name.to_string());
        }
    }

    // Type positions never exist at runtime.
    fn visit_ts_type(&mut self, _it: &TSType<'a>) {}

    fn visit_ts_interface_declaration(&mut self, _it: &TSInterfaceDeclaration<'a>) {}

    fn visit_ts_type_alias_declaration(&mut self, _it: &TSTypeAliasDeclaration<'a>) {}
}

/// Uppercase identifier reads, found with the oxc parser.
/// Returns `None` when the source does not parse; the regex passes still apply.
pub fn collect_references(text: &str) -> Option<BTreeSet<String>> {
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_typescript(true)
        .with_module(true)
        .with_jsx(true);
    let ret = Parser::new(&allocator, text, source_type).parse();
    if !ret.errors.is_empty() {
        return None;
    }
    let mut collector = ReferenceCollector {
        names: BTreeSet::new(),
    };
    collector.visit_program(&ret.program);
    Some(collector.names)
}

/// Populate `registry` with a stub for every referenced-but-unbound symbol.
/// Returns the names added by this call.
pub fn synthesize_stubs(
    text: &str,
    imports: &[ImportInfo],
    registry: &mut StubRegistry,
) -> Vec<String> {
    let locals = collect_local_bindings(text);
    let mut candidates: Vec<(String, StubOrigin)> = Vec::new();

    for import in imports {
        candidates.push((import.name.clone(), StubOrigin::Import));
    }
    for tag in collect_markup_tags(text) {
        candidates.push((tag, StubOrigin::Markup));
    }
    if let Some(references) = collect_references(text) {
        for name in references {
            candidates.push((name, StubOrigin::Reference));
        }
    }

    let mut added = Vec::new();
    for (name, origin) in candidates {
        // Imports and tags shadow a same-named global, plain reads of one do not.
        let runtime_global =
            origin == StubOrigin::Reference && JS_GLOBALS.contains(name.as_str());
        if locals.contains(&name)
            || INTRINSIC_TAGS.contains(name.as_str())
            || FRAMEWORK_BINDINGS.contains(name.as_str())
            || runtime_global
            || registry.contains(&name)
        {
            continue;
        }
        if registry.resolve_from(&name, origin).is_some() {
            added.push(name);
        }
    }
    added
}
