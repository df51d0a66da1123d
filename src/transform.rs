//! # Transform Pipeline
//!
//! Rewrites TypeScript-flavoured component source into plain JSX the sandbox
//! compiler accepts. The rules are ordered text rewrites; each one runs on
//! the output of the previous.
//!
//! 1. Strip interface and type-alias declarations
//! 2. Strip return-type annotations on function and method signatures
//! 3. Strip return-type annotations on arrow functions
//! 4. Strip parameter-type annotations
//! 5. Strip residual binding annotations, hook type arguments, and `as` casts
//! 6. Remove import statements
//! 7. Rewrite the default export into `window.__PREVIEW_ENTRY__`
//! 8. Remove remaining `export` keywords
//!
//! The result is preflighted with the oxc parser. Text that does not parse
//! gets a syntax-error entry point instead of an error.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Host-visible slot the rewritten default export is assigned to.
pub const ENTRY_SLOT: &str = "window.__PREVIEW_ENTRY__";

lazy_static! {
    static ref INTERFACE_HEAD_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:export[ \t]+)?(?:declare[ \t]+)?interface[ \t]+[\w$]+[^{;]*\{"
    )
    .unwrap();
    static ref TYPE_ALIAS_HEAD_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:export[ \t]+)?(?:declare[ \t]+)?type[ \t]+[\w$]+[ \t]*(?:<[^=\n]*>)?[ \t]*="
    )
    .unwrap();
    static ref FUNCTION_GENERICS_RE: Regex =
        Regex::new(r"(\bfunction\b\s*\*?\s*[\w$]*)\s*<[^<>()]*(?:<[^<>()]*>[^<>()]*)*>\s*\(")
            .unwrap();
    static ref FUNCTION_HEAD_RE: Regex =
        Regex::new(r"\bfunction\b\s*\*?\s*[\w$]*\s*\(").unwrap();
    static ref METHOD_HEAD_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:(?:async|static|get|set|public|private|protected)[ \t]+)*([\w$]+)[ \t]*\("
    )
    .unwrap();
    static ref ARROW_RETURN_RE: Regex = Regex::new(r"\)\s*:\s*[^=;{}()]+?\s*=>").unwrap();
    static ref BINDING_ANNOTATION_RE: Regex = Regex::new(
        r"\b(const|let|var)(\s+)([\w$]+|\[[^\]=]*\]|\{[^}=]*\})\s*:\s*[^=;(]+?\s*="
    )
    .unwrap();
    static ref UNINITIALIZED_ANNOTATION_RE: Regex =
        Regex::new(r"\b(let|var)(\s+)([\w$]+)\s*:\s*[\w$.<>\[\]| ]+;").unwrap();
    static ref HOOK_GENERIC_RE: Regex = Regex::new(
        r"\b(use[A-Z][\w$]*|createContext|forwardRef|memo)\s*<[^<>()]*(?:<[^<>()]*>[^<>()]*)*>\s*\("
    )
    .unwrap();
    static ref AS_ASSERTION_RE: Regex = Regex::new(
        r#"([\w$)\]}'"])\s+as\s+(?:(?:const|any|unknown|HTML[A-Za-z]*Element)\b|React\.[A-Za-z]+(?:<[^<>]*>)?)"#
    )
    .unwrap();
    static ref IMPORT_STMT_RE: Regex = Regex::new(
        r#"(?m)^[ \t]*import\s+[^;'"]*?\s*from\s*['"][^'"]*['"][ \t]*;?[ \t]*\r?\n?"#
    )
    .unwrap();
    static ref SIDE_EFFECT_IMPORT_RE: Regex =
        Regex::new(r#"(?m)^[ \t]*import\s*['"][^'"]*['"][ \t]*;?[ \t]*\r?\n?"#).unwrap();
    static ref DEFAULT_DECL_RE: Regex = Regex::new(
        r"\bexport\s+default\s+((?:async\s+)?function\b\s*\*?\s*([A-Za-z_$][\w$]*)|class\s+([A-Za-z_$][\w$]*))"
    )
    .unwrap();
    static ref DEFAULT_ALIAS_RE: Regex =
        Regex::new(r"\bexport\s*\{\s*([A-Za-z_$][\w$]*)\s+as\s+default\s*\}\s*;?").unwrap();
    static ref DEFAULT_EXPR_RE: Regex = Regex::new(r"\bexport\s+default\s+").unwrap();
    static ref EXPORT_LIST_RE: Regex =
        Regex::new(r#"\bexport\s*(?:\*|\{[^}]*\})\s*(?:from\s*['"][^'"]*['"])?[ \t]*;?"#).unwrap();
    static ref EXPORT_KEYWORD_RE: Regex =
        Regex::new(r"\bexport\s+((?:async\s+)?function|class|const|let|var|enum)\b").unwrap();
}

const NON_METHOD_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "with", "return", "function", "typeof", "await", "new",
];

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EntryPoint {
    /// The default export was assigned to [`ENTRY_SLOT`].
    DefaultExport,
    /// No default export; the sandbox falls back to the detected component name.
    Fallback,
    /// The rewritten text does not parse.
    SyntaxError { message: String },
}

impl EntryPoint {
    pub fn kind(&self) -> &'static str {
        match self {
            EntryPoint::DefaultExport => "defaultExport",
            EntryPoint::Fallback => "fallback",
            EntryPoint::SyntaxError { .. } => "syntaxError",
        }
    }

    pub fn is_syntax_error(&self) -> bool {
        matches!(self, EntryPoint::SyntaxError { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub code: String,
    pub entry: EntryPoint,
    /// Rules that changed the text, in application order.
    pub applied: Vec<&'static str>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORM TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// One text rewrite stage.
pub trait Transform: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, text: &str) -> String;
}

pub struct StripTypeDeclarations;
pub struct StripFunctionReturnTypes;
pub struct StripArrowReturnTypes;
pub struct StripParameterTypes;
pub struct StripBindingAnnotations;
pub struct RemoveImports;
pub struct RewriteDefaultExport;
pub struct RemoveExports;

impl Transform for StripTypeDeclarations {
    fn name(&self) -> &'static str {
        "strip-type-declarations"
    }

    fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();

        let mut pos = 0;
        while let Some((start, head_end)) = INTERFACE_HEAD_RE
            .find_at(&out, pos)
            .map(|m| (m.start(), m.end()))
        {
            match find_matching(out.as_bytes(), head_end - 1) {
                Some(close) => {
                    let end = consume_terminator(out.as_bytes(), close + 1);
                    out.replace_range(start..end, "");
                    pos = start;
                }
                None => pos = head_end,
            }
        }

        pos = 0;
        while let Some((start, head_end)) = TYPE_ALIAS_HEAD_RE
            .find_at(&out, pos)
            .map(|m| (m.start(), m.end()))
        {
            let end = type_alias_end(out.as_bytes(), head_end);
            out.replace_range(start..end, "");
            pos = start;
        }

        out
    }
}

impl Transform for StripFunctionReturnTypes {
    fn name(&self) -> &'static str {
        "strip-function-return-types"
    }

    fn apply(&self, text: &str) -> String {
        let mut out = FUNCTION_GENERICS_RE.replace_all(text, "$1(").into_owned();
        let mut signatures = function_signatures(&out);
        signatures.sort_by(|a, b| b.close.cmp(&a.close));
        for sig in signatures {
            if let Some(end) = return_type_end(out.as_bytes(), sig.close) {
                out.replace_range(sig.close + 1..end, " ");
            }
        }
        out
    }
}

impl Transform for StripArrowReturnTypes {
    fn name(&self) -> &'static str {
        "strip-arrow-return-types"
    }

    fn apply(&self, text: &str) -> String {
        let b = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in ARROW_RETURN_RE.find_iter(text) {
            if !opens_arrow_parameters(b, m.start()) {
                continue;
            }
            out.push_str(&text[last..m.start()]);
            out.push_str(") =>");
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }
}

impl Transform for StripParameterTypes {
    fn name(&self) -> &'static str {
        "strip-parameter-types"
    }

    fn apply(&self, text: &str) -> String {
        let mut signatures = function_signatures(text);
        signatures.extend(arrow_signatures(text));
        signatures.sort_by_key(|s| (s.open, std::cmp::Reverse(s.close)));

        // Nested lists disappear with their parent's annotation.
        let mut outermost: Vec<Signature> = Vec::new();
        for sig in signatures {
            match outermost.last() {
                Some(last) if sig.open <= last.close => {}
                _ => outermost.push(sig),
            }
        }

        let mut out = text.to_string();
        for sig in outermost.iter().rev() {
            let params = &out[sig.open + 1..sig.close];
            let stripped = strip_param_types(params);
            if stripped != params {
                out.replace_range(sig.open + 1..sig.close, &stripped);
            }
        }
        out
    }
}

impl Transform for StripBindingAnnotations {
    fn name(&self) -> &'static str {
        "strip-binding-annotations"
    }

    fn apply(&self, text: &str) -> String {
        let out = BINDING_ANNOTATION_RE.replace_all(text, "$1$2$3 =");
        let out = UNINITIALIZED_ANNOTATION_RE.replace_all(&out, "$1$2$3;");
        let out = HOOK_GENERIC_RE.replace_all(&out, "$1(");
        let b = out.as_bytes();
        AS_ASSERTION_RE
            .replace_all(&out, |caps: &Captures| match caps.get(0) {
                Some(m) if in_markup_text(b, m.start()) => m.as_str().to_string(),
                _ => caps.get(1).map_or("", |g| g.as_str()).to_string(),
            })
            .into_owned()
    }
}

impl Transform for RemoveImports {
    fn name(&self) -> &'static str {
        "remove-imports"
    }

    fn apply(&self, text: &str) -> String {
        let out = IMPORT_STMT_RE.replace_all(text, "");
        SIDE_EFFECT_IMPORT_RE.replace_all(&out, "").into_owned()
    }
}

impl Transform for RewriteDefaultExport {
    fn name(&self) -> &'static str {
        "rewrite-default-export"
    }

    fn apply(&self, text: &str) -> String {
        if let Some(caps) = DEFAULT_DECL_RE.captures(text) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let declaration = caps.get(1).map_or("", |m| m.as_str());
            let name = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());

            let mut out = String::with_capacity(text.len() + 48);
            out.push_str(&text[..whole.start]);
            out.push_str(declaration);
            out.push_str(&text[whole.end..]);
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("{} = {};\n", ENTRY_SLOT, name));
            return out;
        }

        if DEFAULT_ALIAS_RE.is_match(text) {
            let replacement = format!("{} = $1;", ENTRY_SLOT);
            return DEFAULT_ALIAS_RE
                .replacen(text, 1, replacement.as_str())
                .into_owned();
        }

        let replacement = format!("{} = ", ENTRY_SLOT);
        DEFAULT_EXPR_RE
            .replacen(text, 1, replacement.as_str())
            .into_owned()
    }
}

impl Transform for RemoveExports {
    fn name(&self) -> &'static str {
        "remove-exports"
    }

    fn apply(&self, text: &str) -> String {
        let out = EXPORT_LIST_RE.replace_all(text, "");
        EXPORT_KEYWORD_RE.replace_all(&out, "$1").into_owned()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TransformPipeline {
    rules: Vec<Box<dyn Transform>>,
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl TransformPipeline {
    /// The eight rules in their fixed order.
    pub fn standard() -> Self {
        Self::with_rules(vec![
            Box::new(StripTypeDeclarations),
            Box::new(StripFunctionReturnTypes),
            Box::new(StripArrowReturnTypes),
            Box::new(StripParameterTypes),
            Box::new(StripBindingAnnotations),
            Box::new(RemoveImports),
            Box::new(RewriteDefaultExport),
            Box::new(RemoveExports),
        ])
    }

    pub fn with_rules(rules: Vec<Box<dyn Transform>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn run(&self, text: &str) -> TransformOutput {
        let mut code = text.to_string();
        let mut applied = Vec::new();

        for rule in &self.rules {
            let next = rule.apply(&code);
            if next != code {
                tracing::debug!(rule = rule.name(), "transform rule applied");
                applied.push(rule.name());
                code = next;
            }
        }

        let entry = match preflight(&code) {
            Err(message) => {
                tracing::debug!(%message, "transformed code failed preflight");
                EntryPoint::SyntaxError { message }
            }
            Ok(()) if code.contains(ENTRY_SLOT) => EntryPoint::DefaultExport,
            Ok(()) => EntryPoint::Fallback,
        };

        TransformOutput {
            code,
            entry,
            applied,
        }
    }
}

/// Run the standard pipeline.
pub fn transform(text: &str) -> TransformOutput {
    TransformPipeline::standard().run(text)
}

/// Parse `code` as plain JSX. Returns the first parser message on failure.
pub fn preflight(code: &str) -> std::result::Result<(), String> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true).with_jsx(true);
    let ret = Parser::new(&allocator, code, source_type).parse();
    match ret.errors.first() {
        Some(err) => Err(err.to_string()),
        None => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNING HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// A parenthesized parameter list; `open`/`close` index the parens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signature {
    open: usize,
    close: usize,
}

fn function_signatures(text: &str) -> Vec<Signature> {
    let b = text.as_bytes();
    let mut sigs = Vec::new();

    for m in FUNCTION_HEAD_RE.find_iter(text) {
        let open = m.end() - 1;
        if let Some(close) = find_matching(b, open) {
            sigs.push(Signature { open, close });
        }
    }

    // Methods only count when a body follows the list. A head continuing an
    // expression, such as a ternary branch, is a call.
    for caps in METHOD_HEAD_RE.captures_iter(text) {
        let name = caps.get(1).map_or("", |m| m.as_str());
        if NON_METHOD_KEYWORDS.contains(&name) {
            continue;
        }
        let line_start = caps.get(0).map_or(0, |m| m.start());
        if !matches!(prev_non_ws(b, line_start), None | Some(b';' | b'{' | b'}' | b',')) {
            continue;
        }
        let open = caps.get(0).map_or(0, |m| m.end() - 1);
        let Some(close) = find_matching(b, open) else {
            continue;
        };
        let after = return_type_end(b, close).unwrap_or(close + 1);
        if next_non_ws(b, after) == Some(b'{') && !sigs.iter().any(|s| s.open == open) {
            sigs.push(Signature { open, close });
        }
    }

    sigs
}

fn arrow_signatures(text: &str) -> Vec<Signature> {
    let b = text.as_bytes();
    let mut sigs = Vec::new();
    let mut from = 0;
    while let Some(offset) = text[from..].find("=>") {
        let arrow = from + offset;
        from = arrow + 2;
        let mut j = arrow;
        while j > 0 && b[j - 1].is_ascii_whitespace() {
            j -= 1;
        }
        if j == 0 || b[j - 1] != b')' {
            continue;
        }
        if let Some(open) = find_matching_backward(b, j - 1) {
            sigs.push(Signature {
                open,
                close: j - 1,
            });
        }
    }
    sigs
}

/// End of a `: Type` return annotation following `close`, i.e. the index of the body brace.
fn return_type_end(b: &[u8], close: usize) -> Option<usize> {
    let mut i = close + 1;
    while i < b.len() && b[i].is_ascii_whitespace() {
        i += 1;
    }
    if b.get(i) != Some(&b':') {
        return None;
    }
    i += 1;
    let mut depth = 0i32;
    while i < b.len() {
        match b[i] {
            b'(' | b'[' | b'<' => depth += 1,
            b')' | b']' => depth -= 1,
            b'>' if i > 0 && b[i - 1] != b'=' => depth -= 1,
            b'{' if depth <= 0 => return Some(i),
            b';' | b'}' if depth <= 0 => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

fn strip_param_types(params: &str) -> String {
    let chars: Vec<char> = params.chars().collect();
    let mut out = String::with_capacity(params.len());
    let mut depth = 0i32;
    let mut type_depth = 0i32;
    let mut in_type = false;
    let mut in_default = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_type {
            match c {
                '=' if chars.get(i + 1) == Some(&'>') => {
                    i += 2;
                    continue;
                }
                ',' | '=' if type_depth <= 0 => {
                    in_type = false;
                    type_depth = 0;
                    if c == '=' {
                        out.push(' ');
                    }
                    // reprocess the delimiter outside the annotation
                    continue;
                }
                '(' | '{' | '[' | '<' => type_depth += 1,
                ')' | '}' | ']' | '>' => type_depth -= 1,
                _ => {}
            }
            i += 1;
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                let end = skip_string_chars(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
                continue;
            }
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth -= 1,
            ',' if depth == 0 => in_default = false,
            '=' if depth == 0 => in_default = true,
            ':' if depth == 0 && !in_default => {
                if out.ends_with('?') {
                    out.pop();
                }
                in_type = true;
                i += 1;
                continue;
            }
            _ => {}
        }
        out.push(c);
        i += 1;
    }

    out
}

fn skip_string_chars(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == '\\' {
            i += 2;
            continue;
        }
        if chars[i] == quote {
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn skip_string(b: &[u8], start: usize) -> usize {
    let quote = b[start];
    let mut i = start + 1;
    while i < b.len() {
        if b[i] == b'\\' {
            i += 2;
            continue;
        }
        if b[i] == quote {
            return i + 1;
        }
        i += 1;
    }
    b.len()
}

/// Index of the bracket closing the one at `open`.
pub(crate) fn find_matching(b: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut i = open;
    while i < b.len() {
        match b[i] {
            b'\'' | b'"' | b'`' => {
                i = skip_string(b, i);
                continue;
            }
            b'(' | b'{' | b'[' => depth += 1,
            b')' | b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn find_matching_backward(b: &[u8], close: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut i = close + 1;
    while i > 0 {
        i -= 1;
        match b[i] {
            b')' | b'}' | b']' => depth += 1,
            b'(' | b'{' | b'[' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn prev_non_ws(b: &[u8], before: usize) -> Option<u8> {
    b.get(..before)?
        .iter()
        .rev()
        .copied()
        .find(|c| !c.is_ascii_whitespace())
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}

/// Whether the `)` at `close` ends an arrow parameter list. A call such as
/// `compact()` or a parenthesized ternary branch `? (a)` is rejected.
fn opens_arrow_parameters(b: &[u8], close: usize) -> bool {
    let Some(open) = find_matching_backward(b, close) else {
        return false;
    };
    let mut i = open;
    while i > 0 && b[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    if i == 0 {
        return true;
    }
    let prev = b[i - 1];
    if is_ident_byte(prev) {
        let mut start = i - 1;
        while start > 0 && is_ident_byte(b[start - 1]) {
            start -= 1;
        }
        return matches!(&b[start..i], b"async" | b"return");
    }
    !matches!(prev, b')' | b']' | b'?' | b'.')
}

/// Whether `at` sits in JSX text: the nearest structural byte before it closes a tag.
fn in_markup_text(b: &[u8], at: usize) -> bool {
    let mut i = at + 1;
    while i > 0 {
        i -= 1;
        match b[i] {
            b'>' => return i == 0 || b[i - 1] != b'=',
            b'<' | b'{' | b'}' | b'(' | b')' | b'[' | b']' | b';' | b'=' => return false,
            _ => {}
        }
    }
    false
}

fn next_non_ws(b: &[u8], from: usize) -> Option<u8> {
    b.get(from..)?
        .iter()
        .copied()
        .find(|c| !c.is_ascii_whitespace())
}

/// Skip an optional `;` and the rest of the line after a removed declaration.
fn consume_terminator(b: &[u8], mut i: usize) -> usize {
    while i < b.len() && (b[i] == b' ' || b[i] == b'\t') {
        i += 1;
    }
    if i < b.len() && b[i] == b';' {
        i += 1;
    }
    while i < b.len() && (b[i] == b' ' || b[i] == b'\t' || b[i] == b'\r') {
        i += 1;
    }
    if i < b.len() && b[i] == b'\n' {
        i += 1;
    }
    i
}

/// End of a type alias body starting at `start` (just past the `=`).
fn type_alias_end(b: &[u8], start: usize) -> usize {
    let mut depth = 0i32;
    let mut last = b'=';
    let mut i = start;
    while i < b.len() {
        let c = b[i];
        match c {
            b'\'' | b'"' | b'`' => {
                i = skip_string(b, i);
                last = c;
                continue;
            }
            b'(' | b'{' | b'[' | b'<' => depth += 1,
            b')' | b'}' | b']' => depth -= 1,
            b'>' if i > 0 && b[i - 1] != b'=' => depth -= 1,
            b';' if depth <= 0 => return consume_terminator(b, i),
            b'\n' if depth <= 0 => {
                let continues = matches!(last, b'=' | b'|' | b'&' | b',')
                    || matches!(next_non_ws(b, i + 1), Some(b'|') | Some(b'&'));
                if !continues {
                    return i + 1;
                }
            }
            _ => {}
        }
        if !c.is_ascii_whitespace() {
            last = c;
        }
        i += 1;
    }
    b.len()
}
