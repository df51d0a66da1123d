//! # Sandbox Document Builder
//!
//! Assembles one self-contained HTML document per preview: runtime script
//! tags, a content-security policy, the stub declarations, the transformed
//! source as an escaped JSON string, and the sandbox runtime (error boundary,
//! identifier trap, lifecycle handshake).
//!
//! ## Determinism
//!
//! The output is a pure function of the transformed source, the stub
//! registry, the config and the channel token. No clocks, no random ids.
//!
//! ## Isolation
//!
//! The host must frame the document with `sandbox="allow-scripts"` and nothing
//! else. [`SandboxFrame`] renders that markup.

use serde::Serialize;
use serde_json::json;

use crate::config::PreviewConfig;
use crate::error::Result;
use crate::protocol::ChannelToken;
use crate::stubs::{StubRegistry, FRAMEWORK_BINDINGS};
use crate::transform::{EntryPoint, TransformOutput, ENTRY_SLOT};

/// The only capability granted to the preview frame.
pub const SANDBOX_POLICY: &str = "allow-scripts";

/// Inputs of one document build.
pub struct DocumentInput<'a> {
    pub token: &'a ChannelToken,
    pub component_name: &'a str,
    pub transformed: &'a TransformOutput,
    pub stubs: &'a StubRegistry,
    pub config: &'a PreviewConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewDocument {
    pub html: String,
    pub entry: EntryPoint,
    pub stub_names: Vec<String>,
    pub token: ChannelToken,
}

pub fn build_document(input: &DocumentInput<'_>) -> Result<PreviewDocument> {
    let config = input.config;
    let (source, syntax_error) = match &input.transformed.entry {
        EntryPoint::SyntaxError { message } => (String::new(), Some(message.clone())),
        _ => (input.transformed.code.clone(), None),
    };

    let runtime_config = json!({
        "channel": input.token.channel,
        "sessionId": input.token.session_id,
        "componentName": input.component_name,
        "entryKind": input.transformed.entry.kind(),
        "syntaxError": syntax_error,
        "retryLimit": config.retry_limit,
        "settleDelayMs": config.settle_delay_ms,
        "maxRuntimeStubs": config.max_runtime_stubs,
        "prelude": framework_prelude(),
        "stubs": input.stubs.declarations(),
        "fallbackEntry": fallback_entry(input.component_name),
        "source": source,
    });
    let config_json = script_safe_json(&serde_json::to_string(&runtime_config)?);

    let mut html = String::with_capacity(source.len() + RUNTIME_JS.len() + 2048);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(&format!(
        "<meta http-equiv=\"Content-Security-Policy\" content=\"{}\">\n",
        escape_html(&content_security_policy(config))
    ));
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>{} preview</title>\n",
        escape_html(input.component_name)
    ));
    html.push_str(&format!("<style>{}</style>\n", BASE_CSS));
    for url in [
        &config.runtime.react,
        &config.runtime.react_dom,
        &config.runtime.babel,
    ] {
        html.push_str(&format!("<script src=\"{}\"></script>\n", escape_html(url)));
    }
    html.push_str("</head>\n<body>\n<div id=\"root\"></div>\n");
    html.push_str(&format!(
        "<script>window.__PREVIEW_CONFIG__ = {};</script>\n",
        config_json
    ));
    html.push_str("<script>\n");
    html.push_str(RUNTIME_JS);
    html.push_str("</script>\n</body>\n</html>\n");

    tracing::debug!(
        session_id = %input.token.session_id,
        entry = input.transformed.entry.kind(),
        stubs = input.stubs.len(),
        bytes = html.len(),
        "built sandbox document"
    );

    Ok(PreviewDocument {
        html,
        entry: input.transformed.entry.clone(),
        stub_names: input.stubs.names(),
        token: input.token.clone(),
    })
}

/// `var useState = React.useState;` for every framework binding, sorted.
fn framework_prelude() -> String {
    let mut names: Vec<&str> = FRAMEWORK_BINDINGS
        .iter()
        .copied()
        .filter(|n| *n != "React" && *n != "ReactDOM")
        .collect();
    names.sort_unstable();
    names
        .iter()
        .map(|n| format!("var {0} = React.{0};", n))
        .collect::<Vec<_>>()
        .join("\n")
}

fn fallback_entry(component_name: &str) -> String {
    let usable = component_name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && component_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !FRAMEWORK_BINDINGS.contains(component_name);
    if !usable {
        return String::new();
    }
    format!(
        "if (typeof {slot} === 'undefined' && typeof {name} !== 'undefined') {{ {slot} = {name}; }}",
        slot = ENTRY_SLOT,
        name = component_name
    )
}

fn content_security_policy(config: &PreviewConfig) -> String {
    let mut origins: Vec<String> = [
        &config.runtime.react,
        &config.runtime.react_dom,
        &config.runtime.babel,
    ]
    .iter()
    .filter_map(|url| origin_of(url))
    .collect();
    origins.sort();
    origins.dedup();

    let mut script_src = String::from("'unsafe-inline' 'unsafe-eval'");
    for origin in &origins {
        script_src.push(' ');
        script_src.push_str(origin);
    }

    format!(
        "default-src 'none'; script-src {}; style-src 'unsafe-inline'; img-src * data: blob:; font-src * data:; connect-src 'none'; form-action 'none'",
        script_src
    )
}

/// `https://unpkg.com/react@18/...` → `https://unpkg.com`
fn origin_of(url: &str) -> Option<String> {
    let scheme_end = url.find("://")?;
    let rest = &url[scheme_end + 3..];
    let host_end = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
    if host_end == 0 {
        return None;
    }
    Some(format!("{}://{}", &url[..scheme_end], &rest[..host_end]))
}

/// JSON that cannot terminate the enclosing `<script>` element.
fn script_safe_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len() + 16);
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST FRAME
// ═══════════════════════════════════════════════════════════════════════════════

/// Host-side `<iframe>` markup embedding a document through `srcdoc`.
pub struct SandboxFrame<'a> {
    document: &'a PreviewDocument,
    title: String,
    class_name: Option<String>,
}

impl<'a> SandboxFrame<'a> {
    pub fn new(document: &'a PreviewDocument) -> Self {
        Self {
            document,
            title: String::from("Component preview"),
            class_name: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn render(&self) -> String {
        let class_attr = self
            .class_name
            .as_deref()
            .map(|c| format!(" class=\"{}\"", escape_html(c)))
            .unwrap_or_default();
        format!(
            "<iframe sandbox=\"{}\" referrerpolicy=\"no-referrer\" title=\"{}\"{} srcdoc=\"{}\"></iframe>",
            SANDBOX_POLICY,
            escape_html(&self.title),
            class_attr,
            escape_html(&self.document.html)
        )
    }
}

const BASE_CSS: &str = "body{margin:0;padding:16px;font-family:system-ui,-apple-system,sans-serif}\
.preview-stub{border:2px dashed #f59e0b;background:#fffbeb;color:#92400e;border-radius:6px;padding:8px 12px;margin:4px 0}\
.preview-stub-label{display:block;font:600 12px ui-monospace,monospace}\
.preview-message{border-radius:6px;padding:12px 16px;font-size:14px}\
.preview-error,.preview-syntax-error{border:1px solid #fca5a5;background:#fef2f2;color:#991b1b}\
.preview-message pre{white-space:pre-wrap;font:12px ui-monospace,monospace}";

/// Sandbox runtime. Reads `window.__PREVIEW_CONFIG__`.
const RUNTIME_JS: &str = r##"(function () {
  'use strict';
  var cfg = window.__PREVIEW_CONFIG__;
  var root = document.getElementById('root');
  var readySent = false;
  var trapped = {};
  var trappedNames = [];
  var installed = {};
  var pendingRetry = {};
  var reported = typeof WeakSet === 'function' ? new WeakSet() : null;
  var NOT_DEFINED = /([A-Za-z_$][\w$]*) is not defined|Can't find variable: ([A-Za-z_$][\w$]*)/;

  function h() {
    return React.createElement.apply(React, arguments);
  }

  function post(type, payload) {
    var message = { channel: cfg.channel, sessionId: cfg.sessionId, type: type };
    Object.keys(payload).forEach(function (key) { message[key] = payload[key]; });
    try {
      parent.postMessage(message, '*');
    } catch (e) {
      // detached frame
    }
  }

  function reportError(err, extra) {
    if (reported && err && typeof err === 'object') {
      if (reported.has(err)) return;
      reported.add(err);
    }
    var error = { message: String((err && err.message) || err || 'Unknown error') };
    if (err && err.stack) error.stack = String(err.stack);
    if (extra) {
      Object.keys(extra).forEach(function (key) {
        if (extra[key] != null) error[key] = extra[key];
      });
    }
    post('Error', { error: error });
  }

  function signalReady() {
    if (readySent) return;
    readySent = true;
    setTimeout(function () {
      post('Ready', {
        componentName: cfg.componentName,
        timestamp: Date.now(),
        runtimeStubs: trappedNames.slice()
      });
    }, cfg.settleDelayMs);
  }

  function showMessage(kind, title, detail) {
    root.innerHTML = '';
    var box = document.createElement('div');
    box.className = 'preview-message preview-' + kind;
    box.setAttribute('role', 'alert');
    var heading = document.createElement('strong');
    heading.textContent = title;
    box.appendChild(heading);
    if (detail) {
      var pre = document.createElement('pre');
      pre.textContent = detail;
      box.appendChild(pre);
    }
    root.appendChild(box);
  }

  function showSyntaxError(message) {
    showMessage('syntax-error', 'Syntax error', message);
    reportError({ name: 'SyntaxError', message: 'Syntax error: ' + message });
  }

  function stub(name) {
    if (installed[name]) return installed[name];
    var Placeholder = function (props) {
      return h('div', { className: 'preview-stub', 'data-preview-stub': name },
        h('span', { className: 'preview-stub-label' }, name),
        props && props.children);
    };
    Placeholder.displayName = name;
    installed[name] = new Proxy(Placeholder, {
      get: function (target, key) {
        if (typeof key === 'string' && /^[A-Z]/.test(key) && !(key in target)) {
          return stub(name + '.' + key);
        }
        return target[key];
      }
    });
    return installed[name];
  }

  function makeMock(path) {
    var target = function () {};
    return new Proxy(target, {
      get: function (t, key) {
        if (key === Symbol.toPrimitive) return function () { return ''; };
        if (key === 'toString' || key === 'valueOf' || key === 'toJSON') return function () { return ''; };
        if (typeof key === 'symbol' || key === 'then' || key === '$$typeof') return undefined;
        if (key === 'prototype') return t.prototype;
        if (key === 'length') return 0;
        return makeMock(path + '.' + key);
      },
      apply: function () { return makeMock(path + '()'); },
      construct: function () { return makeMock('new ' + path); }
    });
  }

  function mock(name) {
    if (!installed[name]) installed[name] = makeMock(name);
    return installed[name];
  }

  function undefinedName(err) {
    if (!err || err.name !== 'ReferenceError') return null;
    var match = NOT_DEFINED.exec(String(err.message));
    return match ? (match[1] || match[2]) : null;
  }

  function canTrap(err) {
    var name = undefinedName(err);
    return !!name && !trapped[name] && trappedNames.length < cfg.maxRuntimeStubs;
  }

  function trap(err) {
    if (!canTrap(err)) return false;
    var name = undefinedName(err);
    trapped[name] = true;
    trappedNames.push(name);
    window[name] = /^[A-Z]/.test(name) ? stub(name) : mock(name);
    return true;
  }

  function ErrorBoundary(props) {
    React.Component.call(this, props);
    this.state = { error: null, retries: 0 };
    this.retry = this.retry.bind(this);
  }
  ErrorBoundary.getDerivedStateFromError = function (error) {
    return { error: error };
  };

  function defineBoundary() {
    ErrorBoundary.prototype = Object.create(React.Component.prototype);
    ErrorBoundary.prototype.constructor = ErrorBoundary;
    ErrorBoundary.prototype.componentDidCatch = function (error, info) {
      var name = undefinedName(error);
      // the global listener may have trapped this error before the boundary saw it
      if (trap(error) || (name && pendingRetry[name])) {
        if (name) delete pendingRetry[name];
        this.setState({ error: null });
        return;
      }
      reportError(error, { componentStack: info && info.componentStack });
    };
    ErrorBoundary.prototype.componentDidMount = function () {
      if (!this.state.error) signalReady();
    };
    ErrorBoundary.prototype.componentDidUpdate = function () {
      if (!this.state.error) signalReady();
    };
    ErrorBoundary.prototype.retry = function () {
      if (this.state.retries >= cfg.retryLimit) return;
      this.setState({ error: null, retries: this.state.retries + 1 });
    };
    ErrorBoundary.prototype.render = function () {
      var error = this.state.error;
      if (!error) return this.props.children;
      var left = cfg.retryLimit - this.state.retries;
      return h('div', { className: 'preview-message preview-error', role: 'alert' },
        h('strong', null, 'Render error'),
        h('pre', null, String(error.message || error)),
        left > 0
          ? h('button', { type: 'button', onClick: this.retry }, 'Retry (' + left + ' left)')
          : h('p', null, 'Retry limit reached'));
    };
  }

  var api = { stub: stub, mock: mock };

  function evaluate(compiled) {
    var body = cfg.prelude + '\n' + cfg.stubs +
      '\nreturn (function () {\n' + compiled + '\n' + cfg.fallbackEntry + '\n})();';
    for (;;) {
      try {
        window.__PREVIEW_ENTRY__ = undefined;
        new Function('React', 'ReactDOM', '__preview', body)(React, ReactDOM, api);
        return window.__PREVIEW_ENTRY__;
      } catch (err) {
        if (!trap(err)) throw err;
      }
    }
  }

  window.addEventListener('error', function (event) {
    var err = event.error;
    if (trap(err)) {
      pendingRetry[undefinedName(err)] = true;
      return;
    }
    reportError(err || event.message, {
      filename: event.filename,
      lineno: event.lineno,
      colno: event.colno
    });
  });

  window.addEventListener('unhandledrejection', function (event) {
    reportError(event.reason || 'Unhandled promise rejection');
  });

  function start() {
    if (cfg.entryKind === 'syntaxError') {
      showSyntaxError(cfg.syntaxError);
      return;
    }
    if (typeof React === 'undefined' || typeof ReactDOM === 'undefined' || typeof Babel === 'undefined') {
      showMessage('error', 'Preview runtime failed to load', null);
      reportError('Preview runtime failed to load');
      return;
    }
    defineBoundary();

    var compiled;
    try {
      compiled = Babel.transform(cfg.source, { presets: ['react'], filename: 'preview.jsx' }).code;
    } catch (err) {
      showSyntaxError(String((err && err.message) || err));
      return;
    }

    var Entry;
    try {
      Entry = evaluate(compiled);
    } catch (err) {
      showMessage('error', 'Preview failed to evaluate', String((err && err.message) || err));
      reportError(err);
      return;
    }
    if (Entry == null) {
      showMessage('error', 'Nothing to render', 'No component was exported.');
      reportError('No renderable component found');
      return;
    }

    var element = React.isValidElement(Entry) ? Entry : h(Entry);
    ReactDOM.createRoot(root).render(h(ErrorBoundary, null, element));
  }

  start();
})();
"##;
