//! Structural checks on generated documents, parsed the way a browser would.

#[cfg(test)]
mod tests {
    use html5ever::parse_document;
    use html5ever::tendril::TendrilSink;
    use markup5ever_rcdom::{Handle, NodeData, RcDom};

    use crate::config::PreviewConfig;
    use crate::document::{build_document, DocumentInput, PreviewDocument, SandboxFrame};
    use crate::protocol::{ChannelToken, DEFAULT_CHANNEL};
    use crate::stubs::{StubOrigin, StubRegistry};
    use crate::transform::transform;

    fn parse(html: &str) -> RcDom {
        parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html.as_bytes())
            .unwrap()
    }

    fn collect_elements(handle: &Handle, out: &mut Vec<Handle>) {
        if let NodeData::Element { .. } = handle.data {
            out.push(handle.clone());
        }
        for child in handle.children.borrow().iter() {
            collect_elements(child, out);
        }
    }

    fn elements(dom: &RcDom, tag: &str) -> Vec<Handle> {
        let mut all = Vec::new();
        collect_elements(&dom.document, &mut all);
        all.into_iter()
            .filter(|h| match &h.data {
                NodeData::Element { name, .. } => name.local.to_string() == tag,
                _ => false,
            })
            .collect()
    }

    fn attr(handle: &Handle, key: &str) -> Option<String> {
        match &handle.data {
            NodeData::Element { attrs, .. } => attrs
                .borrow()
                .iter()
                .find(|a| a.name.local.to_string() == key)
                .map(|a| a.value.to_string()),
            _ => None,
        }
    }

    fn text(handle: &Handle) -> String {
        handle
            .children
            .borrow()
            .iter()
            .filter_map(|child| match &child.data {
                NodeData::Text { contents } => Some(contents.borrow().to_string()),
                _ => None,
            })
            .collect()
    }

    fn build(code: &str, component_name: &str, stubs: &StubRegistry) -> PreviewDocument {
        let token = ChannelToken::new(DEFAULT_CHANNEL, "session-42");
        let transformed = transform(code);
        build_document(&DocumentInput {
            token: &token,
            component_name,
            transformed: &transformed,
            stubs,
            config: &PreviewConfig::default(),
        })
        .unwrap()
    }

    fn runtime_config(dom: &RcDom) -> serde_json::Value {
        let prefix = "window.__PREVIEW_CONFIG__ = ";
        let script = elements(dom, "script")
            .into_iter()
            .map(|s| text(&s))
            .find(|t| t.starts_with(prefix))
            .expect("config script");
        let json = script[prefix.len()..].trim_end().trim_end_matches(';');
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_document_structure() {
        let mut stubs = StubRegistry::new();
        stubs.resolve_from("Header", StubOrigin::Markup);
        let doc = build(
            "export default function Page() { return <main><Header /></main>; }",
            "Page",
            &stubs,
        );
        let dom = parse(&doc.html);

        let csp: Vec<_> = elements(&dom, "meta")
            .into_iter()
            .filter(|m| attr(m, "http-equiv").as_deref() == Some("Content-Security-Policy"))
            .collect();
        assert_eq!(csp.len(), 1);
        let policy = attr(&csp[0], "content").unwrap();
        assert!(policy.starts_with("default-src 'none';"));
        assert!(policy.contains("connect-src 'none'"));

        let roots: Vec<_> = elements(&dom, "div")
            .into_iter()
            .filter(|d| attr(d, "id").as_deref() == Some("root"))
            .collect();
        assert_eq!(roots.len(), 1);

        let scripts = elements(&dom, "script");
        assert_eq!(scripts.len(), 5);
        let external: Vec<_> = scripts.iter().filter_map(|s| attr(s, "src")).collect();
        assert_eq!(external.len(), 3);
        assert!(external.iter().all(|src| src.starts_with("https://unpkg.com/")));

        assert_eq!(text(&elements(&dom, "title")[0]), "Page preview");

        let config = runtime_config(&dom);
        assert_eq!(config["channel"], DEFAULT_CHANNEL);
        assert_eq!(config["sessionId"], "session-42");
        assert_eq!(config["componentName"], "Page");
        assert_eq!(config["entryKind"], "defaultExport");
        assert_eq!(config["stubs"], "var Header = __preview.stub('Header');");
        assert_eq!(config["retryLimit"], 3);
    }

    #[test]
    fn test_hostile_source_cannot_break_out_of_script() {
        let code = r#"export default () => <p>{"</script><script>alert(1)</script><!--"}</p>;"#;
        let stubs = StubRegistry::new();
        let doc = build(code, "Banner", &stubs);
        let dom = parse(&doc.html);

        assert_eq!(elements(&dom, "script").len(), 5);
        let config = runtime_config(&dom);
        let source = config["source"].as_str().unwrap();
        assert!(source.contains("</script><script>alert(1)</script><!--"));
        assert_eq!(source, transform(code).code);
    }

    #[test]
    fn test_syntax_error_document_omits_source() {
        let doc = build(
            "export default function Broken() { return <div><span>hi</div>; }",
            "Broken",
            &StubRegistry::new(),
        );
        assert!(doc.entry.is_syntax_error());
        let config = runtime_config(&parse(&doc.html));
        assert_eq!(config["entryKind"], "syntaxError");
        assert_eq!(config["source"], "");
        assert!(!config["syntaxError"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_sandbox_frame_round_trips_document() {
        let doc = build("export default () => <p>hi</p>;", "Hello", &StubRegistry::new());
        let markup = SandboxFrame::new(&doc)
            .title("Hello \"preview\"")
            .class_name("preview-frame")
            .render();
        let dom = parse(&markup);

        let frames = elements(&dom, "iframe");
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(attr(frame, "sandbox").as_deref(), Some("allow-scripts"));
        assert_eq!(attr(frame, "referrerpolicy").as_deref(), Some("no-referrer"));
        assert_eq!(attr(frame, "title").as_deref(), Some("Hello \"preview\""));
        assert_eq!(attr(frame, "class").as_deref(), Some("preview-frame"));
        assert_eq!(attr(frame, "srcdoc").as_deref(), Some(doc.html.as_str()));
    }
}
