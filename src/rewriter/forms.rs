//! Recognized import/export syntactic forms.
//!
//! Each form is matched as a whole statement with the quoted specifier in
//! its own capture group, so a rewrite can splice the specifier without
//! touching the binding list around it. Anything that does not match one of
//! these forms is left alone.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

/// `import d from "x"`, `import { a as b } from "x"`, `import * as ns from "x"`,
/// `import d, { a } from "x"`, `import d, * as ns from "x"`
static IMPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\bimport\s*((?:[\w$]+\s*,\s*)?\{[^}]*\}|(?:[\w$]+\s*,\s*)?\*\s*as\s+[\w$]+|[\w$]+)\s*from\s*["']([^"']+)["']"#,
    )
    .unwrap()
});

/// Side-effect-only `import "x"`
static IMPORT_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bimport\s*["']([^"']+)["']"#).unwrap());

/// `export { a } from "x"`, `export * from "x"`, `export * as ns from "x"`
static EXPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bexport\s*(\{[^}]*\}|\*\s*as\s+[\w$]+|\*)\s*from\s*["']([^"']+)["']"#).unwrap()
});

/// `import("x")`
static DYNAMIC_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bimport\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap());

/// Any quoted relative specifier, recognized form or not. Used to detect
/// references that the statement-level patterns could not account for.
static RELATIVE_SPEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](\.\.?/[^"']+)["']"#).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    StaticImport,
    ReExport,
    DynamicImport,
}

/// One recognized module reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub kind: FormKind,

    /// The specifier text between the quotes.
    pub specifier: String,

    /// Byte range of the specifier inside the source.
    pub span: Range<usize>,
}

/// Scan source text for every recognized reference, ordered by position.
pub fn scan(source: &str) -> Vec<Reference> {
    let mut refs = Vec::new();
    collect(&IMPORT_FROM, 2, FormKind::StaticImport, source, &mut refs);
    collect(&IMPORT_BARE, 1, FormKind::StaticImport, source, &mut refs);
    collect(&EXPORT_FROM, 2, FormKind::ReExport, source, &mut refs);
    collect(&DYNAMIC_IMPORT, 1, FormKind::DynamicImport, source, &mut refs);
    refs.sort_by_key(|r| r.span.start);
    refs.dedup_by_key(|r| r.span.start);
    refs
}

/// Every quoted relative specifier in the source with its byte range.
pub fn scan_relative_specifiers(source: &str) -> Vec<(String, Range<usize>)> {
    RELATIVE_SPEC
        .captures_iter(source)
        .filter_map(|cap| cap.get(1))
        .map(|m| (m.as_str().to_string(), m.range()))
        .collect()
}

fn collect(re: &Regex, group: usize, kind: FormKind, source: &str, out: &mut Vec<Reference>) {
    for cap in re.captures_iter(source) {
        if let Some(m) = cap.get(group) {
            out.push(Reference {
                kind,
                specifier: m.as_str().to_string(),
                span: m.range(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(source: &str) -> Vec<String> {
        scan(source).into_iter().map(|r| r.specifier).collect()
    }

    #[test]
    fn test_static_import_forms() {
        let source = r#"
            import def from './default.js';
            import { a, b as c } from './named.js';
            import * as ns from './namespace.js';
            import d, { e } from './mixed.js';
            import './effect.js';
        "#;

        assert_eq!(
            specs(source),
            vec![
                "./default.js",
                "./named.js",
                "./namespace.js",
                "./mixed.js",
                "./effect.js"
            ]
        );
    }

    #[test]
    fn test_reexport_forms() {
        let source = r#"
            export { a } from './a.js';
            export { b as c } from './b.js';
            export * from './star.js';
            export * as ns from './ns.js';
        "#;

        let refs = scan(source);
        assert_eq!(refs.len(), 4);
        assert!(refs.iter().all(|r| r.kind == FormKind::ReExport));
    }

    #[test]
    fn test_dynamic_import() {
        let refs = scan(r#"const page = import("./page.js");"#);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, FormKind::DynamicImport);
        assert_eq!(refs[0].specifier, "./page.js");
    }

    #[test]
    fn test_minified_statements() {
        let source = r#"import{a as b}from"./a.js";export*from"./b.js";import"./c.js";"#;
        assert_eq!(specs(source), vec!["./a.js", "./b.js", "./c.js"]);
    }

    #[test]
    fn test_multiline_binding_list() {
        let source = "import {\n  alpha,\n  beta\n} from \"./long.js\";\n";
        assert_eq!(specs(source), vec!["./long.js"]);
    }

    #[test]
    fn test_span_points_at_specifier() {
        let source = r#"import { a } from "./a.js";"#;
        let refs = scan(source);
        assert_eq!(&source[refs[0].span.clone()], "./a.js");
    }

    #[test]
    fn test_unrecognized_forms_are_not_references() {
        let source = r#"new Worker("./worker.js"); const p = "./plain.js";"#;
        assert!(scan(source).is_empty());

        let loose = scan_relative_specifiers(source);
        assert_eq!(loose.len(), 2);
        assert_eq!(loose[0].0, "./worker.js");
    }
}
