//! Export surface extraction.
//!
//! The runtime needs to know two things about a chunk's exports: the fact
//! that it has a default export (a namespace re-export does not carry one),
//! and which names it re-exports wholesale from other chunks.

use once_cell::sync::Lazy;
use regex::Regex;

static EXPORT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bexport\s+(?:async\s+)?(?:(?:const|let|var)\s+|function\s*\*?\s*|class\s+)([\w$]+)"#)
        .unwrap()
});

static EXPORT_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bexport\s*\{([^}]*)\}"#).unwrap());

static EXPORT_DEFAULT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bexport\s+default\b"#).unwrap());

static EXPORT_STAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bexport\s*\*\s*(?:as\s+([\w$]+)\s+)?from\s*["']([^"']+)["']"#).unwrap()
});

/// Statically-declared export surface of one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSurface {
    /// Named bindings, including names re-exported through a brace list.
    pub named: Vec<String>,

    /// Whether the chunk has a default export.
    pub has_default: bool,

    /// Specifiers of `export * from` namespace re-exports.
    pub star_reexports: Vec<String>,
}

/// Extract the export surface from chunk source text.
pub fn extract(source: &str) -> ExportSurface {
    let mut surface = ExportSurface::default();

    for cap in EXPORT_DECL.captures_iter(source) {
        push_named(&mut surface.named, &cap[1]);
    }

    for cap in EXPORT_BRACE.captures_iter(source) {
        for entry in cap[1].split(',') {
            let parts: Vec<&str> = entry.split_whitespace().collect();
            let exported = match parts.as_slice() {
                [name] => *name,
                [_, "as", alias] => *alias,
                _ => continue,
            };
            if exported == "default" {
                surface.has_default = true;
            } else {
                push_named(&mut surface.named, exported);
            }
        }
    }

    if EXPORT_DEFAULT.is_match(source) {
        surface.has_default = true;
    }

    for cap in EXPORT_STAR.captures_iter(source) {
        match cap.get(1) {
            // `export * as ns from "x"` exposes a single named binding
            Some(alias) => push_named(&mut surface.named, alias.as_str()),
            None => surface.star_reexports.push(cap[2].to_string()),
        }
    }

    surface
}

fn push_named(named: &mut Vec<String>, name: &str) {
    if !named.iter().any(|n| n == name) {
        named.push(name.to_string());
    }
}
