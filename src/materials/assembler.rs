// src/materials/assembler.rs
//! Shader template assembler.
//!
//! Renders a complete shader from the static template, the current defines,
//! and the feature fragments, and keeps user code intact across re-renders:
//!
//! - Everything up to and including the [`HEADER_END_MARK`] line is the
//!   generated header and is replaced wholesale on every render.
//! - Everything after it is the body. It is carried over verbatim from the
//!   previous source and never parsed or rewritten.
//! - An optional editor block sits directly above the mark, between
//!   [`EDITOR_BLOCK_BEGIN`] and [`EDITOR_BLOCK_END`]. `strip_editor_block`
//!   removes exactly that block and fails if only one delimiter is present.
//!
//! Rendering is a pure function of the store, the world snapshot and the
//! template, so identical inputs give byte-identical output.

use std::fmt::Write as _;

use xxhash_rust::xxh3::xxh3_64;

use crate::error::Warning;
use crate::materials::catalog::Catalog;
use crate::materials::fragments::{active_defines, known_defines};
use crate::materials::property_store::PropertyStore;
use crate::materials::world_state::WorldState;

pub const HEADER_END_MARK: &str = "//// __END_HEADER__";
pub const EDITOR_BLOCK_BEGIN: &str = "//// __EDITOR_BLOCK_BEGIN__";
pub const EDITOR_BLOCK_END: &str = "//// __EDITOR_BLOCK_END__";

const HEADER_END_NOTICE: &str = "\
// Everything above __END_HEADER__ is regenerated whenever material options
// change. Put custom code below it.
";

// ====================================================================================
// ShaderSource
// ====================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderSource {
    header: String,
    body: String,
    generated: bool,
}

impl ShaderSource {
    /// Splits `text` after the first header end mark line. Text without a
    /// mark is all body.
    pub fn parse(text: &str, generated: bool) -> Self {
        match find_line(text, HEADER_END_MARK) {
            Some((_, end)) => Self {
                header: text[..end].to_string(),
                body: text[end..].to_string(),
                generated,
            },
            None => Self {
                header: String::new(),
                body: text.to_string(),
                generated,
            },
        }
    }

    #[inline]
    pub fn header(&self) -> &str {
        &self.header
    }

    #[inline]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[inline]
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Full shader text.
    pub fn text(&self) -> String {
        let mut out = String::with_capacity(self.header.len() + self.body.len());
        out.push_str(&self.header);
        out.push_str(&self.body);
        out
    }
}

/// xxh3 of a full shader text, used to skip redundant backend uploads.
#[inline]
pub fn fingerprint(text: &str) -> u64 {
    xxh3_64(text.as_bytes())
}

// ====================================================================================
// Rendering
// ====================================================================================

/// Renders the generated header, ending with the header end mark line.
pub fn render_header(
    catalog: &Catalog,
    store: &PropertyStore,
    world: &WorldState,
    inject_editor: bool,
) -> String {
    let template = catalog.template;
    let defines = active_defines(catalog, store);

    let mut out = String::with_capacity(16 * 1024);
    out.push_str(template.preamble);
    out.push('\n');
    for define in &defines {
        let _ = writeln!(out, "#define {define}");
    }
    let _ = writeln!(out, "#define REGION_SIZE {}", world.region_size);
    let _ = writeln!(out, "#define TEXTURE_COUNT {}", world.texture_count);

    out.push_str(template.base_header);
    for fragment in catalog.fragments {
        let source = fragment.source.trim_matches('\n');
        if source.is_empty() {
            continue;
        }
        let _ = write!(out, "\n// ---- {} ----\n{}\n", fragment.group, source);
    }
    out.push('\n');
    out.push_str(HEADER_END_NOTICE);
    out.push_str(HEADER_END_MARK);
    out.push('\n');

    if inject_editor {
        let block = editor_block(catalog, &defines);
        inject_editor_block(&out, &block)
    } else {
        out
    }
}

/// Renders a generated source, carrying the body of `previous` (or the
/// template body when there is none).
pub fn render(
    catalog: &Catalog,
    store: &PropertyStore,
    world: &WorldState,
    previous: Option<&ShaderSource>,
    inject_editor: bool,
) -> ShaderSource {
    let header = render_header(catalog, store, world, inject_editor);
    let body = match previous {
        Some(prev) => prev.body.clone(),
        None => catalog.template.body.to_string(),
    };
    ShaderSource {
        header,
        body,
        generated: true,
    }
}

/// Puts a fresh header on top of a user-authored source. The previous
/// editor block is stripped first; if its delimiters do not pair up, the
/// whole previous text is kept as body and a warning is returned.
pub fn splice_header(header: String, previous: &str) -> (ShaderSource, Option<Warning>) {
    match strip_editor_block(previous) {
        Ok(clean) => {
            let body = ShaderSource::parse(&clean, false).body;
            (
                ShaderSource {
                    header,
                    body,
                    generated: false,
                },
                None,
            )
        }
        Err(warning) => {
            log::warn!("{warning}");
            (
                ShaderSource {
                    header,
                    body: previous.to_string(),
                    generated: false,
                },
                Some(warning),
            )
        }
    }
}

// ====================================================================================
// Editor block
// ====================================================================================

/// One `const bool` per define the catalog knows about.
pub fn editor_block(catalog: &Catalog, active: &[&str]) -> String {
    let mut out = String::from("// Feature switches for this build (read-only).\n");
    for define in known_defines(catalog) {
        let _ = writeln!(
            out,
            "const bool DEFINED_{} = {};",
            define,
            active.contains(&define)
        );
    }
    out
}

/// Inserts `block` between delimiters directly above the header end mark.
/// An existing well-formed block is replaced. Sources without a mark are
/// returned unchanged.
pub fn inject_editor_block(source: &str, block: &str) -> String {
    let base = match strip_editor_block(source) {
        Ok(clean) => clean,
        Err(warning) => {
            log::warn!("not injecting editor block: {warning}");
            return source.to_string();
        }
    };
    let Some((at, _)) = find_line(&base, HEADER_END_MARK) else {
        log::debug!("no header end mark, editor block not injected");
        return base;
    };

    let mut out = String::with_capacity(base.len() + block.len() + 64);
    out.push_str(&base[..at]);
    out.push_str(EDITOR_BLOCK_BEGIN);
    out.push('\n');
    out.push_str(block);
    if !block.is_empty() && !block.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(EDITOR_BLOCK_END);
    out.push('\n');
    out.push_str(&base[at..]);
    out
}

/// Removes the editor block, delimiters included. Sources without one are
/// returned unchanged.
pub fn strip_editor_block(source: &str) -> Result<String, Warning> {
    let begin = find_line(source, EDITOR_BLOCK_BEGIN);
    let end = find_line(source, EDITOR_BLOCK_END);
    match (begin, end) {
        (None, None) => Ok(source.to_string()),
        (Some((b, _)), Some((e_start, e_end))) if b < e_start => {
            let mut out = String::with_capacity(source.len());
            out.push_str(&source[..b]);
            out.push_str(&source[e_end..]);
            Ok(out)
        }
        (Some(_), Some(_)) => Err(Warning::InjectionCorruption {
            detail: "end delimiter precedes begin delimiter".into(),
        }),
        (Some(_), None) => Err(Warning::InjectionCorruption {
            detail: "missing end delimiter".into(),
        }),
        (None, Some(_)) => Err(Warning::InjectionCorruption {
            detail: "missing begin delimiter".into(),
        }),
    }
}

/// Byte range `(start, end)` of the first line that starts with `mark`;
/// `end` includes the trailing newline when present.
fn find_line(text: &str, mark: &str) -> Option<(usize, usize)> {
    text.match_indices(mark)
        .map(|(i, _)| i)
        .find(|&i| i == 0 || text.as_bytes()[i - 1] == b'\n')
        .map(|start| {
            let end = text[start..]
                .find('\n')
                .map_or(text.len(), |n| start + n + 1);
            (start, end)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::catalog::TERRAIN;
    use crate::value::PropertyValue;

    fn store() -> PropertyStore {
        PropertyStore::new(&TERRAIN).unwrap()
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut s = store();
        s.set("tinting_enabled", PropertyValue::Bool(true)).unwrap();
        let world = WorldState::default();
        let a = render(&TERRAIN, &s, &world, None, true);
        let b = render(&TERRAIN, &s, &world, None, true);
        assert_eq!(a.header(), b.header());
        assert_eq!(fingerprint(&a.text()), fingerprint(&b.text()));
    }

    #[test]
    fn test_header_ends_with_mark() {
        let src = render(&TERRAIN, &store(), &WorldState::default(), None, false);
        assert!(src.header().ends_with(&format!("{HEADER_END_MARK}\n")));
        assert!(src.is_generated());
        assert_eq!(ShaderSource::parse(&src.text(), true), src);
    }

    #[test]
    fn test_defines_reflect_store() {
        let mut s = store();
        let world = WorldState::default();
        let before = render_header(&TERRAIN, &s, &world, false);
        assert!(!before.contains("#define AUTO_TEXTURING_ENABLED"));
        assert!(before.contains("#define REGION_SIZE 1024"));

        s.set("auto_texturing_enabled", PropertyValue::Bool(true)).unwrap();
        let after = render_header(&TERRAIN, &s, &world, false);
        assert!(after.contains("#define AUTO_TEXTURING_ENABLED\n"));
        assert_ne!(before, after);
    }

    #[test]
    fn test_body_carried_over() {
        let world = WorldState::default();
        let mut s = store();
        let first = render(&TERRAIN, &s, &world, None, false);
        let custom = ShaderSource::parse(
            &format!("{}\n// my code\nvoid light() {{}}\n", first.header()),
            true,
        );
        s.set("blending_by_height", PropertyValue::Bool(true)).unwrap();
        let second = render(&TERRAIN, &s, &world, Some(&custom), false);
        assert_eq!(second.body(), custom.body());
        assert_ne!(second.header(), custom.header());
    }

    #[test]
    fn test_inject_strip_round_trip() {
        let src = render(&TERRAIN, &store(), &WorldState::default(), None, false).text();
        let injected = inject_editor_block(&src, "const bool X = true;");
        assert!(injected.contains(EDITOR_BLOCK_BEGIN));
        let block_at = injected.find(EDITOR_BLOCK_END).unwrap();
        assert!(block_at < injected.find(HEADER_END_MARK).unwrap());
        assert_eq!(strip_editor_block(&injected).unwrap(), src);
    }

    #[test]
    fn test_inject_replaces_existing_block() {
        let src = render(&TERRAIN, &store(), &WorldState::default(), None, false).text();
        let once = inject_editor_block(&src, "a\n");
        let twice = inject_editor_block(&once, "b\n");
        assert_eq!(twice.matches(EDITOR_BLOCK_BEGIN).count(), 1);
        assert!(twice.contains("\nb\n"));
    }

    #[test]
    fn test_strip_detects_corruption() {
        let text = format!("{EDITOR_BLOCK_BEGIN}\nconst bool X = true;\n{HEADER_END_MARK}\nbody\n");
        assert!(matches!(
            strip_editor_block(&text),
            Err(Warning::InjectionCorruption { .. })
        ));

        let reversed = format!("{EDITOR_BLOCK_END}\n{EDITOR_BLOCK_BEGIN}\n");
        assert!(strip_editor_block(&reversed).is_err());
        assert_eq!(strip_editor_block("plain").unwrap(), "plain");
    }

    #[test]
    fn test_splice_keeps_user_code_on_corruption() {
        let header = render_header(&TERRAIN, &store(), &WorldState::default(), false);
        let broken = format!("old header\n{EDITOR_BLOCK_BEGIN}\n{HEADER_END_MARK}\nvoid fragment() {{}}\n");
        let (spliced, warning) = splice_header(header.clone(), &broken);
        assert!(warning.is_some());
        assert_eq!(spliced.header(), header);
        assert_eq!(spliced.body(), broken);
        assert!(!spliced.is_generated());
    }

    #[test]
    fn test_splice_repeatedly_preserves_body() {
        let world = WorldState::default();
        let mut s = store();
        let body = "\n// user code\nvoid fragment() {\n\tALBEDO = vec3(1.0);\n}\n";
        let mut current = format!("{}{}", render_header(&TERRAIN, &s, &world, true), body);
        for field in ["tinting_enabled", "multi_scaling_enabled", "debug_view_holes"] {
            s.set(field, PropertyValue::Bool(true)).unwrap();
            let (spliced, warning) = splice_header(render_header(&TERRAIN, &s, &world, true), &current);
            assert!(warning.is_none());
            assert_eq!(spliced.body(), body);
            current = spliced.text();
        }
    }

    #[test]
    fn test_source_without_mark_is_all_body() {
        let parsed = ShaderSource::parse("shader_type spatial;\n", false);
        assert_eq!(parsed.header(), "");
        assert_eq!(parsed.body(), "shader_type spatial;\n");
    }

    #[test]
    fn test_editor_block_lists_defines() {
        let s = store();
        let block = editor_block(&TERRAIN, &active_defines(&TERRAIN, &s));
        assert!(block.contains("const bool DEFINED_TEXTURE_SAMPLERS_LINEAR = true;"));
        assert!(block.contains("const bool DEFINED_TEXTURE_SAMPLERS_NEAREST = false;"));
    }
}
