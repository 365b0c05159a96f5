//! GLSL source utilities
//!
//! Version header selection, a lexical scan of `uniform` declarations, and
//! the two textual patches the pipeline builder applies to fragment sources.

use std::collections::HashSet;

/// Suffix appended to fragment uniforms that collide with vertex uniforms
pub const FRAGMENT_DUPLICATE_SUFFIX: &str = "_fragdup";

/// Name of the LOD-bias constant patched into fragment sources
pub const MIP_LOD_BIAS_DEFINE: &str = "MIP_LOD_BIAS";

const DESKTOP_LADDER: [((u32, u32), &str); 5] = [
    ((3, 0), "#version 130"),
    ((3, 1), "#version 140"),
    ((3, 2), "#version 150 core"),
    ((3, 3), "#version 330 core"),
    ((4, 1), "#version 410 core"),
];

const ES_LADDER: [((u32, u32), &str); 2] = [((3, 0), "#version 300 es"), ((3, 1), "#version 310 es")];

/// `#version` line for a context version
///
/// Picks the highest ladder entry not above the context version; versions
/// below the ladder get its first entry.
pub fn version_header(is_es: bool, major: u32, minor: u32) -> &'static str {
    let ladder: &[((u32, u32), &str)] = if is_es { &ES_LADDER } else { &DESKTOP_LADDER };
    ladder
        .iter()
        .rev()
        .find(|(version, _)| *version <= (major, minor))
        .or_else(|| ladder.first())
        .map_or("#version 130", |(_, header)| header)
}

/// Default precision block for ES fragment shaders
pub fn es_fragment_precision(high_precision: bool) -> &'static str {
    if high_precision {
        "precision highp float;\nprecision highp int;\nprecision highp sampler2DArray;\n"
    } else {
        "precision mediump float;\nprecision mediump int;\nprecision mediump sampler2DArray;\n"
    }
}

/// One `uniform` declaration found by [`scan_uniforms`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    /// GLSL type name
    pub type_name: String,
    /// Declared name
    pub name: String,
    /// Array length when declared as an array with a literal size
    pub array_len: Option<u32>,
}

/// Replace comments with whitespace, keeping line structure
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Identifiers, numbers and single punctuation characters, skipping
/// preprocessor lines
fn tokenize(source: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for line in source.lines() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        let mut chars = line.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
            } else if is_ident_start(c) || c.is_ascii_digit() {
                let mut token = String::new();
                while let Some(&c) = chars.peek() {
                    if is_ident_char(c) || c == '.' {
                        token.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(token);
            } else {
                tokens.push(c.to_string());
                chars.next();
            }
        }
    }
    tokens
}

const PRECISION_QUALIFIERS: [&str; 3] = ["lowp", "mediump", "highp"];

/// Scan top-level `uniform <type> <name>` declarations outside comments
///
/// Interface blocks (`uniform Block { ... }`) are skipped. Comma lists and
/// array declarators are handled.
pub fn scan_uniforms(source: &str) -> Vec<UniformDecl> {
    let tokens = tokenize(&strip_comments(source));
    let mut decls = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i].as_str() {
            "{" => depth += 1,
            "}" => depth = depth.saturating_sub(1),
            "uniform" if depth == 0 => {
                let mut j = i + 1;
                while tokens.get(j).is_some_and(|t| PRECISION_QUALIFIERS.contains(&t.as_str())) {
                    j += 1;
                }
                let Some(type_name) = tokens.get(j) else { break };
                if tokens.get(j + 1).map(String::as_str) == Some("{") {
                    // Interface block; the brace is counted by the outer loop
                    i = j + 1;
                    continue;
                }
                j += 1;
                loop {
                    let Some(name) = tokens.get(j).filter(|t| t.starts_with(is_ident_start)) else {
                        break;
                    };
                    let mut decl = UniformDecl {
                        type_name: type_name.clone(),
                        name: name.clone(),
                        array_len: None,
                    };
                    j += 1;
                    if tokens.get(j).map(String::as_str) == Some("[") {
                        decl.array_len = tokens.get(j + 1).and_then(|t| t.parse().ok());
                        while tokens.get(j).is_some_and(|t| t != "]") {
                            j += 1;
                        }
                        j += 1;
                    }
                    decls.push(decl);
                    if tokens.get(j).map(String::as_str) == Some(",") {
                        j += 1;
                    } else {
                        break;
                    }
                }
                i = j;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    decls
}

/// Uniform names declared in both sources, in fragment declaration order
pub fn duplicate_uniforms(vertex_source: &str, fragment_source: &str) -> Vec<String> {
    let vertex: HashSet<String> = scan_uniforms(vertex_source).into_iter().map(|d| d.name).collect();
    let mut seen = HashSet::new();
    scan_uniforms(fragment_source)
        .into_iter()
        .map(|d| d.name)
        .filter(|name| vertex.contains(name) && seen.insert(name.clone()))
        .collect()
}

/// Append [`FRAGMENT_DUPLICATE_SUFFIX`] to every whole-word use of `names`
pub fn rename_identifiers(source: &str, names: &[String]) -> String {
    if names.is_empty() {
        return source.to_string();
    }
    let mut out = String::with_capacity(source.len() + names.len() * 16);
    let mut word = String::new();
    let flush = |word: &mut String, out: &mut String| {
        if !word.is_empty() {
            out.push_str(word);
            if names.iter().any(|n| n == word.as_str()) {
                out.push_str(FRAGMENT_DUPLICATE_SUFFIX);
            }
            word.clear();
        }
    };

    for c in source.chars() {
        if is_ident_char(c) && !(word.is_empty() && c.is_ascii_digit()) {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);
    out
}

/// Replace the value of `#define MIP_LOD_BIAS <value>` lines
///
/// Returns the source unchanged when it does not declare the constant.
pub fn patch_mip_lod_bias(source: &str, bias: f32) -> String {
    let mut patched = false;
    let mut out: Vec<String> = source
        .lines()
        .map(|line| {
            let mut parts = line.split_whitespace();
            if parts.next() == Some("#define") && parts.next() == Some(MIP_LOD_BIAS_DEFINE) {
                patched = true;
                format!("#define {MIP_LOD_BIAS_DEFINE} {bias:?}")
            } else {
                line.to_string()
            }
        })
        .collect();
    if !patched {
        return source.to_string();
    }
    if source.ends_with('\n') {
        out.push(String::new());
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TERRAIN_VS: &str = "\
uniform mat4 ModelViewProjectionMatrix;
uniform int fogEnabled; // enable fog
/* uniform float commentedOut; */
in vec4 vertex;
void main() { gl_Position = ModelViewProjectionMatrix * vertex; }
";

    const TERRAIN_FS: &str = "\
#define MIP_LOD_BIAS 0.0
uniform sampler2D tex;
uniform mediump int fogEnabled;
uniform float fogStart, fogEnd;
uniform vec4 paramx1[2];
out vec4 FragColor;
void main() {
    if (fogEnabled > 0) { FragColor = vec4(fogStart); }
}
";

    #[test]
    fn test_header_ladder_clamps() {
        assert_eq!(version_header(false, 3, 0), "#version 130");
        assert_eq!(version_header(false, 3, 2), "#version 150 core");
        assert_eq!(version_header(false, 4, 0), "#version 330 core");
        assert_eq!(version_header(false, 4, 6), "#version 410 core");
        assert_eq!(version_header(false, 2, 1), "#version 130");
        assert_eq!(version_header(true, 3, 0), "#version 300 es");
        assert_eq!(version_header(true, 3, 2), "#version 310 es");
    }

    #[test]
    fn test_scan_skips_comments_and_reads_lists() {
        let names: Vec<String> = scan_uniforms(TERRAIN_FS).into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["tex", "fogEnabled", "fogStart", "fogEnd", "paramx1"]);

        let vs = scan_uniforms(TERRAIN_VS);
        assert_eq!(vs.len(), 2);
        assert_eq!(vs[1].type_name, "int");
    }

    #[test]
    fn test_scan_reads_array_length() {
        let decls = scan_uniforms(TERRAIN_FS);
        let paramx1 = decls.iter().find(|d| d.name == "paramx1").unwrap();
        assert_eq!(paramx1.array_len, Some(2));
    }

    #[test]
    fn test_scan_skips_interface_blocks() {
        let src = "uniform Globals { mat4 mvp; float t; } globals;\nuniform float alpha;";
        let names: Vec<String> = scan_uniforms(src).into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["alpha"]);
    }

    #[test]
    fn test_duplicates_and_rename() {
        let dups = duplicate_uniforms(TERRAIN_VS, TERRAIN_FS);
        assert_eq!(dups, ["fogEnabled"]);

        let renamed = rename_identifiers(TERRAIN_FS, &dups);
        assert!(renamed.contains("uniform mediump int fogEnabled_fragdup;"));
        assert!(renamed.contains("if (fogEnabled_fragdup > 0)"));
        assert!(!renamed.contains("fogEnabled;"));
        // Other identifiers sharing a prefix are untouched
        let other = rename_identifiers("int fogEnabledX = fogEnabled;", &dups);
        assert_eq!(other, "int fogEnabledX = fogEnabled_fragdup;");
    }

    #[test]
    fn test_patch_mip_lod_bias() {
        let patched = patch_mip_lod_bias(TERRAIN_FS, -0.5);
        assert!(patched.starts_with("#define MIP_LOD_BIAS -0.5\n"));
        assert!(patched.ends_with("}\n"));
        assert_eq!(patch_mip_lod_bias("void main() {}", 1.0), "void main() {}");
    }
}
