//! Turns a `mainImage` body into a complete GLSL 450 fragment shader.
//!
//! Contract v1: `#version 450`, then one anonymous std140 block
//! `VisualUniforms` at set 0 binding 0 declaring every [`Uniform`] in
//! [`Uniform::ALL`] order, a single color output, the user body, and a
//! `main` that calls `mainImage(out vec4, in vec2)` with a bottom-left
//! origin `fragCoord`.

use regex::Regex;
use std::sync::LazyLock;

use super::uniforms::Uniform;

pub const WRAP_CONTRACT_VERSION: u32 = 1;

/// Name of the color output the adapter writes.
pub const OUTPUT_NAME: &str = "beatshade_FragColor";

const EPILOGUE: &str = "
void main() {
    vec4 color = vec4(0.0, 0.0, 0.0, 1.0);
    mainImage(color, vec2(gl_FragCoord.x, iResolution.y - gl_FragCoord.y));
    beatshade_FragColor = color;
}
";

pub fn prologue() -> String {
    let mut out = String::from("#version 450\n\n");
    out.push_str("layout(set = 0, binding = 0) uniform VisualUniforms {\n");
    for uniform in Uniform::ALL {
        out.push_str(&format!("    {} {};\n", uniform.glsl_type(), uniform.name()));
    }
    out.push_str("};\n\n");
    out.push_str(&format!("layout(location = 0) out vec4 {};\n\n", OUTPUT_NAME));
    out
}

/// Prologue + body + entry adapter. The body is inserted verbatim.
pub fn wrap(body: &str) -> String {
    let mut out = prologue();
    out.push_str(body.trim());
    out.push('\n');
    out.push_str(EPILOGUE);
    out
}

/// Number of lines the prologue adds before the body's first line.
pub fn body_line_offset() -> usize {
    prologue().lines().count()
}

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```(?:glsl|hlsl|c|cpp)?[ \t]*\n?").unwrap());
static FENCE_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n?```\s*$").unwrap());
static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#\s*version\s+.*$").unwrap());
static PRECISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*precision\s+\w+\s+\w+\s*;.*$").unwrap());
static UNIFORM_REDECL: LazyLock<Regex> = LazyLock::new(|| {
    let names: Vec<&str> = Uniform::ALL.iter().map(|u| u.name()).collect();
    Regex::new(&format!(r"(?m)^\s*uniform\s+\w+\s+(?:{})\s*;.*$", names.join("|"))).unwrap()
});
static OUT_DECL: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"(?m)^\s*(?:layout\s*\([^)]*\)\s*)?out\s+vec4\s+\w+\s*;.*$").unwrap()
    });
static MAIN_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)void\s+main\s*\(\s*\)\s*\{[^}]*mainImage\s*\([^)]*\)\s*;[^}]*\}").unwrap()
});
static RETURN_VOID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\breturn\s+void\s*(?:\([^)]*\)\s*)?;").unwrap());
static VOID_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+\s*\(\s*)void(\s*\))").unwrap());
static LINE_CONTINUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\\r?\n").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Return types that can open a top-level function declaration.
const DECL_TYPES: [&str; 13] = [
    "void", "float", "int", "bool", "vec2", "vec3", "vec4", "ivec2", "ivec3", "ivec4", "mat2",
    "mat3", "mat4",
];

/// Characters that already end a line legitimately.
const TERMINATORS: &str = ";{}/*,()";

/// Cleans generated source so it can be wrapped.
///
/// Removes markdown fences and anything the prologue or adapter already
/// provides (`#version`, precision, uniform redeclarations, color outputs,
/// a `main` that only forwards to `mainImage`), fixes `return void;` and
/// `f(void)` calls, and terminates a statement left without `;` right
/// before a function declaration.
pub fn sanitize(raw: &str) -> String {
    let code = raw.trim();
    let code = FENCE_OPEN.replace_all(code, "");
    let code = FENCE_CLOSE.replace_all(&code, "");
    let code = VERSION.replace_all(&code, "");
    let code = PRECISION.replace_all(&code, "");
    let code = UNIFORM_REDECL.replace_all(&code, "");
    let code = OUT_DECL.replace_all(&code, "");
    let code = MAIN_WRAPPER.replace_all(&code, "");
    let code = RETURN_VOID.replace_all(&code, "return;");
    let code = VOID_CALL.replace_all(&code, "${1}${2}");
    let code = LINE_CONTINUATION.replace_all(&code, "\n");
    let code = terminate_before_declarations(&code);
    let code = BLANK_RUNS.replace_all(&code, "\n\n");
    code.trim().to_string()
}

/// `float funcName(` at column 0.
fn opens_function(line: &str) -> bool {
    if line.starts_with(char::is_whitespace) || !line.contains('(') {
        return false;
    }
    let head = line.split('(').next().unwrap_or_default();
    head.split_whitespace()
        .next()
        .is_some_and(|word| DECL_TYPES.contains(&word))
}

fn terminate_before_declarations(code: &str) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let mut out = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_end();
        let unterminated = !trimmed.starts_with('#')
            && trimmed.ends_with(|c: char| !TERMINATORS.contains(c));
        if unterminated && lines.get(i + 1).is_some_and(|next| opens_function(next)) {
            log::debug!("Inserting missing ';' after line {}", i + 1);
            out.push(format!("{};", trimmed));
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prologue_declares_every_uniform_in_order() {
        let prologue = prologue();
        assert!(prologue.starts_with("#version 450\n"));
        let mut last = 0;
        for uniform in Uniform::ALL {
            let decl = format!("{} {};", uniform.glsl_type(), uniform.name());
            let at = prologue.find(&decl).unwrap_or_else(|| panic!("missing {decl}"));
            assert!(at > last);
            last = at;
        }
    }

    #[test]
    fn wrap_places_body_between_prologue_and_adapter() {
        let body = "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }";
        let wrapped = wrap(body);
        let body_at = wrapped.find(body).unwrap();
        let main_at = wrapped.find("void main()").unwrap();
        assert!(wrapped.find("uniform VisualUniforms").unwrap() < body_at);
        assert!(body_at < main_at);
        assert!(wrapped.contains("mainImage(color, vec2(gl_FragCoord.x, iResolution.y - gl_FragCoord.y));"));
        assert_eq!(wrapped.lines().nth(body_line_offset()), Some(body));
    }

    #[test]
    fn sanitize_strips_fences_and_duplicates() {
        let raw = "```glsl\n#version 300 es\nprecision highp float;\nuniform float iTime;\nuniform vec2 iResolution;\nout vec4 fragColor;\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(iTime); }\n```";
        assert_eq!(sanitize(raw), "void mainImage(out vec4 c, in vec2 p) { c = vec4(iTime); }");
    }

    #[test]
    fn sanitize_keeps_unrelated_uniforms() {
        let raw = "uniform float u_custom;\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(0.0); }";
        assert!(sanitize(raw).starts_with("uniform float u_custom;"));
    }

    #[test]
    fn sanitize_drops_forwarding_main() {
        let raw = "void mainImage(out vec4 c, in vec2 p) { c = vec4(0.0); }\nvoid main() {\n    mainImage(fragColor, gl_FragCoord.xy);\n}";
        assert_eq!(sanitize(raw), "void mainImage(out vec4 c, in vec2 p) { c = vec4(0.0); }");
    }

    #[test]
    fn sanitize_fixes_void_returns_and_calls() {
        let raw = "void f() { return void; }\nfloat g() { return h(void); }";
        assert_eq!(sanitize(raw), "void f() { return; }\nfloat g() { return h(); }");
    }

    #[test]
    fn sanitize_terminates_statement_before_function() {
        let raw = "float k = 0.5\nvoid mainImage(out vec4 c, in vec2 p) {\n    c = vec4(k)\n}";
        assert_eq!(
            sanitize(raw),
            "float k = 0.5;\nvoid mainImage(out vec4 c, in vec2 p) {\n    c = vec4(k)\n}"
        );
    }

    #[test]
    fn sanitize_leaves_terminated_and_nested_lines() {
        let raw = "float f(float x) {\n    return x;\n}\nvec3 g(float x) {\n    float y = f(x)\n        * 2.0;\n    return vec3(y);\n}\n#define SCALE 2.0\nvoid h() {}";
        assert_eq!(sanitize(raw), raw);
    }

    #[test]
    fn sanitize_collapses_blank_lines() {
        assert_eq!(sanitize("a;\n\n\n\n\nb;"), "a;\n\nb;");
    }
}
