//! CPU-side compilation validation.
//!
//! Sources go through [`sanitize`], [`lint`], [`wrap`], then the naga GLSL
//! front end and validator. Anything that survives is safe to hand to a
//! [`ShaderBackend`](super::pipeline::ShaderBackend); a driver can still
//! reject it, which the backend reports as [`ShaderError::Gpu`].

use naga::front::glsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use super::wrap::{sanitize, wrap};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ShaderError {
    #[error("shader rejected: {0}")]
    Lint(String),
    #[error("GLSL parse failed:\n{0}")]
    Parse(String),
    #[error("shader validation failed:\n{0}")]
    Validation(String),
    #[error("GPU rejected shader: {0}")]
    Gpu(String),
    #[error("fallback shader '{name}' failed to build: {source}")]
    FallbackRejected {
        name: String,
        #[source]
        source: Box<ShaderError>,
    },
}

/// A validated module plus the exact text it was parsed from.
#[derive(Clone, Debug)]
pub struct CompiledModule {
    pub module: naga::Module,
    pub wrapped: String,
}

static MAIN_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bvoid\s+mainImage\s*\(").unwrap());
static VOID_EXPR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bvoid\s*\(").unwrap());
static VOID_DECL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^void\s+\w+\s*\(").unwrap());
static SAMPLER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bsampler[123]D\w*\b").unwrap());
static TEXTURE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\btexture(?:Lod|Grad|Offset|Fetch)?\s*\(").unwrap());

/// Rejects sources that would parse but can never work here: no entry
/// point, `void(...)` used as an expression, or texture sampling when no
/// textures are bound.
pub fn lint(body: &str) -> Result<(), ShaderError> {
    let code = strip_comments(body);

    if !MAIN_IMAGE.is_match(&code) {
        return Err(ShaderError::Lint(
            "missing entry point `void mainImage(out vec4, in vec2)`".into(),
        ));
    }

    for (i, line) in code.lines().enumerate() {
        let line = line.trim();
        if VOID_EXPR.is_match(line) && !VOID_DECL.is_match(line) {
            return Err(ShaderError::Lint(format!(
                "line {}: void(...) is not a valid expression: {}",
                i + 1,
                line
            )));
        }
    }

    if SAMPLER.is_match(&code) {
        return Err(ShaderError::Lint(
            "samplers are not available, generate the image procedurally".into(),
        ));
    }
    if TEXTURE_CALL.is_match(&code) {
        return Err(ShaderError::Lint(
            "texture() called but no textures are bound".into(),
        ));
    }
    Ok(())
}

/// Blanks `//` and `/* */` comments, keeping line structure.
fn strip_comments(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();
    let mut in_block = false;
    while let Some(c) = chars.next() {
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
            } else if c == '\n' {
                out.push('\n');
            }
            continue;
        }
        let next = chars.peek().copied();
        match (c, next) {
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
                in_block = true;
            }
            _ => out.push(c),
        }
    }
    out
}

/// Parses and validates an already wrapped fragment shader.
pub fn validate_wrapped(wrapped: String) -> Result<CompiledModule, ShaderError> {
    let mut frontend = glsl::Frontend::default();
    let options = glsl::Options::from(naga::ShaderStage::Fragment);
    let module = frontend
        .parse(&options, &wrapped)
        .map_err(|errors| ShaderError::Parse(errors.emit_to_string(&wrapped)))?;

    Validator::new(ValidationFlags::all(), Capabilities::empty())
        .validate(&module)
        .map_err(|err| ShaderError::Validation(err.emit_to_string(&wrapped)))?;

    Ok(CompiledModule { module, wrapped })
}

/// Full path from raw `mainImage` source to a validated module.
pub fn compile_fragment(body: &str) -> Result<CompiledModule, ShaderError> {
    let body = sanitize(body);
    lint(&body)?;
    validate_wrapped(wrap(&body))
}
