//! Built-in `mainImage` bodies used when a supplied shader fails to build.

pub struct FallbackShader {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub source: &'static str,
}

const DEFAULT: &str = "plasma";

/// Ordered library. Keyword matching walks it front to back.
pub fn library() -> &'static [FallbackShader] {
    &[
        FallbackShader {
            name: "tunnel",
            keywords: &["tunnel", "warp", "speed", "hyper", "vortex", "portal"],
            source: include_str!("../../shaders/fallback/tunnel.glsl"),
        },
        FallbackShader {
            name: "kaleidoscope",
            keywords: &["kaleidoscope", "geometric", "crystal", "mirror", "symmetry", "mandala"],
            source: include_str!("../../shaders/fallback/kaleidoscope.glsl"),
        },
        FallbackShader {
            name: "grid",
            keywords: &["grid", "retro", "synthwave", "star", "space", "cosmos", "night"],
            source: include_str!("../../shaders/fallback/grid.glsl"),
        },
        FallbackShader {
            name: "waves",
            keywords: &["ocean", "wave", "water", "flow", "fluid", "organic", "nature"],
            source: include_str!("../../shaders/fallback/waves.glsl"),
        },
        FallbackShader {
            name: "plasma",
            keywords: &["plasma", "psychedelic", "liquid", "lava"],
            source: include_str!("../../shaders/fallback/plasma.glsl"),
        },
    ]
}

pub fn find(name: &str) -> Option<&'static FallbackShader> {
    library().iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

pub fn default_fallback() -> &'static FallbackShader {
    library()
        .iter()
        .find(|f| f.name == DEFAULT)
        .unwrap_or(&library()[0])
}

/// First library entry with a keyword in `description` (case-insensitive),
/// else the default. Same description, same pick.
pub fn pick_fallback(description: &str) -> &'static FallbackShader {
    let description = description.to_lowercase();
    library()
        .iter()
        .find(|f| f.keywords.iter().any(|kw| description.contains(kw)))
        .unwrap_or_else(default_fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::compile::compile_fragment;

    #[test]
    fn every_fallback_compiles() {
        for fallback in library() {
            if let Err(err) = compile_fragment(fallback.source) {
                panic!("fallback '{}' failed: {}", fallback.name, err);
            }
        }
    }

    #[test]
    fn keywords_select_matching_shader() {
        assert_eq!(pick_fallback("A deep OCEAN at dusk").name, "waves");
        assert_eq!(pick_fallback("hyperspace tunnel").name, "tunnel");
        assert_eq!(pick_fallback("mirror symmetry").name, "kaleidoscope");
    }

    #[test]
    fn unmatched_description_uses_default() {
        assert_eq!(pick_fallback("").name, "plasma");
        assert_eq!(pick_fallback("something else entirely").name, "plasma");
        assert_eq!(default_fallback().name, "plasma");
    }

    #[test]
    fn find_is_case_insensitive() {
        assert_eq!(find("Grid").map(|f| f.name), Some("grid"));
        assert!(find("sphere").is_none());
    }
}
