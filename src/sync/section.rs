use crate::analysis::Section;

/// Index of the active section at `time`.
///
/// The active section is the latest one whose start is at or before `time`;
/// earlier times clamp to the first section. Scans from the end, so a shared
/// start resolves to the later entry.
pub fn resolve_section_index(sections: &[Section], time: f64) -> Option<usize> {
    if sections.is_empty() {
        return None;
    }
    sections
        .iter()
        .rposition(|s| s.start <= time)
        .or(Some(0))
}

pub fn resolve_section(sections: &[Section], time: f64) -> Option<&Section> {
    resolve_section_index(sections, time).map(|i| &sections[i])
}
