use unicode_normalization::UnicodeNormalization;

/// Name suffixes the exporter gives derivative images, per UI language.
/// Matched against the lowercased, NFC-normalized stem.
const DERIVATIVE_SUFFIXES: &[&str] = &[
    "-edited",
    "-effects",
    "-smile",
    "-mix",
    "-edytowane",
    "-bearbeitet",
    "-bewerkt",
    "-編集済み",
    "-modificato",
    "-modifié",
    "-ha editado",
    "-editat",
];

/// Whether `stem` (a file name minus its extension) names an edited copy
pub fn is_extra(stem: &str) -> bool {
    let stem: String = stem.to_lowercase().nfc().collect();
    DERIVATIVE_SUFFIXES.iter().any(|suffix| stem.ends_with(suffix))
}

/// Remove the extra suffix from a filename, keeping its extension.
/// Returns `None` when the name carries no such suffix.
pub fn strip_extra(filename: &str) -> Option<String> {
    let normalized: String = filename.nfc().collect();
    let lower = normalized.to_lowercase();
    for suffix in DERIVATIVE_SUFFIXES {
        if let Some(pos) = lower.rfind(suffix) {
            // lowercasing can shift byte offsets for some scripts
            if lower.len() != normalized.len() {
                return None;
            }
            let mut result = normalized.clone();
            result.replace_range(pos..pos + suffix.len(), "");
            return Some(result);
        }
    }
    None
}
