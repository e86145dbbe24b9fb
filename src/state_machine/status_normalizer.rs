//! # Status Normalizer
//!
//! Maps the job service's free-form status vocabulary onto [`EngineStatus`].

use super::states::EngineStatus;

/// Normalize a raw external status.
///
/// Matching is case-insensitive. Known synonyms collapse onto the canonical set;
/// any other non-empty value passes through lower-cased as [`EngineStatus::Other`].
/// Empty input yields `None`, which callers must not treat as a status change.
pub fn normalize_status(raw: &str) -> Option<EngineStatus> {
    let lowered = raw.trim().to_lowercase();

    match lowered.as_str() {
        "" => None,
        "running" | "in_progress" | "processing" => Some(EngineStatus::Processing),
        "completed" | "done" => Some(EngineStatus::Completed),
        "failed" | "error" => Some(EngineStatus::Failed),
        _ => Some(EngineStatus::Other(lowered)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_synonyms() {
        for raw in ["running", "in_progress", "processing", "RUNNING", "In_Progress"] {
            assert_eq!(normalize_status(raw), Some(EngineStatus::Processing), "{raw}");
        }
    }

    #[test]
    fn test_terminal_synonyms() {
        assert_eq!(normalize_status("done"), Some(EngineStatus::Completed));
        assert_eq!(normalize_status("Completed"), Some(EngineStatus::Completed));
        assert_eq!(normalize_status("error"), Some(EngineStatus::Failed));
        assert_eq!(normalize_status("FAILED"), Some(EngineStatus::Failed));
    }

    #[test]
    fn test_unmapped_passthrough_is_lowercased() {
        assert_eq!(
            normalize_status("Queued"),
            Some(EngineStatus::Other("queued".to_string()))
        );
    }

    #[test]
    fn test_empty_status_is_absent() {
        assert_eq!(normalize_status(""), None);
        assert_eq!(normalize_status("   "), None);
    }
}
