//! Processing-time estimation
//!
//! Used by the upload path to reject documents whose processing would blow
//! the job ceiling before any work is queued.

/// Estimate end-to-end processing time in seconds.
///
/// Linear in content length and scaled by the number of views to generate:
/// each view runs a fixed script of LLM calls whose latency grows with the
/// prompt size.
pub fn estimated_processing_secs(content_chars: usize, view_count: usize) -> u64 {
    const CHARS_PER_UNIT: usize = 4000;
    const SECS_PER_UNIT_PER_VIEW: u64 = 3;

    let units = content_chars.div_ceil(CHARS_PER_UNIT).max(1) as u64;
    let views = view_count.max(1) as u64;
    units * views * SECS_PER_UNIT_PER_VIEW
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_document_single_view() {
        assert_eq!(estimated_processing_secs(1000, 1), 3);
    }

    #[test]
    fn test_scales_linearly_with_length() {
        let one = estimated_processing_secs(4000, 1);
        let ten = estimated_processing_secs(40_000, 1);
        assert_eq!(ten, one * 10);
    }

    #[test]
    fn test_scales_with_view_count() {
        let single = estimated_processing_secs(20_000, 1);
        let triple = estimated_processing_secs(20_000, 3);
        assert_eq!(triple, single * 3);
    }

    #[test]
    fn test_zero_views_treated_as_one() {
        assert_eq!(
            estimated_processing_secs(1000, 0),
            estimated_processing_secs(1000, 1)
        );
    }
}
