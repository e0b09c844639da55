//! Address fragment codec: `<projectId>` or `<projectId>/r:<runId>`.

use crate::Selection;

/// Prefix marking the run segment of a fragment.
pub const RUN_PREFIX: &str = "r:";

/// Encodes a selection as fragment text, without the leading `#`.
///
/// An empty run id omits the run segment entirely.
pub fn encode_fragment(selection: &Selection) -> String {
    if selection.run_id.is_empty() {
        selection.project_id.clone()
    } else {
        format!("{}/{}{}", selection.project_id, RUN_PREFIX, selection.run_id)
    }
}

/// Decodes fragment text into a selection. Never fails.
///
/// A leading `#` is tolerated. Segments after the second are ignored, and a
/// second segment without the run prefix yields no run.
pub fn decode_fragment(fragment: &str) -> Selection {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    let mut segments = fragment.split('/');
    let project_id = segments.next().unwrap_or_default().to_string();
    let run_id = segments
        .next()
        .and_then(|segment| segment.strip_prefix(RUN_PREFIX))
        .unwrap_or_default()
        .to_string();

    Selection { project_id, run_id }
}
