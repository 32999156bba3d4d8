/*!
 * Validation of generated subtitle tracks.
 *
 * - `timeline`: timing integrity (ranges, minimum display, overlaps, gaps,
 *   reading speed)
 */

pub mod timeline;

pub use timeline::{TimelineIssue, TimelineReport, TimelineValidator};
