//! The viewport seen by the refresh worker.

use std::path::PathBuf;

/// One visible column of the file manager.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Column {
    /// Directory or file the column shows, `None` for an empty column.
    pub target: Option<PathBuf>,
    /// The column shows a flattened listing.
    pub flattened: bool,
}

impl Column {
    /// Unflattened column showing `target`.
    #[must_use]
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: Some(target.into()),
            flattened: false,
        }
    }
}

/// What the refresh worker needs from the UI. Implementations are called
/// from the worker thread and must hand redraws over to the UI thread.
pub trait Viewport: Send + Sync {
    /// Columns currently on screen, left to right.
    fn visible_columns(&self) -> Vec<Column>;

    /// Flag column `index` for redraw.
    fn mark_column_redraw(&self, index: usize);

    /// Ask the UI to redraw flagged columns.
    fn request_redraw(&self);
}
