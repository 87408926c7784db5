//! CSV export of the visible page.

use std::fmt;

use crate::error::ExportError;

type Extractor<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

/// One exported column: a header plus a value extractor.
pub struct ExportColumn<T> {
    header: String,
    value: Extractor<T>,
}

impl<T> ExportColumn<T> {
    /// Column rendering `value(item)` under `header`.
    pub fn new<F>(header: impl Into<String>, value: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self {
            header: header.into(),
            value: Box::new(value),
        }
    }

    /// Column header.
    #[must_use]
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Cell value for `item`.
    #[must_use]
    pub fn value(&self, item: &T) -> String {
        (self.value)(item)
    }
}

impl<T> fmt::Debug for ExportColumn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportColumn")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// Render `items` as CSV with a header row. Output depends only on the inputs.
///
/// # Errors
///
/// Returns [`ExportError`] when the CSV writer fails.
pub fn to_csv<T>(items: &[T], columns: &[ExportColumn<T>]) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer
        .write_record(columns.iter().map(ExportColumn::header))
        .map_err(|source| ExportError::Csv { source })?;
    for item in items {
        writer
            .write_record(columns.iter().map(|column| column.value(item)))
            .map_err(|source| ExportError::Csv { source })?;
    }
    writer
        .flush()
        .map_err(|source| ExportError::Flush { source })?;
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Flush {
            source: err.into_error(),
        })?;
    String::from_utf8(bytes).map_err(|source| ExportError::Utf8 { source })
}
