//! Error rendering with suggestions and the cause chain.

use std::error::Error;

use blobkit_core::error::BlobError;

use super::colors::ColorSupport;

pub struct ErrorFormatter {
    colors: ColorSupport,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self::with_colors(ColorSupport::detect())
    }

    pub fn with_colors(colors: ColorSupport) -> Self {
        Self { colors }
    }

    /// Format an error with its suggestion and causes
    pub fn format_error(&self, error: &BlobError) -> String {
        let mut output = format!("{}: {}\n", self.colors.red("error"), error);

        let mut source = error.source();
        while let Some(err) = source {
            output.push_str(&format!("{}: {}\n", self.colors.dim("caused by"), err));
            source = err.source();
        }

        if let Some(suggestion) = error.suggestion() {
            output.push_str(&format!("{}: {}\n", self.colors.dim("help"), suggestion));
        }

        output
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}
