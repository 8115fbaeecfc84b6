//! Terminal output formatting.
//!
//! Status messages go to stderr so that blob data written to stdout stays
//! clean; metadata listings go to stdout.

pub mod colors;
pub mod errors;

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colors: colors::ColorSupport,
}

impl OutputHandler {
    pub fn new() -> Self {
        Self {
            colors: colors::ColorSupport::detect(),
        }
    }

    /// Print a status message
    pub fn info(&self, message: &str) {
        eprintln!("{}", self.colors.dim(message));
    }

    pub fn success(&self, message: &str) {
        eprintln!("{} {}", self.colors.green("✓"), message);
    }

    pub fn warn(&self, message: &str) {
        eprintln!("{} {}", self.colors.yellow("⚠"), message);
    }

    /// Print one `label: value` line of a listing
    pub fn field(&self, label: &str, value: &str) {
        println!("{}", self.format_field(label, value));
    }

    pub fn format_field(&self, label: &str, value: &str) -> String {
        format!("{} {}", self.colors.bold(&format!("{:<14}", format!("{}:", label))), value)
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}
