use std::time::Instant;

/// Default absolute cap on a single inflated entry (1 GiB).
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 1 << 30;

/// Extraction settings for [`ArchiveExtractor`](super::ArchiveExtractor).
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Extract all entries even if the TOC has out-of-bounds entries
    pub allow_partial: bool,
    /// Do not attempt entries that failed the parse-time bound check
    pub skip_invalid: bool,
    /// Maximum number of entries extracted concurrently
    pub jobs: usize,
    /// Stop starting new entries once this instant has passed
    pub deadline: Option<Instant>,
    /// Hard cap on the inflated size of any entry
    pub max_entry_size: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            allow_partial: false,
            skip_invalid: false,
            jobs: 1,
            deadline: None,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
        }
    }
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }

    /// Skipping invalid entries implies accepting a partially corrupt TOC.
    pub fn skip_invalid(mut self, skip: bool) -> Self {
        self.skip_invalid = skip;
        if skip {
            self.allow_partial = true;
        }
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn max_entry_size(mut self, bytes: u64) -> Self {
        self.max_entry_size = bytes;
        self
    }

    pub(crate) fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
