/// Trait for reporting progress while reference files load and records stream
pub trait ProgressHandler: Send + Sync {
    /// Called when starting to load a reference file
    fn on_start_reference_load(&self, file: &str);

    /// Called when a reference file is loaded, with the number of records kept
    fn on_finish_reference_load(&self, file: &str, records: usize);

    /// Called once per input record, after its output has been written
    fn on_record_processed(&self) {}

    /// Called when the input stream is exhausted
    fn on_finish_stream(&self) {}
}

/// A no-op progress handler
pub struct NoOpProgressHandler;

impl ProgressHandler for NoOpProgressHandler {
    fn on_start_reference_load(&self, _file: &str) {}
    fn on_finish_reference_load(&self, _file: &str, _records: usize) {}
}
