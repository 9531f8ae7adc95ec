mod jsonlog;
mod record;

pub use crate::{
    jsonlog::{open, Cursor, Handle},
    record::Record,
};
pub mod error;

#[cfg(test)]
mod tests;

/// [`Handle`] options.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Size in bytes of a cursor's read buffer.
    ///
    /// One buffer of this size is allocated per cursor and refilled from the
    /// file as the scan advances.
    ///
    /// Default: 1MiB
    pub read_buffer_size: usize,
    /// The maximum number of records a single scan call produces.
    ///
    /// Scans of large logs return after this many records even though more
    /// are available, so that decoded batches can be handed off while the
    /// next batch is read.
    ///
    /// Default: 100
    pub scan_batch_size: usize,
    /// Granularity in bytes by which a cursor's object buffer grows.
    ///
    /// The object buffer holds the bytes of a single record while it is
    /// being accumulated across read-buffer refills; most records are far
    /// smaller than one page.
    ///
    /// Default: 1KiB
    pub object_buffer_page: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024 * 1024,
            scan_batch_size: 100,
            object_buffer_page: 1024,
        }
    }
}
