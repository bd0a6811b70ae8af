//! Service layer separating filesystem and progress concerns from the
//! conversion pipeline

pub mod io;
pub mod progress;

pub use io::{is_image_file, scan_source_images, FileTransferService};
pub use progress::{
    BucketProgress, ConsoleProgressReporter, ConversionStage, NoOpProgressReporter,
    ProgressReporter,
};
