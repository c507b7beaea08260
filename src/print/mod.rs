pub mod invoice;
pub mod job;

pub use invoice::{fake_print_frame, sample_invoice};
pub use job::{spawn_print_job, PrintJob};
