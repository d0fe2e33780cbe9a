//! Concrete value stores.

mod file;
mod json_file;
mod path_source;
mod test_store;
mod touch_file;

pub use file::{get_modified_time, staged_write};
pub use json_file::JsonFileStore;
pub use path_source::PathSource;
pub use test_store::TestStore;
pub use touch_file::TouchFileStore;
