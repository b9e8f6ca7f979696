pub mod args;
pub mod index;
pub mod projects;
pub mod recordings;

pub use args::{Cli, CliCommand, IndexCliArgs, RecordingsCliArgs};
pub use index::handle_index_command;
pub use projects::handle_projects_command;
pub use recordings::handle_recordings_command;
