/// Access log file tailer
pub mod file_tailer;

pub use file_tailer::FileTailer;
