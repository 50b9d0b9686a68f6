pub mod formatters;
pub mod senders;

pub use formatters::{formatter_for, ConsoleFormatter, CsvFormatter, DataFormatter, JsonFormatter, RegisterReading};
pub use senders::{ConsoleSender, DataSender, FileSender};
