pub mod json_compact;
pub mod markdown;

pub use json_compact::JsonCompactFormatter;
pub use markdown::MarkdownFormatter;
