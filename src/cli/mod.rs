pub mod doctor;
pub mod lint;
pub mod overview;
pub mod queue;
pub mod summarize;

/// Print a value as pretty JSON, falling back to Debug output.
pub fn print_json<T: serde::Serialize + std::fmt::Debug>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(_) => println!("{value:#?}"),
    }
}
