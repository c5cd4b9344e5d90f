pub mod batch;
pub mod deployment;
pub mod release_app;

use serde_json::Value;

/// Pretty-prints a response payload. Kept trivial on purpose: forge-cli is a
/// thin client, not a TUI.
pub fn print_result(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(_) => println!("{value}"),
    }
}
