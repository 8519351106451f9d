use serde_json::json;

/// Print a structured error to stderr and return the exit code to use.
pub fn report_error(message: &str, docs_hint: Option<&str>) -> i32 {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| message.to_string())
    );
    1
}
