use serde_json::Value;

use super::{format_value, unwrap_result};

/// Print just the key answer value from the output.
///
/// Looks for well-known result fields in order of priority, then falls back
/// to the first field of the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = unwrap_result(value);

    let priority_keys = [
        "status",
        "sbi_status",
        "applied_count",
        "abn_count",
        "affected_rows",
    ];

    if let Value::Object(map) = result_obj {
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_value(val));
                    return;
                }
            }
        }
        if let Some(Value::Object(upload)) = map.get("upload") {
            if let Some(status) = upload.get("status") {
                println!("{}", format_value(status));
                return;
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_value(val));
            return;
        }
    }

    println!("{}", format_value(result_obj));
}
