//! Fixed mapping from store-native error codes to HTTP statuses and client
//! messages.

pub const FALLBACK_MESSAGE: &str = "Error handling the request, see log for more information";

pub fn status_for(code: i32) -> u16 {
    match code {
        2 | 51091 => 400,
        13 | 18 | 66 => 403,
        47 => 404,
        61 | 121 => 400,
        112 => 409,
        225 | 251 | 256 => 406,
        11000 | 13297 => 409,
        56 | 40353 => 400,
        _ => 500,
    }
}

/// Client-facing message. Filter errors keep the store's explanation; the
/// other codes use a fixed text so store internals are not echoed back.
pub fn message_for(code: i32, native_message: &str) -> String {
    let fixed = match code {
        2 | 51091 => return format!("Invalid filter: {native_message}"),
        13 => "The store user does not have enough permissions to execute this operation",
        18 => "Wrong store credentials",
        47 => "Document not found by filter",
        61 => "Write request for sharded collection must specify the shardkey",
        66 => "Update tried to change an immutable field",
        121 => "Document failed validation",
        112 => "Write conflict inside transaction",
        225 | 251 | 256 => "The given transaction is not in-progress",
        11000 => "Duplicate key error (insert with existing _id, update a document not matching specified filter or unique index violation)",
        56 | 40353 => "FieldPath must not end with a '.'",
        13297 => "Db already exists with different case",
        _ => FALLBACK_MESSAGE,
    };
    fixed.to_string()
}
