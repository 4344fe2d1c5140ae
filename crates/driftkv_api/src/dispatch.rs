//! The top-level dispatch entry point.

use crate::error::{ApiError, ApiResult};
use crate::registry;
use crate::types::ListResponse;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::debug;

/// Sends one named API request to a database and returns the JSON response.
///
/// Registry-level rpcs (`list`, `open`, `close`, `drop`, `version`,
/// `profile`, `setLogLevel`) are handled directly; everything else routes
/// to the named database's connection. Handler panics are contained here
/// and returned as errors; the process survives.
pub fn dispatch(db_name: &str, rpc: &str, data: &[u8]) -> ApiResult<Vec<u8>> {
    let start = Instant::now();

    let outcome = catch_unwind(AssertUnwindSafe(|| dispatch_inner(db_name, rpc, data)));
    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(ApiError::Panicked {
            message: panic_message(payload.as_ref()),
        }),
    };

    debug!(
        db = db_name,
        rpc,
        elapsed = ?start.elapsed(),
        ok = result.is_ok(),
        "dispatch"
    );
    result
}

fn dispatch_inner(db_name: &str, rpc: &str, data: &[u8]) -> ApiResult<Vec<u8>> {
    match rpc {
        "list" => {
            let databases = registry::list()?;
            Ok(serde_json::to_vec(&ListResponse { databases })?)
        }
        "open" => {
            registry::open(db_name)?;
            Ok(Vec::new())
        }
        "close" => {
            registry::close(db_name)?;
            Ok(Vec::new())
        }
        "drop" => {
            registry::drop_database(db_name)?;
            Ok(Vec::new())
        }
        "version" => Ok(env!("CARGO_PKG_VERSION").as_bytes().to_vec()),
        "profile" => {
            registry::profile();
            Ok(Vec::new())
        }
        "setLogLevel" => {
            registry::set_log_level(&raw_string(data))?;
            Ok(Vec::new())
        }
        _ => {
            let connection = registry::connection(db_name)?;
            connection.dispatch(rpc, data)
        }
    }
}

/// Reads a request body that is a bare string: either raw text or a JSON
/// string literal.
fn raw_string(data: &[u8]) -> String {
    if let Ok(text) = serde_json::from_slice::<String>(data) {
        return text;
    }
    String::from_utf8_lossy(data).trim().to_string()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
