//! pgexplain WASM - Browser entry points for the analysis engine
//!
//! [`explain`] and [`compare`] never fail and never unwind: engine errors
//! and panics alike come back as a response whose `error` field is set.
//! When compiled for `wasm32` both are exported through `wasm-bindgen` and
//! return the response serialized as JSON.

use pgexplain_analyzer::{ExplainError, Explained, SerializationError};
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

/// Error label used for caught panics
pub const INTERNAL_ERROR: &str = "internal_error";

/// Response of [`explain`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplainResponse {
    /// The `Explained` envelope as JSON; empty on error
    pub explained: String,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ExplainResponse {
    pub fn to_json(&self) -> String {
        encode(self)
    }
}

/// Response of [`compare`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareResponse {
    /// The `Comparison` as JSON; empty on error
    pub comparison: String,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl CompareResponse {
    pub fn to_json(&self) -> String {
        encode(self)
    }
}

/// A failure converted for the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    /// Short label of the failing stage, e.g. `parse_error`
    pub error: String,
    pub details: String,
    pub stack: Option<String>,
}

impl From<ExplainError> for Fault {
    fn from(err: ExplainError) -> Self {
        Self {
            error: err.kind().to_string(),
            details: err.to_string(),
            stack: None,
        }
    }
}

/// Analyzes a raw EXPLAIN document
pub fn explain(plan_text: &str) -> ExplainResponse {
    let result = catch_faults(|| {
        let explained = pgexplain_analyzer::explain(plan_text)?;
        Ok(explained.to_json()?)
    });

    match result {
        Ok(explained) => ExplainResponse {
            explained,
            ..ExplainResponse::default()
        },
        Err(fault) => {
            tracing::warn!(error = %fault.error, details = %fault.details, "Explain failed");
            ExplainResponse {
                explained: String::new(),
                error: Some(fault.error),
                details: Some(fault.details),
                stack: fault.stack,
            }
        }
    }
}

/// Compares two `Explained` envelopes given as JSON
pub fn compare(explained_a: &str, explained_b: &str) -> CompareResponse {
    let result = catch_faults(|| {
        let before = Explained::from_json(explained_a)?;
        let after = Explained::from_json(explained_b)?;
        let comparison = pgexplain_analyzer::compare(&before, &after)?;
        Ok(serde_json::to_string(&comparison).map_err(SerializationError::from)?)
    });

    match result {
        Ok(comparison) => CompareResponse {
            comparison,
            ..CompareResponse::default()
        },
        Err(fault) => {
            tracing::warn!(error = %fault.error, details = %fault.details, "Compare failed");
            CompareResponse {
                comparison: String::new(),
                error: Some(fault.error),
                details: Some(fault.details),
                stack: fault.stack,
            }
        }
    }
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Records a backtrace at the panic site, then defers to the previous hook
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Runs `f`, turning errors into faults and panics into faults with a stack
///
/// Only effective where panics unwind; on `wasm32-unknown-unknown` panics
/// abort, so every engine failure is also reported through `Result`.
pub fn catch_faults<T>(f: impl FnOnce() -> Result<T, ExplainError>) -> Result<T, Fault> {
    install_panic_hook();
    PANIC_TRACE.with(|slot| *slot.borrow_mut() = None);

    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result.map_err(Fault::from),
        Err(payload) => {
            let details = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let stack = PANIC_TRACE
                .with(|slot| slot.borrow_mut().take())
                .unwrap_or_else(|| Backtrace::force_capture().to_string());

            tracing::error!(details = %details, "Caught panic in analysis engine");
            Err(Fault {
                error: INTERNAL_ERROR.to_string(),
                details,
                stack: Some(stack),
            })
        }
    }
}

fn encode<T: Serialize>(response: &T) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        serde_json::json!({
            "error": "serialization_error",
            "details": e.to_string(),
        })
        .to_string()
    })
}

#[cfg(target_arch = "wasm32")]
mod bindings {
    use wasm_bindgen::prelude::*;

    #[wasm_bindgen(js_name = explain)]
    pub fn explain(plan_text: &str) -> String {
        super::explain(plan_text).to_json()
    }

    #[wasm_bindgen(js_name = compare)]
    pub fn compare(explained_a: &str, explained_b: &str) -> String {
        super::compare(explained_a, explained_b).to_json()
    }
}
