//! Content patches for chart files.
//!
//! Patch documents are RFC 6902 operation lists. YAML targets are edited
//! in place so comments and ordering survive; other targets are treated
//! as JSON documents.

mod yaml;

use apk2oci_core::error::{ChartError, Result};
use json_patch::{Patch, PatchOperation};
use serde_json::Value;

use self::yaml::{Edit, EditError};

/// Whether a chart-relative path is edited as YAML.
pub fn is_yaml_path(path: &str) -> bool {
    path.ends_with(".yaml") || path.ends_with(".yml")
}

/// Decode a raw patch document.
pub fn decode_patch(path: &str, document: &[u8]) -> Result<Patch> {
    serde_json::from_slice(document)
        .map_err(|e| ChartError::patch(path, format!("invalid patch document: {}", e)))
}

/// Apply a raw patch document to one file.
pub fn apply_patch(path: &str, original: &[u8], document: &[u8]) -> Result<Vec<u8>> {
    let patch = decode_patch(path, document)?;
    apply_operations(path, original, &patch.0)
}

/// Apply decoded operations to one file, picking the strategy by extension.
pub fn apply_operations(path: &str, original: &[u8], ops: &[PatchOperation]) -> Result<Vec<u8>> {
    if is_yaml_path(path) {
        apply_yaml(path, original, ops)
    } else {
        apply_json(path, original, ops)
    }
}

fn apply_json(path: &str, original: &[u8], ops: &[PatchOperation]) -> Result<Vec<u8>> {
    let mut doc: Value = serde_json::from_slice(original)
        .map_err(|e| ChartError::patch(path, format!("file is not JSON: {}", e)))?;
    json_patch::patch(&mut doc, ops).map_err(|e| ChartError::patch(path, e))?;
    serde_json::to_vec(&doc).map_err(|e| ChartError::patch(path, e))
}

fn apply_yaml(path: &str, original: &[u8], ops: &[PatchOperation]) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(original)
        .map_err(|e| ChartError::patch(path, format!("file is not UTF-8: {}", e)))?;

    // Structural result; also the reference the line edit must agree with.
    let expected = match serde_yaml::from_str::<Value>(text) {
        Ok(mut doc) => {
            json_patch::patch(&mut doc, ops).map_err(|e| ChartError::patch(path, e))?;
            Some(doc)
        }
        Err(e) => {
            tracing::debug!(path, error = %e, "YAML target has no JSON equivalent");
            None
        }
    };

    let edited = match to_edits(ops) {
        Some(edits) => yaml::apply(text, &edits),
        None => Err(EditError::Unsupported("move, copy or test operation".to_string())),
    };

    match (edited, expected) {
        (Ok(edited), Some(expected)) => {
            if serde_yaml::from_str::<Value>(&edited).ok().as_ref() == Some(&expected) {
                Ok(edited.into_bytes())
            } else {
                tracing::warn!(path, "In-place YAML edit diverged, rewriting document");
                render_yaml(path, &expected)
            }
        }
        (Ok(edited), None) => {
            serde_yaml::from_str::<serde_yaml::Value>(&edited)
                .map_err(|e| ChartError::patch(path, format!("patched YAML is invalid: {}", e)))?;
            Ok(edited.into_bytes())
        }
        (Err(EditError::Unsupported(reason)), Some(expected)) => {
            tracing::debug!(path, reason = %reason, "Rewriting YAML structurally");
            render_yaml(path, &expected)
        }
        (Err(EditError::Unsupported(reason)), None) => Err(ChartError::patch(
            path,
            format!("unsupported YAML ({})", reason),
        )),
        (Err(EditError::Invalid(message)), _) => Err(ChartError::patch(path, message)),
    }
}

fn render_yaml(path: &str, value: &Value) -> Result<Vec<u8>> {
    serde_yaml::to_string(value)
        .map(String::into_bytes)
        .map_err(|e| ChartError::patch(path, e))
}

fn to_edits(ops: &[PatchOperation]) -> Option<Vec<Edit<'_>>> {
    ops.iter()
        .map(|op| match op {
            PatchOperation::Add(op) => Some(Edit::Add(pointer_tokens(&op.path.to_string())?, &op.value)),
            PatchOperation::Replace(op) => {
                Some(Edit::Replace(pointer_tokens(&op.path.to_string())?, &op.value))
            }
            PatchOperation::Remove(op) => Some(Edit::Remove(pointer_tokens(&op.path.to_string())?)),
            _ => None,
        })
        .collect()
}

/// Split a JSON pointer into unescaped tokens.
fn pointer_tokens(pointer: &str) -> Option<Vec<String>> {
    if pointer.is_empty() {
        return Some(Vec::new());
    }
    let rest = pointer.strip_prefix('/')?;
    Some(
        rest.split('/')
            .map(|t| t.replace("~1", "/").replace("~0", "~"))
            .collect(),
    )
}
