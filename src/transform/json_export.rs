use crate::error::{IngestError, IngestResult};
use crate::services::object_store::{list_all, ObjectStore};
use serde_json::Value;
use tracing::{info, warn};

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Build a CSV of `fields` from every `.json` object in `container`
///
/// Objects that are not JSON objects are skipped. Fails when nothing usable
/// was found, so an empty export never overwrites a previous one.
pub async fn export_json_objects(store: &dyn ObjectStore, container: &str, fields: &[String]) -> IngestResult<Vec<u8>> {
    if fields.is_empty() {
        return Err(IngestError::malformed_input("fields", "no fields to export"));
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(fields)?;

    let mut exported = 0usize;
    for object in list_all(store, container).await? {
        if !object.key.ends_with(".json") {
            continue;
        }

        let body = store.get(container, &object.key).await?;
        let document: Value = match serde_json::from_slice(&body) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(_) => continue,
            Err(e) => {
                warn!(key = %object.key, error = %e, "Skipping unreadable JSON object");
                continue;
            }
        };

        writer.write_record(fields.iter().map(|field| cell(document.get(field))))?;
        exported += 1;
    }

    if exported == 0 {
        return Err(IngestError::malformed_input(
            container,
            "no JSON objects found to export",
        ));
    }

    info!(container = %container, rows = exported, "Exported JSON objects to CSV");
    writer
        .into_inner()
        .map_err(|e| IngestError::serialization(e.to_string()))
}
