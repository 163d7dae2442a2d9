//! Executes one command against a query service.

use edr_protocol::{EdrError, EdrFeatureCollection, FeatureRecord};
use grid_processor::QueryService;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::cli::{Command, OutputFormat, QueryArgs};

/// Run `command` and return the JSON document to print.
pub async fn execute(service: &QueryService, command: &Command) -> Result<Value, EdrError> {
    match command {
        Command::Position(query) => {
            let records = service.position(&query.to_params()).await?;
            render(query, records)
        }
        Command::Area(query) => {
            let records = service.area(&query.to_params()).await?;
            render(query, records)
        }
        Command::Collection { base_url } => {
            let collection = service.collection(base_url).await;
            serde_json::to_value(collection).map_err(serialization_failed)
        }
    }
}

fn render(query: &QueryArgs, records: Vec<FeatureRecord>) -> Result<Value, EdrError> {
    info!(records = records.len(), coords = %query.coords, "Query complete");
    let value = match query.format {
        OutputFormat::Records => serde_json::to_value(&records),
        OutputFormat::Geojson => serde_json::to_value(EdrFeatureCollection::from(records)),
    };
    value.map_err(serialization_failed)
}

fn serialization_failed(err: serde_json::Error) -> EdrError {
    error!(error = %err, "Failed to serialize response");
    EdrError::StoreUnavailable(format!("failed to encode response: {}", err))
}

/// Exception document for a failed request.
pub fn exception(err: &EdrError, instance: &str) -> Value {
    let response = err.to_exception().with_instance(instance);
    serde_json::to_value(&response).unwrap_or_else(|e| {
        warn!(error = %e, "Exception document could not be encoded");
        minimal_exception(err, instance)
    })
}

/// Exception document assembled field by field.
fn minimal_exception(err: &EdrError, instance: &str) -> Value {
    let response = err.to_exception();
    json!({
        "type": response.type_,
        "status": err.status_code(),
        "detail": err.to_string(),
        "instance": instance,
    })
}
