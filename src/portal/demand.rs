//! Executed demand ("demanda ejecutado")
//!
//! The upstream endpoint is slow and often fails, so fetching and
//! normalizing are separate soft boundaries: both log the error and
//! return `None` instead of propagating it.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::America::Lima;
use chrono_tz::Tz;
use serde_json::{Map, Value};

use super::errors::raise_for_status;
use super::{format_request_date, Portal, DEMAND_PATH};
use crate::config::DEMAND_TIMEOUT;
use crate::table::{coerce_numeric, TimeSeriesTable};

pub const DATA_FIELD: &str = "Data";
pub const TIMESTAMP_FIELD: &str = "Fecha";

/// Format of `Fecha`, e.g. "2024/01/15 00:30"
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M";

/// A fully read reply from the demand endpoint
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
}

/// System load readings (30 min), daily and weekly forecasts from `start`
/// to `end`, both inclusive. Dates are Lima civil dates.
pub async fn fetch_executed_demand(
    portal: &Portal<'_>,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<RawResponse> {
    tracing::info!("Requesting executed demand from {} to {}", start, end);

    match request_executed_demand(portal, start, end).await {
        Ok(raw) => {
            tracing::info!(
                "Successfully fetched executed demand. Elapsed time of request: {:.1} seconds",
                raw.elapsed.as_secs_f64()
            );
            Some(raw)
        }
        Err(e) => {
            tracing::error!("Exception while requesting executed demand: {:?}", e);
            None
        }
    }
}

async fn request_executed_demand(
    portal: &Portal<'_>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RawResponse> {
    let start_str = format_request_date(start);
    let end_str = format_request_date(end);
    let request = portal
        .session()
        .client()
        .post(portal.endpoint(DEMAND_PATH)?)
        .query(&[
            ("fechaInicial", start_str.as_str()),
            ("fechaFinal", end_str.as_str()),
        ])
        .timeout(DEMAND_TIMEOUT);

    let started = Instant::now();
    let response = portal.session().send(request).await?;
    raise_for_status(&response)?;

    let url = response.url().to_string();
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .context("Failed to read executed demand body")?;

    Ok(RawResponse {
        url,
        status,
        body,
        elapsed: started.elapsed(),
    })
}

/// Table of the `Data` records with `Fecha` localized to America/Lima
pub fn normalize_executed_demand(raw: &RawResponse) -> Option<TimeSeriesTable<DateTime<Tz>>> {
    tracing::info!("Processing executed demand");
    let started = Instant::now();

    match parse_executed_demand(&raw.body) {
        Ok(table) => {
            tracing::info!(
                "Successfully processed executed demand. Elapsed time of process: {:.1} seconds",
                started.elapsed().as_secs_f64()
            );
            Some(table)
        }
        Err(e) => {
            tracing::error!("Exception while processing executed demand: {:?}", e);
            None
        }
    }
}

fn parse_executed_demand(body: &str) -> Result<TimeSeriesTable<DateTime<Tz>>> {
    let payload: Value = serde_json::from_str(body).context("Executed demand body is not JSON")?;
    let records = payload
        .get(DATA_FIELD)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Executed demand has no '{}' list", DATA_FIELD))?;

    if records.is_empty() {
        return Err(anyhow!("Executed demand '{}' list is empty", DATA_FIELD));
    }

    let objects = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            record
                .as_object()
                .ok_or_else(|| anyhow!("Record {} is not an object", i))
        })
        .collect::<Result<Vec<&Map<String, Value>>>>()?;

    // Union of fields in first-seen order
    let mut columns: Vec<&str> = Vec::new();
    for object in &objects {
        for key in object.keys() {
            if key != TIMESTAMP_FIELD && !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut table = TimeSeriesTable::new(TIMESTAMP_FIELD, &columns);
    for (i, object) in objects.iter().enumerate() {
        let raw_ts = object
            .get(TIMESTAMP_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Record {} has no '{}'", i, TIMESTAMP_FIELD))?;
        let timestamp = NaiveDateTime::parse_from_str(raw_ts.trim(), TIMESTAMP_FORMAT)
            .with_context(|| format!("Record {}: '{}' does not match {}", i, raw_ts, TIMESTAMP_FORMAT))?;

        let values = columns
            .iter()
            .map(|column| object.get(*column).map(numeric_value).unwrap_or(f64::NAN))
            .collect();
        table.push_row(timestamp, values)?;
    }

    table.map_timestamps(localize)
}

fn numeric_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => coerce_numeric(s),
        _ => f64::NAN,
    }
}

/// Attach the Lima offset without shifting the wall clock
pub fn localize(naive: NaiveDateTime) -> Result<DateTime<Tz>> {
    Lima.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| anyhow!("{} does not exist in America/Lima", naive))
}
