//! Event renderings: JSON, CSV and an HTML map.

use chrono::{DateTime, Local, SecondsFormat};
use csv::WriterBuilder;
use serde::Serialize;

use super::gateway::ViewError;
use crate::models::Event;

const MAP_TEMPLATE: &str = include_str!("map.html");
const MARKERS_PLACEHOLDER: &str = "__MARKERS__";

pub const CSV_HEADER: [&str; 10] = [
    "id",
    "created_at",
    "name",
    "destination",
    "address",
    "continent",
    "country",
    "region",
    "city",
    "user_agent",
];

/// RFC3339 rendering of a nanosecond timestamp in the server's local zone.
pub fn format_local(created_at: i64) -> String {
    DateTime::from_timestamp_nanos(created_at)
        .with_timezone(&Local)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    #[serde(flatten)]
    event: &'a Event,
    time_human: String,
}

pub fn render_json(events: &[Event]) -> Result<Vec<u8>, ViewError> {
    let records: Vec<JsonRecord<'_>> = events
        .iter()
        .map(|event| JsonRecord {
            event,
            time_human: format_local(event.created_at),
        })
        .collect();

    serde_json::to_vec_pretty(&records).map_err(|e| ViewError::Render(e.to_string()))
}

pub fn render_csv(events: &[Event]) -> Result<Vec<u8>, ViewError> {
    let mut writer = WriterBuilder::new().from_writer(vec![]);
    writer
        .write_record(CSV_HEADER)
        .map_err(|e| ViewError::Render(e.to_string()))?;

    for event in events {
        let geo = event.geolocation.as_ref();
        let text = |field: Option<&String>| field.map(String::as_str).unwrap_or("").to_string();

        writer
            .write_record([
                event.id.clone(),
                format_local(event.created_at),
                event.name.clone(),
                event.destination.clone(),
                event.request_address.clone(),
                text(geo.and_then(|g| g.continent.as_ref())),
                text(geo.and_then(|g| g.country.as_ref())),
                text(geo.and_then(|g| g.region.as_ref())),
                text(geo.and_then(|g| g.city.as_ref())),
                event.user_agent.replace(',', ";"),
            ])
            .map_err(|e| ViewError::Render(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| ViewError::Render(e.to_string()))
}

#[derive(Serialize)]
struct MapMarker<'a> {
    lat: f64,
    lng: f64,
    name: &'a str,
    destination: &'a str,
    city: Option<&'a str>,
    country: Option<&'a str>,
    time: String,
}

/// Self-contained Leaflet page with one marker per located event.
pub fn render_map(events: &[Event]) -> Result<Vec<u8>, ViewError> {
    let markers: Vec<MapMarker<'_>> = events
        .iter()
        .filter_map(|event| {
            let geo = event.geolocation.as_ref()?;
            Some(MapMarker {
                lat: geo.latitude,
                lng: geo.longitude,
                name: &event.name,
                destination: &event.destination,
                city: geo.city.as_deref(),
                country: geo.country.as_deref(),
                time: format_local(event.created_at),
            })
        })
        .collect();

    let json = serde_json::to_string(&markers).map_err(|e| ViewError::Render(e.to_string()))?;
    // Keep the payload from closing the surrounding <script> element.
    let json = json.replace("</", "<\\/");

    Ok(MAP_TEMPLATE.replace(MARKERS_PLACEHOLDER, &json).into_bytes())
}
