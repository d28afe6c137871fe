//! Built-in layouts for the hub's UDP broadcast protocol

use super::{Conversion, FieldSpec, Layout, SampleSource};
use crate::types::MessageKind;

/// Numeric "no reading" sentinel for sensor-measured quantities
pub const NO_READING: f64 = -9999.0;

fn sensor(name: &str) -> FieldSpec {
    FieldSpec::float(name).sentinel(NO_READING)
}

// Minutes on the wire, stored as seconds
fn report_interval() -> FieldSpec {
    FieldSpec::integer("report_interval").with_conversion(Conversion::scale(60.0))
}

// Status messages may omit the timestamp; the record is then skipped, not flagged
fn status_timestamp() -> FieldSpec {
    FieldSpec::timestamp().nullable()
}

fn precipitation_type() -> FieldSpec {
    FieldSpec::string("precipitation_type")
        .with_conversion(Conversion::map([
            (0, "none"),
            (1, "rain"),
            (2, "hail"),
            (3, "rain_hail"),
        ]))
        .sentinel(NO_READING)
}

fn flat(key: &str) -> SampleSource {
    SampleSource::Flat(key.to_string())
}

fn first_row(key: &str) -> SampleSource {
    SampleSource::FirstRow(key.to_string())
}

/// Layouts for every message kind the hub broadcasts
pub fn standard_layouts() -> Vec<Layout> {
    vec![
        Layout::new(
            MessageKind::PrecipEvent,
            flat("evt"),
            vec![FieldSpec::timestamp()],
        )
        .with_marker("precip_start"),
        Layout::new(
            MessageKind::StrikeEvent,
            flat("evt"),
            vec![
                FieldSpec::timestamp(),
                sensor("distance"),
                sensor("energy"),
            ],
        ),
        Layout::new(
            MessageKind::RapidWind,
            flat("ob"),
            vec![
                FieldSpec::timestamp(),
                sensor("wind_speed"),
                sensor("wind_direction"),
            ],
        ),
        Layout::new(
            MessageKind::ObsAir,
            first_row("obs"),
            vec![
                FieldSpec::timestamp(),
                sensor("station_pressure"),
                sensor("air_temperature"),
                sensor("relative_humidity"),
                FieldSpec::integer("lightning_strike_count").sentinel(NO_READING),
                sensor("lightning_avg_distance"),
                FieldSpec::float("battery"),
                report_interval(),
            ],
        ),
        Layout::new(
            MessageKind::ObsSky,
            first_row("obs"),
            vec![
                FieldSpec::timestamp(),
                sensor("illuminance"),
                sensor("uv"),
                sensor("rain_accumulated"),
                sensor("wind_lull"),
                sensor("wind_avg"),
                sensor("wind_gust"),
                sensor("wind_direction"),
                FieldSpec::float("battery"),
                report_interval(),
                sensor("solar_radiation"),
                FieldSpec::float("local_day_rain_accumulation").nullable(),
                precipitation_type(),
                FieldSpec::integer("wind_sample_interval"),
            ],
        ),
        Layout::new(
            MessageKind::ObsSt,
            first_row("obs"),
            vec![
                FieldSpec::timestamp(),
                sensor("wind_lull"),
                sensor("wind_avg"),
                sensor("wind_gust"),
                sensor("wind_direction"),
                FieldSpec::integer("wind_sample_interval"),
                sensor("station_pressure"),
                sensor("air_temperature"),
                sensor("relative_humidity"),
                sensor("illuminance"),
                sensor("uv"),
                sensor("solar_radiation"),
                sensor("rain_accumulated"),
                precipitation_type(),
                sensor("lightning_avg_distance"),
                FieldSpec::integer("lightning_strike_count").sentinel(NO_READING),
                FieldSpec::float("battery"),
                report_interval(),
            ],
        ),
        Layout::new(
            MessageKind::DeviceStatus,
            SampleSource::Keyed,
            vec![
                status_timestamp(),
                FieldSpec::integer("uptime"),
                FieldSpec::float("voltage"),
                FieldSpec::integer("firmware_revision"),
                FieldSpec::integer("rssi"),
                FieldSpec::integer("hub_rssi"),
                FieldSpec::integer("sensor_status"),
                FieldSpec::boolean("debug").nullable(),
            ],
        ),
        Layout::new(
            MessageKind::HubStatus,
            SampleSource::Keyed,
            vec![
                status_timestamp(),
                FieldSpec::integer("uptime"),
                FieldSpec::integer("rssi"),
                FieldSpec::string("firmware_revision"),
                FieldSpec::string("reset_flags").nullable(),
                FieldSpec::integer("seq").nullable(),
            ],
        ),
    ]
}
