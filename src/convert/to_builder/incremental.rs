use serde_json::{Map, Value};

use super::components::request_option;
use super::support::{
    expect_type, known_fields, optional_bool, optional_string, required_string, spec_key,
    string_list, Converted, Scope,
};
use crate::builder::locked_inputs::locked_input_template;
use crate::builder::types::{
    BuilderDatetime, BuilderIncrementalSync, BuilderRequestOption, BuilderSlicer, FilterMode,
};
use crate::interpolation::interpolate_config_key;
use crate::manifest::{
    CANONICAL_DATETIME_FORMAT, DATETIME_BASED_CURSOR, MIN_MAX_DATETIME, NOW_UTC_SENTINEL,
};

const CURSOR_FIELDS: [&str; 14] = [
    "type",
    "cursor_field",
    "cursor_datetime_formats",
    "datetime_format",
    "start_datetime",
    "end_datetime",
    "start_time_option",
    "end_time_option",
    "lookback_window",
    "step",
    "cursor_granularity",
    "is_data_feed",
    "partition_field_start",
    "partition_field_end",
];

pub(crate) fn incremental_sync(
    scope: &Scope,
    value: &Value,
) -> Converted<Option<BuilderIncrementalSync>> {
    let map = known_fields(scope, value, DATETIME_BASED_CURSOR, &CURSOR_FIELDS)?;
    expect_type(scope, value, "incremental_sync", DATETIME_BASED_CURSOR)?;
    if map.contains_key("partition_field_start") || map.contains_key("partition_field_end") {
        return scope.fail("DatetimeBasedCursor partition_field_start/end are not supported");
    }

    let cursor_field = required_string(scope, map, "cursor_field", DATETIME_BASED_CURSOR)?;
    let datetime_format = required_string(scope, map, "datetime_format", DATETIME_BASED_CURSOR)?;
    let cursor_datetime_formats = match map.get("cursor_datetime_formats") {
        None | Some(Value::Null) => vec![datetime_format.clone()],
        Some(formats) => string_list(scope, formats, "cursor_datetime_formats")?,
    };

    let Some(start_value) = map.get("start_datetime") else {
        return scope.fail("DatetimeBasedCursor.start_datetime is required");
    };
    let start_datetime = datetime(scope, start_value, "start_datetime", &datetime_format)?;
    let end_value = map.get("end_datetime");
    let end_datetime = match end_value {
        None => BuilderDatetime::Now,
        Some(value) => match datetime(scope, value, "end_datetime", &datetime_format)? {
            BuilderDatetime::Custom { value, .. } if value == NOW_UTC_SENTINEL => {
                BuilderDatetime::Now
            }
            other => other,
        },
    };

    let is_data_feed = optional_bool(scope, map, "is_data_feed", DATETIME_BASED_CURSOR)?;
    let filter_mode = if is_data_feed == Some(true) {
        FilterMode::NoFilter
    } else if end_value.is_some() {
        FilterMode::Range
    } else {
        FilterMode::Start
    };

    let step = optional_string(scope, map, "step", DATETIME_BASED_CURSOR)?;
    let granularity = optional_string(scope, map, "cursor_granularity", DATETIME_BASED_CURSOR)?;
    let slicer = match (step, granularity) {
        (Some(step), Some(cursor_granularity)) => Some(BuilderSlicer {
            step,
            cursor_granularity,
        }),
        (None, None) => None,
        _ => return scope.fail("DatetimeBasedCursor step and cursor_granularity must be set together"),
    };

    let datetime_format = (cursor_datetime_formats.first() != Some(&datetime_format))
        .then_some(datetime_format);

    Ok(Some(BuilderIncrementalSync {
        cursor_field,
        cursor_datetime_formats,
        datetime_format,
        start_datetime,
        end_datetime,
        start_time_option: option_field(scope, map, "start_time_option")?,
        end_time_option: option_field(scope, map, "end_time_option")?,
        lookback_window: optional_string(scope, map, "lookback_window", DATETIME_BASED_CURSOR)?,
        slicer,
        filter_mode,
    }))
}

fn option_field(
    scope: &Scope,
    map: &Map<String, Value>,
    field: &str,
) -> Converted<Option<BuilderRequestOption>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(request_option(
            scope,
            value,
            &format!("{DATETIME_BASED_CURSOR}.{field}"),
        )?)),
    }
}

/// A datetime is a plain string or a `MinMaxDatetime` without bounds. It is
/// user input when it references a spec key that satisfies the date
/// template and uses the canonical format.
fn datetime(
    scope: &Scope,
    value: &Value,
    field: &str,
    cursor_format: &str,
) -> Converted<BuilderDatetime> {
    let (text, format) = match value {
        Value::String(text) => (text.clone(), cursor_format.to_string()),
        Value::Object(_) => {
            let map = known_fields(
                scope,
                value,
                MIN_MAX_DATETIME,
                &["type", "datetime", "datetime_format"],
            )?;
            expect_type(scope, value, field, MIN_MAX_DATETIME)?;
            let text = required_string(scope, map, "datetime", MIN_MAX_DATETIME)?;
            let format = optional_string(scope, map, "datetime_format", MIN_MAX_DATETIME)?
                .unwrap_or_else(|| cursor_format.to_string());
            (text, format)
        }
        _ => return scope.fail(format!("{field} must be a string or a MinMaxDatetime")),
    };

    if format == CANONICAL_DATETIME_FORMAT {
        if let Some(template) = locked_input_template(DATETIME_BASED_CURSOR, field) {
            let path = format!("{DATETIME_BASED_CURSOR}.{field}");
            if let Ok(key) = spec_key(scope, &path, Some(&Value::String(text.clone())), template) {
                return Ok(BuilderDatetime::UserInput {
                    value: interpolate_config_key(&key),
                });
            }
        }
    }
    Ok(BuilderDatetime::Custom {
        value: text,
        format: Some(format),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> Value {
        json!({
            "required": ["start_date"],
            "properties": {
                "start_date": {
                    "type": "string",
                    "pattern": "^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}Z$"
                }
            }
        })
    }

    #[test]
    fn start_only_cursor_uses_user_input() {
        let spec = spec();
        let scope = Scope::global(Some(&spec));
        let converted = incremental_sync(
            &scope,
            &json!({
                "type": "DatetimeBasedCursor",
                "cursor_field": "updated_at",
                "datetime_format": "%Y-%m-%dT%H:%M:%SZ",
                "start_datetime": {
                    "type": "MinMaxDatetime",
                    "datetime": "{{ config['start_date'] }}",
                    "datetime_format": "%Y-%m-%dT%H:%M:%SZ"
                }
            }),
        )
        .expect("converts")
        .expect("present");
        assert_eq!(
            converted.start_datetime,
            BuilderDatetime::UserInput {
                value: "{{ config[\"start_date\"] }}".into()
            }
        );
        assert_eq!(converted.end_datetime, BuilderDatetime::Now);
        assert_eq!(converted.filter_mode, FilterMode::Start);
        assert_eq!(converted.datetime_format, None);
        assert_eq!(converted.cursor_datetime_formats, vec!["%Y-%m-%dT%H:%M:%SZ".to_string()]);
    }

    #[test]
    fn non_canonical_format_is_custom() {
        let spec = spec();
        let scope = Scope::global(Some(&spec));
        let converted = incremental_sync(
            &scope,
            &json!({
                "type": "DatetimeBasedCursor",
                "cursor_field": "updated_at",
                "datetime_format": "%s",
                "start_datetime": "{{ config['start_date'] }}",
                "end_datetime": "{{ now_utc().strftime('%Y-%m-%dT%H:%M:%SZ') }}",
                "is_data_feed": true
            }),
        )
        .expect("converts")
        .expect("present");
        assert_eq!(
            converted.start_datetime,
            BuilderDatetime::Custom {
                value: "{{ config['start_date'] }}".into(),
                format: Some("%s".into())
            }
        );
        assert_eq!(converted.end_datetime, BuilderDatetime::Now);
        assert_eq!(converted.filter_mode, FilterMode::NoFilter);
    }

    #[test]
    fn bounds_and_partition_fields_are_rejected() {
        let scope = Scope::global(None);
        let bounded = json!({
            "type": "DatetimeBasedCursor",
            "cursor_field": "updated_at",
            "datetime_format": "%s",
            "start_datetime": {"type": "MinMaxDatetime", "datetime": "0", "min_datetime": "0"}
        });
        assert!(incremental_sync(&scope, &bounded).is_err());
        let partitioned = json!({
            "type": "DatetimeBasedCursor",
            "cursor_field": "updated_at",
            "datetime_format": "%s",
            "start_datetime": "0",
            "partition_field_start": "start"
        });
        assert!(incremental_sync(&scope, &partitioned).is_err());
    }
}
