use serde_json::Value;

use crate::encode::Format;
use crate::error::{Error, Result};
use crate::extract::ValueRange;

/// Parsed request body. Bounds are checked for type here and for ordering in
/// [`RequestParams::range`].
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    pub min_val: f64,
    pub max_val: f64,
    pub format: Format,
    pub colormap: Option<String>,
    pub brightness: Option<f32>,
    pub compress: Option<bool>,
}

impl RequestParams {
    pub fn new(min_val: f64, max_val: f64, format: Format) -> Self {
        Self {
            min_val,
            max_val,
            format,
            colormap: None,
            brightness: None,
            compress: None,
        }
    }

    pub fn from_json(body: &Value) -> Result<Self> {
        let object = body.as_object().ok_or_else(|| {
            Error::InvalidRequest("request body must be a JSON object".to_string())
        })?;

        let bound = |key: &str| -> Result<f64> {
            object.get(key).and_then(Value::as_f64).ok_or_else(|| {
                Error::InvalidRequest("min_val and max_val must be numbers".to_string())
            })
        };
        let min_val = bound("min_val")?;
        let max_val = bound("max_val")?;

        let format = match object.get("format") {
            None | Some(Value::Null) => Format::ScalarPoint,
            Some(Value::String(tag)) => tag.parse()?,
            Some(other) => {
                return Err(Error::InvalidRequest(format!(
                    "format must be a string, got {other}"
                )))
            }
        };

        let colormap = optional(object.get("colormap"), "colormap", |value| {
            value.as_str().map(str::to_string)
        })?;
        let brightness = optional(object.get("brightness"), "brightness", |value| {
            value.as_f64().map(|v| v as f32).filter(|v| v.is_finite() && *v >= 0.0)
        })?;
        let compress = optional(object.get("compress"), "compress", Value::as_bool)?;

        Ok(Self {
            min_val,
            max_val,
            format,
            colormap,
            brightness,
            compress,
        })
    }

    pub fn range(&self) -> Result<ValueRange> {
        ValueRange::new(self.min_val, self.max_val)
    }
}

fn optional<T>(
    value: Option<&Value>,
    key: &str,
    convert: impl FnOnce(&Value) -> Option<T>,
) -> Result<Option<T>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => convert(value)
            .map(Some)
            .ok_or_else(|| Error::InvalidRequest(format!("invalid {key}: {value}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_body_defaults_to_scalar_points() {
        let params = RequestParams::from_json(&json!({ "min_val": 3, "max_val": 6.5 }))
            .expect("params");
        assert_eq!(params, RequestParams::new(3.0, 6.5, Format::ScalarPoint));
        assert!(params.range().is_ok());
    }

    #[test]
    fn optional_fields_are_parsed() {
        let params = RequestParams::from_json(&json!({
            "min_val": -1.0,
            "max_val": 1.0,
            "format": "vtp",
            "colormap": "viridis",
            "brightness": 1.2,
            "compress": false
        }))
        .expect("params");
        assert_eq!(params.format, Format::AttributedPointSet);
        assert_eq!(params.colormap.as_deref(), Some("viridis"));
        assert_eq!(params.brightness, Some(1.2));
        assert_eq!(params.compress, Some(false));
    }

    #[test]
    fn non_numeric_bounds_are_rejected() {
        for body in [
            json!({ "min_val": "3", "max_val": 6 }),
            json!({ "max_val": 6 }),
            json!({ "min_val": true, "max_val": 6 }),
            json!([3, 6]),
        ] {
            let err = RequestParams::from_json(&body).expect_err("rejected");
            assert_eq!(err.status_code(), 400, "{body}");
        }
    }

    #[test]
    fn ordering_is_checked_by_range() {
        let params = RequestParams::from_json(&json!({ "min_val": 5, "max_val": 5 }))
            .expect("params");
        assert!(matches!(params.range(), Err(Error::InvalidRange { .. })));
    }

    #[test]
    fn bad_optional_fields_are_client_errors() {
        for body in [
            json!({ "min_val": 0, "max_val": 1, "format": "obj" }),
            json!({ "min_val": 0, "max_val": 1, "format": 3 }),
            json!({ "min_val": 0, "max_val": 1, "brightness": -1 }),
            json!({ "min_val": 0, "max_val": 1, "compress": "yes" }),
        ] {
            assert!(matches!(
                RequestParams::from_json(&body),
                Err(Error::InvalidRequest(_))
            ));
        }
    }
}
