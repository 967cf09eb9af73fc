use serde::Deserialize;
use serde_json::Value;

use digit_ocr::TrainingExample;

/// What a POST body asks the engine to do.
#[derive(Debug, PartialEq)]
pub enum Command {
    Train(Vec<TrainingExample>),
    Predict(Vec<f64>),
}

#[derive(Debug, PartialEq)]
pub enum RequestError {
    /// Body is not JSON at all.
    InvalidJson(String),
    /// JSON, but neither a training nor a prediction request.
    InvalidRequest,
}

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(default)]
    train: bool,
    #[serde(default, rename = "trainArray")]
    train_array: Option<Vec<TrainingExample>>,
    #[serde(default)]
    predict: bool,
    #[serde(default)]
    image: Option<Vec<f64>>,
}

pub fn parse_command(raw: &[u8]) -> Result<Command, RequestError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| RequestError::InvalidJson(e.to_string()))?;
    let body: Body = serde_json::from_value(value).map_err(|_| RequestError::InvalidRequest)?;

    match body {
        Body { train: true, train_array: Some(examples), .. } => Ok(Command::Train(examples)),
        Body { predict: true, image: Some(image), .. } => Ok(Command::Predict(image)),
        _ => Err(RequestError::InvalidRequest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_training_request() {
        let raw = br#"{"train": true, "trainArray": [{"y0": [0.0, 1.0], "label": 4}]}"#;
        assert_eq!(
            parse_command(raw),
            Ok(Command::Train(vec![TrainingExample::new(vec![0.0, 1.0], 4)]))
        );
    }

    #[test]
    fn parses_prediction_request() {
        let raw = br#"{"predict": true, "image": [0.0, 0.5, 1.0]}"#;
        assert_eq!(parse_command(raw), Ok(Command::Predict(vec![0.0, 0.5, 1.0])));
    }

    #[test]
    fn training_takes_precedence_when_both_flags_are_set() {
        let raw = br#"{"train": true, "trainArray": [], "predict": true, "image": []}"#;
        assert_eq!(parse_command(raw), Ok(Command::Train(vec![])));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(parse_command(b"{not json"), Err(RequestError::InvalidJson(_))));
    }

    #[test]
    fn rejects_other_shapes() {
        assert_eq!(parse_command(br#"{"hello": 1}"#), Err(RequestError::InvalidRequest));
        assert_eq!(parse_command(br#"{"train": true}"#), Err(RequestError::InvalidRequest));
        assert_eq!(
            parse_command(br#"{"predict": false, "image": [1.0]}"#),
            Err(RequestError::InvalidRequest)
        );
        assert_eq!(parse_command(br#"[1, 2, 3]"#), Err(RequestError::InvalidRequest));
        assert_eq!(
            parse_command(br#"{"train": true, "trainArray": [{"y0": [], "label": "3"}]}"#),
            Err(RequestError::InvalidRequest)
        );
    }
}
