use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use validator::Validate;

use super::error::JobError;

pub const PROCESSED_PREFIX: &str = "processed-";

/// One step of a transformation request. Applied in list order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Resize { width: i64, height: i64 },
    Rotate { degrees: i64 },
    Grayscale,
    /// Any operation name this worker does not know. Skipped, not rejected, and kept
    /// verbatim so it can be echoed in events and forwarded to a delegated executor.
    Unsupported(Value),
}

impl Operation {
    pub fn name(&self) -> &str {
        match self {
            Operation::Resize { .. } => "resize",
            Operation::Rotate { .. } => "rotate",
            Operation::Grayscale => "grayscale",
            Operation::Unsupported(raw) => raw
                .get("operation")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }
}

/// Wire shape of the operations this worker understands.
#[derive(Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
enum KnownOperation {
    Resize { width: i64, height: i64 },
    Rotate { degrees: i64 },
    Grayscale,
}

const KNOWN_OPERATIONS: [&str; 3] = ["resize", "rotate", "grayscale"];

impl From<KnownOperation> for Operation {
    fn from(op: KnownOperation) -> Self {
        match op {
            KnownOperation::Resize { width, height } => Operation::Resize { width, height },
            KnownOperation::Rotate { degrees } => Operation::Rotate { degrees },
            KnownOperation::Grayscale => Operation::Grayscale,
        }
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Operation::Resize { width, height } => KnownOperation::Resize {
                width: *width,
                height: *height,
            }
            .serialize(serializer),
            Operation::Rotate { degrees } => {
                KnownOperation::Rotate { degrees: *degrees }.serialize(serializer)
            }
            Operation::Grayscale => KnownOperation::Grayscale.serialize(serializer),
            Operation::Unsupported(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let name = raw
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                D::Error::custom("operation entry needs a string \"operation\" tag")
            })?;

        if !KNOWN_OPERATIONS.contains(&name) {
            return Ok(Operation::Unsupported(raw));
        }
        KnownOperation::deserialize(raw)
            .map(Operation::from)
            .map_err(D::Error::custom)
    }
}

/// Unit of work flowing producer -> queue -> worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct JobMessage {
    #[serde(default, alias = "image_id")]
    #[validate(length(min = 1, message = "image_key is required"))]
    pub image_key: String,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl JobMessage {
    pub fn new(image_key: impl Into<String>, operations: Vec<Operation>) -> Self {
        Self {
            image_key: image_key.into(),
            operations,
        }
    }

    /// Decodes and validates a queue body. Every failure here is a poison message.
    pub fn parse(body: &[u8]) -> Result<Self, JobError> {
        let job: JobMessage = serde_json::from_slice(body)
            .map_err(|e| JobError::MalformedJob(format!("invalid job body: {}", e)))?;
        job.validate()
            .map_err(|e| JobError::MalformedJob(e.to_string()))?;
        Ok(job)
    }

    /// Result key. Depends on the source key only, so redelivery overwrites.
    pub fn processed_image_key(&self) -> String {
        processed_key(&self.image_key)
    }
}

pub fn processed_key(image_key: &str) -> String {
    format!("{}{}", PROCESSED_PREFIX, image_key)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Body published to the notification channel after each processing attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub image_key: String,
    pub processed_image_key: String,
    pub operations: Vec<Operation>,
    pub status: JobStatus,
    pub environment: String,
}

impl CompletionEvent {
    pub fn completed(job: &JobMessage, processed_image_key: String, environment: &str) -> Self {
        Self {
            image_key: job.image_key.clone(),
            processed_image_key,
            operations: job.operations.clone(),
            status: JobStatus::Completed,
            environment: environment.to_string(),
        }
    }

    pub fn failed(job: &JobMessage, environment: &str) -> Self {
        Self {
            image_key: job.image_key.clone(),
            processed_image_key: job.processed_image_key(),
            operations: job.operations.clone(),
            status: JobStatus::Failed,
            environment: environment.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_wire_format() {
        let body = br#"{"image_key":"cat.png","operations":[
            {"operation":"resize","width":50,"height":40},
            {"operation":"rotate","degrees":-90},
            {"operation":"grayscale"}
        ]}"#;
        let job = JobMessage::parse(body).unwrap();

        assert_eq!(job.image_key, "cat.png");
        assert_eq!(
            job.operations,
            vec![
                Operation::Resize { width: 50, height: 40 },
                Operation::Rotate { degrees: -90 },
                Operation::Grayscale,
            ]
        );
    }

    #[test]
    fn unknown_operations_are_kept_verbatim() {
        let job = JobMessage::parse(
            br#"{"image_key":"a.png","operations":[{"operation":"sepia","strength":3}]}"#,
        )
        .unwrap();
        let sepia = json!({"operation": "sepia", "strength": 3});

        assert_eq!(job.operations, vec![Operation::Unsupported(sepia.clone())]);
        assert_eq!(job.operations[0].name(), "sepia");
        assert_eq!(
            serde_json::to_value(&job).unwrap(),
            json!({"image_key": "a.png", "operations": [sepia]})
        );
    }

    #[test]
    fn missing_operations_means_empty() {
        let job = JobMessage::parse(br#"{"image_key":"a.png"}"#).unwrap();
        assert!(job.operations.is_empty());
    }

    #[test]
    fn legacy_image_id_field_is_accepted() {
        let job = JobMessage::parse(br#"{"image_id":"old.jpg","operations":[]}"#).unwrap();
        assert_eq!(job.image_key, "old.jpg");
    }

    #[test]
    fn missing_or_empty_key_is_malformed() {
        for body in [
            &br#"{"operations":[]}"#[..],
            br#"{"image_key":"","operations":[]}"#,
        ] {
            let err = JobMessage::parse(body).unwrap_err();
            assert!(matches!(err, JobError::MalformedJob(_)), "{err:?}");
        }
    }

    #[test]
    fn wrong_shapes_are_malformed() {
        for body in [
            &b"not json"[..],
            br#"{"image_key":"a.png","operations":{"operation":"grayscale"}}"#,
            br#"{"image_key":"a.png","operations":[{"width":10}]}"#,
            br#"{"image_key":"a.png","operations":[{"operation":7}]}"#,
            br#"{"image_key":"a.png","operations":["grayscale"]}"#,
            br#"{"image_key":"a.png","operations":[{"operation":"resize","width":"big","height":1}]}"#,
        ] {
            let err = JobMessage::parse(body).unwrap_err();
            assert!(matches!(err, JobError::MalformedJob(_)), "{err:?}");
        }
    }

    #[test]
    fn negative_dimensions_still_parse() {
        let job = JobMessage::parse(
            br#"{"image_key":"a.png","operations":[{"operation":"resize","width":-1,"height":5}]}"#,
        )
        .unwrap();
        assert_eq!(job.operations, vec![Operation::Resize { width: -1, height: 5 }]);
    }

    #[test]
    fn processed_key_ignores_operations() {
        let a = JobMessage::new("cat.png", vec![Operation::Grayscale]);
        let b = JobMessage::new("cat.png", vec![Operation::Rotate { degrees: 90 }]);
        assert_eq!(a.processed_image_key(), "processed-cat.png");
        assert_eq!(a.processed_image_key(), b.processed_image_key());
    }

    #[test]
    fn event_serializes_to_wire_format() {
        let sepia = json!({"operation": "sepia", "strength": 3});
        let job = JobMessage::new(
            "cat.png",
            vec![Operation::Grayscale, Operation::Unsupported(sepia.clone())],
        );
        let event = CompletionEvent::completed(&job, job.processed_image_key(), "nonprod");

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "image_key": "cat.png",
                "processed_image_key": "processed-cat.png",
                "operations": [{"operation": "grayscale"}, sepia],
                "status": "completed",
                "environment": "nonprod"
            })
        );
    }
}
