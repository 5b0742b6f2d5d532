use serde::{Deserialize, Serialize};

pub const DEFAULT_DATASET_CATEGORY: &str = "dataset";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    name: String,
    category: String,
    before: String,
    after: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub prompt: String,
    pub completion: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Query {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        before: impl Into<String>,
        after: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            before: before.into(),
            after: after.into(),
        }
    }

    pub fn from_dataset_record(record: DatasetRecord, line_number: usize) -> Self {
        Self {
            name: record
                .name
                .unwrap_or_else(|| format!("line-{line_number}")),
            category: record
                .category
                .unwrap_or_else(|| DEFAULT_DATASET_CATEGORY.to_string()),
            before: record.input,
            after: record.output,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn after(&self) -> &str {
        &self.after
    }

    pub fn training_record(&self) -> TrainingRecord {
        TrainingRecord {
            prompt: self.before.clone(),
            completion: self.after.clone(),
        }
    }

    pub fn inference_input(&self) -> &str {
        &self.before
    }

    pub fn dataset_record(&self) -> DatasetRecord {
        DatasetRecord {
            input: self.before.clone(),
            output: self.after.clone(),
            category: Some(self.category.clone()),
            name: Some(self.name.clone()),
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::{DatasetRecord, Query};

    #[test]
    fn training_record_passes_texts_through_verbatim() {
        let query = Query::new("foo", "cli", "print(1)", "print(2)");
        let value = serde_json::to_value(query.training_record()).expect("record serializes");

        assert_eq!(
            value,
            serde_json::json!({"prompt": "print(1)", "completion": "print(2)"})
        );
        assert_eq!(value.as_object().map(|object| object.len()), Some(2));
    }

    #[test]
    fn inference_input_is_the_before_text_untouched() {
        let before = "def f():\n\treturn  \"x\"\n\n";
        let query = Query::new("f", "cli", before, "def f(): pass");
        assert_eq!(query.inference_input(), before);
    }

    #[test]
    fn dataset_record_defaults_missing_name_and_category() {
        let record: DatasetRecord =
            serde_json::from_str(r#"{"input": "a = 1", "output": "a = 2"}"#)
                .expect("minimal record should deserialize");
        let query = Query::from_dataset_record(record, 7);

        assert_eq!(query.name(), "line-7");
        assert_eq!(query.category(), "dataset");
        assert_eq!(query.key(), "dataset/line-7");
    }

    #[test]
    fn dataset_record_reloads_into_an_equal_query() {
        let query = Query::new("bug_12", "web", "x = [", "x = []");
        let reloaded = Query::from_dataset_record(query.dataset_record(), 1);
        assert_eq!(reloaded, query);
    }
}
