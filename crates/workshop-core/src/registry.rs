//! Job type registry.
//!
//! Stored jobs carry a `className` discriminator. The registry maps each
//! discriminator to a factory producing an empty instance of the concrete
//! type, which is then filled from the stored attributes.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::job::{Attributes, DEFAULT_JOB_TYPE, Job};

/// Attribute key holding the job's concrete type discriminator
pub const CLASS_NAME_KEY: &str = "className";

/// Attribute key holding the job's type tag
pub const TYPE_KEY: &str = "type";

/// Builds an empty job of one concrete type
pub type JobFactory = fn() -> Box<dyn Job>;

fn build<J: Job + Default + 'static>() -> Box<dyn Job> {
    Box::new(J::default())
}

/// Registry of job types known to this process
#[derive(Debug, Default, Clone)]
pub struct JobRegistry {
    factories: BTreeMap<&'static str, JobFactory>,
}

impl JobRegistry {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job type under the class name its instances report.
    ///
    /// # Errors
    ///
    /// Fails if the class name is empty or already taken.
    pub fn register<J: Job + Default + 'static>(&mut self) -> CoreResult<()> {
        let class_name = J::default().class_name();
        if class_name.is_empty() {
            return Err(CoreError::EmptyClassName);
        }
        if self.factories.contains_key(class_name) {
            return Err(CoreError::DuplicateJobClass {
                class_name: class_name.to_string(),
            });
        }
        self.factories.insert(class_name, build::<J>);
        tracing::debug!(class_name, "registered job class");
        Ok(())
    }

    /// Registers a job type, consuming and returning the registry
    ///
    /// # Errors
    ///
    /// See [`JobRegistry::register`].
    pub fn with<J: Job + Default + 'static>(mut self) -> CoreResult<Self> {
        self.register::<J>()?;
        Ok(self)
    }

    /// Returns true if a class name is registered
    #[must_use]
    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// Registered class names, sorted
    #[must_use]
    pub fn class_names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Creates an empty job of the given class
    ///
    /// # Errors
    ///
    /// Fails if the class is not registered.
    pub fn instantiate(&self, class_name: &str) -> CoreResult<Box<dyn Job>> {
        let factory = self
            .factories
            .get(class_name)
            .ok_or_else(|| CoreError::UnknownJobClass {
                class_name: class_name.to_string(),
            })?;
        Ok(factory())
    }

    /// Converts a job into the attribute map handed to backends: the job's
    /// own attributes plus `className` and `type`.
    ///
    /// # Errors
    ///
    /// Fails if the job's class was never registered, since it could not be
    /// loaded back.
    pub fn serialize(&self, job: &dyn Job) -> CoreResult<Attributes> {
        let class_name = job.class_name();
        if !self.contains(class_name) {
            return Err(CoreError::UnknownJobClass {
                class_name: class_name.to_string(),
            });
        }

        let mut attributes = job.attributes().clone();
        attributes.insert(
            CLASS_NAME_KEY.to_string(),
            Value::String(class_name.to_string()),
        );
        attributes.insert(
            TYPE_KEY.to_string(),
            Value::String(job.job_type().to_string()),
        );
        Ok(attributes)
    }

    /// Rebuilds a job from a backend attribute map.
    ///
    /// `className` and `type` are consumed; every other key, including the
    /// backend's `id` and `status`, is handed to the job as attributes.
    ///
    /// # Errors
    ///
    /// Fails if `className` is absent or not registered.
    pub fn deserialize(&self, mut attributes: Attributes) -> CoreResult<Box<dyn Job>> {
        let class_name = match attributes.remove(CLASS_NAME_KEY) {
            Some(Value::String(name)) if !name.is_empty() => name,
            _ => return Err(CoreError::MissingClassName),
        };

        let mut job = self.instantiate(&class_name)?;

        let job_type = match attributes.remove(TYPE_KEY) {
            Some(Value::String(job_type)) => job_type,
            _ => DEFAULT_JOB_TYPE.to_string(),
        };
        job.set_job_type(job_type);
        job.set_attributes(attributes);
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobData;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct ReportJob {
        data: JobData,
    }

    impl Job for ReportJob {
        fn class_name(&self) -> &'static str {
            "report"
        }

        fn data(&self) -> &JobData {
            &self.data
        }

        fn data_mut(&mut self) -> &mut JobData {
            &mut self.data
        }

        fn perform(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct NamelessJob {
        data: JobData,
    }

    impl Job for NamelessJob {
        fn class_name(&self) -> &'static str {
            ""
        }

        fn data(&self) -> &JobData {
            &self.data
        }

        fn data_mut(&mut self) -> &mut JobData {
            &mut self.data
        }

        fn perform(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn registry() -> JobRegistry {
        JobRegistry::new().with::<ReportJob>().unwrap()
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = registry();
        let err = registry.register::<ReportJob>().unwrap_err();
        assert!(matches!(err, CoreError::DuplicateJobClass { ref class_name } if class_name == "report"));
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let mut registry = JobRegistry::new();
        assert!(matches!(
            registry.register::<NamelessJob>(),
            Err(CoreError::EmptyClassName)
        ));
    }

    #[test]
    fn test_serialize_adds_envelope_fields() {
        let mut job = ReportJob::default();
        job.data_mut().insert("name", "weekly");
        job.set_job_type("special".to_string());

        let attributes = registry().serialize(&job).unwrap();
        assert_eq!(attributes.get(CLASS_NAME_KEY), Some(&json!("report")));
        assert_eq!(attributes.get(TYPE_KEY), Some(&json!("special")));
        assert_eq!(attributes.get("name"), Some(&json!("weekly")));
    }

    #[test]
    fn test_serialize_unregistered_class() {
        let job = ReportJob::default();
        let err = JobRegistry::new().serialize(&job).unwrap_err();
        assert!(matches!(err, CoreError::UnknownJobClass { .. }));
    }

    #[test]
    fn test_deserialize_restores_type_and_attributes() {
        let attributes = json!({
            "className": "report",
            "type": "special",
            "id": "3",
            "status": "locked",
            "name": "weekly",
        });
        let Value::Object(attributes) = attributes else {
            unreachable!()
        };

        let job = registry().deserialize(attributes).unwrap();
        assert_eq!(job.class_name(), "report");
        assert_eq!(job.job_type(), "special");
        assert_eq!(job.id().unwrap().as_str(), "3");
        assert!(job.attributes().get(CLASS_NAME_KEY).is_none());
        assert!(job.attributes().get(TYPE_KEY).is_none());
        assert_eq!(job.attributes().get("name"), Some(&json!("weekly")));
        assert_eq!(job.data().status(), Some("locked"));
    }

    #[test]
    fn test_deserialize_defaults_missing_type() {
        let mut attributes = Attributes::new();
        attributes.insert(CLASS_NAME_KEY.to_string(), json!("report"));
        let job = registry().deserialize(attributes).unwrap();
        assert_eq!(job.job_type(), DEFAULT_JOB_TYPE);
    }

    #[test]
    fn test_deserialize_errors() {
        let registry = registry();
        assert!(matches!(
            registry.deserialize(Attributes::new()),
            Err(CoreError::MissingClassName)
        ));

        let mut attributes = Attributes::new();
        attributes.insert(CLASS_NAME_KEY.to_string(), json!("nope"));
        assert!(matches!(
            registry.deserialize(attributes),
            Err(CoreError::UnknownJobClass { .. })
        ));
    }

    #[test]
    fn test_class_names() {
        assert_eq!(registry().class_names(), vec!["report"]);
    }
}
