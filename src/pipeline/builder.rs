// file: src/pipeline/builder.rs
// description: assembles an ordered step list and checks that every required slot is produced upstream
// reference: internal pipeline design

use crate::error::{PipelineError, Result};
use crate::pipeline::context::ContextKey;
use crate::pipeline::step::PipelineStep;
use std::collections::HashSet;
use std::sync::Arc;

/// A validated, ordered list of steps.
#[derive(Clone)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl Pipeline {
    pub fn steps(&self) -> &[Arc<dyn PipelineStep>] {
        &self.steps
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Arc<dyn PipelineStep>>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        if self.steps.is_empty() {
            return Err(PipelineError::Config(
                "pipeline must contain at least one step".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut available: HashSet<ContextKey> = HashSet::new();

        for (index, step) in self.steps.iter().enumerate() {
            if !names.insert(step.name()) {
                return Err(PipelineError::Config(format!(
                    "duplicate step name '{}'",
                    step.name()
                )));
            }

            if let Some(key) = step.requires().iter().find(|key| !available.contains(*key)) {
                return Err(PipelineError::Config(format!(
                    "step '{}' (step {}) requires '{}' but no earlier step produces it",
                    step.name(),
                    index + 1,
                    key
                )));
            }

            available.extend(step.produces().iter().copied());
        }

        Ok(Pipeline { steps: self.steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::PipelineContext;
    use crate::pipeline::step::StepResources;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct Fake {
        name: &'static str,
        requires: &'static [ContextKey],
        produces: &'static [ContextKey],
    }

    #[async_trait]
    impl PipelineStep for Fake {
        fn name(&self) -> &'static str {
            self.name
        }

        fn requires(&self) -> &'static [ContextKey] {
            self.requires
        }

        fn produces(&self) -> &'static [ContextKey] {
            self.produces
        }

        async fn run(&self, _ctx: &mut PipelineContext, _res: &StepResources) -> Result<Value> {
            Ok(json!(null))
        }
    }

    fn fake(
        name: &'static str,
        requires: &'static [ContextKey],
        produces: &'static [ContextKey],
    ) -> Arc<dyn PipelineStep> {
        Arc::new(Fake {
            name,
            requires,
            produces,
        })
    }

    #[test]
    fn test_accepts_satisfied_requirements() {
        let pipeline = PipelineBuilder::new()
            .step(fake("extract", &[], &[ContextKey::ExtractedContent]))
            .step(fake(
                "intake",
                &[ContextKey::ExtractedContent],
                &[ContextKey::IntakeAnalysis],
            ))
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["extract", "intake"]);
    }

    #[test]
    fn test_rejects_requirement_produced_later() {
        let result = PipelineBuilder::new()
            .step(fake(
                "intake",
                &[ContextKey::ExtractedContent],
                &[ContextKey::IntakeAnalysis],
            ))
            .step(fake("extract", &[], &[ContextKey::ExtractedContent]))
            .build();

        let message = result.err().unwrap().to_string();
        assert!(message.contains("intake"));
        assert!(message.contains("extracted_content"));
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        assert!(PipelineBuilder::new().build().is_err());
        assert!(
            PipelineBuilder::new()
                .step(fake("a", &[], &[]))
                .step(fake("a", &[], &[]))
                .build()
                .is_err()
        );
    }
}
