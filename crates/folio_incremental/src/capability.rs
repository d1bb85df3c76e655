//! Processors, their build steps and what they declare about incrementality.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::step::BuildStep;

/// What a processor declared about itself, computed once per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorCapability {
    /// The processor's name.
    pub name: String,
    /// `true` only if every step supports incremental reuse.
    pub can_incremental: bool,
    /// Names of the steps that do not support incremental reuse.
    #[serde(default)]
    pub unsupported_steps: Vec<String>,
    /// Names of all steps, in execution order.
    pub steps: Vec<String>,
}

/// A named pipeline of build steps for one class of documents.
#[derive(Clone)]
pub struct Processor {
    name: String,
    steps: Vec<Arc<dyn BuildStep>>,
}

impl Processor {
    /// Creates a processor with no steps.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn with_step(mut self, step: impl BuildStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Returns the processor's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the steps in execution order.
    pub fn steps(&self) -> &[Arc<dyn BuildStep>] {
        &self.steps
    }

    /// Derives the processor's capability from its steps.
    pub fn capability(&self) -> ProcessorCapability {
        let unsupported_steps: Vec<String> = self
            .steps
            .iter()
            .filter(|s| !s.supports_incremental())
            .map(|s| s.name().to_string())
            .collect();
        ProcessorCapability {
            name: self.name.clone(),
            can_incremental: unsupported_steps.is_empty(),
            unsupported_steps,
            steps: self.steps.iter().map(|s| s.name().to_string()).collect(),
        }
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<&str> = self.steps.iter().map(|s| s.name()).collect();
        f.debug_struct("Processor")
            .field("name", &self.name)
            .field("steps", &steps)
            .finish()
    }
}

/// All processors available to a build, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<String, Processor>,
}

impl ProcessorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a processor, replacing any previous one with the same name.
    pub fn register(&mut self, processor: Processor) {
        self.processors.insert(processor.name.clone(), processor);
    }

    /// Looks up a processor by name.
    pub fn get(&self, name: &str) -> Option<&Processor> {
        self.processors.get(name)
    }

    /// Computes the capability of every registered processor.
    pub fn capabilities(&self) -> BTreeMap<String, ProcessorCapability> {
        self.processors
            .iter()
            .map(|(name, p)| (name.clone(), p.capability()))
            .collect()
    }
}
