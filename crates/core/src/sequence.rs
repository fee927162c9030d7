use crate::error::{StepListError, StoreError, ValidationError};
use crate::object_store::ObjectStore;
use crate::step::{Step, StepList};
use crate::types::ScreenObject;
use crate::watcher::Watcher;

pub const DEFAULT_SEQUENCE_NAME: &str = "UntitledSequence";

/// The aggregate a run, a save, or the UI operates on.
///
/// Every mutation goes through a method so the modified flag stays accurate.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    name: String,
    loop_count: i64,
    objects: ObjectStore,
    steps: StepList,
    watchers: Vec<Watcher>,
    modified: bool,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_NAME)
    }
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loop_count: 1,
            objects: ObjectStore::new(),
            steps: StepList::new(),
            watchers: Vec::new(),
            modified: false,
        }
    }

    /// Assemble a sequence from loaded parts; starts unmodified.
    pub fn from_parts(
        name: impl Into<String>,
        loop_count: i64,
        objects: ObjectStore,
        steps: StepList,
        watchers: Vec<Watcher>,
    ) -> Self {
        Self { name: name.into(), loop_count, objects, steps, watchers, modified: false }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.modified = true;
    }

    /// 0 = loop forever, N > 0 = exactly N passes. Negative is rejected at run start.
    pub fn loop_count(&self) -> i64 {
        self.loop_count
    }

    pub fn set_loop_count(&mut self, loop_count: i64) {
        self.loop_count = loop_count;
        self.modified = true;
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn steps(&self) -> &StepList {
        &self.steps
    }

    pub fn watchers(&self) -> &[Watcher] {
        &self.watchers
    }

    pub fn set_watchers(&mut self, watchers: Vec<Watcher>) {
        self.watchers = watchers;
        self.modified = true;
    }

    pub fn add_object(&mut self, name: &str, object: ScreenObject) -> Result<(), StoreError> {
        self.objects.add(name, object)?;
        self.modified = true;
        Ok(())
    }

    pub fn remove_object(&mut self, name: &str) -> Option<ScreenObject> {
        let removed = self.objects.remove(name);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    pub(crate) fn object_mut(&mut self, name: &str) -> Option<&mut ScreenObject> {
        self.objects.get_mut(name)
    }

    pub fn insert_step(&mut self, step: Step, at: Option<usize>) -> Result<usize, StepListError> {
        let index = self.steps.insert(step, at)?;
        self.modified = true;
        Ok(index)
    }

    pub fn push_step(&mut self, step: Step) {
        self.steps.push(step);
        self.modified = true;
    }

    pub fn delete_step(&mut self, index: usize) -> Result<Step, StepListError> {
        let step = self.steps.delete(index)?;
        self.modified = true;
        Ok(step)
    }

    pub fn move_step_up(&mut self, index: usize) -> Result<bool, StepListError> {
        let moved = self.steps.move_up(index)?;
        self.modified |= moved;
        Ok(moved)
    }

    pub fn move_step_down(&mut self, index: usize) -> Result<bool, StepListError> {
        let moved = self.steps.move_down(index)?;
        self.modified |= moved;
        Ok(moved)
    }

    /// Edit a step in place; its position is unchanged.
    pub fn step_mut(&mut self, index: usize) -> Option<&mut Step> {
        let step = self.steps.get_mut(index)?;
        self.modified = true;
        Some(step)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_saved(&mut self) {
        self.modified = false;
    }

    /// Checks run before any step executes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.steps.is_empty() {
            return Err(ValidationError::EmptySteps);
        }
        if self.loop_count < 0 {
            return Err(ValidationError::NegativeLoopCount(self.loop_count));
        }
        Ok(())
    }
}
