//! Ordered step log.

use serde::{Deserialize, Serialize};

use crate::step::{Step, StepEdit};
use crate::{CoreError, StepId};

/// Ordered sequence of steps; insertion order is execution order.
///
/// Ids are unique within a store and nothing here reorders steps implicitly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Step>", into = "Vec<Step>")]
pub struct StepStore {
    steps: Vec<Step>,
}

impl StepStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<Step>) -> Result<Self, CoreError> {
        let mut store = Self::new();
        for step in steps {
            store.ensure_unique(&step.id)?;
            store.steps.push(step);
        }
        Ok(store)
    }

    /// Appends a step at the end. The timestamp is raised to the previous step's when the
    /// clock went backwards so creation times stay non-decreasing.
    pub fn append(&mut self, mut step: Step) -> Result<&Step, CoreError> {
        self.ensure_unique(&step.id)?;
        if let Some(last) = self.steps.last() {
            step.timestamp = step.timestamp.max(last.timestamp);
        }
        self.steps.push(step);
        Ok(&self.steps[self.steps.len() - 1])
    }

    pub fn insert_at(&mut self, position: usize, step: Step) -> Result<(), CoreError> {
        if position > self.steps.len() {
            return Err(CoreError::PositionOutOfRange {
                position,
                len: self.steps.len(),
            });
        }
        self.ensure_unique(&step.id)?;
        self.steps.insert(position, step);
        Ok(())
    }

    pub fn insert_after(&mut self, anchor: &StepId, step: Step) -> Result<(), CoreError> {
        let position = self.position(anchor)?;
        self.insert_at(position + 1, step)
    }

    pub fn remove(&mut self, id: &StepId) -> Result<Step, CoreError> {
        let position = self.position(id)?;
        Ok(self.steps.remove(position))
    }

    pub fn update(&mut self, id: &StepId, edit: StepEdit) -> Result<&Step, CoreError> {
        let position = self.position(id)?;
        let mut edited = self.steps[position].clone();
        edited.apply_edit(edit)?;
        self.steps[position] = edited;
        Ok(&self.steps[position])
    }

    /// Applies `edit` and then moves the step to `position`, if given. Either both
    /// happen or neither does.
    pub fn update_and_move(
        &mut self,
        id: &StepId,
        edit: StepEdit,
        position: Option<usize>,
    ) -> Result<&Step, CoreError> {
        let current = self.position(id)?;
        if let Some(position) = position {
            if position >= self.steps.len() {
                return Err(CoreError::PositionOutOfRange {
                    position,
                    len: self.steps.len(),
                });
            }
        }
        let mut edited = self.steps[current].clone();
        edited.apply_edit(edit)?;
        self.steps.remove(current);
        let target = position.unwrap_or(current);
        self.steps.insert(target, edited);
        Ok(&self.steps[target])
    }

    /// Moves a step to `position`, counted after its removal.
    pub fn move_to(&mut self, id: &StepId, position: usize) -> Result<(), CoreError> {
        let current = self.position(id)?;
        if position >= self.steps.len() {
            return Err(CoreError::PositionOutOfRange {
                position,
                len: self.steps.len(),
            });
        }
        let step = self.steps.remove(current);
        self.steps.insert(position, step);
        Ok(())
    }

    pub fn get(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|step| &step.id == id)
    }

    pub fn position(&self, id: &StepId) -> Result<usize, CoreError> {
        self.steps
            .iter()
            .position(|step| &step.id == id)
            .ok_or_else(|| CoreError::StepNotFound(id.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Step> {
        self.steps.clone()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    fn ensure_unique(&self, id: &StepId) -> Result<(), CoreError> {
        if self.get(id).is_some() {
            return Err(CoreError::DuplicateStep(id.clone()));
        }
        Ok(())
    }
}

impl TryFrom<Vec<Step>> for StepStore {
    type Error = CoreError;

    fn try_from(steps: Vec<Step>) -> Result<Self, Self::Error> {
        Self::from_steps(steps)
    }
}

impl From<StepStore> for Vec<Step> {
    fn from(store: StepStore) -> Self {
        store.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;

    fn ids(store: &StepStore) -> Vec<String> {
        store.iter().map(|step| step.id.0.clone()).collect()
    }

    #[test]
    fn append_keeps_order_and_rejects_duplicates() {
        let mut store = StepStore::new();
        store.append(Step::navigate("https://a").with_id("a")).unwrap();
        store.append(Step::comment("x").with_id("b")).unwrap();
        let err = store.append(Step::comment("y").with_id("a")).unwrap_err();
        assert_eq!(err, CoreError::DuplicateStep(StepId::from("a")));
        assert_eq!(ids(&store), vec!["a", "b"]);
    }

    #[test]
    fn append_clamps_timestamps_to_be_non_decreasing() {
        let mut store = StepStore::new();
        store
            .append(Step::comment("first").with_timestamp(2_000))
            .unwrap();
        let appended = store
            .append(Step::comment("second").with_timestamp(1_500))
            .unwrap();
        assert_eq!(appended.timestamp, 2_000);
    }

    #[test]
    fn explicit_insert_and_move() {
        let mut store = StepStore::new();
        store.append(Step::comment("a").with_id("a")).unwrap();
        store.append(Step::comment("c").with_id("c")).unwrap();
        store
            .insert_after(&StepId::from("a"), Step::comment("b").with_id("b"))
            .unwrap();
        assert_eq!(ids(&store), vec!["a", "b", "c"]);

        store.move_to(&StepId::from("c"), 0).unwrap();
        assert_eq!(ids(&store), vec!["c", "a", "b"]);

        let err = store
            .insert_at(9, Step::comment("z").with_id("z"))
            .unwrap_err();
        assert!(matches!(err, CoreError::PositionOutOfRange { position: 9, len: 3 }));
    }

    #[test]
    fn remove_and_update_by_id() {
        let mut store = StepStore::new();
        store.append(Step::comment("a").with_id("a")).unwrap();
        store.append(Step::wait_for(500).with_id("w")).unwrap();

        let updated = store
            .update(
                &StepId::from("w"),
                StepEdit {
                    value: Some("750".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.value(), Some("750"));

        let removed = store.remove(&StepId::from("a")).unwrap();
        assert_eq!(removed.kind(), StepKind::Comment);
        assert!(store.remove(&StepId::from("a")).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_edit_leaves_step_untouched() {
        let mut store = StepStore::new();
        store.append(Step::navigate("https://a").with_id("n")).unwrap();
        let result = store.update(
            &StepId::from("n"),
            StepEdit {
                kind: Some(StepKind::WaitFor),
                value: Some("soon".into()),
                ..Default::default()
            },
        );
        assert!(result.is_err());
        assert_eq!(store.get(&StepId::from("n")).unwrap().kind(), StepKind::Navigate);
    }

    #[test]
    fn rejected_edit_does_not_move_the_step() {
        let mut store = StepStore::new();
        store.append(Step::comment("a").with_id("a")).unwrap();
        store.append(Step::navigate("https://b").with_id("b")).unwrap();

        let err = store
            .update_and_move(
                &StepId::from("b"),
                StepEdit {
                    kind: Some(StepKind::WaitFor),
                    value: Some("later".into()),
                    ..Default::default()
                },
                Some(0),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidEdit(_)));
        assert_eq!(ids(&store), vec!["a", "b"]);

        let err = store
            .update_and_move(&StepId::from("b"), StepEdit::default(), Some(2))
            .unwrap_err();
        assert!(matches!(err, CoreError::PositionOutOfRange { position: 2, len: 2 }));

        let moved = store
            .update_and_move(
                &StepId::from("b"),
                StepEdit {
                    url: Some("https://c".into()),
                    ..Default::default()
                },
                Some(0),
            )
            .unwrap();
        assert_eq!(moved.url(), Some("https://c"));
        assert_eq!(ids(&store), vec!["b", "a"]);
    }

    #[test]
    fn deserializing_rejects_duplicate_ids() {
        let raw = r#"[
            {"id": "a", "type": "comment", "timestamp": 1},
            {"id": "a", "type": "comment", "timestamp": 2}
        ]"#;
        assert!(serde_json::from_str::<StepStore>(raw).is_err());
    }
}
